//! initial-message extraction from the view's query string.
//!
//! a chat opened as `...?messagefromquery=what%20is%20CRISPR` auto-submits
//! that message once on load. on wasm the query string comes from
//! `window.location`; native builds read an env var instead, so a value
//! copied straight out of a url works verbatim.

use percent_encoding::percent_decode_str;

/// query parameter carrying the auto-submitted message.
pub const QUERY_PARAM: &str = "messagefromquery";

/// env var standing in for the query string on native builds.
pub const QUERY_ENV_VAR: &str = "MEDCHAT_QUERY";

fn decode(value: &str) -> Option<String> {
    let decoded = percent_decode_str(value).decode_utf8_lossy().into_owned();
    (!decoded.trim().is_empty()).then_some(decoded)
}

/// pull the initial message out of a raw query string (`?a=b&c=d`, with or
/// without the leading `?`). `None` when the parameter is absent or decodes
/// to whitespace, which means no auto-submission.
pub fn initial_message(query: &str) -> Option<String> {
    let query = query.strip_prefix('?').unwrap_or(query);
    query
        .split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(key, _)| *key == QUERY_PARAM)
        .and_then(|(_, value)| decode(value))
}

/// read the page's query string.
#[cfg(target_arch = "wasm32")]
pub fn initial_message_from_location() -> Option<String> {
    let search = web_sys::window()?.location().search().ok()?;
    initial_message(&search)
}

/// read the env-var stand-in. accepts either a bare (possibly
/// percent-encoded) message or a full query string.
#[cfg(not(target_arch = "wasm32"))]
pub fn initial_message_from_env() -> Option<String> {
    let raw = std::env::var(QUERY_ENV_VAR).ok()?;
    initial_message(&raw).or_else(|| decode(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_percent_escapes() {
        assert_eq!(
            initial_message("?messagefromquery=what%20is%20CRISPR"),
            Some("what is CRISPR".to_string())
        );
    }

    #[test]
    fn works_without_leading_question_mark() {
        assert_eq!(
            initial_message("messagefromquery=hello"),
            Some("hello".to_string())
        );
    }

    #[test]
    fn picks_the_parameter_out_of_many() {
        assert_eq!(
            initial_message("?utm_source=x&messagefromquery=hi&lang=en"),
            Some("hi".to_string())
        );
    }

    #[test]
    fn absent_parameter_means_no_auto_submission() {
        assert_eq!(initial_message("?other=1"), None);
        assert_eq!(initial_message(""), None);
    }

    #[test]
    fn empty_or_whitespace_value_means_no_auto_submission() {
        assert_eq!(initial_message("?messagefromquery="), None);
        assert_eq!(initial_message("?messagefromquery=%20%20"), None);
    }
}
