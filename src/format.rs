//! paragraph splitting for transcript display.

/// default display width of a paragraph, in characters.
pub const DEFAULT_PARAGRAPH_LEN: usize = 500;

/// split `text` into sentences at each "period followed by whitespace"
/// boundary. the period stays with its sentence; the whitespace run is
/// consumed.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut iter = text.char_indices().peekable();
    while let Some((i, c)) = iter.next() {
        if c != '.' {
            continue;
        }
        let mut end = i + 1;
        let mut saw_whitespace = false;
        while let Some(&(j, d)) = iter.peek() {
            if !d.is_whitespace() {
                break;
            }
            saw_whitespace = true;
            end = j + d.len_utf8();
            iter.next();
        }
        if saw_whitespace {
            sentences.push(&text[start..i + 1]);
            start = end;
        }
    }
    sentences.push(&text[start..]);
    sentences
}

/// greedily pack sentences into display paragraphs of at most `max_len`
/// characters.
///
/// a single sentence longer than `max_len` is emitted whole as its own
/// oversized paragraph; sentences are never cut. empty input yields no
/// paragraphs. each paragraph is trimmed. pure and deterministic.
pub fn split_paragraphs(text: &str, max_len: usize) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        if current.len() + sentence.len() <= max_len {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(sentence);
        } else {
            push_trimmed(&mut paragraphs, &current);
            current = sentence.to_string();
        }
    }
    push_trimmed(&mut paragraphs, &current);

    paragraphs
}

fn push_trimmed(paragraphs: &mut Vec<String>, paragraph: &str) {
    let trimmed = paragraph.trim();
    if !trimmed.is_empty() {
        paragraphs.push(trimmed.to_string());
    }
}

/// `split_paragraphs` with [`DEFAULT_PARAGRAPH_LEN`].
pub fn split_paragraphs_default(text: &str) -> Vec<String> {
    split_paragraphs(text, DEFAULT_PARAGRAPH_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tiny_max_yields_single_sentence_paragraphs() {
        assert_eq!(split_paragraphs("A. B. C.", 3), vec!["A.", "B.", "C."]);
    }

    #[test]
    fn no_period_yields_one_trimmed_paragraph() {
        assert_eq!(
            split_paragraphs("  just one long thought with no full stop  ", 500),
            vec!["just one long thought with no full stop"]
        );
    }

    #[test]
    fn empty_input_yields_no_paragraphs() {
        assert!(split_paragraphs("", 500).is_empty());
        assert!(split_paragraphs("   ", 500).is_empty());
    }

    #[test]
    fn oversized_sentence_is_never_cut() {
        let long = "x".repeat(1000);
        let paragraphs = split_paragraphs(&long, 500);
        assert_eq!(paragraphs.len(), 1);
        assert_eq!(paragraphs[0].len(), 1000);
    }

    #[test]
    fn sentences_pack_while_under_the_limit() {
        let text = "First sentence. Second sentence. Third sentence.";
        // "First sentence." + "Second sentence." fits in 40; adding the third
        // would not.
        assert_eq!(
            split_paragraphs(text, 40),
            vec!["First sentence. Second sentence.", "Third sentence."]
        );
    }

    #[test]
    fn period_without_following_whitespace_does_not_split() {
        assert_eq!(split_paragraphs("v1.2 is out", 500), vec!["v1.2 is out"]);
    }

    #[test]
    fn trailing_boundary_leaves_no_empty_paragraph() {
        assert_eq!(split_paragraphs("Done. ", 500), vec!["Done."]);
    }

    #[test]
    fn default_max_is_500() {
        let sentence = format!("{}.", "a".repeat(299));
        let text = format!("{sentence} {sentence} {sentence}");
        let paragraphs = split_paragraphs_default(&text);
        // 300 + 300 fits under 500 only once, so the first paragraph holds one
        // sentence and the packing continues from there.
        assert_eq!(paragraphs.len(), 3);
        for p in &paragraphs {
            assert_eq!(p, &sentence);
        }
    }

    #[test]
    fn deterministic_for_same_input() {
        let text = "Alpha beta. Gamma delta. Epsilon.";
        assert_eq!(split_paragraphs(text, 20), split_paragraphs(text, 20));
    }
}
