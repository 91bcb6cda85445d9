//! completion gateway: the boundary between session turns and the remote
//! provider.
//!
//! the gateway is the fault boundary of the crate. whatever goes wrong on the
//! wire (transport, auth, malformed response, rate limit) is logged here and
//! collapsed into [`FALLBACK_REPLY`], so callers always get text back and the
//! session's reply interval always closes.

use std::sync::Arc;

use async_trait::async_trait;
use bevy::prelude::*;
use llm::{
    builder::{LLMBackend, LLMBuilder},
    chat::ChatMessage,
    error::LLMError,
    LLMProvider,
};
use thiserror::Error;

use crate::session::{Role, Turn, SYSTEM_INSTRUCTION};

/// shown in place of the assistant reply when the provider call fails.
pub const FALLBACK_REPLY: &str = "Sorry, I encountered an error. Please try again.";

/// fixed generation parameters. not user-configurable.
pub const MODEL_ID: &str = "llama3-8b-8192";
pub const TEMPERATURE: f32 = 0.5;
pub const MAX_TOKENS: u32 = 1024;

/// env var the groq backend reads its key from. the key stays inside the
/// provider; no component or ui state ever carries it.
pub const API_KEY_VAR: &str = "GROQ_API_KEY";

/// internal to the gateway; never crosses into the session controller.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("provider error: {0}")]
    Provider(#[from] LLMError),
    #[error("provider returned an empty reply")]
    EmptyReply,
}

/// seam to the remote provider: ordered turns in (system instruction first),
/// assistant text out. implemented by [`LlmBackend`] for real traffic and by
/// fakes in tests.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, turns: &[Turn]) -> Result<String, GatewayError>;
}

/// map session turns to the provider's message type. the system turn is
/// skipped: it is installed on the provider at build time.
fn to_chat_messages(turns: &[Turn]) -> Vec<ChatMessage> {
    turns
        .iter()
        .filter_map(|t| match t.role {
            Role::User => Some(ChatMessage::user().content(t.content.clone()).build()),
            Role::Assistant => Some(ChatMessage::assistant().content(t.content.clone()).build()),
            Role::System => None,
        })
        .collect()
}

/// one-shot chat over an `llm` provider with the fixed parameters above.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
}

impl LlmBackend {
    /// build a groq-backed provider. the key is read once and captured by the
    /// provider; it is not retained anywhere else.
    pub fn groq(api_key: impl Into<String>) -> Result<Self, GatewayError> {
        let provider: Arc<dyn LLMProvider> = LLMBuilder::new()
            .backend(LLMBackend::Groq)
            .api_key(api_key)
            .model(MODEL_ID)
            .temperature(TEMPERATURE)
            .max_tokens(MAX_TOKENS)
            .stream(false)
            .system(SYSTEM_INSTRUCTION)
            .build()?
            .into();
        Ok(Self { provider })
    }
}

#[async_trait]
impl CompletionBackend for LlmBackend {
    async fn complete(&self, turns: &[Turn]) -> Result<String, GatewayError> {
        let messages = to_chat_messages(turns);
        let resp = self.provider.chat(&messages).await?;
        let text = resp.text().unwrap_or_default().to_string();
        if text.is_empty() {
            return Err(GatewayError::EmptyReply);
        }
        Ok(text)
    }
}

/// resource the app installs before chatting. stateless between calls.
#[derive(Resource, Clone)]
pub struct CompletionGateway {
    backend: Arc<dyn CompletionBackend>,
}

impl CompletionGateway {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// groq gateway keyed from the environment (`GROQ_API_KEY`). an absent
    /// key still builds; the first call fails and surfaces as the fallback.
    pub fn groq_from_env() -> Result<Self, GatewayError> {
        let key = std::env::var(API_KEY_VAR).unwrap_or_default();
        Ok(Self::new(Arc::new(LlmBackend::groq(key)?)))
    }

    /// run the completion. never errors: a failed call is logged and comes
    /// back as [`FALLBACK_REPLY`].
    pub async fn complete(&self, turns: &[Turn]) -> String {
        match self.backend.complete(turns).await {
            Ok(text) => {
                info!(target: "bevy_medchat", "completion ok: reply_len={}", text.len());
                text
            }
            Err(err) => {
                error!(target: "bevy_medchat", "completion error: {err}");
                FALLBACK_REPLY.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm::chat::ChatRole;
    use pretty_assertions::assert_eq;

    struct FixedReply(&'static str);

    #[async_trait]
    impl CompletionBackend for FixedReply {
        async fn complete(&self, _turns: &[Turn]) -> Result<String, GatewayError> {
            Ok(self.0.to_string())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl CompletionBackend for AlwaysFails {
        async fn complete(&self, _turns: &[Turn]) -> Result<String, GatewayError> {
            Err(GatewayError::EmptyReply)
        }
    }

    #[tokio::test]
    async fn success_passes_reply_through() {
        let gateway = CompletionGateway::new(Arc::new(FixedReply("CRISPR is a genome editor.")));
        let reply = gateway.complete(&[Turn::user("what is CRISPR")]).await;
        assert_eq!(reply, "CRISPR is a genome editor.");
    }

    #[tokio::test]
    async fn failure_collapses_to_fallback_text() {
        let gateway = CompletionGateway::new(Arc::new(AlwaysFails));
        let reply = gateway.complete(&[Turn::user("what is CRISPR")]).await;
        assert_eq!(reply, FALLBACK_REPLY);
    }

    #[test]
    fn chat_messages_skip_the_system_turn() {
        let turns = vec![
            Turn::system(SYSTEM_INSTRUCTION),
            Turn::user("q1"),
            Turn::assistant("a1"),
            Turn::user("q2"),
        ];
        let messages = to_chat_messages(&turns);

        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[0].role, ChatRole::User));
        assert_eq!(messages[0].content, "q1");
        assert!(matches!(messages[1].role, ChatRole::Assistant));
        assert_eq!(messages[1].content, "a1");
        assert!(matches!(messages[2].role, ChatRole::User));
        assert_eq!(messages[2].content, "q2");
    }
}
