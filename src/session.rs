//! conversation state for one chat entity.
//!
//! `Session` owns the ordered transcript, the draft input line, and the
//! one-request-in-flight gate. all mutation goes through the methods below;
//! systems in the crate root drive them from bevy events.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// persona instruction prepended to every outbound prompt. never stored in
/// the session itself.
pub const SYSTEM_INSTRUCTION: &str = "You are a helpful Medical Research Assistant. \
You should answer questions only related to medical research. \
You should not answer programming questions.";

/// who produced a turn.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// one message in the transcript. immutable once appended; ordering in
/// `Session::turns` is chronological, oldest first.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// attach this to an entity you want to chat through the gateway.
///
/// `awaiting_reply` is true from a user turn's append until the paired
/// assistant turn lands (the gateway's fallback text counts), and while it is
/// true further submissions are ignored.
#[derive(Component, Clone, Debug, Default)]
pub struct Session {
    turns: Vec<Turn>,
    draft_input: String,
    awaiting_reply: bool,
    query_applied: bool,
}

impl Session {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn draft_input(&self) -> &str {
        &self.draft_input
    }

    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    /// draft editing for the input line.
    pub fn push_draft(&mut self, s: &str) {
        self.draft_input.push_str(s);
    }

    pub fn backspace_draft(&mut self) {
        self.draft_input.pop();
    }

    /// append a user turn and open the reply interval.
    ///
    /// returns the outbound prompt (`[system, ..all turns so far]`) for the
    /// gateway, or `None` when the text trims to empty or a reply is already
    /// pending. the user turn is in `turns` before the caller starts the
    /// remote call, so a ui can render it immediately.
    pub fn submit(&mut self, text: &str) -> Option<Vec<Turn>> {
        if text.trim().is_empty() || self.awaiting_reply {
            return None;
        }
        self.turns.push(Turn::user(text));
        self.draft_input.clear();
        self.awaiting_reply = true;

        let mut prompt = Vec::with_capacity(self.turns.len() + 1);
        prompt.push(Turn::system(SYSTEM_INSTRUCTION));
        prompt.extend(self.turns.iter().cloned());
        Some(prompt)
    }

    /// auto-submission for a query-parameter message. same semantics as
    /// `submit`, but honored at most once per session lifetime.
    pub fn initialize_from_query(&mut self, text: &str) -> Option<Vec<Turn>> {
        if self.query_applied {
            return None;
        }
        self.query_applied = true;
        self.submit(text)
    }

    /// append the assistant turn and close the reply interval. the caller
    /// passes either the provider's reply or the gateway's fallback text, so
    /// this is reached for every opened interval.
    pub fn resolve(&mut self, reply: impl Into<String>) {
        self.turns.push(Turn::assistant(reply));
        self.awaiting_reply = false;
    }
}
