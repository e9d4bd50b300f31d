use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::api::HistoryMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }

    /// Stored history only distinguishes assistant turns; anything else
    /// (including system rows) is shown as the user's side.
    pub fn from_api_role(role: &str) -> Self {
        if role.eq_ignore_ascii_case("assistant") {
            TurnRole::Assistant
        } else {
            TurnRole::User
        }
    }

    pub fn is_user(self) -> bool {
        self == TurnRole::User
    }

    pub fn is_assistant(self) -> bool {
        self == TurnRole::Assistant
    }
}

/// Whether a turn may still change.
///
/// Only the assistant placeholder that is currently being streamed into is
/// `Provisional`; everything else in a log is `Final`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Provisional,
    Final,
}

/// Client-generated opaque turn id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TurnId(String);

static NEXT_TURN_SEQ: AtomicU64 = AtomicU64::new(1);

impl TurnId {
    pub fn generate(role: TurnRole) -> Self {
        let seq = NEXT_TURN_SEQ.fetch_add(1, Ordering::Relaxed);
        let millis = chrono::Utc::now().timestamp_millis();
        Self(format!("{millis}-{}-{seq}", role.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TurnId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    id: TurnId,
    role: TurnRole,
    content: String,
    context_snippets: Vec<String>,
    state: TurnState,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: TurnId::generate(TurnRole::User),
            role: TurnRole::User,
            content: content.into(),
            context_snippets: Vec::new(),
            state: TurnState::Final,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: TurnId::generate(TurnRole::Assistant),
            role: TurnRole::Assistant,
            content: content.into(),
            context_snippets: Vec::new(),
            state: TurnState::Final,
        }
    }

    /// Empty assistant turn that incoming fragments are appended to.
    pub fn placeholder() -> Self {
        Self {
            state: TurnState::Provisional,
            ..Self::assistant(String::new())
        }
    }

    pub fn from_history(message: HistoryMessage) -> Self {
        Self {
            id: TurnId::from(message.uuid),
            role: TurnRole::from_api_role(&message.role),
            content: message.content,
            context_snippets: Vec::new(),
            state: TurnState::Final,
        }
    }

    pub fn id(&self) -> &TurnId {
        &self.id
    }

    pub fn role(&self) -> TurnRole {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn context_snippets(&self) -> &[String] {
        &self.context_snippets
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn is_provisional(&self) -> bool {
        self.state == TurnState::Provisional
    }

    pub fn is_user(&self) -> bool {
        self.role.is_user()
    }

    pub fn is_assistant(&self) -> bool {
        self.role.is_assistant()
    }

    pub(crate) fn push_fragment(&mut self, fragment: &str) {
        self.content.push_str(fragment);
    }

    pub(crate) fn set_context_snippets(&mut self, snippets: Vec<String>) {
        self.context_snippets = snippets;
    }

    pub(crate) fn mark_final(&mut self) {
        self.state = TurnState::Final;
    }
}
