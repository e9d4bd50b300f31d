use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Standard `{code, msg, data}` wrapper used by most backend endpoints.
#[derive(Deserialize, Debug)]
pub struct Envelope<T> {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub msg: Option<String>,
    pub data: Option<T>,
}

#[derive(Serialize)]
pub struct CreateChatRequest<'a> {
    pub kb_uuid: Option<&'a str>,
    pub title: &'a str,
}

#[derive(Serialize)]
pub struct SendMessageRequest<'a> {
    pub content: &'a str,
}

#[derive(Serialize)]
pub struct RenameChatRequest<'a> {
    pub title: &'a str,
}

#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
}

#[derive(Deserialize, Debug)]
pub struct LoginData {
    #[serde(default)]
    pub token: Option<String>,
}

/// A conversation as returned by the create endpoint.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub kb_uuid: Option<String>,
    #[serde(default)]
    pub update_at: Option<i64>,
}

/// Lightweight projection used by the conversation directory.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub uuid: String,
    #[serde(default)]
    pub title: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default, rename = "update_at")]
    pub last_updated: Option<i64>,
}

impl ConversationSummary {
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            "Untitled chat"
        } else {
            &self.title
        }
    }

    pub fn last_updated_display(&self) -> Option<String> {
        let millis = self.last_updated?;
        let utc = DateTime::from_timestamp_millis(millis)?;
        Some(
            utc.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
                .to_string(),
        )
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct ChatPage {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub list: Vec<ConversationSummary>,
}

/// One stored turn from the history endpoint.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub uuid: String,
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub create_at: Option<i64>,
}

/// Reply of the non-streaming send endpoint.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatReply {
    pub answer: String,
    #[serde(default)]
    pub context: Vec<String>,
}
