use tracing::{info, warn};
use unicode_segmentation::UnicodeSegmentation;

use crate::api::{ApiError, ChatBackend, Conversation, ConversationSummary};
use crate::core::state_store::ConversationStore;

/// Characters of the first message used as a new conversation's title.
pub const DRAFT_TITLE_LENGTH: usize = 50;
pub const DEFAULT_TITLE: &str = "My conversation";

/// Title for a conversation created from its first message.
pub fn draft_title(message: &str) -> String {
    let title: String = message
        .trim()
        .graphemes(true)
        .take(DRAFT_TITLE_LENGTH)
        .collect();
    if title.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        title
    }
}

/// Outcome of [`IdentityResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub chat_uuid: String,
    /// Set when the conversation was created by this call.
    pub created: Option<ConversationSummary>,
}

/// Decides which conversation an outgoing turn belongs to.
///
/// Does not guard against concurrent resolution itself; the session manager
/// only resolves while its in-flight flag is held.
#[derive(Debug, Default)]
pub struct IdentityResolver {
    active: Option<String>,
    kb_binding: Option<String>,
}

impl IdentityResolver {
    pub fn new(active: Option<String>, kb_binding: Option<String>) -> Self {
        Self { active, kb_binding }
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn set_active(&mut self, chat_uuid: impl Into<String>) {
        self.active = Some(chat_uuid.into());
    }

    pub fn clear(&mut self) {
        self.active = None;
    }

    pub fn kb_binding(&self) -> Option<&str> {
        self.kb_binding.as_deref()
    }

    pub fn set_kb_binding(&mut self, kb_uuid: Option<String>) {
        self.kb_binding = kb_uuid
            .map(|kb| kb.trim().to_string())
            .filter(|kb| !kb.is_empty());
    }

    /// Returns the active conversation, creating one first when there is none.
    ///
    /// On failure (including a create response without a uuid) the active
    /// identity is untouched, so resubmitting is a clean retry.
    pub async fn resolve(
        &mut self,
        backend: &dyn ChatBackend,
        store: &dyn ConversationStore,
        message: &str,
    ) -> Result<Resolution, ApiError> {
        if let Some(active) = &self.active {
            return Ok(Resolution {
                chat_uuid: active.clone(),
                created: None,
            });
        }

        let title = draft_title(message);
        let created = backend
            .create_conversation(self.kb_binding.as_deref(), &title)
            .await?;
        let Conversation {
            uuid,
            title: created_title,
            update_at,
            ..
        } = created;
        let chat_uuid = uuid
            .filter(|uuid| !uuid.trim().is_empty())
            .ok_or(ApiError::MissingField("uuid"))?;

        info!(chat = %chat_uuid, "created conversation");
        self.active = Some(chat_uuid.clone());
        if let Err(err) = store.set(&chat_uuid) {
            warn!(error = %err, "could not remember active conversation");
        }

        Ok(Resolution {
            created: Some(ConversationSummary {
                uuid: chat_uuid.clone(),
                title: if created_title.is_empty() {
                    title
                } else {
                    created_title
                },
                last_updated: update_at,
            }),
            chat_uuid,
        })
    }
}
