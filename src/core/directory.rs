use std::error::Error as StdError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::api::{ApiError, ChatBackend, ConversationSummary};
use crate::core::failure::describe_failure;

#[derive(Debug)]
pub enum DirectoryError {
    EmptyTitle,
    List(ApiError),
    Rename(ApiError),
    Delete(ApiError),
}

impl DirectoryError {
    pub fn user_message(&self) -> String {
        match self {
            DirectoryError::EmptyTitle => "Title cannot be empty".to_string(),
            DirectoryError::List(err) => describe_failure(err, "Failed to load chat list"),
            DirectoryError::Rename(err) => describe_failure(err, "Failed to rename chat"),
            DirectoryError::Delete(err) => describe_failure(err, "Failed to delete chat"),
        }
    }
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_message())
    }
}

impl StdError for DirectoryError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            DirectoryError::EmptyTitle => None,
            DirectoryError::List(err) | DirectoryError::Rename(err) | DirectoryError::Delete(err) => {
                Some(err)
            }
        }
    }
}

/// Locally cached view of the server's conversation list.
///
/// The cache is only ever replaced from the list endpoint or patched after a
/// confirmed remote change, so dropping it and refetching is always safe. It
/// never reads or writes the message log.
///
/// Every [`ConversationDirectory::clear`] bumps a generation counter. A first
/// page fetched under an older generation is returned to its caller but never
/// written into the cache.
pub struct ConversationDirectory {
    backend: Arc<dyn ChatBackend>,
    page_size: u32,
    summaries: Mutex<Vec<ConversationSummary>>,
    generation: AtomicU64,
}

impl ConversationDirectory {
    pub fn new(backend: Arc<dyn ChatBackend>, page_size: u32) -> Self {
        Self {
            backend,
            page_size: page_size.max(1),
            summaries: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
        }
    }

    fn cache(&self) -> MutexGuard<'_, Vec<ConversationSummary>> {
        self.summaries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Fetches one page of summaries. The first page replaces the cache.
    pub async fn list(&self, page: u32) -> Result<Vec<ConversationSummary>, DirectoryError> {
        self.list_in_generation(page, self.generation()).await
    }

    async fn list_in_generation(
        &self,
        page: u32,
        generation: u64,
    ) -> Result<Vec<ConversationSummary>, DirectoryError> {
        let page = page.max(1);
        let fetched = self
            .backend
            .list_conversations(page, self.page_size)
            .await
            .map_err(DirectoryError::List)?;
        debug!(page, count = fetched.list.len(), total = fetched.total, "fetched chat list");
        if page == 1 {
            let mut cache = self.cache();
            if self.generation() == generation {
                *cache = fetched.list.clone();
            } else {
                debug!(generation, "dropping chat list fetched before the cache was cleared");
            }
        }
        Ok(fetched.list)
    }

    pub async fn refresh(&self) -> Result<(), DirectoryError> {
        self.list(1).await.map(|_| ())
    }

    /// Refreshes the first page unless the cache was cleared after
    /// `generation` was read.
    pub async fn refresh_from(&self, generation: u64) -> Result<(), DirectoryError> {
        self.list_in_generation(1, generation).await.map(|_| ())
    }

    /// Renames remotely; the cached title changes only once the server agrees.
    pub async fn rename(&self, chat_uuid: &str, title: &str) -> Result<(), DirectoryError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(DirectoryError::EmptyTitle);
        }
        self.backend
            .rename_conversation(chat_uuid, title)
            .await
            .map_err(DirectoryError::Rename)?;
        info!(chat = chat_uuid, "renamed conversation");
        if let Some(summary) = self
            .cache()
            .iter_mut()
            .find(|summary| summary.uuid == chat_uuid)
        {
            summary.title = title.to_string();
        }
        Ok(())
    }

    pub async fn delete(&self, chat_uuid: &str) -> Result<(), DirectoryError> {
        self.backend
            .delete_conversation(chat_uuid)
            .await
            .map_err(DirectoryError::Delete)?;
        info!(chat = chat_uuid, "deleted conversation");
        self.cache().retain(|summary| summary.uuid != chat_uuid);
        Ok(())
    }

    /// Puts a just-created conversation at the top without waiting for a refetch.
    pub fn remember_created(&self, created: ConversationSummary) {
        let mut cache = self.cache();
        cache.retain(|summary| summary.uuid != created.uuid);
        cache.insert(0, created);
    }

    pub fn summaries(&self) -> Vec<ConversationSummary> {
        self.cache().clone()
    }

    pub fn find(&self, chat_uuid: &str) -> Option<ConversationSummary> {
        self.cache()
            .iter()
            .find(|summary| summary.uuid == chat_uuid)
            .cloned()
    }

    /// Maps a 1-based position in the last listing, or a uuid, to a uuid.
    pub fn resolve_reference(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        match reference.parse::<usize>() {
            Ok(index) => index
                .checked_sub(1)
                .and_then(|index| self.cache().get(index).map(|summary| summary.uuid.clone())),
            Err(_) => Some(reference.to_string()),
        }
    }

    pub fn clear(&self) {
        let mut cache = self.cache();
        self.generation.fetch_add(1, Ordering::SeqCst);
        cache.clear();
    }
}
