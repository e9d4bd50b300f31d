//! The streaming conversation session.
//!
//! [`SessionManager`] owns the message log and walks it through
//! `Idle -> Sending -> Streaming -> Idle`. A submitted turn resolves the
//! conversation identity, gets an assistant placeholder, and then grows that
//! placeholder as stream events are applied through [`SessionManager::next_update`].
//! Any failure returns the session to `Idle` with the placeholder removed and
//! one human-readable error recorded.
//!
//! Every reply stream carries an id. Abandoning a stream (switching
//! conversation, starting a new one, logging out) cancels it and bumps the
//! expected id, so events still in flight from the old stream are dropped on
//! arrival and never touch the new log.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiError, ChatBackend};
use crate::core::chat_stream::{ChatStreamService, ReplyParams, StreamEvent};
use crate::core::config::data::{ReplyMode, DEFAULT_LIST_PAGE_SIZE};
use crate::core::directory::{ConversationDirectory, DirectoryError};
use crate::core::failure::describe_failure;
use crate::core::identity::IdentityResolver;
use crate::core::message::Turn;
use crate::core::message_log::MessageLog;
use crate::core::state_store::ConversationStore;

pub const REQUEST_FAILED: &str = "Request failed, please verify backend service or token";
pub const HISTORY_FAILED: &str = "Failed to load chat history";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    /// Resolving the conversation identity for a submitted turn.
    Sending,
    /// A reply is being received into the placeholder.
    Streaming,
}

#[derive(Debug)]
pub enum SessionError {
    Identity(ApiError),
    StreamOpen(ApiError),
    MidStream(ApiError),
    HistoryLoad(ApiError),
}

impl SessionError {
    pub fn api_error(&self) -> &ApiError {
        match self {
            SessionError::Identity(err)
            | SessionError::StreamOpen(err)
            | SessionError::MidStream(err)
            | SessionError::HistoryLoad(err) => err,
        }
    }

    pub fn user_message(&self) -> String {
        let fallback = match self {
            SessionError::HistoryLoad(_) => HISTORY_FAILED,
            _ => REQUEST_FAILED,
        };
        describe_failure(self.api_error(), fallback)
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_message())
    }
}

impl StdError for SessionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.api_error())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    EmptyInput,
    Unauthenticated,
    Busy,
}

/// Result of [`SessionManager::submit`]. Rejections leave the session untouched.
#[derive(Debug)]
pub enum SubmitOutcome {
    Rejected(RejectReason),
    /// The reply is underway; drive it with [`SessionManager::next_update`].
    Streaming { chat_uuid: String },
    Failed(SessionError),
}

/// One applied step of the in-flight reply.
#[derive(Debug)]
pub enum SessionUpdate {
    Fragment(String),
    Context(Vec<String>),
    Completed,
    Failed(SessionError),
}

pub struct SessionOptions {
    pub kb_uuid: Option<String>,
    pub reply_mode: ReplyMode,
    pub list_page_size: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            kb_uuid: None,
            reply_mode: ReplyMode::default(),
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
        }
    }
}

pub struct SessionManager {
    backend: Arc<dyn ChatBackend>,
    store: Arc<dyn ConversationStore>,
    directory: Arc<ConversationDirectory>,
    identity: IdentityResolver,
    log: MessageLog,
    phase: SessionPhase,
    last_error: Option<String>,
    reply_mode: ReplyMode,
    streams: ChatStreamService,
    events: mpsc::UnboundedReceiver<(StreamEvent, u64)>,
    stream_cancel_token: Option<CancellationToken>,
    current_stream_id: u64,
    streaming_chat: Option<String>,
    refresh_task: Option<AbortHandle>,
}

impl SessionManager {
    /// Starts from the remembered active conversation, without loading it.
    /// Call [`SessionManager::restore`] to fetch its history.
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        store: Arc<dyn ConversationStore>,
        options: SessionOptions,
    ) -> Self {
        let directory = Arc::new(ConversationDirectory::new(
            Arc::clone(&backend),
            options.list_page_size,
        ));
        let identity = IdentityResolver::new(store.get(), options.kb_uuid);
        let (streams, events) = ChatStreamService::new();
        Self {
            backend,
            store,
            directory,
            identity,
            log: MessageLog::new(),
            phase: SessionPhase::Idle,
            last_error: None,
            reply_mode: options.reply_mode,
            streams,
            events,
            stream_cancel_token: None,
            current_stream_id: 0,
            streaming_chat: None,
            refresh_task: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        self.phase != SessionPhase::Idle
    }

    pub fn turns(&self) -> &[Turn] {
        self.log.turns()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn active_chat(&self) -> Option<&str> {
        self.identity.active()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn directory(&self) -> &Arc<ConversationDirectory> {
        &self.directory
    }

    pub fn reply_mode(&self) -> ReplyMode {
        self.reply_mode
    }

    pub fn kb_binding(&self) -> Option<&str> {
        self.identity.kb_binding()
    }

    /// Knowledge base bound to the next conversation this session creates.
    pub fn set_kb_binding(&mut self, kb_uuid: Option<String>) {
        self.identity.set_kb_binding(kb_uuid);
    }

    fn remember_active(&self, chat_uuid: &str) {
        if let Err(err) = self.store.set(chat_uuid) {
            warn!(error = %err, "could not remember active conversation");
        }
    }

    fn forget_active(&self) {
        if let Err(err) = self.store.clear() {
            warn!(error = %err, "could not clear remembered conversation");
        }
    }

    fn fail(&mut self, error: &SessionError) {
        let message = error.user_message();
        warn!(error = %message, "reply failed");
        self.last_error = Some(message);
        self.phase = SessionPhase::Idle;
        self.stream_cancel_token = None;
        self.streaming_chat = None;
    }

    /// Sends a user turn. Surrounding whitespace is trimmed.
    ///
    /// Blank input, a missing credential, or a reply already in progress are
    /// rejected without touching the log or the network.
    pub async fn submit(&mut self, text: &str) -> SubmitOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SubmitOutcome::Rejected(RejectReason::EmptyInput);
        }
        if !self.backend.is_authenticated() {
            return SubmitOutcome::Rejected(RejectReason::Unauthenticated);
        }
        if self.phase != SessionPhase::Idle {
            return SubmitOutcome::Rejected(RejectReason::Busy);
        }

        self.phase = SessionPhase::Sending;
        self.last_error = None;
        self.log.append(Turn::user(text));

        let resolution = match self
            .identity
            .resolve(self.backend.as_ref(), self.store.as_ref(), text)
            .await
        {
            Ok(resolution) => resolution,
            Err(err) => {
                let error = SessionError::Identity(err);
                self.fail(&error);
                return SubmitOutcome::Failed(error);
            }
        };
        if let Some(created) = resolution.created {
            self.directory.remember_created(created);
        }
        let chat_uuid = resolution.chat_uuid;

        self.log.append(Turn::placeholder());
        self.cancel_current_stream();
        self.current_stream_id += 1;
        let cancel_token = CancellationToken::new();
        self.stream_cancel_token = Some(cancel_token.clone());
        self.streaming_chat = Some(chat_uuid.clone());
        self.phase = SessionPhase::Streaming;
        debug!(stream_id = self.current_stream_id, chat = %chat_uuid, mode = %self.reply_mode, "starting reply");

        self.streams.spawn_reply(ReplyParams {
            backend: Arc::clone(&self.backend),
            chat_uuid: chat_uuid.clone(),
            content: text.to_string(),
            mode: self.reply_mode,
            cancel_token,
            stream_id: self.current_stream_id,
        });
        SubmitOutcome::Streaming { chat_uuid }
    }

    /// Waits for and applies the next event of the current reply.
    ///
    /// Returns `None` when no reply is in progress. Events from abandoned
    /// streams are skipped.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        while self.phase == SessionPhase::Streaming {
            let (event, stream_id) = self.events.recv().await?;
            if stream_id != self.current_stream_id {
                debug!(stream_id, current = self.current_stream_id, "ignoring stale stream event");
                continue;
            }
            return Some(self.apply_stream_event(event));
        }
        None
    }

    /// Drives the current reply to completion or failure.
    pub async fn wait_until_idle(&mut self) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        while let Some(update) = self.next_update().await {
            updates.push(update);
        }
        updates
    }

    fn apply_stream_event(&mut self, event: StreamEvent) -> SessionUpdate {
        match event {
            StreamEvent::Fragment(text) => {
                self.log.extend_last(&text);
                SessionUpdate::Fragment(text)
            }
            StreamEvent::Context(snippets) => {
                self.log.attach_context(snippets.clone());
                SessionUpdate::Context(snippets)
            }
            StreamEvent::Completed => {
                self.log.finalize();
                self.phase = SessionPhase::Idle;
                self.stream_cancel_token = None;
                if let Some(chat_uuid) = self.streaming_chat.take() {
                    info!(chat = %chat_uuid, "reply completed");
                    self.remember_active(&chat_uuid);
                }
                self.spawn_directory_refresh();
                SessionUpdate::Completed
            }
            StreamEvent::OpenFailed(err) => {
                self.log.discard_last();
                let error = SessionError::StreamOpen(err);
                self.fail(&error);
                SessionUpdate::Failed(error)
            }
            StreamEvent::Failed(err) => {
                if let Some(partial) = self.log.discard_last() {
                    debug!(discarded = partial.content().len(), "rolled back partial reply");
                }
                let error = SessionError::MidStream(err);
                self.fail(&error);
                SessionUpdate::Failed(error)
            }
        }
    }

    fn spawn_directory_refresh(&mut self) {
        let directory = Arc::clone(&self.directory);
        let generation = directory.generation();
        let task = tokio::spawn(async move {
            if let Err(err) = directory.refresh_from(generation).await {
                warn!(error = %err, "background chat list refresh failed");
            }
        });
        if let Some(previous) = self.refresh_task.replace(task.abort_handle()) {
            previous.abort();
        }
    }

    fn cancel_current_stream(&mut self) {
        if let Some(token) = self.stream_cancel_token.take() {
            token.cancel();
        }
    }

    /// Stops consuming the in-flight reply and drops its placeholder.
    fn abandon_stream(&mut self) {
        if self.phase != SessionPhase::Streaming {
            return;
        }
        self.cancel_current_stream();
        self.current_stream_id += 1;
        self.log.discard_last();
        self.streaming_chat = None;
        self.phase = SessionPhase::Idle;
        info!("abandoned in-flight reply");
    }

    /// Makes `chat_uuid` active and replaces the log with its history.
    ///
    /// On failure nothing is active and the log is empty.
    pub async fn resume(&mut self, chat_uuid: &str) -> Result<(), SessionError> {
        self.abandon_stream();
        self.last_error = None;
        match self.backend.load_history(chat_uuid).await {
            Ok(history) => {
                info!(chat = chat_uuid, turns = history.len(), "loaded conversation history");
                self.log
                    .replace_all(history.into_iter().map(Turn::from_history).collect());
                self.identity.set_active(chat_uuid);
                self.remember_active(chat_uuid);
                Ok(())
            }
            Err(err) => {
                let error = SessionError::HistoryLoad(err);
                warn!(chat = chat_uuid, error = %error, "could not load conversation history");
                self.identity.clear();
                self.log.clear();
                self.forget_active();
                self.last_error = Some(error.user_message());
                Err(error)
            }
        }
    }

    /// Reloads the remembered conversation, if any. Returns whether one was loaded.
    pub async fn restore(&mut self) -> Result<bool, SessionError> {
        let Some(active) = self.identity.active().map(str::to_string) else {
            return Ok(false);
        };
        if !self.backend.is_authenticated() {
            return Ok(false);
        }
        self.resume(&active).await.map(|()| true)
    }

    /// Starts over with no active conversation; the next submit creates one.
    pub fn new_conversation(&mut self) {
        self.abandon_stream();
        self.log.clear();
        self.identity.clear();
        self.forget_active();
        self.last_error = None;
    }

    /// Forgets everything tied to the signed-in user, including the
    /// backend credential. Later submits are rejected as unauthenticated.
    pub fn logout(&mut self) {
        self.new_conversation();
        if let Some(task) = self.refresh_task.take() {
            task.abort();
        }
        self.directory.clear();
        self.backend.clear_credentials();
        info!("session cleared on logout");
    }

    /// Deletes a conversation; deleting the active one starts a new chat.
    /// Returns whether the deleted conversation was the active one.
    pub async fn delete_conversation(&mut self, chat_uuid: &str) -> Result<bool, DirectoryError> {
        self.directory.delete(chat_uuid).await?;
        let was_active = self.identity.active() == Some(chat_uuid);
        if was_active {
            self.new_conversation();
        }
        Ok(was_active)
    }
}
