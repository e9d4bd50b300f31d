//! Backend calls the session core depends on.
//!
//! [`ChatBackend`] is the seam between the session state machine and the
//! transport. [`HttpBackend`] implements it over `reqwest` against the
//! `/api/v1` REST surface; tests substitute a scripted backend.

pub mod error;
pub mod models;

pub use error::ApiError;
pub use models::*;

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::core::chat_stream::StreamReader;
use crate::utils::auth::add_bearer;
use crate::utils::url::api_url;

#[async_trait]
/// Contract required from the remote chat service.
pub trait ChatBackend: Send + Sync {
    /// Whether a bearer credential is available for calls.
    fn is_authenticated(&self) -> bool;

    /// Drops the bearer credential; later calls fail as unauthenticated.
    fn clear_credentials(&self);

    async fn create_conversation(
        &self,
        kb_uuid: Option<&str>,
        title: &str,
    ) -> Result<Conversation, ApiError>;

    /// Opens the streaming reply for `content`. A non-success status is an
    /// error here, never an empty stream.
    async fn open_message_stream(
        &self,
        chat_uuid: &str,
        content: &str,
    ) -> Result<StreamReader, ApiError>;

    /// Sends `content` and waits for the complete reply.
    async fn send_message(&self, chat_uuid: &str, content: &str) -> Result<ChatReply, ApiError>;

    async fn load_history(&self, chat_uuid: &str) -> Result<Vec<HistoryMessage>, ApiError>;

    async fn list_conversations(&self, page: u32, size: u32) -> Result<ChatPage, ApiError>;

    async fn rename_conversation(&self, chat_uuid: &str, title: &str) -> Result<(), ApiError>;

    async fn delete_conversation(&self, chat_uuid: &str) -> Result<(), ApiError>;
}

/// Reads a non-streaming response, turning non-2xx into [`ApiError::Status`].
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    context: &'static str,
) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body).map_err(|source| ApiError::Decode { context, source })
}

/// Unwraps a `{code, msg, data}` envelope, rejecting non-200 codes.
pub(crate) fn unwrap_envelope<T>(envelope: Envelope<T>) -> Result<Option<T>, ApiError> {
    match envelope.code {
        Some(code) if code != 200 => Err(ApiError::Rejected {
            code,
            message: envelope.msg,
        }),
        _ => Ok(envelope.data),
    }
}

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
    request_timeout: Duration,
}

impl HttpBackend {
    /// The client only bounds connection setup; streamed bodies may run for as
    /// long as the server keeps them open. Plain request/response calls get
    /// `request_timeout` individually.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()?;
        Ok(Self::with_client(client, base_url, token, request_timeout))
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        token: Option<String>,
        request_timeout: Duration,
    ) -> Self {
        let token = token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());
        Self {
            client,
            base_url: base_url.into(),
            token: RwLock::new(token),
            request_timeout,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder, ApiError> {
        let token = self
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ApiError::Unauthenticated)?;
        let request = self.client.request(method, api_url(&self.base_url, path));
        Ok(add_bearer(request, &token))
    }

    fn timed(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder, ApiError> {
        Ok(self.request(method, path)?.timeout(self.request_timeout))
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn clear_credentials(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    async fn create_conversation(
        &self,
        kb_uuid: Option<&str>,
        title: &str,
    ) -> Result<Conversation, ApiError> {
        let response = self
            .timed(reqwest::Method::POST, "chat")?
            .json(&CreateChatRequest { kb_uuid, title })
            .send()
            .await?;
        let envelope: Envelope<Conversation> = read_json(response, "create chat").await?;
        unwrap_envelope(envelope)?.ok_or(ApiError::MissingField("uuid"))
    }

    async fn open_message_stream(
        &self,
        chat_uuid: &str,
        content: &str,
    ) -> Result<StreamReader, ApiError> {
        // Only the wait for response headers is bounded; the body may stream
        // for as long as the server keeps it open.
        let pending = self
            .request(
                reqwest::Method::POST,
                &format!("chat/{chat_uuid}/message/stream"),
            )?
            .json(&SendMessageRequest { content })
            .send();
        let response = tokio::time::timeout(self.request_timeout, pending)
            .await
            .map_err(|_| ApiError::TimedOut("the reply stream to open"))??;
        debug!(status = %response.status(), chat = chat_uuid, "stream response received");
        StreamReader::open(response).await
    }

    async fn send_message(&self, chat_uuid: &str, content: &str) -> Result<ChatReply, ApiError> {
        let response = self
            .timed(reqwest::Method::POST, &format!("chat/{chat_uuid}/message"))?
            .json(&SendMessageRequest { content })
            .send()
            .await?;
        read_json(response, "send message").await
    }

    async fn load_history(&self, chat_uuid: &str) -> Result<Vec<HistoryMessage>, ApiError> {
        let response = self
            .timed(reqwest::Method::GET, &format!("chat/{chat_uuid}/messages"))?
            .send()
            .await?;
        read_json(response, "message history").await
    }

    async fn list_conversations(&self, page: u32, size: u32) -> Result<ChatPage, ApiError> {
        let response = self
            .timed(reqwest::Method::GET, "chat/list")?
            .query(&[("page", page), ("size", size)])
            .send()
            .await?;
        let envelope: Envelope<ChatPage> = read_json(response, "chat list").await?;
        Ok(unwrap_envelope(envelope)?.unwrap_or_default())
    }

    async fn rename_conversation(&self, chat_uuid: &str, title: &str) -> Result<(), ApiError> {
        let response = self
            .timed(reqwest::Method::PUT, &format!("chat/{chat_uuid}"))?
            .json(&RenameChatRequest { title })
            .send()
            .await?;
        let envelope: Envelope<serde_json::Value> = read_json(response, "rename chat").await?;
        unwrap_envelope(envelope).map(|_| ())
    }

    async fn delete_conversation(&self, chat_uuid: &str) -> Result<(), ApiError> {
        let response = self
            .timed(reqwest::Method::DELETE, &format!("chat/{chat_uuid}"))?
            .send()
            .await?;
        let envelope: Envelope<serde_json::Value> = read_json(response, "delete chat").await?;
        unwrap_envelope(envelope).map(|_| ())
    }
}
