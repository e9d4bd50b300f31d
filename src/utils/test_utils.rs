//! Scripted stand-ins for the backend, shared by the session tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

use crate::api::{
    ApiError, ChatBackend, ChatPage, ChatReply, Conversation, ConversationSummary, HistoryMessage,
};
use crate::core::chat_stream::StreamReader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Create { kb_uuid: Option<String>, title: String },
    Stream { chat_uuid: String, content: String },
    Send { chat_uuid: String, content: String },
    History(String),
    List { page: u32, size: u32 },
    Rename { chat_uuid: String, title: String },
    Delete(String),
}

type Chunk = Result<Vec<u8>, ApiError>;

pub enum ScriptedStream {
    OpenError(ApiError),
    Chunks(Vec<Chunk>),
    /// Chunks are released one at a time through a [`StreamGate`]; the body
    /// ends when the gate is dropped.
    Gated(mpsc::UnboundedReceiver<Chunk>),
}

/// Test-side handle feeding a gated stream.
pub struct StreamGate {
    tx: mpsc::UnboundedSender<Chunk>,
}

impl StreamGate {
    /// Returns false once the reader has been dropped.
    pub fn send(&self, text: &str) -> bool {
        self.tx.send(Ok(text.as_bytes().to_vec())).is_ok()
    }
}

pub fn text_chunks(parts: &[&str]) -> Vec<Chunk> {
    parts.iter().map(|part| Ok(part.as_bytes().to_vec())).collect()
}

pub fn summary(uuid: &str, title: &str) -> ConversationSummary {
    ConversationSummary {
        uuid: uuid.to_string(),
        title: title.to_string(),
        last_updated: None,
    }
}

pub fn history_message(uuid: &str, role: &str, content: &str) -> HistoryMessage {
    HistoryMessage {
        uuid: uuid.to_string(),
        role: role.to_string(),
        content: content.to_string(),
        create_at: None,
    }
}

pub fn server_error(body: &str) -> ApiError {
    ApiError::Status {
        status: 500,
        body: body.to_string(),
    }
}

/// Backend that replays scripted results in order and records every call.
///
/// Unscripted calls fall back to: creation fails, streams end immediately,
/// complete replies fail, history and list are empty, rename and delete
/// succeed.
pub struct FakeBackend {
    authenticated: AtomicBool,
    calls: Mutex<Vec<BackendCall>>,
    creates: Mutex<VecDeque<Result<Conversation, ApiError>>>,
    streams: Mutex<VecDeque<ScriptedStream>>,
    replies: Mutex<VecDeque<Result<ChatReply, ApiError>>>,
    histories: Mutex<VecDeque<Result<Vec<HistoryMessage>, ApiError>>>,
    lists: Mutex<VecDeque<Result<ChatPage, ApiError>>>,
    renames: Mutex<VecDeque<Result<(), ApiError>>>,
    deletes: Mutex<VecDeque<Result<(), ApiError>>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            authenticated: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
            creates: Mutex::new(VecDeque::new()),
            streams: Mutex::new(VecDeque::new()),
            replies: Mutex::new(VecDeque::new()),
            histories: Mutex::new(VecDeque::new()),
            lists: Mutex::new(VecDeque::new()),
            renames: Mutex::new(VecDeque::new()),
            deletes: Mutex::new(VecDeque::new()),
        }
    }

    pub fn unauthenticated() -> Self {
        let backend = Self::new();
        backend.authenticated.store(false, Ordering::SeqCst);
        backend
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, matches: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|call| matches(call)).count()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn push_created(&self, uuid: &str) {
        self.push_create_result(Ok(Conversation {
            uuid: Some(uuid.to_string()),
            title: String::new(),
            kb_uuid: None,
            update_at: Some(1_700_000_000),
        }));
    }

    pub fn push_create_result(&self, result: Result<Conversation, ApiError>) {
        self.creates.lock().unwrap().push_back(result);
    }

    pub fn push_stream(&self, stream: ScriptedStream) {
        self.streams.lock().unwrap().push_back(stream);
    }

    pub fn push_stream_text(&self, parts: &[&str]) {
        self.push_stream(ScriptedStream::Chunks(text_chunks(parts)));
    }

    pub fn push_gated_stream(&self) -> StreamGate {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push_stream(ScriptedStream::Gated(rx));
        StreamGate { tx }
    }

    pub fn push_reply(&self, result: Result<ChatReply, ApiError>) {
        self.replies.lock().unwrap().push_back(result);
    }

    pub fn push_history(&self, result: Result<Vec<HistoryMessage>, ApiError>) {
        self.histories.lock().unwrap().push_back(result);
    }

    pub fn push_list(&self, result: Result<ChatPage, ApiError>) {
        self.lists.lock().unwrap().push_back(result);
    }

    pub fn push_rename(&self, result: Result<(), ApiError>) {
        self.renames.lock().unwrap().push_back(result);
    }

    pub fn push_delete(&self, result: Result<(), ApiError>) {
        self.deletes.lock().unwrap().push_back(result);
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    fn clear_credentials(&self) {
        self.authenticated.store(false, Ordering::SeqCst);
    }

    async fn create_conversation(
        &self,
        kb_uuid: Option<&str>,
        title: &str,
    ) -> Result<Conversation, ApiError> {
        self.record(BackendCall::Create {
            kb_uuid: kb_uuid.map(str::to_string),
            title: title.to_string(),
        });
        self.creates
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(server_error("no scripted conversation")))
    }

    async fn open_message_stream(
        &self,
        chat_uuid: &str,
        content: &str,
    ) -> Result<StreamReader, ApiError> {
        self.record(BackendCall::Stream {
            chat_uuid: chat_uuid.to_string(),
            content: content.to_string(),
        });
        let scripted = self.streams.lock().unwrap().pop_front();
        match scripted.unwrap_or(ScriptedStream::Chunks(Vec::new())) {
            ScriptedStream::OpenError(err) => Err(err),
            ScriptedStream::Chunks(chunks) => Ok(StreamReader::from_stream(stream::iter(chunks))),
            ScriptedStream::Gated(rx) => Ok(StreamReader::from_stream(stream::unfold(
                rx,
                |mut rx| async move { rx.recv().await.map(|chunk| (chunk, rx)) },
            ))),
        }
    }

    async fn send_message(&self, chat_uuid: &str, content: &str) -> Result<ChatReply, ApiError> {
        self.record(BackendCall::Send {
            chat_uuid: chat_uuid.to_string(),
            content: content.to_string(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(server_error("no scripted reply")))
    }

    async fn load_history(&self, chat_uuid: &str) -> Result<Vec<HistoryMessage>, ApiError> {
        self.record(BackendCall::History(chat_uuid.to_string()));
        self.histories
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn list_conversations(&self, page: u32, size: u32) -> Result<ChatPage, ApiError> {
        self.record(BackendCall::List { page, size });
        self.lists
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ChatPage::default()))
    }

    async fn rename_conversation(&self, chat_uuid: &str, title: &str) -> Result<(), ApiError> {
        self.record(BackendCall::Rename {
            chat_uuid: chat_uuid.to_string(),
            title: title.to_string(),
        });
        self.renames.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn delete_conversation(&self, chat_uuid: &str) -> Result<(), ApiError> {
        self.record(BackendCall::Delete(chat_uuid.to_string()));
        self.deletes.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

/// Serves one HTTP connection: captures the request head and body, then
/// writes each response part with a short pause so chunk boundaries survive.
pub async fn serve_once(parts: Vec<Vec<u8>>) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (request_tx, request_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let read = socket.read(&mut buf).await.expect("read");
            if read == 0 {
                break;
            }
            request.extend_from_slice(&buf[..read]);
            let text = String::from_utf8_lossy(&request).to_string();
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text[..head_end]
                    .lines()
                    .find_map(|line| {
                        line.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .map(|value| value.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if request.len() >= head_end + 4 + content_length {
                    break;
                }
            }
        }
        let _ = request_tx.send(String::from_utf8_lossy(&request).to_string());

        for part in parts {
            socket.write_all(&part).await.expect("write");
            socket.flush().await.expect("flush");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let _ = socket.shutdown().await;
    });

    (format!("http://{addr}"), request_rx)
}

/// Accepts one connection and holds it open without ever answering.
pub async fn serve_without_reply() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.expect("accept");
        tokio::time::sleep(Duration::from_secs(60)).await;
    });
    format!("http://{addr}")
}

pub fn json_response(status_line: &str, body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
    .into_bytes()
}

/// One frame of a chunked transfer-encoded body.
pub fn chunk(bytes: &[u8]) -> Vec<u8> {
    let mut framed = format!("{:X}\r\n", bytes.len()).into_bytes();
    framed.extend_from_slice(bytes);
    framed.extend_from_slice(b"\r\n");
    framed
}
