use std::sync::Arc;

use futures_util::stream::{BoxStream, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{ApiError, ChatBackend};
use crate::core::config::data::ReplyMode;
use crate::core::decoder::TextDecoder;

pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, ApiError>>;

/// An open response body, as exposed by the transport.
pub enum ResponseBody {
    /// The transport hands out chunks as they arrive.
    Incremental(ChunkStream),
    /// The transport could only provide the complete body. `HttpBackend`
    /// always streams, so only other transports build this.
    Buffered(Vec<u8>),
}

/// Forward-only reader over one response body.
///
/// Knows nothing about chats: it yields raw byte chunks until the server
/// closes the body (`None`) or the connection fails (`Some(Err(_))`, after
/// which the reader is exhausted). A reader cannot be restarted; every
/// attempt needs a fresh request.
pub struct StreamReader {
    body: Option<ResponseBody>,
}

impl StreamReader {
    pub fn new(body: ResponseBody) -> Self {
        Self { body: Some(body) }
    }

    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Vec<u8>, ApiError>> + Send + 'static,
    {
        Self::new(ResponseBody::Incremental(stream.boxed()))
    }

    pub fn buffered(body: Vec<u8>) -> Self {
        Self::new(ResponseBody::Buffered(body))
    }

    /// Accepts a response for streaming. A non-success status is a failure to
    /// open the stream: its body is read as failure detail instead of being
    /// treated as reply content.
    pub async fn open(response: reqwest::Response) -> Result<Self, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ApiError::from));
        Ok(Self::from_stream(chunks))
    }

    pub async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, ApiError>> {
        match self.body.take()? {
            ResponseBody::Buffered(bytes) => {
                if bytes.is_empty() {
                    None
                } else {
                    Some(Ok(bytes))
                }
            }
            ResponseBody::Incremental(mut stream) => match stream.next().await {
                Some(Ok(chunk)) => {
                    self.body = Some(ResponseBody::Incremental(stream));
                    Some(Ok(chunk))
                }
                Some(Err(err)) => Some(Err(err)),
                None => None,
            },
        }
    }
}

/// Progress of one reply, tagged with its stream id when sent.
#[derive(Debug)]
pub enum StreamEvent {
    /// Decoded text, in arrival order.
    Fragment(String),
    /// Source snippets cited by the reply.
    Context(Vec<String>),
    Completed,
    /// The reply could not be started; nothing was received.
    OpenFailed(ApiError),
    /// The body failed after it had been opened.
    Failed(ApiError),
}

pub struct ReplyParams {
    pub backend: Arc<dyn ChatBackend>,
    pub chat_uuid: String,
    pub content: String,
    pub mode: ReplyMode,
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
}

type EventSender = mpsc::UnboundedSender<(StreamEvent, u64)>;

/// Drives a reader through a [`TextDecoder`], forwarding fragments as events.
///
/// Stops silently when the receiver is gone or the token is cancelled, so an
/// abandoned stream is no longer read from.
pub async fn pump_stream(
    mut reader: StreamReader,
    tx: &EventSender,
    stream_id: u64,
    cancel_token: &CancellationToken,
) {
    let mut decoder = TextDecoder::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                debug!(stream_id, "stream abandoned; dropping reader");
                return;
            }
            next = reader.next_chunk() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                let text = decoder.decode(&chunk);
                if !text.is_empty() && tx.send((StreamEvent::Fragment(text), stream_id)).is_err() {
                    return;
                }
            }
            Some(Err(err)) => {
                debug!(stream_id, error = %err, "stream failed mid-body");
                let _ = tx.send((StreamEvent::Failed(err), stream_id));
                return;
            }
            None => {
                let rest = decoder.flush();
                if !rest.is_empty() {
                    let _ = tx.send((StreamEvent::Fragment(rest), stream_id));
                }
                let _ = tx.send((StreamEvent::Completed, stream_id));
                return;
            }
        }
    }
}

async fn run_reply(params: ReplyParams, tx: &EventSender) {
    let ReplyParams {
        backend,
        chat_uuid,
        content,
        mode,
        cancel_token,
        stream_id,
    } = params;

    match mode {
        ReplyMode::Stream => match backend.open_message_stream(&chat_uuid, &content).await {
            Ok(reader) => {
                debug!(stream_id, chat = %chat_uuid, "reply stream opened");
                pump_stream(reader, tx, stream_id, &cancel_token).await;
            }
            Err(err) => {
                let _ = tx.send((StreamEvent::OpenFailed(err), stream_id));
            }
        },
        ReplyMode::Complete => match backend.send_message(&chat_uuid, &content).await {
            Ok(reply) => {
                if !reply.answer.is_empty() {
                    let _ = tx.send((StreamEvent::Fragment(reply.answer), stream_id));
                }
                if !reply.context.is_empty() {
                    let _ = tx.send((StreamEvent::Context(reply.context), stream_id));
                }
                let _ = tx.send((StreamEvent::Completed, stream_id));
            }
            Err(err) => {
                let _ = tx.send((StreamEvent::OpenFailed(err), stream_id));
            }
        },
    }
}

#[derive(Clone)]
pub struct ChatStreamService {
    tx: EventSender,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamEvent, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_reply(&self, params: ReplyParams) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let cancel_token = params.cancel_token.clone();
            tokio::select! {
                _ = run_reply(params, &tx) => {}
                _ = cancel_token.cancelled() => {}
            }
        });
    }

    #[cfg(test)]
    pub fn send_for_test(&self, event: StreamEvent, stream_id: u64) {
        let _ = self.tx.send((event, stream_id));
    }
}
