use std::error::Error as StdError;
use std::fmt;

/// Failure of a single call to the chat backend.
///
/// Every variant is local to the call that produced it; nothing here is
/// retried automatically. Callers turn these into user-facing text with
/// [`crate::core::failure::describe_failure`].
#[derive(Debug)]
pub enum ApiError {
    /// The request could not be sent or the connection failed mid-body.
    Transport(reqwest::Error),

    /// Lower-level I/O failure while reading a response body.
    Io(std::io::Error),

    /// The server answered with a non-success status. The body is read
    /// eagerly so it can be mined for a human-readable detail.
    Status { status: u16, body: String },

    /// The body did not have the expected JSON shape.
    Decode {
        context: &'static str,
        source: serde_json::Error,
    },

    /// The envelope decoded but a required value was absent.
    MissingField(&'static str),

    /// The backend envelope reported a non-success `code`.
    Rejected { code: i64, message: Option<String> },

    /// No bearer credential is available for the call.
    Unauthenticated,

    /// The server did not answer within the request timeout.
    TimedOut(&'static str),
}

impl ApiError {
    /// Raw failure payload, when the server sent one.
    pub fn body(&self) -> Option<&str> {
        match self {
            ApiError::Status { body, .. } => Some(body.as_str()),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Transport(err) => write!(f, "{err}"),
            ApiError::Io(err) => write!(f, "{err}"),
            ApiError::Status { status, .. } => {
                write!(f, "Request failed with status code {status}")
            }
            ApiError::Decode { context, source } => {
                write!(f, "Unexpected {context} response: {source}")
            }
            ApiError::MissingField(field) => write!(f, "Response is missing {field}"),
            ApiError::Rejected { code, message } => match message {
                Some(message) => write!(f, "{message}"),
                None => write!(f, "Request rejected with code {code}"),
            },
            ApiError::Unauthenticated => write!(f, "Not signed in"),
            ApiError::TimedOut(context) => write!(f, "Timed out waiting for {context}"),
        }
    }
}

impl StdError for ApiError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ApiError::Transport(err) => Some(err),
            ApiError::Io(err) => Some(err),
            ApiError::Decode { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Io(err)
    }
}
