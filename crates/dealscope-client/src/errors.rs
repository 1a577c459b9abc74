/// Failure while opening or reading the analysis event stream.
///
/// These end a run as `RunState::Failed`; the `Display` text is what the
/// snapshot's `error` field carries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent (connection refused, DNS, TLS, ...).
    #[error("request failed: {0}")]
    Request(String),
    /// The server answered with a non-success status.
    #[error("Server error {status}: {body}")]
    Status { status: u16, body: String },
    /// The server answered 2xx but not with an event stream.
    #[error("unsupported response body ({content_type}): expected text/event-stream")]
    UnsupportedBody { content_type: String },
    /// Reading the streamed body failed mid-way.
    #[error("stream read failed: {0}")]
    Read(String),
}

impl TransportError {
    /// Returns the HTTP status when the server rejected the request.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Top-level error type for the public client API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid user input (for example an empty company name).
    #[error("validation error: {0}")]
    Validation(String),
    /// HTTP transport failure outside of a run.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A stored analysis does not exist.
    #[error("analysis {id} not found")]
    NotFound { id: i64 },
    /// A response body did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
    /// Internal misuse or a run task that vanished without a result.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}
