use thiserror::Error;

/// Unified error type for the SDK.
///
/// Errors raised before a task reaches its running state come back through
/// `Result`; once a task is running, failures are delivered to the caller as a
/// terminal error envelope on the response stream instead (see
/// [`crate::types::DashScopeResponse`]). No retries happen at this layer.
#[derive(Debug, Error)]
pub enum Error {
    /// A frame arrived that is invalid for the current protocol state, e.g. a
    /// binary frame during the start handshake. Fatal to the task.
    #[error("unexpected message received: {0}")]
    UnexpectedMessageReceived(String),

    /// A text frame that is not valid JSON or lacks a `header` object.
    /// Fatal only during the start handshake; mid-stream it is converted to a
    /// synthetic error envelope.
    #[error("malformed frame: {reason}")]
    MalformedFrame {
        reason: String,
        /// Raw frame text, preserved for the synthetic envelope.
        raw: String,
    },

    /// The underlying socket closed, reset, or timed out between frames.
    #[error("transport disconnected: {0}")]
    TransportDisconnected(String),

    /// The server rejected the task before it started.
    #[error("task failed before start: {code}: {message}")]
    TaskFailed { code: String, message: String },

    /// Programmer error: an HTTP method this API does not support.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedHttpMethod(String),

    /// Programmer error: the supplied input does not fit the declared
    /// streaming mode (e.g. a chunk stream for a non-streaming-input mode).
    #[error("invalid input for streaming mode: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Non-success response from the REST surface.
    #[error("API error (HTTP {status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
        request_id: String,
    },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub fn disconnected(msg: impl Into<String>) -> Self {
        Error::TransportDisconnected(msg.into())
    }

    /// Short stable code string used when an error must be flattened into a
    /// terminal error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Error::UnexpectedMessageReceived(_) => "UnexpectedMessageReceived",
            Error::MalformedFrame { .. } => "MalformedFrame",
            Error::TransportDisconnected(_) => "TransportDisconnected",
            Error::TaskFailed { .. } => "TaskFailed",
            Error::UnsupportedHttpMethod(_) => "UnsupportedHTTPMethod",
            Error::InvalidInput(_) => "InvalidInput",
            Error::Configuration(_) => "Configuration",
            Error::Api { .. } => "ApiError",
            Error::WebSocket(_) => "WebSocketError",
            Error::Http(_) => "HttpError",
            Error::Serialization(_) => "SerializationError",
        }
    }
}
