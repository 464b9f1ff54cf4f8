//! WebSocket transport error types.

use std::io;

use thiserror::Error;

/// WebSocket transport and protocol errors
#[derive(Debug, Clone, Error)]
pub enum WebSocketError {
    /// The URL could not be parsed or has no host
    #[error("Invalid WebSocket URL: {0}")]
    InvalidUrl(String),

    /// Scheme other than `ws` or `wss` (or `wss` without TLS support)
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// TCP connection failure
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// TLS negotiation failure
    #[error("TLS error: {0}")]
    Tls(String),

    /// Status line did not start with `HTTP/1.`
    #[error("Server is using incompatible protocol: {0}")]
    IncompatibleProtocol(String),

    /// Handshake response status other than 101
    #[error("Server returned status code {0}")]
    InvalidStatusCode(u16),

    /// Header line without a colon, or an oversized header section
    #[error("Malformed HTTP header: {0}")]
    MalformedHeader(String),

    /// A required handshake header was absent
    #[error("Server omitted required {0} header")]
    MissingHeader(&'static str),

    /// `Upgrade` header did not name websocket
    #[error("Server is using incompatible upgrade protocol: {0}")]
    InvalidUpgradeHeader(String),

    /// `Connection` header did not contain the upgrade token
    #[error("Server is using incompatible connection: {0}")]
    InvalidConnectionHeader(String),

    /// `Sec-WebSocket-Accept` did not match the key sent
    #[error("Server returned incorrect nonce")]
    AcceptMismatch,

    /// Framing violation
    #[error("WebSocket protocol error: {0}")]
    Protocol(String),

    /// 64-bit frame length with the sign bit set
    #[error("Frame payload length is too large")]
    PayloadTooLarge,

    /// Reassembled message exceeded the configured limit
    #[error("Message exceeds {limit} bytes")]
    MessageTooLarge { limit: usize },

    /// Stream ended inside a frame
    #[error("Premature EOF")]
    UnexpectedEof,

    /// Stream ended at a message boundary
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Timeout
    #[error("Operation timed out")]
    Timeout,

    /// Invalid flags or opcode passed by the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),
}

impl From<io::Error> for WebSocketError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => WebSocketError::UnexpectedEof,
            io::ErrorKind::TimedOut => WebSocketError::Timeout,
            _ => WebSocketError::Io(err.to_string()),
        }
    }
}

impl From<url::ParseError> for WebSocketError {
    fn from(err: url::ParseError) -> Self {
        WebSocketError::InvalidUrl(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for WebSocketError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        WebSocketError::Timeout
    }
}

#[cfg(feature = "tls")]
impl From<native_tls::Error> for WebSocketError {
    fn from(err: native_tls::Error) -> Self {
        WebSocketError::Tls(err.to_string())
    }
}

/// Result type alias for WebSocket operations
pub type WsResult<T> = Result<T, WebSocketError>;
