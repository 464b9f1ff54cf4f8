//! Error types for the Coinfloor trading client.

use thiserror::Error;

use crate::auth::AuthError;
use crate::websocket::WebSocketError;

/// Errors surfaced by [`CoinfloorClient`](crate::api::CoinfloorClient) operations
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Transport or protocol failure; fatal to the connection
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WebSocketError),

    /// Signing the authentication challenge failed
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// The server rejected the request
    #[error("<{code}>{}", format_server_message(.message))]
    Server { code: i64, message: Option<String> },

    /// Request issued while no connection is established
    #[error("Not connected")]
    NotConnected,

    /// `connect` called while a connection is active or in progress
    #[error("Already connected")]
    AlreadyConnected,

    /// The connection closed before the response arrived
    #[error("Disconnected")]
    Disconnected,

    /// No response within the caller's deadline
    #[error("Timed out waiting for response")]
    Timeout,

    /// A response lacked or mistyped a required field
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The welcome message was missing, unparseable or carried a bad nonce
    #[error("Invalid welcome message: {0}")]
    InvalidWelcome(String),

    /// A request could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn format_server_message(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(" {message}"),
        None => String::new(),
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::InvalidResponse(err.to_string())
    }
}

/// Result type alias for client operations.
pub type ApiResult<T> = Result<T, ApiError>;
