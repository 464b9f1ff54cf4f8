//! WebSocket transport built directly on TCP/TLS sockets.
//!
//! Implements the subset of RFC 6455 the trading API needs: the client side of
//! the HTTP upgrade, frame encoding and decoding, masking and fragmentation.
//!
//! ```rust,ignore
//! use coinfloor::websocket::{Connection, ConnectionConfig, OpCode};
//!
//! let mut connection = Connection::connect("wss://api.coinfloor.co.uk/", &ConnectionConfig::default()).await?;
//!
//! if let Some(mut message) = connection.next_message(None).await? {
//!     let mut payload = Vec::new();
//!     message.read_to_end(&mut payload).await?;
//! }
//!
//! let mut out = connection.open_message(0, OpCode::Text, true).await?;
//! out.write(br#"{"method":"GetBalances"}"#).await?;
//! out.close().await?;
//! ```

pub mod connection;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod reader;
pub mod writer;

pub use connection::{
    AsyncStream, Connection, ConnectionConfig, ConnectionReader, ConnectionWriter, InboundMessage,
    OutboundMessage,
};
pub use error::{WebSocketError, WsResult};
pub use frame::{OpCode, FLAG_FIN, FLAG_RSV1, FLAG_RSV2, FLAG_RSV3};
pub use handshake::{accept_key, HandshakeTarget};
pub use reader::{FrameReader, MessageReader};
pub use writer::MessageWriter;
