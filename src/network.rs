//! Network constants for the Coinfloor client.

use std::time::Duration;

/// Default WebSocket URL for the Coinfloor trading API.
pub const DEFAULT_WS_URL: &str = "wss://api.coinfloor.co.uk/";

/// Port used for `ws://` URLs without an explicit port.
pub const DEFAULT_WS_PORT: u16 = 80;

/// Port used for `wss://` URLs without an explicit port.
pub const DEFAULT_WSS_PORT: u16 = 443;

/// Time allowed for the TCP connection to be established.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed for the HTTP upgrade exchange, and for the welcome message after it.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum silence between two reads inside a single frame.
pub const INTRA_FRAME_TIMEOUT: Duration = Duration::from_secs(10);

/// Idle time after which the client sends a ping.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(45);
