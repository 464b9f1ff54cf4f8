//! Client configuration.

use std::time::Duration;

use crate::network::{
    CONNECTION_TIMEOUT, DEFAULT_WS_URL, HANDSHAKE_TIMEOUT, INTRA_FRAME_TIMEOUT, KEEPALIVE_INTERVAL,
};
use crate::websocket::reader::DEFAULT_MAX_MESSAGE_SIZE;
use crate::websocket::writer::DEFAULT_BUFFER_CAPACITY;
use crate::websocket::ConnectionConfig;

/// Trading client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Endpoint used by [`CoinfloorClient::connect`](crate::api::CoinfloorClient::connect)
    pub url: String,
    /// Time allowed for the TCP connect
    pub connect_timeout: Duration,
    /// Time allowed for TLS plus the HTTP upgrade
    pub handshake_timeout: Duration,
    /// Time allowed for the server's welcome message after the upgrade
    pub welcome_timeout: Duration,
    /// Per-read timeout inside a frame. `None` waits forever.
    pub intra_frame_timeout: Option<Duration>,
    /// Idle time after which a ping is sent
    pub keepalive_interval: Duration,
    /// Deadline for the awaiting request methods. `None` waits until the
    /// response arrives or the connection drops.
    pub request_timeout: Option<Duration>,
    /// Payload bytes buffered per outbound frame
    pub write_buffer_capacity: usize,
    /// Upper bound for a reassembled inbound message
    pub max_message_size: usize,
    /// Mask outbound frames, as clients must
    pub mask_outbound: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            connect_timeout: CONNECTION_TIMEOUT,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            welcome_timeout: HANDSHAKE_TIMEOUT,
            intra_frame_timeout: Some(INTRA_FRAME_TIMEOUT),
            keepalive_interval: KEEPALIVE_INTERVAL,
            request_timeout: None,
            write_buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            mask_outbound: true,
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at `url`.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Transport settings derived from this configuration.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: self.connect_timeout,
            handshake_timeout: self.handshake_timeout,
            intra_frame_timeout: self.intra_frame_timeout,
            write_buffer_capacity: self.write_buffer_capacity,
            max_message_size: self.max_message_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.url, "wss://api.coinfloor.co.uk/");
        assert_eq!(config.keepalive_interval, Duration::from_secs(45));
        assert_eq!(config.welcome_timeout, Duration::from_secs(10));
        assert!(config.request_timeout.is_none());
        assert!(config.mask_outbound);
    }

    #[test]
    fn test_connection_config_follows_client_config() {
        let config = ClientConfig {
            intra_frame_timeout: None,
            write_buffer_capacity: 1024,
            ..ClientConfig::with_url("ws://localhost:9000/")
        };
        let transport = config.connection_config();
        assert_eq!(transport.intra_frame_timeout, None);
        assert_eq!(transport.write_buffer_capacity, 1024);
        assert_eq!(config.url, "ws://localhost:9000/");
    }
}
