//! # Coinfloor Rust Client
//!
//! An async client for the Coinfloor private trading API.
//!
//! ## Modules
//!
//! - [`websocket`]: WebSocket transport built directly on TCP/TLS sockets
//! - [`api`]: Request/response correlation, notifications and the trading client
//! - [`auth`]: Challenge signing for the `Authenticate` request
//!
//! Plus shared modules:
//! - [`shared`]: Asset codes and markets
//! - [`network`]: Default endpoint and timeouts
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use coinfloor::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handlers = EventHandlers::new()
//!         .on_orders_matched(|trade| println!("Trade: {:?}", trade))
//!         .on_disconnected(|cause| println!("Disconnected: {:?}", cause));
//!
//!     let client = CoinfloorClient::builder().handlers(handlers).build()?;
//!     client.connect().await?;
//!     client.authenticate(12345, "cookie", "passphrase").await?;
//!
//!     let balances = client.get_balances().await?;
//!     println!("Balances: {:?}", balances);
//!
//!     let id = client.place_limit_order(XBT, GBP, 10_000, 2_500_000, 0, true).await?;
//!     println!("Placed order {}", id);
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

// ============================================================================
// MODULES
// ============================================================================

/// Shared types and asset codes.
pub mod shared;

/// Default endpoint and timeout constants.
pub mod network;

/// Authentication challenge signing.
pub mod auth;

/// Trading API client.
pub mod api;

/// WebSocket transport.
pub mod websocket;

// ============================================================================
// PRELUDE
// ============================================================================

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use coinfloor::prelude::*;
/// ```
pub mod prelude {
    // Client
    pub use crate::api::{
        ApiError, ApiRequest, ApiResult, ClientConfig, CoinfloorClient, CoinfloorClientBuilder,
        ConnectionState, EventHandlers, ResponseHandle, TickerCache,
        // Value types
        BalanceChanged, MarketOrderEstimate, OrderClosed, OrderId, OrderInfo, OrderOpened,
        OrdersMatched, TickerInfo,
    };

    // Auth
    pub use crate::auth::{AuthError, AuthResult, AuthSigner, SigningContext};

    // Network constants
    pub use crate::network::DEFAULT_WS_URL;

    // Shared types
    pub use crate::shared::{AssetCode, AssetPair, GBP, XBT};

    // Transport
    pub use crate::websocket::{WebSocketError, WsResult};
}
