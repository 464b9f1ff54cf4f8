//! Trading API client for Coinfloor.
//!
//! Requests and responses are JSON objects exchanged over one WebSocket
//! session. Each request carries a tag that the server echoes on its
//! response; untagged messages are notifications.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use coinfloor::api::CoinfloorClient;
//! use coinfloor::shared::{GBP, XBT};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CoinfloorClient::builder().build()?;
//!     client.connect().await?;
//!
//!     let ticker = client.watch_ticker(XBT, GBP, true).await?;
//!     println!("Ticker: {:?}", ticker);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Issuing Requests Without Waiting
//!
//! [`CoinfloorClient::send`] returns once the request is written. The
//! [`ResponseHandle`] it returns resolves later:
//!
//! ```rust,ignore
//! use coinfloor::api::{GetBalances, GetOrders};
//!
//! let balances = client.send(GetBalances {}).await?;
//! let orders = client.send(GetOrders {}).await?;
//! let (balances, orders) = (balances.wait().await?, orders.wait().await?);
//! ```
//!
//! # Error Handling
//!
//! All methods return `ApiResult<T>` which is an alias for `Result<T, ApiError>`:
//!
//! ```rust,ignore
//! use coinfloor::api::ApiError;
//!
//! match client.cancel_order(12345).await {
//!     Ok(order) => println!("Cancelled {:?}", order),
//!     Err(ApiError::Server { code, message }) => println!("Rejected <{}> {:?}", code, message),
//!     Err(ApiError::Disconnected) => println!("Connection dropped"),
//!     Err(e) => println!("Other error: {}", e),
//! }
//! ```

pub mod client;
pub mod config;
mod dispatcher;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod requests;
pub mod ticker;
pub mod types;
mod wire;

// Re-export main types for convenience
pub use client::{CoinfloorClient, CoinfloorClientBuilder, ConnectionState};
pub use config::ClientConfig;
pub use error::{ApiError, ApiResult};
pub use handlers::EventHandlers;
pub use registry::ResponseHandle;
pub use requests::{
    ApiRequest, Authenticate, CancelAllOrders, CancelOrder, EstimateMarketOrder,
    ExecuteMarketOrder, GetBalances, GetOrders, GetTradeVolume, PlaceLimitOrder, WatchOrders,
    WatchTicker,
};
pub use ticker::TickerCache;
pub use types::*;
