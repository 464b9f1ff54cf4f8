//! Order-related types.
//!
//! Quantities are signed: positive for bids, negative for asks. Quantities,
//! prices and totals are integers in each asset's smallest unit.

use crate::shared::AssetCode;

/// Server-assigned order identifier.
pub type OrderId = i64;

/// Snapshot of an open or just-cancelled order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderInfo {
    /// Client-supplied idempotency token, if the order carried one
    pub tonce: Option<i64>,
    pub base: AssetCode,
    pub counter: AssetCode,
    pub quantity: i64,
    pub price: i64,
    /// Server timestamp
    pub time: i64,
}

/// Result of `EstimateMarketOrder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketOrderEstimate {
    pub base: AssetCode,
    pub counter: AssetCode,
    /// Base quantity the order would fill
    pub quantity: i64,
    /// Counter total the order would cost or raise
    pub total: i64,
}
