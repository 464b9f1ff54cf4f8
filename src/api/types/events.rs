//! Push notifications delivered to [`EventHandlers`](crate::api::EventHandlers).

use crate::api::types::OrderId;
use crate::shared::AssetCode;

/// `BalanceChanged`: the authenticated user's balance of `asset` is now `balance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChanged {
    pub asset: AssetCode,
    pub balance: i64,
}

/// `OrderOpened`: an order was added to a watched book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderOpened {
    pub id: OrderId,
    pub tonce: Option<i64>,
    pub base: AssetCode,
    pub counter: AssetCode,
    pub quantity: i64,
    pub price: i64,
    pub time: i64,
    /// The order belongs to the authenticated user (the notice carried a `tonce` key)
    pub own: bool,
}

/// `OrdersMatched`: a trade between a bid and an ask.
///
/// Ids, remainders and fees are only reported for the user's own side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrdersMatched {
    pub bid: Option<OrderId>,
    /// `None` if the key was absent, `Some(0)` if it was null
    pub bid_tonce: Option<i64>,
    pub ask: Option<OrderId>,
    /// `None` if the key was absent, `Some(0)` if it was null
    pub ask_tonce: Option<i64>,
    pub base: AssetCode,
    pub counter: AssetCode,
    pub quantity: i64,
    pub price: i64,
    pub total: i64,
    pub bid_rem: Option<i64>,
    pub ask_rem: Option<i64>,
    pub time: i64,
    pub bid_base_fee: Option<i64>,
    pub bid_counter_fee: Option<i64>,
    pub ask_base_fee: Option<i64>,
    pub ask_counter_fee: Option<i64>,
}

/// `OrderClosed`: an order left a watched book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderClosed {
    pub id: OrderId,
    pub tonce: Option<i64>,
    pub base: AssetCode,
    pub counter: AssetCode,
    pub quantity: i64,
    pub price: i64,
    pub own: bool,
}
