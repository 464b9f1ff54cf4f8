//! Market data types.

use crate::shared::{AssetCode, AssetPair};

/// Cached ticker for one market.
///
/// Every field is `None` until the server has reported it, and returns to
/// `None` when the server reports it as unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickerInfo {
    pub base: AssetCode,
    pub counter: AssetCode,
    pub last: Option<i64>,
    pub bid: Option<i64>,
    pub ask: Option<i64>,
    pub low: Option<i64>,
    pub high: Option<i64>,
    pub volume: Option<i64>,
}

impl TickerInfo {
    /// The market this ticker belongs to.
    pub fn pair(&self) -> AssetPair {
        AssetPair::new(self.base, self.counter)
    }

    /// Ask minus bid, when both are known.
    pub fn spread(&self) -> Option<i64> {
        Some(self.ask? - self.bid?)
    }
}
