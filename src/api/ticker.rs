//! Per-market ticker cache.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::api::types::TickerInfo;
use crate::api::wire::TickerUpdate;
use crate::shared::AssetPair;

/// Last-known ticker fields for one market
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Ticker {
    last: Option<i64>,
    bid: Option<i64>,
    ask: Option<i64>,
    low: Option<i64>,
    high: Option<i64>,
    volume: Option<i64>,
}

impl Ticker {
    /// Overwrite only the fields present in `update`.
    fn apply_update(&mut self, update: &TickerUpdate) {
        fn merge(field: &mut Option<i64>, incoming: Option<Option<i64>>) {
            if let Some(value) = incoming {
                *field = value;
            }
        }
        merge(&mut self.last, update.last);
        merge(&mut self.bid, update.bid);
        merge(&mut self.ask, update.ask);
        merge(&mut self.low, update.low);
        merge(&mut self.high, update.high);
        merge(&mut self.volume, update.volume);
    }

    fn info(&self, pair: AssetPair) -> TickerInfo {
        TickerInfo {
            base: pair.base,
            counter: pair.counter,
            last: self.last,
            bid: self.bid,
            ask: self.ask,
            low: self.low,
            high: self.high,
            volume: self.volume,
        }
    }
}

/// Tickers keyed by market, merged in the order updates arrive
#[derive(Debug, Default)]
pub struct TickerCache {
    tickers: Mutex<HashMap<AssetPair, Ticker>>,
}

impl TickerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a sparse update, creating the entry if needed, and return the result.
    pub(crate) fn merge(&self, pair: AssetPair, update: &TickerUpdate) -> TickerInfo {
        let mut tickers = self.tickers.lock().unwrap_or_else(PoisonError::into_inner);
        let ticker = tickers.entry(pair).or_default();
        ticker.apply_update(update);
        ticker.info(pair)
    }

    /// Current ticker for a market, if any update has been seen.
    pub fn get(&self, pair: AssetPair) -> Option<TickerInfo> {
        let tickers = self.tickers.lock().unwrap_or_else(PoisonError::into_inner);
        tickers.get(&pair).map(|ticker| ticker.info(pair))
    }

    /// Markets with a cached ticker.
    pub fn markets(&self) -> Vec<AssetPair> {
        let tickers = self.tickers.lock().unwrap_or_else(PoisonError::into_inner);
        tickers.keys().copied().collect()
    }
}
