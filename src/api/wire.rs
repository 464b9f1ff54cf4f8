//! Wire shapes of responses and notices, and their conversion to public types.

use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::api::types::{
    BalanceChanged, MarketOrderEstimate, OrderClosed, OrderId, OrderInfo, OrderOpened,
    OrdersMatched,
};
use crate::shared::serde_util::double_option;
use crate::shared::{AssetCode, AssetPair};

// ─── Responses ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct BalanceEntry {
    pub asset: AssetCode,
    pub balance: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BalancesResponse {
    pub balances: Vec<BalanceEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrderEntry {
    pub id: OrderId,
    #[serde(default)]
    pub tonce: Option<i64>,
    #[serde(default)]
    pub base: Option<AssetCode>,
    #[serde(default)]
    pub counter: Option<AssetCode>,
    pub quantity: i64,
    pub price: i64,
    #[serde(default)]
    pub time: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrdersResponse {
    pub orders: Vec<OrderEntry>,
}

/// Order fields at the top level of a response (`CancelOrder`).
#[derive(Debug, Deserialize)]
pub(crate) struct OrderFields {
    #[serde(default)]
    pub tonce: Option<i64>,
    #[serde(default)]
    pub base: Option<AssetCode>,
    #[serde(default)]
    pub counter: Option<AssetCode>,
    pub quantity: i64,
    pub price: i64,
    #[serde(default)]
    pub time: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EstimateResponse {
    #[serde(default)]
    pub base: Option<AssetCode>,
    #[serde(default)]
    pub counter: Option<AssetCode>,
    pub quantity: i64,
    pub total: i64,
}

/// Sparse ticker fields: absent keys are `None`, null keys are `Some(None)`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct TickerUpdate {
    #[serde(default)]
    pub base: Option<AssetCode>,
    #[serde(default)]
    pub counter: Option<AssetCode>,
    #[serde(default, deserialize_with = "double_option::deserialize")]
    pub last: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option::deserialize")]
    pub bid: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option::deserialize")]
    pub ask: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option::deserialize")]
    pub low: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option::deserialize")]
    pub high: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option::deserialize")]
    pub volume: Option<Option<i64>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Welcome {
    pub nonce: String,
}

/// Fill in base/counter from `default` where the server omitted them.
pub(crate) fn resolve_pair(
    base: Option<AssetCode>,
    counter: Option<AssetCode>,
    default: Option<AssetPair>,
) -> ApiResult<AssetPair> {
    match (base.or(default.map(|p| p.base)), counter.or(default.map(|p| p.counter))) {
        (Some(base), Some(counter)) => Ok(AssetPair::new(base, counter)),
        _ => Err(ApiError::InvalidResponse(
            "missing field `base` or `counter`".to_string(),
        )),
    }
}

impl OrderEntry {
    pub(crate) fn into_order(self, default: Option<AssetPair>) -> ApiResult<(OrderId, OrderInfo)> {
        let pair = resolve_pair(self.base, self.counter, default)?;
        Ok((
            self.id,
            OrderInfo {
                tonce: self.tonce,
                base: pair.base,
                counter: pair.counter,
                quantity: self.quantity,
                price: self.price,
                time: self.time,
            },
        ))
    }
}

impl OrderFields {
    pub(crate) fn into_order(self) -> ApiResult<OrderInfo> {
        let pair = resolve_pair(self.base, self.counter, None)?;
        Ok(OrderInfo {
            tonce: self.tonce,
            base: pair.base,
            counter: pair.counter,
            quantity: self.quantity,
            price: self.price,
            time: self.time,
        })
    }
}

impl EstimateResponse {
    pub(crate) fn into_estimate(self, default: AssetPair) -> MarketOrderEstimate {
        MarketOrderEstimate {
            base: self.base.unwrap_or(default.base),
            counter: self.counter.unwrap_or(default.counter),
            quantity: self.quantity,
            total: self.total,
        }
    }
}

// ─── Notices ─────────────────────────────────────────────────────────────────

/// Known values of the `notice` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NoticeKind {
    BalanceChanged,
    OrderOpened,
    OrdersMatched,
    OrderClosed,
    TickerChanged,
    Unknown,
}

impl From<&str> for NoticeKind {
    fn from(s: &str) -> Self {
        match s {
            "BalanceChanged" => NoticeKind::BalanceChanged,
            "OrderOpened" => NoticeKind::OrderOpened,
            "OrdersMatched" => NoticeKind::OrdersMatched,
            "OrderClosed" => NoticeKind::OrderClosed,
            "TickerChanged" => NoticeKind::TickerChanged,
            _ => NoticeKind::Unknown,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BalanceChangedNotice {
    pub asset: AssetCode,
    pub balance: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrderOpenedNotice {
    pub id: OrderId,
    #[serde(default, deserialize_with = "double_option::deserialize")]
    pub tonce: Option<Option<i64>>,
    pub base: AssetCode,
    pub counter: AssetCode,
    pub quantity: i64,
    pub price: i64,
    #[serde(default)]
    pub time: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrdersMatchedNotice {
    #[serde(default)]
    pub bid: Option<OrderId>,
    #[serde(default, deserialize_with = "double_option::deserialize")]
    pub bid_tonce: Option<Option<i64>>,
    #[serde(default)]
    pub ask: Option<OrderId>,
    #[serde(default, deserialize_with = "double_option::deserialize")]
    pub ask_tonce: Option<Option<i64>>,
    pub base: AssetCode,
    pub counter: AssetCode,
    pub quantity: i64,
    pub price: i64,
    pub total: i64,
    #[serde(default)]
    pub bid_rem: Option<i64>,
    #[serde(default)]
    pub ask_rem: Option<i64>,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub bid_base_fee: Option<i64>,
    #[serde(default)]
    pub bid_counter_fee: Option<i64>,
    #[serde(default)]
    pub ask_base_fee: Option<i64>,
    #[serde(default)]
    pub ask_counter_fee: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrderClosedNotice {
    pub id: OrderId,
    #[serde(default, deserialize_with = "double_option::deserialize")]
    pub tonce: Option<Option<i64>>,
    pub base: AssetCode,
    pub counter: AssetCode,
    pub quantity: i64,
    pub price: i64,
}

impl From<BalanceChangedNotice> for BalanceChanged {
    fn from(n: BalanceChangedNotice) -> Self {
        BalanceChanged {
            asset: n.asset,
            balance: n.balance,
        }
    }
}

impl From<OrderOpenedNotice> for OrderOpened {
    fn from(n: OrderOpenedNotice) -> Self {
        OrderOpened {
            id: n.id,
            tonce: n.tonce.flatten(),
            base: n.base,
            counter: n.counter,
            quantity: n.quantity,
            price: n.price,
            time: n.time,
            own: n.tonce.is_some(),
        }
    }
}

/// Absent stays `None`; an explicit null becomes `Some(0)`.
fn matched_tonce(tonce: Option<Option<i64>>) -> Option<i64> {
    tonce.map(|t| t.unwrap_or(0))
}

impl From<OrdersMatchedNotice> for OrdersMatched {
    fn from(n: OrdersMatchedNotice) -> Self {
        OrdersMatched {
            bid: n.bid,
            bid_tonce: matched_tonce(n.bid_tonce),
            ask: n.ask,
            ask_tonce: matched_tonce(n.ask_tonce),
            base: n.base,
            counter: n.counter,
            quantity: n.quantity,
            price: n.price,
            total: n.total,
            bid_rem: n.bid_rem,
            ask_rem: n.ask_rem,
            time: n.time,
            bid_base_fee: n.bid_base_fee,
            bid_counter_fee: n.bid_counter_fee,
            ask_base_fee: n.ask_base_fee,
            ask_counter_fee: n.ask_counter_fee,
        }
    }
}

impl From<OrderClosedNotice> for OrderClosed {
    fn from(n: OrderClosedNotice) -> Self {
        OrderClosed {
            id: n.id,
            tonce: n.tonce.flatten(),
            base: n.base,
            counter: n.counter,
            quantity: n.quantity,
            price: n.price,
            own: n.tonce.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_order_opened_own_flag() {
        let theirs: OrderOpenedNotice = serde_json::from_value(json!({
            "notice": "OrderOpened", "id": 1, "base": 63488, "counter": 64032,
            "quantity": 100, "price": 250, "time": 9
        }))
        .unwrap();
        let mine_null: OrderOpenedNotice = serde_json::from_value(json!({
            "id": 2, "tonce": null, "base": 63488, "counter": 64032,
            "quantity": 100, "price": 250, "time": 9
        }))
        .unwrap();
        let mine: OrderOpenedNotice = serde_json::from_value(json!({
            "id": 3, "tonce": 77, "base": 63488, "counter": 64032,
            "quantity": -100, "price": 250, "time": 9
        }))
        .unwrap();

        let theirs = OrderOpened::from(theirs);
        let mine_null = OrderOpened::from(mine_null);
        let mine = OrderOpened::from(mine);
        assert!(!theirs.own);
        assert_eq!(theirs.tonce, None);
        assert!(mine_null.own);
        assert_eq!(mine_null.tonce, None);
        assert!(mine.own);
        assert_eq!(mine.tonce, Some(77));
    }

    #[test]
    fn test_orders_matched_optional_fields() {
        let notice: OrdersMatchedNotice = serde_json::from_value(json!({
            "bid": 10, "bid_tonce": null, "ask_tonce": 5,
            "base": 63488, "counter": 64032, "quantity": 3, "price": 4,
            "total": 12, "bid_rem": 0, "time": 100, "bid_base_fee": 1
        }))
        .unwrap();
        let matched = OrdersMatched::from(notice);

        assert_eq!(matched.bid, Some(10));
        assert_eq!(matched.bid_tonce, Some(0));
        assert_eq!(matched.ask, None);
        assert_eq!(matched.ask_tonce, Some(5));
        assert_eq!(matched.bid_rem, Some(0));
        assert_eq!(matched.ask_rem, None);
        assert_eq!(matched.bid_base_fee, Some(1));
        assert_eq!(matched.ask_counter_fee, None);
    }

    #[test]
    fn test_resolve_pair_defaults() {
        let default = Some(AssetPair::new(1, 2));
        assert_eq!(resolve_pair(None, None, default).unwrap(), AssetPair::new(1, 2));
        assert_eq!(resolve_pair(Some(5), None, default).unwrap(), AssetPair::new(5, 2));
        assert!(resolve_pair(None, Some(2), None).is_err());
    }

    #[test]
    fn test_notice_kind() {
        assert_eq!(NoticeKind::from("TickerChanged"), NoticeKind::TickerChanged);
        assert_eq!(NoticeKind::from("Whatever"), NoticeKind::Unknown);
    }
}
