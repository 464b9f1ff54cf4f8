//! Request catalogue.
//!
//! Each request is a serializable struct whose fields are sent as-is; the
//! client adds `method` and `tag`. [`ApiRequest::interpret`] turns the raw
//! response object into the typed result.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::error::{ApiError, ApiResult};
use crate::api::ticker::TickerCache;
use crate::api::types::{MarketOrderEstimate, OrderId, OrderInfo, TickerInfo};
use crate::api::wire::{
    BalancesResponse, EstimateResponse, OrderFields, OrdersResponse, TickerUpdate,
};
use crate::shared::{AssetCode, AssetPair};

/// A request the server understands
pub trait ApiRequest: Serialize + Send + 'static {
    /// Typed result of a successful response
    type Output: Send + 'static;

    /// Value of the `method` field
    const METHOD: &'static str;

    /// Interpret a successful response.
    fn interpret(&self, response: &Value, tickers: &TickerCache) -> ApiResult<Self::Output>;
}

// ─── Interpreters ────────────────────────────────────────────────────────────

fn balances(response: &Value) -> ApiResult<HashMap<AssetCode, i64>> {
    let parsed = BalancesResponse::deserialize(response)?;
    Ok(parsed
        .balances
        .into_iter()
        .map(|entry| (entry.asset, entry.balance))
        .collect())
}

fn orders(response: &Value, default: Option<AssetPair>) -> ApiResult<HashMap<OrderId, OrderInfo>> {
    OrdersResponse::deserialize(response)?
        .orders
        .into_iter()
        .map(|entry| entry.into_order(default))
        .collect()
}

fn integer_field(response: &Value, field: &str) -> ApiResult<i64> {
    response
        .get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| ApiError::InvalidResponse(format!("missing integer field `{field}`")))
}

fn positive(tonce: Option<i64>) -> Option<i64> {
    tonce.filter(|t| *t > 0)
}

fn is_true(value: &bool) -> bool {
    *value
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// `Authenticate`: prove knowledge of the passphrase for `user_id`.
#[derive(Debug, Clone, Serialize)]
pub struct Authenticate {
    pub user_id: u64,
    pub cookie: String,
    /// Base64 client nonce
    pub nonce: String,
    /// Base64 `[r, s]`
    pub signature: [String; 2],
}

impl ApiRequest for Authenticate {
    type Output = ();
    const METHOD: &'static str = "Authenticate";

    fn interpret(&self, _: &Value, _: &TickerCache) -> ApiResult<()> {
        Ok(())
    }
}

// ─── Account ─────────────────────────────────────────────────────────────────

/// `GetBalances`: balance per asset.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GetBalances {}

impl ApiRequest for GetBalances {
    type Output = HashMap<AssetCode, i64>;
    const METHOD: &'static str = "GetBalances";

    fn interpret(&self, response: &Value, _: &TickerCache) -> ApiResult<Self::Output> {
        balances(response)
    }
}

/// `GetOrders`: the user's open orders.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GetOrders {}

impl ApiRequest for GetOrders {
    type Output = HashMap<OrderId, OrderInfo>;
    const METHOD: &'static str = "GetOrders";

    fn interpret(&self, response: &Value, _: &TickerCache) -> ApiResult<Self::Output> {
        orders(response, None)
    }
}

/// `GetTradeVolume`: the user's 30-day volume in `asset`.
#[derive(Debug, Clone, Serialize)]
pub struct GetTradeVolume {
    pub asset: AssetCode,
}

impl ApiRequest for GetTradeVolume {
    type Output = i64;
    const METHOD: &'static str = "GetTradeVolume";

    fn interpret(&self, response: &Value, _: &TickerCache) -> ApiResult<i64> {
        integer_field(response, "volume")
    }
}

// ─── Orders ──────────────────────────────────────────────────────────────────

/// `EstimateMarketOrder`: what a market order would fill at current book depth.
#[derive(Debug, Clone, Serialize)]
pub struct EstimateMarketOrder {
    pub base: AssetCode,
    pub counter: AssetCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
}

impl EstimateMarketOrder {
    /// Estimate by base quantity (positive to buy, negative to sell).
    pub fn by_quantity(base: AssetCode, counter: AssetCode, quantity: i64) -> Self {
        Self {
            base,
            counter,
            quantity: Some(quantity),
            total: None,
        }
    }

    /// Estimate by counter total (positive to buy, negative to sell).
    pub fn by_total(base: AssetCode, counter: AssetCode, total: i64) -> Self {
        Self {
            base,
            counter,
            quantity: None,
            total: Some(total),
        }
    }
}

impl ApiRequest for EstimateMarketOrder {
    type Output = MarketOrderEstimate;
    const METHOD: &'static str = "EstimateMarketOrder";

    fn interpret(&self, response: &Value, _: &TickerCache) -> ApiResult<Self::Output> {
        let pair = AssetPair::new(self.base, self.counter);
        Ok(EstimateResponse::deserialize(response)?.into_estimate(pair))
    }
}

/// `PlaceOrder` with a price: a limit order. Resolves to the new order's id.
#[derive(Debug, Clone, Serialize)]
pub struct PlaceLimitOrder {
    pub base: AssetCode,
    pub counter: AssetCode,
    pub quantity: i64,
    pub price: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tonce: Option<i64>,
    /// Sent only when `false`
    #[serde(skip_serializing_if = "is_true")]
    pub persist: bool,
}

impl PlaceLimitOrder {
    pub fn new(base: AssetCode, counter: AssetCode, quantity: i64, price: i64) -> Self {
        Self {
            base,
            counter,
            quantity,
            price,
            tonce: None,
            persist: true,
        }
    }

    /// Attach an idempotency token. Values of zero or below are not sent.
    pub fn with_tonce(mut self, tonce: i64) -> Self {
        self.tonce = positive(Some(tonce));
        self
    }

    /// Keep the order on the book across the session (`true` by default).
    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }
}

impl ApiRequest for PlaceLimitOrder {
    type Output = OrderId;
    const METHOD: &'static str = "PlaceOrder";

    fn interpret(&self, response: &Value, _: &TickerCache) -> ApiResult<OrderId> {
        integer_field(response, "id")
    }
}

/// `PlaceOrder` without a price: a market order. Resolves to the unfilled remainder.
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteMarketOrder {
    pub base: AssetCode,
    pub counter: AssetCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tonce: Option<i64>,
}

impl ExecuteMarketOrder {
    pub fn by_quantity(base: AssetCode, counter: AssetCode, quantity: i64) -> Self {
        Self {
            base,
            counter,
            quantity: Some(quantity),
            total: None,
            tonce: None,
        }
    }

    pub fn by_total(base: AssetCode, counter: AssetCode, total: i64) -> Self {
        Self {
            base,
            counter,
            quantity: None,
            total: Some(total),
            tonce: None,
        }
    }

    /// Attach an idempotency token. Values of zero or below are not sent.
    pub fn with_tonce(mut self, tonce: i64) -> Self {
        self.tonce = positive(Some(tonce));
        self
    }
}

impl ApiRequest for ExecuteMarketOrder {
    type Output = i64;
    const METHOD: &'static str = "PlaceOrder";

    fn interpret(&self, response: &Value, _: &TickerCache) -> ApiResult<i64> {
        integer_field(response, "remaining")
    }
}

/// `CancelOrder`: cancel by id or by tonce. Resolves to the cancelled order.
#[derive(Debug, Clone, Serialize)]
pub struct CancelOrder {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<OrderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tonce: Option<i64>,
}

impl CancelOrder {
    pub fn by_id(id: OrderId) -> Self {
        Self {
            id: Some(id),
            tonce: None,
        }
    }

    pub fn by_tonce(tonce: i64) -> Self {
        Self {
            id: None,
            tonce: Some(tonce),
        }
    }
}

impl ApiRequest for CancelOrder {
    type Output = OrderInfo;
    const METHOD: &'static str = "CancelOrder";

    fn interpret(&self, response: &Value, _: &TickerCache) -> ApiResult<OrderInfo> {
        OrderFields::deserialize(response)?.into_order()
    }
}

/// `CancelAllOrders`: resolves to the orders that were cancelled.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CancelAllOrders {}

impl ApiRequest for CancelAllOrders {
    type Output = HashMap<OrderId, OrderInfo>;
    const METHOD: &'static str = "CancelAllOrders";

    fn interpret(&self, response: &Value, _: &TickerCache) -> ApiResult<Self::Output> {
        orders(response, None)
    }
}

// ─── Subscriptions ───────────────────────────────────────────────────────────

/// `WatchOrders`: start or stop order book notifications for a market.
///
/// When watching, resolves to the current book.
#[derive(Debug, Clone, Serialize)]
pub struct WatchOrders {
    pub base: AssetCode,
    pub counter: AssetCode,
    pub watch: bool,
}

impl ApiRequest for WatchOrders {
    type Output = Option<HashMap<OrderId, OrderInfo>>;
    const METHOD: &'static str = "WatchOrders";

    fn interpret(&self, response: &Value, _: &TickerCache) -> ApiResult<Self::Output> {
        if !self.watch {
            return Ok(None);
        }
        orders(response, Some(AssetPair::new(self.base, self.counter))).map(Some)
    }
}

/// `WatchTicker`: start or stop ticker notifications for a market.
///
/// When watching, the snapshot in the response is merged into the ticker
/// cache and the merged ticker returned.
#[derive(Debug, Clone, Serialize)]
pub struct WatchTicker {
    pub base: AssetCode,
    pub counter: AssetCode,
    pub watch: bool,
}

impl ApiRequest for WatchTicker {
    type Output = Option<TickerInfo>;
    const METHOD: &'static str = "WatchTicker";

    fn interpret(&self, response: &Value, tickers: &TickerCache) -> ApiResult<Self::Output> {
        if !self.watch {
            return Ok(None);
        }
        let update = TickerUpdate::deserialize(response)?;
        let pair = AssetPair::new(self.base, self.counter);
        Ok(Some(tickers.merge(pair, &update)))
    }
}

/// Serialize `request` as an object carrying its `method` field.
pub(crate) fn to_message<R: ApiRequest>(request: &R) -> ApiResult<Map<String, Value>> {
    match serde_json::to_value(request) {
        Ok(Value::Object(mut message)) => {
            message.insert("method".to_string(), Value::from(R::METHOD));
            Ok(message)
        }
        Ok(_) => Err(ApiError::Serialization(format!(
            "{} does not serialize to an object",
            R::METHOD
        ))),
        Err(e) => Err(ApiError::Serialization(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{GBP, XBT};
    use serde_json::json;

    fn encoded<R: ApiRequest>(request: &R, tag: u32) -> Value {
        let mut message = to_message(request).unwrap();
        message.insert("tag".to_string(), Value::from(tag));
        Value::Object(message)
    }

    #[test]
    fn test_encode_adds_method_and_tag() {
        let value = encoded(&GetBalances {}, 7);
        assert_eq!(value, json!({"method": "GetBalances", "tag": 7}));
    }

    #[test]
    fn test_place_limit_order_optional_fields() {
        let plain = encoded(&PlaceLimitOrder::new(XBT, GBP, 10_000, 250_00), 1);
        assert_eq!(
            plain,
            json!({
                "method": "PlaceOrder", "tag": 1, "base": 63488, "counter": 64032,
                "quantity": 10000, "price": 25000
            })
        );

        let full = encoded(
            &PlaceLimitOrder::new(XBT, GBP, -5, 9)
                .with_tonce(123)
                .with_persist(false),
            2,
        );
        assert_eq!(full["tonce"], 123);
        assert_eq!(full["persist"], false);

        let zero_tonce = encoded(&PlaceLimitOrder::new(XBT, GBP, 1, 1).with_tonce(0), 3);
        assert!(zero_tonce.get("tonce").is_none());
    }

    #[test]
    fn test_market_order_fields() {
        let by_total = encoded(&ExecuteMarketOrder::by_total(XBT, GBP, 500).with_tonce(4), 9);
        assert_eq!(by_total["method"], "PlaceOrder");
        assert_eq!(by_total["total"], 500);
        assert_eq!(by_total["tonce"], 4);
        assert!(by_total.get("quantity").is_none());

        let estimate = encoded(&EstimateMarketOrder::by_quantity(XBT, GBP, 3), 1);
        assert_eq!(estimate["quantity"], 3);
        assert!(estimate.get("total").is_none());
    }

    #[test]
    fn test_cancel_order_by_tonce() {
        let value = encoded(&CancelOrder::by_tonce(55), 1);
        assert_eq!(value, json!({"method": "CancelOrder", "tag": 1, "tonce": 55}));
    }

    #[test]
    fn test_interpret_place_order_id() {
        let request = PlaceLimitOrder::new(XBT, GBP, 1, 1);
        let cache = TickerCache::new();
        let id = request
            .interpret(&json!({"tag": 5, "error_code": 0, "id": 42}), &cache)
            .unwrap();
        assert_eq!(id, 42);

        let err = request.interpret(&json!({"tag": 5}), &cache).unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[test]
    fn test_interpret_balances() {
        let response = json!({"balances": [
            {"asset": 63488, "balance": 150},
            {"asset": 64032, "balance": 9900}
        ]});
        let map = GetBalances {}
            .interpret(&response, &TickerCache::new())
            .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&XBT], 150);
        assert_eq!(map[&GBP], 9900);
    }

    #[test]
    fn test_interpret_watch_orders_defaults_pair() {
        let request = WatchOrders {
            base: XBT,
            counter: GBP,
            watch: true,
        };
        let response = json!({"orders": [
            {"id": 1, "quantity": 10, "price": 300, "time": 77}
        ]});
        let book = request
            .interpret(&response, &TickerCache::new())
            .unwrap()
            .unwrap();
        assert_eq!(book[&1].base, XBT);
        assert_eq!(book[&1].counter, GBP);
        assert_eq!(book[&1].tonce, None);

        let unwatch = WatchOrders {
            watch: false,
            ..request
        };
        assert!(unwatch
            .interpret(&json!({}), &TickerCache::new())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_interpret_get_orders_requires_pair() {
        let response = json!({"orders": [{"id": 1, "quantity": 1, "price": 1}]});
        let err = GetOrders {}
            .interpret(&response, &TickerCache::new())
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[test]
    fn test_interpret_cancel_order() {
        let response = json!({
            "tonce": 8, "base": 63488, "counter": 64032,
            "quantity": -20, "price": 410, "time": 5
        });
        let order = CancelOrder::by_id(3)
            .interpret(&response, &TickerCache::new())
            .unwrap();
        assert_eq!(order.tonce, Some(8));
        assert_eq!(order.quantity, -20);
    }

    #[test]
    fn test_interpret_estimate_defaults_pair() {
        let estimate = EstimateMarketOrder::by_total(XBT, GBP, 1000)
            .interpret(&json!({"quantity": 4, "total": 1000}), &TickerCache::new())
            .unwrap();
        assert_eq!(
            estimate,
            MarketOrderEstimate {
                base: XBT,
                counter: GBP,
                quantity: 4,
                total: 1000
            }
        );
    }

    #[test]
    fn test_interpret_watch_ticker_merges() {
        let cache = TickerCache::new();
        let request = WatchTicker {
            base: XBT,
            counter: GBP,
            watch: true,
        };
        let ticker = request
            .interpret(&json!({"last": 300, "bid": 299, "ask": null}), &cache)
            .unwrap()
            .unwrap();
        assert_eq!(ticker.last, Some(300));
        assert_eq!(ticker.ask, None);
        assert_eq!(cache.get(AssetPair::new(XBT, GBP)), Some(ticker));
    }
}
