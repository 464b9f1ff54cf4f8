//! Inbound message routing.
//!
//! Tagged messages complete the matching pending request; untagged messages
//! with a `notice` field go to the user's [`EventHandlers`].

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::api::error::{ApiError, ApiResult};
use crate::api::registry::RequestRegistry;
use crate::api::ticker::TickerCache;
use crate::api::types::{BalanceChanged, OrderClosed, OrderOpened, OrdersMatched, TickerInfo};
use crate::api::wire::{
    BalanceChangedNotice, NoticeKind, OrderClosedNotice, OrderOpenedNotice, OrdersMatchedNotice,
    TickerUpdate,
};
use crate::shared::AssetPair;

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;
type DisconnectCallback = Arc<dyn Fn(Option<&ApiError>) + Send + Sync>;

/// Callbacks for server notifications and connection loss
///
/// All callbacks run on the dispatcher task, in the order messages arrive.
/// They should return quickly; a slow callback delays every response behind it.
///
/// ```rust,ignore
/// let handlers = EventHandlers::new()
///     .on_balance_changed(|event| println!("{} -> {}", event.asset, event.balance))
///     .on_disconnected(|cause| eprintln!("disconnected: {cause:?}"));
/// ```
#[derive(Clone, Default)]
pub struct EventHandlers {
    balance_changed: Option<Callback<BalanceChanged>>,
    order_opened: Option<Callback<OrderOpened>>,
    orders_matched: Option<Callback<OrdersMatched>>,
    order_closed: Option<Callback<OrderClosed>>,
    ticker_changed: Option<Callback<TickerInfo>>,
    disconnected: Option<DisconnectCallback>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_balance_changed(mut self, f: impl Fn(BalanceChanged) + Send + Sync + 'static) -> Self {
        self.balance_changed = Some(Arc::new(f));
        self
    }

    pub fn on_order_opened(mut self, f: impl Fn(OrderOpened) + Send + Sync + 'static) -> Self {
        self.order_opened = Some(Arc::new(f));
        self
    }

    pub fn on_orders_matched(mut self, f: impl Fn(OrdersMatched) + Send + Sync + 'static) -> Self {
        self.orders_matched = Some(Arc::new(f));
        self
    }

    pub fn on_order_closed(mut self, f: impl Fn(OrderClosed) + Send + Sync + 'static) -> Self {
        self.order_closed = Some(Arc::new(f));
        self
    }

    /// Called with the merged ticker after each `TickerChanged` notice.
    pub fn on_ticker_changed(mut self, f: impl Fn(TickerInfo) + Send + Sync + 'static) -> Self {
        self.ticker_changed = Some(Arc::new(f));
        self
    }

    /// Called once per connection when it ends: with the cause, or `None`
    /// after [`disconnect`](crate::api::CoinfloorClient::disconnect).
    pub fn on_disconnected(
        mut self,
        f: impl Fn(Option<&ApiError>) + Send + Sync + 'static,
    ) -> Self {
        self.disconnected = Some(Arc::new(f));
        self
    }

    pub(crate) fn disconnected(&self, cause: Option<&ApiError>) {
        if let Some(f) = &self.disconnected {
            f(cause);
        }
    }
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("balance_changed", &self.balance_changed.is_some())
            .field("order_opened", &self.order_opened.is_some())
            .field("orders_matched", &self.orders_matched.is_some())
            .field("order_closed", &self.order_closed.is_some())
            .field("ticker_changed", &self.ticker_changed.is_some())
            .field("disconnected", &self.disconnected.is_some())
            .finish()
    }
}

/// Routes parsed inbound text messages
pub(crate) struct MessageHandler {
    registry: Arc<RequestRegistry>,
    tickers: Arc<TickerCache>,
    events: EventHandlers,
}

impl MessageHandler {
    pub(crate) fn new(
        registry: Arc<RequestRegistry>,
        tickers: Arc<TickerCache>,
        events: EventHandlers,
    ) -> Self {
        Self {
            registry,
            tickers,
            events,
        }
    }

    pub(crate) fn events(&self) -> &EventHandlers {
        &self.events
    }

    /// Handle one text message. Malformed input is logged and skipped.
    pub(crate) fn handle_text(&self, payload: &[u8]) {
        let value: Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Skipping unparseable message: {}", e);
                return;
            }
        };

        if value.get("tag").is_some_and(|tag| !tag.is_null()) {
            self.handle_response(value);
            return;
        }

        match value.get("notice").and_then(Value::as_str) {
            Some(notice) => self.handle_notice(NoticeKind::from(notice), notice, &value),
            None => tracing::warn!("Skipping message with neither tag nor notice"),
        }
    }

    fn handle_response(&self, value: Value) {
        let tag = value
            .get("tag")
            .and_then(Value::as_u64)
            .and_then(|t| u32::try_from(t).ok());
        let Some(tag) = tag else {
            tracing::debug!("Dropping response with unusable tag {}", value["tag"]);
            return;
        };
        if !self.registry.complete(tag, response_result(value)) {
            tracing::debug!("Dropping response for unknown tag {}", tag);
        }
    }

    fn handle_notice(&self, kind: NoticeKind, name: &str, value: &Value) {
        match kind {
            NoticeKind::BalanceChanged => {
                deliver::<BalanceChangedNotice, _>(name, value, &self.events.balance_changed)
            }
            NoticeKind::OrderOpened => {
                deliver::<OrderOpenedNotice, _>(name, value, &self.events.order_opened)
            }
            NoticeKind::OrdersMatched => {
                deliver::<OrdersMatchedNotice, _>(name, value, &self.events.orders_matched)
            }
            NoticeKind::OrderClosed => {
                deliver::<OrderClosedNotice, _>(name, value, &self.events.order_closed)
            }
            NoticeKind::TickerChanged => self.handle_ticker(value),
            NoticeKind::Unknown => tracing::debug!("Ignoring unknown notice {}", name),
        }
    }

    fn handle_ticker(&self, value: &Value) {
        let update = match TickerUpdate::deserialize(value) {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!("Skipping malformed TickerChanged: {}", e);
                return;
            }
        };
        let (Some(base), Some(counter)) = (update.base, update.counter) else {
            tracing::warn!("Skipping TickerChanged without base and counter");
            return;
        };
        let ticker = self.tickers.merge(AssetPair::new(base, counter), &update);
        if let Some(f) = &self.events.ticker_changed {
            f(ticker);
        }
    }
}

/// A non-zero `error_code` fails the request; anything else is its payload.
fn response_result(value: Value) -> ApiResult<Value> {
    match value.get("error_code").and_then(Value::as_i64) {
        Some(code) if code != 0 => Err(ApiError::Server {
            code,
            message: value
                .get("error_msg")
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        _ => Ok(value),
    }
}

fn deliver<N, E>(name: &str, value: &Value, callback: &Option<Callback<E>>)
where
    N: for<'de> Deserialize<'de>,
    E: From<N>,
{
    let Some(callback) = callback else {
        return;
    };
    match N::deserialize(value) {
        Ok(notice) => callback(E::from(notice)),
        Err(e) => tracing::warn!("Skipping malformed {}: {}", name, e),
    }
}
