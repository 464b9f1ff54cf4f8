//! Coinfloor trading client.
//!
//! The [`CoinfloorClient`] owns one WebSocket session at a time. Requests may
//! be issued concurrently from any task; each is correlated with its response
//! by tag, and a single background task reads every inbound message.
//!
//! # Example
//!
//! ```rust,ignore
//! use coinfloor::api::{CoinfloorClient, EventHandlers};
//! use coinfloor::shared::{GBP, XBT};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CoinfloorClient::builder()
//!         .handlers(EventHandlers::new().on_ticker_changed(|t| println!("{t:?}")))
//!         .build()?;
//!
//!     client.connect().await?;
//!     client.authenticate(12345, "cookie", "passphrase").await?;
//!
//!     let balances = client.get_balances().await?;
//!     println!("XBT balance: {:?}", balances.get(&XBT));
//!
//!     let id = client.place_limit_order(XBT, GBP, 10_000, 2_500_000, 0, true).await?;
//!     client.cancel_order(id).await?;
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use rand::rngs::OsRng;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::api::config::ClientConfig;
use crate::api::dispatcher::Dispatcher;
use crate::api::error::{ApiError, ApiResult};
use crate::api::handlers::{EventHandlers, MessageHandler};
use crate::api::registry::{PendingRequest, RequestRegistry, ResponseHandle};
use crate::api::requests::{self, *};
use crate::api::ticker::TickerCache;
use crate::api::types::{MarketOrderEstimate, OrderId, OrderInfo, TickerInfo};
use crate::api::wire::Welcome;
use crate::auth::{AuthChallenge, AuthSigner, SigningContext, NONCE_LEN};
use crate::shared::{AssetCode, AssetPair};
use crate::websocket::{
    AsyncStream, Connection, ConnectionReader, ConnectionWriter, OpCode, WebSocketError,
};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The socket is gone and outstanding requests are being failed
    Draining,
}

/// Per-connection resources
struct Session {
    writer: ConnectionWriter,
    server_nonce: [u8; NONCE_LEN],
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

struct SessionSlot {
    state: ConnectionState,
    session: Option<Session>,
}

/// State shared between the client and its dispatcher task
pub(crate) struct Shared {
    pub(crate) registry: Arc<RequestRegistry>,
    pub(crate) tickers: Arc<TickerCache>,
    pub(crate) handler: MessageHandler,
    last_activity: Mutex<Instant>,
    slot: Mutex<SessionSlot>,
}

impl Shared {
    fn new(events: EventHandlers) -> Self {
        let registry = Arc::new(RequestRegistry::new());
        let tickers = Arc::new(TickerCache::new());
        let handler = MessageHandler::new(Arc::clone(&registry), Arc::clone(&tickers), events);
        Self {
            registry,
            tickers,
            handler,
            last_activity: Mutex::new(Instant::now()),
            slot: Mutex::new(SessionSlot {
                state: ConnectionState::Disconnected,
                session: None,
            }),
        }
    }

    fn slot(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reset the keepalive clock.
    pub(crate) fn touch(&self) {
        *self.last_activity.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Time left before a keepalive ping is due.
    pub(crate) fn keepalive_remaining(&self, interval: Duration) -> Duration {
        let last = *self.last_activity.lock().unwrap_or_else(PoisonError::into_inner);
        (last + interval).saturating_duration_since(Instant::now())
    }

    /// Tear down after the dispatcher has stopped.
    pub(crate) fn finish(&self, cause: Option<ApiError>) {
        self.slot().state = ConnectionState::Draining;

        let error = cause.clone().unwrap_or(ApiError::Disconnected);
        let failed = self.registry.fail_all(&error);
        if failed > 0 {
            tracing::info!("Failed {} outstanding requests: {}", failed, error);
        }
        self.handler.events().disconnected(cause.as_ref());

        let mut slot = self.slot();
        slot.session = None;
        slot.state = ConnectionState::Disconnected;
    }

    /// Writer of the live session.
    fn writer(&self) -> ApiResult<ConnectionWriter> {
        let slot = self.slot();
        match (&slot.state, &slot.session) {
            (ConnectionState::Connected, Some(session)) => Ok(session.writer.clone()),
            _ => Err(ApiError::NotConnected),
        }
    }

    fn server_nonce(&self) -> ApiResult<[u8; NONCE_LEN]> {
        let slot = self.slot();
        match (&slot.state, &slot.session) {
            (ConnectionState::Connected, Some(session)) => Ok(session.server_nonce),
            _ => Err(ApiError::NotConnected),
        }
    }
}

/// Returns the state to `Disconnected` unless the connect attempt completed
struct ConnectGuard<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl<'a> ConnectGuard<'a> {
    fn begin(shared: &'a Shared) -> ApiResult<Self> {
        let mut slot = shared.slot();
        if slot.state != ConnectionState::Disconnected {
            return Err(ApiError::AlreadyConnected);
        }
        slot.state = ConnectionState::Connecting;
        Ok(Self {
            shared,
            armed: true,
        })
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.slot().state = ConnectionState::Disconnected;
        }
    }
}

/// Builder for configuring [`CoinfloorClient`].
#[derive(Debug, Clone, Default)]
pub struct CoinfloorClientBuilder {
    config: ClientConfig,
    handlers: EventHandlers,
    signing_context: Option<Arc<SigningContext>>,
}

impl CoinfloorClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the endpoint used by [`CoinfloorClient::connect`].
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Set the idle time after which a keepalive ping is sent.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.config.keepalive_interval = interval;
        self
    }

    /// Bound the awaiting request methods.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Set the notification callbacks.
    pub fn handlers(mut self, handlers: EventHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    /// Share a curve context between clients instead of building one per client.
    pub fn signing_context(mut self, context: Arc<SigningContext>) -> Self {
        self.signing_context = Some(context);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// [`ApiError::Auth`] if no signing context was supplied and the secp224k1
    /// curve is unavailable.
    pub fn build(self) -> ApiResult<CoinfloorClient> {
        let context = match self.signing_context {
            Some(context) => context,
            None => Arc::new(SigningContext::secp224k1()?),
        };
        Ok(CoinfloorClient {
            config: self.config,
            signer: AuthSigner::new(context),
            shared: Arc::new(Shared::new(self.handlers)),
        })
    }
}

/// Client for the Coinfloor trading API
///
/// Every method takes `&self`; wrap the client in an [`Arc`] to share it
/// between tasks. Dropping the client stops its dispatcher task.
pub struct CoinfloorClient {
    config: ClientConfig,
    signer: AuthSigner,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for CoinfloorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinfloorClient")
            .field("url", &self.config.url)
            .field("state", &self.state())
            .finish()
    }
}

impl CoinfloorClient {
    /// Create a client with the given configuration and no callbacks.
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        Self::builder().config(config).build()
    }

    /// Create a new builder.
    pub fn builder() -> CoinfloorClientBuilder {
        CoinfloorClientBuilder::new()
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.slot().state
    }

    /// Check if a session is established.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    /// Connect to the configured endpoint.
    pub async fn connect(&self) -> ApiResult<()> {
        self.connect_to(&self.config.url).await
    }

    /// Connect to `url`, perform the upgrade and read the welcome message.
    ///
    /// # Errors
    ///
    /// [`ApiError::AlreadyConnected`] unless the client is disconnected;
    /// otherwise any transport, handshake or welcome failure. The client is
    /// left disconnected on error.
    pub async fn connect_to(&self, url: &str) -> ApiResult<()> {
        let guard = ConnectGuard::begin(&self.shared)?;
        let connection = Connection::connect(url, &self.config.connection_config()).await?;
        self.establish(connection, guard).await
    }

    /// Like [`connect_to`](Self::connect_to), over a stream the caller already opened.
    pub async fn connect_over<S>(&self, url: &str, stream: S) -> ApiResult<()>
    where
        S: AsyncStream + 'static,
    {
        let guard = ConnectGuard::begin(&self.shared)?;
        let connection =
            Connection::handshake(url, stream, &self.config.connection_config()).await?;
        self.establish(connection, guard).await
    }

    async fn establish(&self, connection: Connection, guard: ConnectGuard<'_>) -> ApiResult<()> {
        let (mut reader, writer) = connection.into_split();
        let server_nonce = match self.read_welcome(&mut reader).await {
            Ok(nonce) => nonce,
            Err(e) => {
                let _ = writer.close().await;
                return Err(e);
            }
        };

        self.shared.registry.open();
        self.shared.touch();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let dispatcher = Dispatcher::new(
            reader,
            writer.clone(),
            Arc::clone(&self.shared),
            self.config.keepalive_interval,
            self.config.mask_outbound,
        );
        {
            let mut slot = self.shared.slot();
            let task = tokio::spawn(dispatcher.run(shutdown_rx));
            slot.state = ConnectionState::Connected;
            slot.session = Some(Session {
                writer,
                server_nonce,
                shutdown: Some(shutdown_tx),
                task: Some(task),
            });
        }
        guard.disarm();

        tracing::info!("Connected");
        Ok(())
    }

    /// Read the first message and extract the server nonce from it.
    async fn read_welcome(&self, reader: &mut ConnectionReader) -> ApiResult<[u8; NONCE_LEN]> {
        let Some(mut message) = reader.next_message(Some(self.config.welcome_timeout)).await?
        else {
            return Err(WebSocketError::Timeout.into());
        };
        if message.opcode() != OpCode::Text {
            return Err(ApiError::InvalidWelcome(format!(
                "expected a text message, got {:?}",
                message.opcode()
            )));
        }

        let mut payload = Vec::new();
        message.read_to_end(&mut payload).await?;
        let welcome: Welcome = serde_json::from_slice(&payload)
            .map_err(|e| ApiError::InvalidWelcome(e.to_string()))?;
        let nonce = BASE64_STANDARD
            .decode(welcome.nonce.as_bytes())
            .map_err(|e| ApiError::InvalidWelcome(format!("nonce: {}", e)))?;
        <[u8; NONCE_LEN]>::try_from(nonce.as_slice()).map_err(|_| {
            ApiError::InvalidWelcome(format!(
                "nonce is {} bytes, expected {}",
                nonce.len(),
                NONCE_LEN
            ))
        })
    }

    /// Close the connection and wait for outstanding requests to be failed.
    ///
    /// Does nothing if there is no connection.
    pub async fn disconnect(&self) -> ApiResult<()> {
        let (shutdown, task) = {
            let mut slot = self.shared.slot();
            match slot.session.as_mut() {
                Some(session) => (session.shutdown.take(), session.task.take()),
                None => return Ok(()),
            }
        };

        if let Some(tx) = shutdown {
            let _ = tx.send(());
        }
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("Dispatcher task ended abnormally: {}", e);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Send a request and return as soon as it has been written.
    ///
    /// # Errors
    ///
    /// [`ApiError::NotConnected`] without a session, or the write error. A
    /// request that failed to send leaves nothing outstanding.
    pub async fn send<R: ApiRequest>(&self, request: R) -> ApiResult<ResponseHandle<R::Output>> {
        let writer = self.shared.writer()?;
        let mut message = requests::to_message(&request)?;

        let (tx, rx) = oneshot::channel();
        let tickers = Arc::clone(&self.shared.tickers);
        let tag = self.shared.registry.register(PendingRequest::new(move |result| {
            let _ = tx.send(result.and_then(|value: Value| request.interpret(&value, &tickers)));
        }))?;
        message.insert("tag".to_string(), Value::from(tag));

        let sent = match serde_json::to_vec(&message) {
            Ok(payload) => writer
                .send(OpCode::Text, self.config.mask_outbound, &payload)
                .await
                .map_err(ApiError::from),
            Err(e) => Err(ApiError::Serialization(e.to_string())),
        };
        if let Err(e) = sent {
            self.shared.registry.cancel(tag);
            return Err(e);
        }

        self.shared.touch();
        Ok(ResponseHandle::new(tag, rx))
    }

    /// Send a request and wait for its result, bounded by the configured
    /// request timeout if there is one.
    pub async fn call<R: ApiRequest>(&self, request: R) -> ApiResult<R::Output> {
        let handle = self.send(request).await?;
        match self.config.request_timeout {
            Some(timeout) => handle.wait_timeout(timeout).await,
            None => handle.wait().await,
        }
    }

    /// Sign the server's challenge and send `Authenticate`.
    ///
    /// # Errors
    ///
    /// [`ApiError::NotConnected`] without a session, [`ApiError::Auth`] if
    /// signing fails, or any error from [`send`](Self::send).
    pub async fn send_authenticate(
        &self,
        user_id: u64,
        cookie: &str,
        passphrase: &str,
    ) -> ApiResult<ResponseHandle<()>> {
        let server_nonce = self.shared.server_nonce()?;
        let challenge = AuthChallenge::generate(server_nonce, &mut OsRng);
        let signature = self.signer.sign(user_id, passphrase, &challenge)?;
        self.send(Authenticate {
            user_id,
            cookie: cookie.to_string(),
            nonce: challenge.encoded_client_nonce(),
            signature: signature.encoded(),
        })
        .await
    }

    /// Authenticate the session.
    pub async fn authenticate(&self, user_id: u64, cookie: &str, passphrase: &str) -> ApiResult<()> {
        let handle = self.send_authenticate(user_id, cookie, passphrase).await?;
        match self.config.request_timeout {
            Some(timeout) => handle.wait_timeout(timeout).await,
            None => handle.wait().await,
        }
    }

    /// Get the balance of every asset.
    pub async fn get_balances(&self) -> ApiResult<HashMap<AssetCode, i64>> {
        self.call(GetBalances {}).await
    }

    /// Get the user's open orders.
    pub async fn get_orders(&self) -> ApiResult<HashMap<OrderId, OrderInfo>> {
        self.call(GetOrders {}).await
    }

    /// Estimate a market order for a base quantity.
    pub async fn estimate_base_market_order(
        &self,
        base: AssetCode,
        counter: AssetCode,
        quantity: i64,
    ) -> ApiResult<MarketOrderEstimate> {
        self.call(EstimateMarketOrder::by_quantity(base, counter, quantity))
            .await
    }

    /// Estimate a market order for a counter total.
    pub async fn estimate_counter_market_order(
        &self,
        base: AssetCode,
        counter: AssetCode,
        total: i64,
    ) -> ApiResult<MarketOrderEstimate> {
        self.call(EstimateMarketOrder::by_total(base, counter, total))
            .await
    }

    /// Place a limit order and return its id.
    ///
    /// `tonce` is sent only when positive.
    pub async fn place_limit_order(
        &self,
        base: AssetCode,
        counter: AssetCode,
        quantity: i64,
        price: i64,
        tonce: i64,
        persist: bool,
    ) -> ApiResult<OrderId> {
        let request = PlaceLimitOrder::new(base, counter, quantity, price)
            .with_tonce(tonce)
            .with_persist(persist);
        self.call(request).await
    }

    /// Execute a market order for a base quantity and return the unfilled remainder.
    pub async fn execute_base_market_order(
        &self,
        base: AssetCode,
        counter: AssetCode,
        quantity: i64,
        tonce: i64,
    ) -> ApiResult<i64> {
        self.call(ExecuteMarketOrder::by_quantity(base, counter, quantity).with_tonce(tonce))
            .await
    }

    /// Execute a market order for a counter total and return the unfilled remainder.
    pub async fn execute_counter_market_order(
        &self,
        base: AssetCode,
        counter: AssetCode,
        total: i64,
        tonce: i64,
    ) -> ApiResult<i64> {
        self.call(ExecuteMarketOrder::by_total(base, counter, total).with_tonce(tonce))
            .await
    }

    /// Cancel an order by id.
    pub async fn cancel_order(&self, id: OrderId) -> ApiResult<OrderInfo> {
        self.call(CancelOrder::by_id(id)).await
    }

    /// Cancel an order by the tonce it was placed with.
    pub async fn cancel_order_by_tonce(&self, tonce: i64) -> ApiResult<OrderInfo> {
        self.call(CancelOrder::by_tonce(tonce)).await
    }

    /// Cancel every open order.
    pub async fn cancel_all_orders(&self) -> ApiResult<HashMap<OrderId, OrderInfo>> {
        self.call(CancelAllOrders {}).await
    }

    /// Get the user's 30-day trade volume in `asset`.
    pub async fn get_trade_volume(&self, asset: AssetCode) -> ApiResult<i64> {
        self.call(GetTradeVolume { asset }).await
    }

    /// Start or stop order notifications for a market.
    ///
    /// Returns the current book when starting.
    pub async fn watch_orders(
        &self,
        base: AssetCode,
        counter: AssetCode,
        watch: bool,
    ) -> ApiResult<Option<HashMap<OrderId, OrderInfo>>> {
        self.call(WatchOrders {
            base,
            counter,
            watch,
        })
        .await
    }

    /// Start or stop ticker notifications for a market.
    ///
    /// Returns the merged ticker when starting.
    pub async fn watch_ticker(
        &self,
        base: AssetCode,
        counter: AssetCode,
        watch: bool,
    ) -> ApiResult<Option<TickerInfo>> {
        self.call(WatchTicker {
            base,
            counter,
            watch,
        })
        .await
    }

    // =========================================================================
    // Cached state
    // =========================================================================

    /// Last known ticker for a market.
    pub fn ticker(&self, base: AssetCode, counter: AssetCode) -> Option<TickerInfo> {
        self.shared.tickers.get(AssetPair::new(base, counter))
    }

    /// Shared handle to the ticker cache.
    pub fn tickers(&self) -> Arc<TickerCache> {
        Arc::clone(&self.shared.tickers)
    }
}

impl Drop for CoinfloorClient {
    fn drop(&mut self) {
        let mut slot = self.shared.slot();
        if let Some(tx) = slot.session.as_mut().and_then(|s| s.shutdown.take()) {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CoinfloorClient {
        CoinfloorClient::builder()
            .url("ws://127.0.0.1:1/")
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_applies_config() {
        let context = Arc::new(SigningContext::secp224k1().unwrap());
        let client = CoinfloorClient::builder()
            .url("ws://localhost:9000/")
            .keepalive_interval(Duration::from_secs(5))
            .request_timeout(Duration::from_secs(2))
            .signing_context(context)
            .build()
            .unwrap();

        assert_eq!(client.config().url, "ws://localhost:9000/");
        assert_eq!(client.config().keepalive_interval, Duration::from_secs(5));
        assert_eq!(client.config().request_timeout, Some(Duration::from_secs(2)));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_requests_need_connection() {
        let client = client();
        let err = client.get_balances().await.unwrap_err();
        assert!(matches!(err, ApiError::NotConnected));

        let err = client
            .send_authenticate(1, "cookie", "secret")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotConnected));

        // Disconnecting while disconnected is a no-op.
        client.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_connect_resets_state() {
        let client = client();
        let err = client.connect_to("http://127.0.0.1/").await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::WebSocket(WebSocketError::UnsupportedScheme(_))
        ));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connect_guard() {
        let shared = Shared::new(EventHandlers::new());
        {
            let _guard = ConnectGuard::begin(&shared).unwrap();
            assert_eq!(shared.slot().state, ConnectionState::Connecting);
            assert!(matches!(
                ConnectGuard::begin(&shared),
                Err(ApiError::AlreadyConnected)
            ));
        }
        assert_eq!(shared.slot().state, ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_clock() {
        let shared = Shared::new(EventHandlers::new());
        shared.touch();
        let interval = Duration::from_secs(45);
        assert_eq!(shared.keepalive_remaining(interval), interval);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(shared.keepalive_remaining(interval), Duration::from_secs(15));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(shared.keepalive_remaining(interval).is_zero());
    }
}
