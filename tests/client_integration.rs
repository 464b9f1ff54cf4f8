//! Integration tests for the trading client.
//!
//! Each test runs an in-process server on 127.0.0.1 that speaks the crate's
//! own frame codec, so no network access is needed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;

use coinfloor::api::*;
use coinfloor::auth::{AuthChallenge, AuthSigner, SignatureComponents, SigningContext};
use coinfloor::shared::{GBP, XBT};
use coinfloor::websocket::{accept_key, FrameReader, MessageWriter, OpCode, WebSocketError};

const SERVER_NONCE: [u8; 16] = *b"0123456789abcdef";
const STEP: Duration = Duration::from_secs(5);

struct MockServer {
    frames: FrameReader<BufReader<OwnedReadHalf>>,
    out: OwnedWriteHalf,
}

impl MockServer {
    async fn send(&mut self, opcode: OpCode, payload: &[u8]) {
        let mut message = MessageWriter::new(&mut self.out, 0, opcode, false, 8192).unwrap();
        message.write(payload).await.unwrap();
        message.close().await.unwrap();
    }

    async fn send_json(&mut self, value: Value) {
        self.send(OpCode::Text, value.to_string().as_bytes()).await;
    }

    async fn recv(&mut self) -> (OpCode, Vec<u8>) {
        tokio::time::timeout(STEP, async {
            let mut message = self.frames.next_message().await.unwrap();
            let mut payload = Vec::new();
            message.read_to_end(&mut payload).await.unwrap();
            (message.opcode(), payload)
        })
        .await
        .expect("client sent nothing")
    }

    async fn recv_json(&mut self) -> Value {
        let (opcode, payload) = self.recv().await;
        assert_eq!(opcode, OpCode::Text);
        serde_json::from_slice(&payload).unwrap()
    }

    /// Answer the next request with `fields` plus its tag and `error_code: 0`.
    async fn reply(&mut self, fields: Value) -> Value {
        let request = self.recv_json().await;
        let mut response = fields;
        response["tag"] = request["tag"].clone();
        response["error_code"] = json!(0);
        self.send_json(response).await;
        request
    }
}

/// Accept one connection, answer the upgrade with `response_headers` and,
/// if given, send `welcome`.
async fn accept(
    listener: &TcpListener,
    response_headers: impl FnOnce(&str) -> String,
    welcome: Option<Value>,
) -> MockServer {
    let (stream, _) = listener.accept().await.unwrap();
    let (read, out) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut key = String::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Sec-WebSocket-Key: ") {
            key = value.to_string();
        }
    }

    let mut server = MockServer {
        frames: FrameReader::new(reader),
        out,
    };
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n{}\r\n",
        response_headers(&key)
    );
    server.out.write_all(response.as_bytes()).await.unwrap();
    if let Some(welcome) = welcome {
        server.send_json(welcome).await;
    }
    server
}

fn upgrade_headers(key: &str) -> String {
    format!(
        "Upgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n",
        accept_key(key)
    )
}

fn welcome() -> Value {
    json!({"nonce": BASE64_STANDARD.encode(SERVER_NONCE)})
}

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/", listener.local_addr().unwrap());
    (listener, url)
}

async fn connect(client: &CoinfloorClient) -> MockServer {
    let (listener, url) = listen().await;
    let (result, server) = tokio::join!(
        client.connect_to(&url),
        accept(&listener, upgrade_headers, Some(welcome()))
    );
    result.unwrap();
    server
}

fn client_with(handlers: EventHandlers) -> CoinfloorClient {
    CoinfloorClient::builder().handlers(handlers).build().unwrap()
}

async fn wait_until_disconnected(client: &CoinfloorClient) {
    tokio::time::timeout(STEP, async {
        while client.state() != ConnectionState::Disconnected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("client did not disconnect");
}

#[tokio::test]
async fn test_place_limit_order_resolves_by_tag() {
    let client = client_with(EventHandlers::new());
    let mut server = connect(&client).await;
    assert!(client.is_connected());

    let handle = client
        .send(PlaceLimitOrder::new(XBT, GBP, 10_000, 250_000).with_tonce(99))
        .await
        .unwrap();
    let request = server.recv_json().await;
    assert_eq!(request["method"], "PlaceOrder");
    assert_eq!(request["tag"], handle.tag());
    assert_eq!(request["base"], XBT);
    assert_eq!(request["counter"], GBP);
    assert_eq!(request["quantity"], 10_000);
    assert_eq!(request["price"], 250_000);
    assert_eq!(request["tonce"], 99);
    assert!(request.get("persist").is_none());

    let response = json!({"tag": handle.tag(), "error_code": 0, "id": 42});
    server.send_json(response.clone()).await;
    assert_eq!(handle.wait_timeout(STEP).await.unwrap(), 42);

    // A repeated tag is dropped and the connection carries on.
    server.send_json(response).await;
    let (volume, _) = tokio::join!(
        client.get_trade_volume(XBT),
        server.reply(json!({"volume": 1234}))
    );
    assert_eq!(volume.unwrap(), 1234);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_server_error_fails_only_that_request() {
    let client = client_with(EventHandlers::new());
    let mut server = connect(&client).await;

    let (result, _) = tokio::join!(client.cancel_order(7), async {
        let request = server.recv_json().await;
        assert_eq!(request["method"], "CancelOrder");
        assert_eq!(request["id"], 7);
        server
            .send_json(json!({
                "tag": request["tag"], "error_code": 4, "error_msg": "Order not found"
            }))
            .await;
    });
    match result.unwrap_err() {
        ApiError::Server { code, message } => {
            assert_eq!(code, 4);
            assert_eq!(message.as_deref(), Some("Order not found"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let (balances, _) = tokio::join!(
        client.get_balances(),
        server.reply(json!({"balances": [{"asset": XBT, "balance": 5}]}))
    );
    assert_eq!(balances.unwrap()[&XBT], 5);
}

#[tokio::test]
async fn test_notifications_reach_callbacks_in_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (a, b, c, d) = (
        Arc::clone(&log),
        Arc::clone(&log),
        Arc::clone(&log),
        Arc::clone(&log),
    );
    let handlers = EventHandlers::new()
        .on_balance_changed(move |e| a.lock().unwrap().push(format!("balance {}", e.balance)))
        .on_order_opened(move |e| b.lock().unwrap().push(format!("opened {} {}", e.id, e.own)))
        .on_orders_matched(move |e| {
            c.lock()
                .unwrap()
                .push(format!("matched {:?} {:?}", e.bid, e.ask_tonce))
        })
        .on_ticker_changed(move |t| d.lock().unwrap().push(format!("ticker {:?}", t.bid)));
    let client = client_with(handlers);
    let mut server = connect(&client).await;

    server
        .send_json(json!({"notice": "BalanceChanged", "asset": GBP, "balance": 900}))
        .await;
    server
        .send_json(json!({
            "notice": "OrderOpened", "id": 11, "base": XBT, "counter": GBP,
            "quantity": 5, "price": 300, "time": 1
        }))
        .await;
    server
        .send_json(json!({
            "notice": "OrdersMatched", "bid": 11, "ask_tonce": null, "base": XBT,
            "counter": GBP, "quantity": 5, "price": 300, "total": 1500, "time": 2
        }))
        .await;
    server
        .send_json(json!({"notice": "TickerChanged", "base": XBT, "counter": GBP, "bid": 300}))
        .await;

    // The response is read after every notice before it.
    let (result, _) = tokio::join!(client.get_orders(), server.reply(json!({"orders": []})));
    assert!(result.unwrap().is_empty());

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "balance 900",
            "opened 11 false",
            "matched Some(11) Some(0)",
            "ticker Some(300)",
        ]
    );
    assert_eq!(client.ticker(XBT, GBP).unwrap().bid, Some(300));
}

#[tokio::test]
async fn test_watch_ticker_merges_sparse_updates() {
    let client = client_with(EventHandlers::new());
    let mut server = connect(&client).await;

    let (ticker, request) = tokio::join!(
        client.watch_ticker(XBT, GBP, true),
        server.reply(json!({"last": 100, "bid": 99, "ask": 101, "volume": 7}))
    );
    assert_eq!(request["watch"], true);
    let ticker = ticker.unwrap().unwrap();
    assert_eq!(ticker.last, Some(100));
    assert_eq!(ticker.spread(), Some(2));

    server
        .send_json(json!({"notice": "TickerChanged", "base": XBT, "counter": GBP, "ask": null}))
        .await;
    let (unwatched, _) = tokio::join!(client.watch_ticker(XBT, GBP, false), server.reply(json!({})));
    assert!(unwatched.unwrap().is_none());

    let cached = client.ticker(XBT, GBP).unwrap();
    assert_eq!(cached.bid, Some(99));
    assert_eq!(cached.ask, None);
    assert_eq!(cached.volume, Some(7));
}

#[tokio::test]
async fn test_ping_is_answered_with_pong() {
    let client = client_with(EventHandlers::new());
    let mut server = connect(&client).await;

    server.send(OpCode::Ping, b"heartbeat").await;
    let (opcode, payload) = server.recv().await;
    assert_eq!(opcode, OpCode::Pong);
    assert_eq!(payload, b"heartbeat");
}

#[tokio::test]
async fn test_idle_connection_sends_keepalive_ping() {
    let client = CoinfloorClient::builder()
        .keepalive_interval(Duration::from_millis(100))
        .build()
        .unwrap();
    let mut server = connect(&client).await;

    let (opcode, payload) = server.recv().await;
    assert_eq!(opcode, OpCode::Ping);
    assert!(payload.is_empty());
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_connection_loss_fails_outstanding_requests() {
    let causes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&causes);
    let handlers =
        EventHandlers::new().on_disconnected(move |cause| sink.lock().unwrap().push(cause.is_some()));
    let client = client_with(handlers);
    let mut server = connect(&client).await;

    let first = client.send(GetBalances {}).await.unwrap();
    let second = client.send(GetOrders {}).await.unwrap();
    assert_ne!(first.tag(), second.tag());
    server.recv_json().await;
    server.recv_json().await;
    drop(server);

    let first = first.wait_timeout(STEP).await.unwrap_err();
    let second = second.wait_timeout(STEP).await.unwrap_err();
    assert!(matches!(first, ApiError::WebSocket(_)), "{first:?}");
    assert!(matches!(second, ApiError::WebSocket(_)), "{second:?}");

    wait_until_disconnected(&client).await;
    assert_eq!(*causes.lock().unwrap(), vec![true]);
    assert!(matches!(
        client.get_balances().await,
        Err(ApiError::NotConnected)
    ));

    // The client can connect again.
    let mut server = connect(&client).await;
    let (volume, _) = tokio::join!(client.get_trade_volume(GBP), server.reply(json!({"volume": 3})));
    assert_eq!(volume.unwrap(), 3);
}

#[tokio::test]
async fn test_disconnect_fails_outstanding_with_disconnected() {
    let causes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&causes);
    let handlers =
        EventHandlers::new().on_disconnected(move |cause| sink.lock().unwrap().push(cause.is_some()));
    let client = client_with(handlers);
    let mut server = connect(&client).await;

    let pending = client.send(GetBalances {}).await.unwrap();
    server.recv_json().await;
    client.disconnect().await.unwrap();

    assert!(matches!(pending.wait().await, Err(ApiError::Disconnected)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(*causes.lock().unwrap(), vec![false]);

    // No close frame: the server just sees the stream end.
    let err = tokio::time::timeout(STEP, server.frames.next_message())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, WebSocketError::ConnectionClosed));
}

#[tokio::test]
async fn test_missing_accept_header_fails_connect() {
    let client = client_with(EventHandlers::new());
    let (listener, url) = listen().await;

    let (result, _server) = tokio::join!(
        client.connect_to(&url),
        accept(
            &listener,
            |_| "Upgrade: websocket\r\nConnection: Upgrade\r\n".to_string(),
            None
        )
    );
    assert!(matches!(
        result,
        Err(ApiError::WebSocket(WebSocketError::MissingHeader("Sec-WebSocket-Accept")))
    ));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_bad_welcome_nonce_fails_connect() {
    let client = client_with(EventHandlers::new());
    let (listener, url) = listen().await;

    let short = json!({"nonce": BASE64_STANDARD.encode([0u8; 8])});
    let (result, _server) = tokio::join!(
        client.connect_to(&url),
        accept(&listener, upgrade_headers, Some(short))
    );
    assert!(matches!(result, Err(ApiError::InvalidWelcome(_))));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let client = client_with(EventHandlers::new());
    let _server = connect(&client).await;

    let err = client.connect_to("ws://127.0.0.1:1/").await.unwrap_err();
    assert!(matches!(err, ApiError::AlreadyConnected));
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_authenticate_signature_verifies() {
    let context = Arc::new(SigningContext::secp224k1().unwrap());
    let client = CoinfloorClient::builder()
        .signing_context(Arc::clone(&context))
        .build()
        .unwrap();
    let mut server = connect(&client).await;

    let (result, request) = tokio::join!(
        client.authenticate(1_000_001, "session-cookie", "correct horse"),
        server.reply(json!({}))
    );
    result.unwrap();

    assert_eq!(request["method"], "Authenticate");
    assert_eq!(request["user_id"], 1_000_001);
    assert_eq!(request["cookie"], "session-cookie");

    let client_nonce = BASE64_STANDARD
        .decode(request["nonce"].as_str().unwrap())
        .unwrap();
    let component = |i: usize| -> [u8; 28] {
        let bytes = BASE64_STANDARD
            .decode(request["signature"][i].as_str().unwrap())
            .unwrap();
        bytes.try_into().unwrap()
    };
    let challenge = AuthChallenge {
        server_nonce: SERVER_NONCE,
        client_nonce: client_nonce.try_into().unwrap(),
    };
    let signature = SignatureComponents {
        r: component(0),
        s: component(1),
    };

    let signer = AuthSigner::new(context);
    assert!(signer
        .verify(1_000_001, "correct horse", &challenge, &signature)
        .unwrap());
    assert!(!signer
        .verify(1_000_001, "wrong horse", &challenge, &signature)
        .unwrap());
}
