//! Stream Supervisor Integration Tests
//!
//! Runs the gateways' streams against a local websocket hub: subscription
//! replay, in-order delivery, reconnection, the trading cursor and the
//! forced token refresh after a rejected handshake.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ssi_fc_gateway::{
    DataGateway, EventKind, GatewayError, SessionConfig, StreamEvent, StreamSettings, StreamState,
    StreamSupervisor, TradingGateway,
};

const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Local Hub
// =============================================================================

struct HubConnection {
    uri: String,
    authorization: Option<String>,
    ws: WebSocketStream<TcpStream>,
}

impl HubConnection {
    async fn next_json(&mut self) -> Value {
        loop {
            let message = timeout(WAIT, self.ws.next()).await.unwrap().unwrap().unwrap();
            if let Message::Text(text) = message {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    async fn send(&mut self, frame: &Value) {
        self.ws.send(Message::Text(frame.to_string().into())).await.unwrap();
    }
}

struct VenueHub {
    url: String,
    connections: mpsc::UnboundedReceiver<HubConnection>,
}

impl VenueHub {
    async fn start() -> Self {
        Self::rejecting_first(0).await
    }

    /// Reject the first `rejections` handshakes with 401.
    async fn rejecting_first(rejections: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut remaining = rejections;
            while let Ok((stream, _)) = listener.accept().await {
                let rejecting = remaining > 0;
                remaining = remaining.saturating_sub(1);

                let captured = Arc::new(Mutex::new(None));
                let sink = Arc::clone(&captured);
                let callback = move |request: &Request, response: Response| {
                    let authorization = request
                        .headers()
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    *sink.lock() = Some((request.uri().to_string(), authorization));
                    if rejecting {
                        let mut rejection = ErrorResponse::new(Some("unauthorized".to_string()));
                        *rejection.status_mut() = StatusCode::UNAUTHORIZED;
                        return Err(rejection);
                    }
                    Ok(response)
                };

                if let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await {
                    let (uri, authorization) = captured.lock().take().unwrap();
                    let _ = tx.send(HubConnection { uri, authorization, ws });
                }
            }
        });

        Self {
            url: format!("ws://{addr}/"),
            connections: rx,
        }
    }

    async fn next_connection(&mut self) -> HubConnection {
        timeout(WAIT, self.connections.recv()).await.unwrap().unwrap()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn fast_stream(max_reconnect_attempts: u32) -> StreamSettings {
    StreamSettings {
        reconnect_delay_initial: Duration::from_millis(20),
        reconnect_delay_max: Duration::from_millis(100),
        max_reconnect_attempts,
        ..StreamSettings::default()
    }
}

fn token_response(token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "status": 200,
        "data": { "accessToken": token }
    }))
}

async fn data_gateway(
    venue: &MockServer,
    stream_url: &str,
    settings: StreamSettings,
) -> DataGateway {
    Mock::given(method("POST"))
        .and(path("/api/v2/Market/AccessToken"))
        .respond_with(token_response("data-token"))
        .mount(venue)
        .await;
    let config = SessionConfig::data("id", "secret")
        .unwrap()
        .with_base_url(venue.uri())
        .with_stream_url(stream_url)
        .with_stream_settings(settings);
    DataGateway::connect(config).await.unwrap()
}

async fn trading_gateway(venue: &MockServer, stream_url: &str) -> TradingGateway {
    Mock::given(method("POST"))
        .and(path("/api/v2/Trading/AccessToken"))
        .respond_with(token_response("trade-token"))
        .mount(venue)
        .await;
    let config = SessionConfig::trading("id", "secret")
        .unwrap()
        .with_base_url(venue.uri())
        .with_stream_url(stream_url)
        .with_stream_settings(fast_stream(5));
    TradingGateway::connect(config).await.unwrap()
}

fn collect(stream: &StreamSupervisor, kinds: &[EventKind]) -> mpsc::UnboundedReceiver<StreamEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    for &kind in kinds {
        let tx = tx.clone();
        stream.register_handler(kind, move |event| {
            let _ = tx.send(event.clone());
        });
    }
    rx
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<StreamEvent>) -> StreamEvent {
    timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

fn market_frame(seq: u64) -> Value {
    let inner = json!({
        "DataType": "X",
        "Content": json!({ "Symbol": "SSI", "Seq": seq }).to_string()
    })
    .to_string();
    json!({ "C": format!("d-{seq}"), "M": [{ "H": "FcMarketDataV2Hub", "M": "Broadcast", "A": [inner] }] })
}

fn seq_of(event: &StreamEvent) -> u64 {
    let content: Value = serde_json::from_str(event.payload["Content"].as_str().unwrap()).unwrap();
    content["Seq"].as_u64().unwrap()
}

const ALL_DATA_KINDS: [EventKind; 4] = [
    EventKind::MarketData,
    EventKind::Disconnected,
    EventKind::Reconnecting,
    EventKind::Reconnected,
];

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn subscribes_and_delivers_in_order() {
    let venue = MockServer::start().await;
    let mut hub = VenueHub::start().await;
    let gateway = data_gateway(&venue, &hub.url, fast_stream(5)).await;
    let mut events = collect(gateway.stream(), &[EventKind::MarketData]);

    assert!(gateway.register_channel("X:SSI"));
    assert!(!gateway.register_channel("X:SSI"));
    gateway.init_stream().unwrap();
    assert_eq!(gateway.stream_state(), StreamState::Connecting);
    gateway.start_stream().unwrap();
    gateway.start_stream().unwrap();

    let mut conn = hub.next_connection().await;
    assert_eq!(conn.uri, "/v2.0/signalr?hub=FcMarketDataV2Hub");
    assert_eq!(conn.authorization.as_deref(), Some("Bearer data-token"));

    let subscribe = conn.next_json().await;
    assert_eq!(subscribe["H"], "FcMarketDataV2Hub");
    assert_eq!(subscribe["M"], "SwitchChannels");
    assert_eq!(subscribe["A"], json!([["X:SSI"]]));
    assert_eq!(gateway.stream_state(), StreamState::Connected);

    assert!(gateway.register_channel("B:ALL"));
    let subscribe = conn.next_json().await;
    assert_eq!(subscribe["A"], json!([["X:SSI", "B:ALL"]]));

    for seq in 0..20 {
        conn.send(&market_frame(seq)).await;
    }
    for seq in 0..20 {
        let event = next_event(&mut events).await;
        assert_eq!(event.channel.as_deref(), Some("X"));
        assert_eq!(seq_of(&event), seq);
    }
}

#[tokio::test]
async fn reconnects_and_replays_subscriptions() {
    let venue = MockServer::start().await;
    let mut hub = VenueHub::start().await;
    let gateway = data_gateway(&venue, &hub.url, fast_stream(5)).await;
    let mut events = collect(gateway.stream(), &ALL_DATA_KINDS);
    let mut states = gateway.stream().watch_state();

    gateway.register_channel("X:SSI");
    gateway.register_channel("B:ALL");
    gateway.start_stream().unwrap();

    let mut first = hub.next_connection().await;
    assert_eq!(first.next_json().await["A"], json!([["X:SSI", "B:ALL"]]));
    first.send(&market_frame(1)).await;
    assert_eq!(seq_of(&next_event(&mut events).await), 1);

    drop(first);

    assert_eq!(next_event(&mut events).await.kind, EventKind::Disconnected);
    let reconnecting = next_event(&mut events).await;
    assert_eq!(reconnecting.kind, EventKind::Reconnecting);
    assert_eq!(reconnecting.payload["attempt"], 1);

    let mut second = hub.next_connection().await;
    assert_eq!(next_event(&mut events).await.kind, EventKind::Reconnected);
    assert_eq!(second.next_json().await["A"], json!([["X:SSI", "B:ALL"]]));

    timeout(WAIT, states.wait_for(|s| *s == StreamState::Connected))
        .await
        .unwrap()
        .unwrap();

    second.send(&market_frame(2)).await;
    let event = next_event(&mut events).await;
    assert_eq!(event.kind, EventKind::MarketData);
    assert_eq!(seq_of(&event), 2);
}

#[tokio::test]
async fn malformed_frames_are_dropped() {
    let venue = MockServer::start().await;
    let mut hub = VenueHub::start().await;
    let gateway = data_gateway(&venue, &hub.url, fast_stream(5)).await;
    let mut events = collect(gateway.stream(), &ALL_DATA_KINDS);

    gateway.start_stream().unwrap();
    let mut conn = hub.next_connection().await;

    conn.ws.send(Message::Text("not json".into())).await.unwrap();
    conn.send(&json!({})).await;
    conn.send(&market_frame(3)).await;

    let event = next_event(&mut events).await;
    assert_eq!(event.kind, EventKind::MarketData);
    assert_eq!(seq_of(&event), 3);
    assert_eq!(gateway.stream_state(), StreamState::Connected);
}

#[tokio::test]
async fn trading_cursor_survives_reconnect() {
    let venue = MockServer::start().await;
    let mut hub = VenueHub::start().await;
    let gateway = trading_gateway(&venue, &hub.url).await;
    let mut events = collect(
        gateway.stream(),
        &[EventKind::OrderUpdate, EventKind::OrderMatch, EventKind::Reconnected],
    );

    gateway.start_stream().unwrap();
    let mut first = hub.next_connection().await;
    assert_eq!(first.uri, "/v2.0/signalr?hub=BroadcastHubV2&notify_id=0");
    assert_eq!(first.authorization.as_deref(), Some("Bearer trade-token"));

    first
        .send(&json!({
            "M": [{ "H": "BroadcastHubV2", "M": "Broadcast", "A": [{ "type": "orderEvent", "data": { "notifyId": 7, "orderID": "1" } }] }]
        }))
        .await;
    first
        .send(&json!({
            "M": [{ "H": "BroadcastHubV2", "M": "Broadcast", "A": [json!({ "type": "orderMatchEvent", "data": { "orderID": "1" } }).to_string()] }]
        }))
        .await;

    let update = next_event(&mut events).await;
    assert_eq!(update.kind, EventKind::OrderUpdate);
    assert_eq!(update.cursor, Some(7));
    let fill = next_event(&mut events).await;
    assert_eq!(fill.kind, EventKind::OrderMatch);
    assert_eq!(fill.cursor, Some(8));

    drop(first);

    let second = hub.next_connection().await;
    assert_eq!(second.uri, "/v2.0/signalr?hub=BroadcastHubV2&notify_id=8");
    let reconnected = next_event(&mut events).await;
    assert_eq!(reconnected.kind, EventKind::Reconnected);
    assert_eq!(reconnected.cursor, Some(8));
}

#[tokio::test]
async fn rejected_handshake_forces_token_refresh() {
    let venue = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/Market/AccessToken"))
        .respond_with(token_response("first-token"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&venue)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/Market/AccessToken"))
        .respond_with(token_response("second-token"))
        .expect(1)
        .mount(&venue)
        .await;

    let mut hub = VenueHub::rejecting_first(1).await;
    let config = SessionConfig::data("id", "secret")
        .unwrap()
        .with_base_url(venue.uri())
        .with_stream_url(&hub.url)
        .with_stream_settings(fast_stream(5));
    let gateway = DataGateway::connect(config).await.unwrap();

    gateway.start_stream().unwrap();

    let conn = hub.next_connection().await;
    assert_eq!(conn.authorization.as_deref(), Some("Bearer second-token"));
    assert_eq!(
        gateway.current_session().unwrap().token().as_str(),
        "second-token"
    );
}

#[tokio::test]
async fn exhausted_budget_terminates_stream() {
    let venue = MockServer::start().await;
    let closed_port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let stream_url = format!("ws://127.0.0.1:{closed_port}/");
    let gateway = data_gateway(&venue, &stream_url, fast_stream(2)).await;
    let mut events = collect(gateway.stream(), &[EventKind::Terminated]);

    gateway.start_stream().unwrap();
    let result = timeout(WAIT, gateway.stream().wait()).await.unwrap();

    assert_eq!(result, Err(GatewayError::StreamTerminated { attempts: 2 }));
    assert_eq!(gateway.stream_state(), StreamState::Closed);
    assert_eq!(next_event(&mut events).await.payload["attempts"], 2);
}

#[tokio::test]
async fn connections_dropped_before_any_frame_spend_the_budget() {
    let venue = MockServer::start().await;
    let mut hub = VenueHub::start().await;
    let gateway = data_gateway(&venue, &hub.url, fast_stream(2)).await;

    gateway.start_stream().unwrap();
    let dropper = tokio::spawn(async move {
        while let Some(conn) = hub.connections.recv().await {
            drop(conn);
        }
    });

    let result = timeout(WAIT, gateway.stream().wait()).await.unwrap();
    assert_eq!(result, Err(GatewayError::StreamTerminated { attempts: 2 }));
    assert_eq!(gateway.stream_state(), StreamState::Closed);
    dropper.abort();
}

#[tokio::test]
async fn close_stops_the_stream() {
    let venue = MockServer::start().await;
    let mut hub = VenueHub::start().await;
    let gateway = data_gateway(&venue, &hub.url, fast_stream(5)).await;

    gateway.start_stream().unwrap();
    let _conn = hub.next_connection().await;

    gateway.stream().close();
    timeout(WAIT, gateway.stream().wait()).await.unwrap().unwrap();
    assert_eq!(gateway.stream_state(), StreamState::Closed);
}
