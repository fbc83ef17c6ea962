//! Integration tests using a mock upstream and a live relay
//!
//! Tests the full end-to-end flow: consumer request → relay → paginated
//! HTTP requests → one WebSocket frame per page

use futures::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use voto_relay::config::{ApiConfig, RelayConfig};
use voto_relay::relay::{serve_on, Accumulator, ChannelMessage, Completion, RelayState, RouteTable};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// Helpers
// ============================================================================

struct Relay {
    addr: SocketAddr,
    _shutdown: oneshot::Sender<()>,
}

impl Relay {
    async fn start(upstream: &MockServer, announce_completion: bool) -> Self {
        let mut config = RelayConfig::from_api(ApiConfig::new(upstream.uri(), "test-key"));
        config.relay.announce_completion = announce_completion;
        config.validate().unwrap();

        let state = Arc::new(RelayState::from_config(&config).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, signal) = oneshot::channel::<()>();

        tokio::spawn(serve_on(listener, state, async move {
            let _ = signal.await;
        }));

        Self {
            addr,
            _shutdown: shutdown,
        }
    }

    async fn connect(&self, path: &str) -> Client {
        let (client, _) = connect_async(format!("ws://{}{path}", self.addr))
            .await
            .unwrap();
        client
    }
}

async fn send(client: &mut Client, text: &str) {
    client.send(Message::Text(text.to_string())).await.unwrap();
}

/// Next text frame, or `None` if nothing arrives within `wait`
async fn next_frame(client: &mut Client, wait: Duration) -> Option<ChannelMessage> {
    loop {
        match tokio::time::timeout(wait, client.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return Some(ChannelMessage::decode(&text).unwrap()),
            Ok(Some(Ok(_))) => continue,
            _ => return None,
        }
    }
}

/// Layer that records the crate's own events as (level, message)
#[derive(Clone, Default)]
struct CapturedEvents(Arc<Mutex<Vec<(Level, String)>>>);

impl CapturedEvents {
    /// Capture events on this thread until the guard drops
    fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::registry().with(self.clone());
        tracing::subscriber::set_default(subscriber)
    }

    fn at(&self, level: Level) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for CapturedEvents {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !event.metadata().target().starts_with("voto_relay") {
            return;
        }
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.0
            .lock()
            .unwrap()
            .push((*event.metadata().level(), visitor.0));
    }
}

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);

async fn mount_single_page(upstream: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/trees"))
        .and(query_param("api_key", "test-key"))
        .and(query_param("limit", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"trees": [{"id": 1, "title": "Campaign"}]},
            "pagination": {"nextURL": null}
        })))
        .mount(upstream)
        .await;
}

// ============================================================================
// Relay Scenarios
// ============================================================================

#[tokio::test]
async fn test_single_page_yields_exactly_one_frame() {
    let upstream = MockServer::start().await;
    mount_single_page(&upstream).await;
    let relay = Relay::start(&upstream, false).await;
    let mut client = relay.connect("/").await;

    send(&mut client, r#"{"type":"get-campaigns"}"#).await;

    let frame = next_frame(&mut client, WAIT).await.unwrap();
    assert_eq!(
        frame,
        ChannelMessage::records("trees", "trees", vec![json!({"id": 1, "title": "Campaign"})])
    );
    assert!(next_frame(&mut client, QUIET).await.is_none());
}

#[tokio::test]
async fn test_two_pages_arrive_in_order() {
    let upstream = MockServer::start().await;
    let next_url = format!("{}/trees?api_key=test-key&limit=20&page_after=10", upstream.uri());

    Mock::given(method("GET"))
        .and(path("/trees"))
        .and(query_param_is_missing("page_after"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"trees": [{"id": 9}, {"id": 10}]},
            "pagination": {"nextURL": next_url}
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    Mock::given(method("GET"))
        .and(path("/trees"))
        .and(query_param("page_after", "10"))
        .and(query_param("limit", "20"))
        .and(query_param("api_key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"trees": [{"id": 11}]},
            "pagination": {"nextURL": ""}
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let relay = Relay::start(&upstream, false).await;
    let mut client = relay.connect("/ws").await;
    send(&mut client, r#"{"type":"get-campaigns"}"#).await;

    let mut accumulator = Accumulator::new(RouteTable::default().get("get-campaigns").unwrap().clone());
    for _ in 0..2 {
        let frame = next_frame(&mut client, WAIT).await.unwrap();
        assert!(accumulator.accept(&frame));
    }

    assert_eq!(
        accumulator.records(),
        &[json!({"id": 9}), json!({"id": 10}), json!({"id": 11})]
    );
    assert!(next_frame(&mut client, QUIET).await.is_none());
}

#[tokio::test]
async fn test_malformed_frame_is_dropped_and_connection_survives() {
    let events = CapturedEvents::default();
    let _guard = events.install();

    let upstream = MockServer::start().await;
    mount_single_page(&upstream).await;
    let relay = Relay::start(&upstream, false).await;
    let mut client = relay.connect("/").await;

    send(&mut client, "not json").await;

    assert!(next_frame(&mut client, QUIET).await.is_none());
    assert!(upstream.received_requests().await.unwrap().is_empty());
    let errors = events.at(Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("malformed frame"));
    assert!(events.at(Level::WARN).is_empty());

    send(&mut client, r#"{"data":{}}"#).await;
    assert!(next_frame(&mut client, QUIET).await.is_none());
    assert_eq!(events.at(Level::ERROR).len(), 2);

    send(&mut client, r#"{"type":"get-campaigns"}"#).await;
    assert!(next_frame(&mut client, WAIT).await.is_some());
}

#[tokio::test]
async fn test_unknown_type_triggers_no_fetch() {
    let events = CapturedEvents::default();
    let _guard = events.install();

    let upstream = MockServer::start().await;
    mount_single_page(&upstream).await;
    let relay = Relay::start(&upstream, false).await;
    let mut client = relay.connect("/").await;

    send(&mut client, r#"{"type":"unknown-op"}"#).await;

    assert!(next_frame(&mut client, QUIET).await.is_none());
    assert!(upstream.received_requests().await.unwrap().is_empty());
    let warnings = events.at(Level::WARN);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("Unrecognized message type"));
    assert!(events.at(Level::ERROR).is_empty());
}

#[tokio::test]
async fn test_completion_frame_when_announced() {
    let upstream = MockServer::start().await;
    mount_single_page(&upstream).await;
    let relay = Relay::start(&upstream, true).await;
    let mut client = relay.connect("/").await;

    let mut accumulator = Accumulator::new(RouteTable::default().get("get-campaigns").unwrap().clone());
    send(&mut client, &accumulator.request().encode().unwrap()).await;

    while !accumulator.is_complete() {
        let frame = next_frame(&mut client, WAIT).await.unwrap();
        accumulator.accept(&frame);
    }

    assert_eq!(accumulator.frames(), 1);
    assert_eq!(
        accumulator.completion(),
        Some(&Completion::Finished {
            pages: 1,
            records: 1
        })
    );
}

#[tokio::test]
async fn test_upstream_failure_announced_and_connection_survives() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/trees"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .up_to_n_times(1)
        .mount(&upstream)
        .await;
    mount_single_page(&upstream).await;

    let relay = Relay::start(&upstream, true).await;
    let mut client = relay.connect("/").await;

    send(&mut client, r#"{"type":"get-campaigns"}"#).await;
    let frame = next_frame(&mut client, WAIT).await.unwrap();
    assert_eq!(frame.kind, "stream-error");
    assert!(frame.data_str("message").unwrap().contains("503"));

    // No retry happened; the next request is served normally
    send(&mut client, r#"{"type":"get-campaigns"}"#).await;
    assert_eq!(next_frame(&mut client, WAIT).await.unwrap().kind, "trees");
    assert_eq!(next_frame(&mut client, WAIT).await.unwrap().kind, "stream-end");
    assert_eq!(upstream.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_connections_are_independent() {
    let upstream = MockServer::start().await;
    mount_single_page(&upstream).await;
    let relay = Relay::start(&upstream, false).await;
    let mut first = relay.connect("/").await;
    let mut second = relay.connect("/ws").await;

    send(&mut first, r#"{"type":"get-campaigns"}"#).await;

    assert!(next_frame(&mut first, WAIT).await.is_some());
    assert!(next_frame(&mut second, QUIET).await.is_none());
}

#[tokio::test]
async fn test_health_endpoint() {
    let upstream = MockServer::start().await;
    let relay = Relay::start(&upstream, false).await;

    let body: serde_json::Value = reqwest::get(format!("http://{}/health", relay.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body, json!({"status": "ok", "routes": ["get-campaigns"]}));
}
