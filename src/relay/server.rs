//! WebSocket relay server
//!
//! Consumers connect on `/` or `/ws`. Each connection gets a writer task
//! that owns the sending half of the socket and drains the connection's
//! outbound queue; the read loop decodes request frames and spawns one
//! session per recognized request.

use super::session::{run_session, Outbound};
use super::types::{ChannelMessage, FrameOutcome, RouteTable};
use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpClientConfig, HttpPageFetcher};
use crate::pagination::{PaginationConfig, Paginator};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Frames buffered per connection before sessions wait on the consumer
const OUTBOUND_BUFFER: usize = 32;

static NEXT_CONNECTION_ID: AtomicUsize = AtomicUsize::new(1);

/// Shared, read-only state of a running relay
#[derive(Debug, Clone)]
pub struct RelayState {
    paginator: Paginator,
    routes: RouteTable,
    announce_completion: bool,
}

impl RelayState {
    /// Assemble relay state from its parts
    pub fn new(paginator: Paginator, routes: RouteTable, announce_completion: bool) -> Self {
        Self {
            paginator,
            routes,
            announce_completion,
        }
    }

    /// Build the HTTP fetcher, driver and route table described by `config`
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let client = HttpClient::with_config(HttpClientConfig::from_settings(&config.http))?;
        let fetcher = HttpPageFetcher::new(client, config.api.clone());
        let paginator = Paginator::new(
            Arc::new(fetcher),
            PaginationConfig::try_from(config.stream)?,
        );
        Ok(Self::new(
            paginator,
            RouteTable::new(&config.relay.routes),
            config.relay.announce_completion,
        ))
    }

    /// Route table in use
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }
}

/// Build the relay router
pub fn router(state: Arc<RelayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the configured address and serve until Ctrl-C
pub async fn serve(config: &RelayConfig) -> Result<()> {
    let state = Arc::new(RelayState::from_config(config)?);
    let addr = config.server.socket_addr()?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::config(format!("Failed to bind to {addr}: {e}")))?;

    serve_on(listener, state, shutdown_signal()).await
}

/// Serve on an already-bound listener until `shutdown` resolves
pub async fn serve_on<F>(listener: TcpListener, state: Arc<RelayState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = listener.local_addr()?;
    info!(
        routes = ?state.routes.request_types(),
        "Relay listening on ws://{}",
        addr
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Other(format!("Server error: {e}")))?;

    info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

/// Health check endpoint
async fn health(State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "routes": state.routes.request_types(),
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let connection = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    info!(connection, "Consumer connected");

    let (mut sender, mut receiver) = socket.split();
    let (outbound, mut queue) = mpsc::channel::<ChannelMessage>(OUTBOUND_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(message) = queue.recv().await {
            let text = match message.encode() {
                Ok(text) => text,
                Err(e) => {
                    error!(connection, error = %e, "Failed to encode frame");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => handle_frame(connection, &text, &state, &outbound),
            Ok(Message::Binary(bytes)) => {
                debug!(connection, len = bytes.len(), "Ignoring binary frame");
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(connection, error = %e, "Socket error");
                break;
            }
        }
    }

    writer.abort();
    info!(connection, "Consumer disconnected");
}

fn handle_frame(connection: usize, text: &str, state: &Arc<RelayState>, outbound: &Outbound) {
    match state.routes.resolve(text) {
        FrameOutcome::Dispatch(route) => {
            debug!(connection, request = %route.request, "Dispatching request");
            let state = Arc::clone(state);
            let outbound = outbound.clone();
            tokio::spawn(async move {
                // Failures are logged by the session itself
                let _ = run_session(
                    &state.paginator,
                    &route,
                    outbound,
                    state.announce_completion,
                )
                .await;
            });
        }
        FrameOutcome::Malformed(e) => {
            error!(connection, error = %e, "Dropping malformed frame");
        }
        FrameOutcome::Unrecognized(kind) => {
            warn!(connection, kind = %kind, "Unrecognized message type");
        }
    }
}
