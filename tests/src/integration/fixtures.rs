//! # Test Fixtures
//!
//! Local stand-ins for the scraping backend: a `tokio-tungstenite` push
//! server and an `axum` REST stub, both bound to `127.0.0.1:0`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use pulse_sync::{SyncConfig, SyncCoordinator};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Upper bound for every wait in the suite.
pub const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Poll `condition` until it holds. Panics after [`WAIT_LIMIT`].
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within {WAIT_LIMIT:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// =============================================================================
// PUSH SERVER
// =============================================================================

enum ServerCommand {
    Text(String),
    Close,
    Freeze,
}

/// Server side of one accepted push connection.
#[derive(Clone)]
pub struct PushClient {
    commands: mpsc::UnboundedSender<ServerCommand>,
}

impl PushClient {
    pub fn send_json(&self, frame: Value) {
        self.send_text(&frame.to_string());
    }

    pub fn send_text(&self, text: &str) {
        let _ = self.commands.send(ServerCommand::Text(text.to_string()));
    }

    /// Close with a close frame.
    pub fn close(&self) {
        let _ = self.commands.send(ServerCommand::Close);
    }

    /// Stop reading from the socket, so pings go unanswered.
    pub fn freeze(&self) {
        let _ = self.commands.send(ServerCommand::Freeze);
    }
}

/// WebSocket server accepting any number of push connections.
pub struct PushServer {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    clients: mpsc::UnboundedReceiver<PushClient>,
    task: JoinHandle<()>,
}

impl PushServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind push server");
        let addr = listener.local_addr().expect("push server address");
        let accepted = Arc::new(AtomicUsize::new(0));
        let (clients_tx, clients) = mpsc::unbounded_channel();

        let counter = accepted.clone();
        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(socket).await else {
                    continue;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let (commands_tx, commands) = mpsc::unbounded_channel();
                let _ = clients_tx.send(PushClient {
                    commands: commands_tx,
                });
                tokio::spawn(serve_connection(ws, commands));
            }
        });

        Self {
            addr,
            accepted,
            clients,
            task,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Wait for the next accepted connection.
    pub async fn next_client(&mut self) -> PushClient {
        tokio::time::timeout(WAIT_LIMIT, self.clients.recv())
            .await
            .expect("no client connected in time")
            .expect("push server stopped")
    }

    /// Stop accepting. Later connection attempts are refused.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for PushServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_connection(
    mut ws: WebSocketStream<TcpStream>,
    mut commands: mpsc::UnboundedReceiver<ServerCommand>,
) {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(ServerCommand::Text(text)) => {
                    if ws.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                Some(ServerCommand::Close) => {
                    let _ = ws.close(None).await;
                    while let Some(Ok(_)) = ws.next().await {}
                    return;
                }
                Some(ServerCommand::Freeze) => {
                    // Hold the socket without reading until told to close.
                    while let Some(command) = commands.recv().await {
                        if matches!(command, ServerCommand::Close) {
                            break;
                        }
                    }
                    return;
                }
                None => {
                    while let Some(Ok(_)) = ws.next().await {}
                    return;
                }
            },
            incoming = ws.next() => {
                // Reading keeps tungstenite answering pings.
                if !matches!(incoming, Some(Ok(_))) {
                    return;
                }
            }
        }
    }
}

// =============================================================================
// REST STUB
// =============================================================================

struct StubState {
    restaurants: Mutex<Vec<Value>>,
    status: Mutex<Value>,
    hits: Mutex<HashMap<String, usize>>,
    delay: Mutex<Duration>,
}

impl StubState {
    async fn hit(&self, path: String) {
        *self.hits.lock().entry(path).or_insert(0) += 1;
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// `axum` server mimicking the backend's REST endpoints.
pub struct ApiStub {
    addr: SocketAddr,
    state: Arc<StubState>,
    task: JoinHandle<()>,
}

impl ApiStub {
    pub async fn start() -> Self {
        let state = Arc::new(StubState {
            restaurants: Mutex::new(vec![
                restaurant_row("Mela", 38),
                restaurant_row("Tandoor Palace", 52),
            ]),
            status: Mutex::new(json!({
                "is_running": false,
                "current_restaurant": null,
                "progress": 0,
                "last_scrape_time": "2025-03-01T14:00:00",
                "successful_scrapes": 2,
                "errors": []
            })),
            hits: Mutex::new(HashMap::new()),
            delay: Mutex::new(Duration::ZERO),
        });

        let app = Router::new()
            .route("/api/restaurants", get(list_restaurants))
            .route("/api/restaurants/:name", get(get_restaurant))
            .route("/api/analytics/summary", get(analytics_summary))
            .route("/api/analytics/trends", get(analytics_trends))
            .route("/api/status", get(scraping_status))
            .route("/health", get(health))
            .route("/api/scrape/:command", post(scrape_command))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind REST stub");
        let addr = listener.local_addr().expect("REST stub address");
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state, task }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests received for `path` (e.g. `/api/restaurants/Mela`).
    pub fn hits(&self, path: &str) -> usize {
        self.state.hits.lock().get(path).copied().unwrap_or(0)
    }

    /// Replace (or add) the row with the same name.
    pub fn set_restaurant(&self, row: Value) {
        let mut restaurants = self.state.restaurants.lock();
        restaurants.retain(|existing| existing["name"] != row["name"]);
        restaurants.push(row);
    }

    /// Delay every response.
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock() = delay;
    }
}

impl Drop for ApiStub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn list_restaurants(State(state): State<Arc<StubState>>) -> Json<Value> {
    state.hit("/api/restaurants".to_string()).await;
    Json(Value::Array(state.restaurants.lock().clone()))
}

async fn get_restaurant(
    State(state): State<Arc<StubState>>,
    Path(name): Path<String>,
) -> Json<Value> {
    state.hit(format!("/api/restaurants/{name}")).await;
    let found = state
        .restaurants
        .lock()
        .iter()
        .find(|row| row["name"] == name.as_str())
        .cloned();
    Json(found.unwrap_or_else(|| json!({"error": "Restaurant not found"})))
}

async fn analytics_summary(State(state): State<Arc<StubState>>) -> Json<Value> {
    state.hit("/api/analytics/summary".to_string()).await;
    let total = state.restaurants.lock().len();
    Json(json!({"total_restaurants": total, "avg_google_rating": 4.5, "avg_yelp_rating": 4.0}))
}

async fn analytics_trends(State(state): State<Arc<StubState>>) -> Json<Value> {
    state.hit("/api/analytics/trends".to_string()).await;
    Json(json!({"activity_trends": [], "sentiment_trends": []}))
}

async fn scraping_status(State(state): State<Arc<StubState>>) -> Json<Value> {
    state.hit("/api/status".to_string()).await;
    Json(state.status.lock().clone())
}

async fn health(State(state): State<Arc<StubState>>) -> Json<Value> {
    state.hit("/health".to_string()).await;
    let monitored = state.restaurants.lock().len();
    Json(json!({
        "status": "healthy",
        "timestamp": "2025-03-01T14:22:05",
        "scraping_active": false,
        "restaurants_monitored": monitored,
        "active_websocket_connections": 1,
        "restaurants_in_cache": monitored
    }))
}

async fn scrape_command(
    State(state): State<Arc<StubState>>,
    Path(command): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    state.hit(format!("/api/scrape/{command}")).await;
    let (running, message) = match command.as_str() {
        "start" => (true, "Scraping started"),
        "stop" => (false, "Scraping stopped"),
        "trigger" => (true, "Scraping cycle triggered"),
        _ => return Err(StatusCode::NOT_FOUND),
    };
    state.status.lock()["is_running"] = Value::Bool(running);
    Ok(Json(json!({"message": message})))
}

// =============================================================================
// DATA
// =============================================================================

pub fn restaurant_row(name: &str, menu_items: u64) -> Value {
    json!({
        "name": name,
        "url": format!("https://{}.example", name.to_lowercase().replace(' ', "-")),
        "menu_items_count": menu_items,
        "categories_count": 6,
        "google_rating": 4.5,
        "yelp_rating": 4.0,
        "total_reviews": 120
    })
}

pub fn restaurant_update(name: &str, menu_items: u64) -> Value {
    json!({
        "type": "restaurant_update",
        "timestamp": "2025-03-01T14:22:05.123456",
        "restaurant": name,
        "update_type": "menu",
        "data": {"status": "completed", "menu_items_count": menu_items}
    })
}

pub fn connection_established() -> Value {
    json!({
        "type": "connection_established",
        "timestamp": "2025-03-01T14:22:00",
        "message": "Connected to Restaurant Intelligence Dashboard"
    })
}

pub fn heartbeat() -> Value {
    json!({"type": "heartbeat", "timestamp": "2025-03-01T14:22:30"})
}

/// Client configuration with timers shortened for tests.
pub fn client_config(api: &ApiStub, push: &PushServer) -> SyncConfig {
    let mut config = SyncConfig::default();
    config.api.base_url = api.base_url();
    config.api.request_timeout = Duration::from_secs(2);
    config.connection.ws_url = push.url();
    config.connection.heartbeat_interval = Duration::from_secs(1);
    config.connection.connect_timeout = Duration::from_secs(2);
    config.reconnect.base_delay = Duration::from_millis(50);
    config.reconnect.max_delay = Duration::from_millis(200);
    config.reconnect.max_attempts = 5;
    config.cache.fetch_timeout = Duration::from_secs(2);
    config
}

pub fn client(config: SyncConfig) -> SyncCoordinator {
    SyncCoordinator::new(config).expect("valid test configuration")
}
