//! In-memory fakes of the outbound ports for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use pulse_types::{CommandAck, ResourceKey, ScrapeCommand};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{FetchError, TransportError};
use crate::ports::{DashboardApi, PushConnector, PushTransport, TransportEvent};

type Inbound = Result<TransportEvent, TransportError>;

/// Test-side end of an accepted fake connection.
#[derive(Clone)]
pub struct ServerEnd {
    tx: mpsc::UnboundedSender<Inbound>,
    probes: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl ServerEnd {
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.tx.send(Ok(TransportEvent::Text(text.into())));
    }

    pub fn send_json(&self, value: Value) {
        self.send_text(value.to_string());
    }

    pub fn close(&self) {
        let _ = self.tx.send(Ok(TransportEvent::Closed(Some("going away".into()))));
    }

    pub fn fail(&self, reason: &str) {
        let _ = self.tx.send(Err(TransportError::Protocol(reason.to_string())));
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakeTransport {
    rx: mpsc::UnboundedReceiver<Inbound>,
    tx: mpsc::UnboundedSender<Inbound>,
    probes: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
    answer_probes: bool,
}

#[async_trait]
impl PushTransport for FakeTransport {
    async fn next_event(&mut self) -> Option<Inbound> {
        self.rx.recv().await
    }

    async fn send_probe(&mut self) -> Result<(), TransportError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.answer_probes {
            let _ = self.tx.send(Ok(TransportEvent::Activity));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

enum Plan {
    Accept(FakeTransport),
    Refuse,
    Hang,
}

/// Connector whose outcomes are scripted per open. Unscripted opens fail.
#[derive(Clone, Default)]
pub struct FakeConnector {
    plans: Arc<Mutex<VecDeque<Plan>>>,
    opens: Arc<AtomicUsize>,
    urls: Arc<Mutex<Vec<String>>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script an accepted connection. Probes are answered with pongs when
    /// `answer_probes` is set.
    pub fn accept(&self, answer_probes: bool) -> ServerEnd {
        let (tx, rx) = mpsc::unbounded_channel();
        let server = ServerEnd {
            tx: tx.clone(),
            probes: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let transport = FakeTransport {
            rx,
            tx,
            probes: server.probes.clone(),
            closed: server.closed.clone(),
            answer_probes,
        };
        self.plans.lock().push_back(Plan::Accept(transport));
        server
    }

    pub fn refuse(&self) {
        self.plans.lock().push_back(Plan::Refuse);
    }

    /// Script an open that never completes.
    pub fn hang(&self) {
        self.plans.lock().push_back(Plan::Hang);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl PushConnector for FakeConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn PushTransport>, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(url.to_string());
        let plan = self.plans.lock().pop_front();
        match plan {
            Some(Plan::Accept(transport)) => Ok(Box::new(transport)),
            Some(Plan::Hang) => {
                std::future::pending::<()>().await;
                Err(TransportError::Closed)
            }
            Some(Plan::Refuse) | None => Err(TransportError::Connect("connection refused".into())),
        }
    }
}

/// Scripted dashboard API. Responses are served per key; unscripted keys
/// return a network error.
#[derive(Clone, Default)]
pub struct FakeApi {
    responses: Arc<Mutex<HashMap<ResourceKey, Result<Value, FetchError>>>>,
    calls: Arc<Mutex<Vec<ResourceKey>>>,
    commands: Arc<Mutex<Vec<ScrapeCommand>>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, key: ResourceKey, value: Value) {
        self.responses.lock().insert(key, Ok(value));
    }

    pub fn fail(&self, key: ResourceKey, error: FetchError) {
        self.responses.lock().insert(key, Err(error));
    }

    /// Delay every response by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self, key: &ResourceKey) -> usize {
        self.calls.lock().iter().filter(|call| *call == key).count()
    }

    pub fn commands(&self) -> Vec<ScrapeCommand> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl DashboardApi for FakeApi {
    async fn fetch(&self, key: &ResourceKey) -> Result<Value, FetchError> {
        self.calls.lock().push(key.clone());
        // Resolved at call time, before any delay.
        let response = self
            .responses
            .lock()
            .get(key)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::Network(format!("no response for {key}"))));
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        response
    }

    async fn execute(&self, command: ScrapeCommand) -> Result<CommandAck, FetchError> {
        self.commands.lock().push(command);
        Ok(CommandAck {
            message: format!("scrape {command} accepted"),
        })
    }
}
