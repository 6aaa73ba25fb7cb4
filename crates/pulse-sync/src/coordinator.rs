//! # Sync Coordinator
//!
//! Merges live push deltas and cached pull snapshots into one
//! [`DashboardSnapshot`] and notifies subscribers of every applied change.
//!
//! ## Reconciliation
//!
//! - A domain push patches the projection immediately and invalidates the
//!   cache entries it supersedes, so the next read revalidates.
//! - A pull carries the projection revision current when its fetch was
//!   issued and never overwrites a field written by a later push.
//! - Every mutation and its notifications run under one reconcile lock, so
//!   subscribers observe changes in processing order.
//!
//! ```text
//! ConnectionManager --events--> event loop --raw frame--> MessageRouter
//!                                   |                          |
//!                                   |  apply + invalidate      | dispatch
//!                                   v                          v
//!   CacheStore <--load/refresh-- DashboardSnapshot      message subscribers
//!                                   |
//!                                   v
//!                             change subscribers
//! ```

use futures::future::{join_all, BoxFuture, FutureExt};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use pulse_types::{CommandAck, ResourceKey, ScrapeCommand};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapters::{HttpDashboardApi, WebSocketConnector};
use crate::cache::{CacheStatsSnapshot, CacheStore};
use crate::config::SyncConfig;
use crate::connection::{ConnectionManager, ConnectionSettings};
use crate::domain::{
    superseded_resources, ConnectionEvent, ConnectionStatus, DashboardSnapshot, EventFilter,
    InboundMessage, Revision, SyncChange,
};
use crate::error::{ConfigError, ConnectionError, FetchError, SyncResult};
use crate::ports::{DashboardApi, PushConnector};
use crate::router::{MessageRouter, RouterStats};
use crate::subscribers::{SubscriberSet, SubscriptionHandle};

/// Callback invoked with each applied change and the snapshot it produced.
pub type ChangeCallback = Arc<dyn Fn(&SyncChange, &DashboardSnapshot) + Send + Sync>;

/// Pulled body plus the projection revision at fetch issue.
#[derive(Debug, Clone, PartialEq)]
struct PulledValue {
    value: Value,
    issued_at: Revision,
}

/// Outcome of [`SyncCoordinator::refresh`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub loaded: Vec<ResourceKey>,
    pub failed: Vec<(ResourceKey, FetchError)>,
}

impl RefreshReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

struct Inner {
    api: Arc<dyn DashboardApi>,
    connection: ConnectionManager,
    router: MessageRouter,
    cache: CacheStore<ResourceKey, PulledValue>,
    snapshot: RwLock<Arc<DashboardSnapshot>>,
    /// Reentrant: subscribers may call back into the coordinator.
    reconcile: ReentrantMutex<()>,
    subscribers: SubscriberSet<ChangeCallback>,
    config: RwLock<SyncConfig>,
    tracked: Mutex<BTreeSet<ResourceKey>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<ConnectionEvent>>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Inner {
    /// Mutate the projection and notify subscribers if `update` reports a
    /// change.
    fn apply<F>(&self, update: F)
    where
        F: FnOnce(&mut DashboardSnapshot) -> Option<SyncChange>,
    {
        let _reconcile = self.reconcile.lock();
        let applied = {
            let mut current = self.snapshot.write();
            let change = update(Arc::make_mut(&mut current));
            change.map(|change| (change, Arc::clone(&current)))
        };

        if let Some((change, snapshot)) = applied {
            debug!(version = snapshot.version, change = ?change, "Applied change");
            self.subscribers.deliver(|callback| {
                callback(&change, &snapshot);
                true
            });
        }
    }

    fn handle_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::StateChanged(status) => {
                self.apply(|snapshot| snapshot.apply_connection(&status));
            }
            ConnectionEvent::Frame { epoch, text } => self.handle_frame(&text, epoch),
            ConnectionEvent::TransientError(reason) => {
                debug!(reason = %reason, "Transient connection error");
            }
            ConnectionEvent::Exhausted { attempts } => {
                self.apply(|snapshot| Some(snapshot.apply_exhausted(attempts)));
            }
        }
    }

    fn handle_frame(&self, text: &str, epoch: u64) {
        let message = match self.router.ingest(text, epoch) {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(_) => {
                self.apply(|snapshot| {
                    snapshot.record_malformed();
                    None
                });
                return;
            }
        };

        {
            let _reconcile = self.reconcile.lock();
            for key in superseded_resources(&message.frame) {
                self.cache.invalidate(&key);
            }
            self.apply(|snapshot| snapshot.apply_push(&message));
        }

        self.router.dispatch(&message);
    }

    fn merge_pull(&self, key: &ResourceKey, pulled: &PulledValue) {
        self.apply(|snapshot| snapshot.apply_pull(key, &pulled.value, pulled.issued_at));
    }

    fn ttl_for(&self, key: &ResourceKey) -> Duration {
        self.config.read().cache.ttl.for_kind(key.kind())
    }
}

/// Build the fetch for `key`. The issue revision is reserved when the cache
/// starts the fetch, not when the caller asked, so joiners and cache hits
/// share the original ordering.
fn fetcher(
    inner: &Arc<Inner>,
    key: &ResourceKey,
) -> impl FnOnce() -> BoxFuture<'static, Result<PulledValue, FetchError>> {
    let api = inner.api.clone();
    let inner = Arc::clone(inner);
    let key = key.clone();
    move || {
        let issued_at = {
            let mut snapshot = inner.snapshot.write();
            Arc::make_mut(&mut snapshot).issue_pull()
        };
        async move {
            let value = api.fetch(&key).await?;
            Ok(PulledValue { value, issued_at })
        }
        .boxed()
    }
}

async fn run_event_loop(inner: Arc<Inner>, mut events: mpsc::UnboundedReceiver<ConnectionEvent>) {
    while let Some(event) = events.recv().await {
        inner.handle_event(event);
    }
    debug!("Connection event stream ended");
}

/// Real-time sync client for the dashboard.
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    /// Build a coordinator talking to the configured HTTP and WebSocket
    /// endpoints.
    ///
    /// # Errors
    ///
    /// `SyncError::Config` if the configuration is invalid.
    pub fn new(config: SyncConfig) -> SyncResult<Self> {
        config.validate()?;
        let api = HttpDashboardApi::new(&config.api)?;
        Ok(Self::with_ports(
            config,
            Arc::new(api),
            Arc::new(WebSocketConnector::new()),
        ))
    }

    /// Build a coordinator over explicit port implementations.
    pub fn with_ports(
        config: SyncConfig,
        api: Arc<dyn DashboardApi>,
        connector: Arc<dyn PushConnector>,
    ) -> Self {
        let (connection, events) =
            ConnectionManager::new(connector, ConnectionSettings::from_config(&config));
        let cache = CacheStore::new(config.cache.fetch_timeout, config.cache.max_entries);
        let router = MessageRouter::new(config.events.log_capacity);

        Self {
            inner: Arc::new(Inner {
                api,
                connection,
                router,
                cache,
                snapshot: RwLock::new(Arc::new(DashboardSnapshot::default())),
                reconcile: ReentrantMutex::new(()),
                subscribers: SubscriberSet::new("state"),
                config: RwLock::new(config),
                tracked: Mutex::new(BTreeSet::from([ResourceKey::Restaurants, ResourceKey::Status])),
                events: Mutex::new(Some(events)),
                event_loop: Mutex::new(None),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Spawn the event loop (first call only) and connect.
    ///
    /// # Errors
    ///
    /// `ConnectionError::NotRunning` after [`shutdown`](Self::shutdown);
    /// `ConnectionError::Exhausted` while the connection is `Failed`.
    pub fn start(&self) -> SyncResult<()> {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return Err(ConnectionError::NotRunning.into());
        }

        if let Some(events) = self.inner.events.lock().take() {
            let task = tokio::spawn(run_event_loop(self.inner.clone(), events));
            *self.inner.event_loop.lock() = Some(task);
            info!("Sync coordinator started");
        }

        self.inner.connection.connect()?;
        Ok(())
    }

    /// Subscribe to applied changes. Each change reaches every subscriber
    /// registered at the time exactly once, in processing order.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&SyncChange, &DashboardSnapshot) + Send + Sync + 'static,
    {
        self.inner.subscribers.insert(Arc::new(callback))
    }

    /// Subscribe to raw validated push messages.
    pub fn subscribe_messages<F>(&self, filter: EventFilter, callback: F) -> SubscriptionHandle
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.inner.router.subscribe(filter, callback)
    }

    /// Best-known state. Never waits on the network.
    pub fn snapshot(&self) -> Arc<DashboardSnapshot> {
        self.inner.snapshot.read().clone()
    }

    /// Cached read of `key`, merged into the snapshot. The key is tracked for
    /// [`refresh`](Self::refresh) from now on.
    pub async fn load(&self, key: ResourceKey) -> Result<Value, FetchError> {
        self.inner.tracked.lock().insert(key.clone());
        let ttl = self.inner.ttl_for(&key);
        let pulled = self
            .inner
            .cache
            .get(key.clone(), ttl, fetcher(&self.inner, &key))
            .await?;
        self.inner.merge_pull(&key, &pulled);
        Ok(pulled.value)
    }

    /// Network read of `key` regardless of freshness.
    pub async fn reload(&self, key: ResourceKey) -> Result<Value, FetchError> {
        self.inner.tracked.lock().insert(key.clone());
        let ttl = self.inner.ttl_for(&key);
        let pulled = self
            .inner
            .cache
            .bypass(key.clone(), ttl, fetcher(&self.inner, &key))
            .await?;
        self.inner.merge_pull(&key, &pulled);
        Ok(pulled.value)
    }

    /// Reload every tracked resource concurrently.
    pub async fn refresh(&self) -> RefreshReport {
        let keys = self.tracked_resources();
        let results = join_all(keys.into_iter().map(|key| async move {
            let result = self.reload(key.clone()).await;
            (key, result)
        }))
        .await;

        let mut report = RefreshReport::default();
        for (key, result) in results {
            match result {
                Ok(_) => report.loaded.push(key),
                Err(err) => {
                    warn!(key = %key, error = %err, "Refresh failed");
                    report.failed.push((key, err));
                }
            }
        }
        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "Refresh complete"
        );
        report
    }

    /// Issue a scrape command. The scraping status is revalidated on the next
    /// read.
    pub async fn execute(&self, command: ScrapeCommand) -> Result<CommandAck, FetchError> {
        let ack = self.inner.api.execute(command).await?;
        self.inner.cache.invalidate(&ResourceKey::Status);
        info!(command = %command, message = %ack.message, "Scrape command accepted");
        Ok(ack)
    }

    /// Drop the cached entry for `key`.
    pub fn invalidate(&self, key: &ResourceKey) -> bool {
        self.inner.cache.invalidate(key)
    }

    pub fn tracked_resources(&self) -> Vec<ResourceKey> {
        self.inner.tracked.lock().iter().cloned().collect()
    }

    pub fn disconnect(&self) {
        self.inner.connection.disconnect();
    }

    pub fn reconnect(&self) {
        self.inner.connection.reconnect();
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.inner.connection.status()
    }

    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.connection.subscribe_status()
    }

    pub fn recent_events(&self) -> Vec<Arc<InboundMessage>> {
        self.inner.router.recent_events()
    }

    pub fn router_stats(&self) -> RouterStats {
        self.inner.router.stats()
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.inner.cache.stats()
    }

    pub fn config(&self) -> SyncConfig {
        self.inner.config.read().clone()
    }

    /// Apply a new configuration at runtime.
    ///
    /// Heartbeat, reconnect policy, TTLs, fetch timeout, cache bound and log
    /// capacity apply immediately; URLs on the next (re)connect or request.
    ///
    /// # Errors
    ///
    /// The validation error; nothing is applied.
    pub fn reconfigure(&self, config: SyncConfig) -> Result<(), ConfigError> {
        config.validate()?;

        self.inner
            .connection
            .update_settings(ConnectionSettings::from_config(&config));
        self.inner.cache.set_fetch_timeout(config.cache.fetch_timeout);
        self.inner.cache.set_max_entries(config.cache.max_entries);
        self.inner.router.set_log_capacity(config.events.log_capacity);
        *self.inner.config.write() = config;
        info!("Configuration updated");
        Ok(())
    }

    /// Disconnect and stop the event loop. The coordinator cannot be
    /// restarted.
    pub fn shutdown(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.connection.disconnect();
        if let Some(task) = self.inner.event_loop.lock().take() {
            task.abort();
        }
        let status = self.inner.connection.status();
        self.inner.apply(|snapshot| snapshot.apply_connection(&status));
        info!("Sync coordinator stopped");
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        if let Some(task) = self.inner.event_loop.lock().take() {
            task.abort();
        }
    }
}
