//! # Connection Manager
//!
//! Lifecycle of the single push connection.
//!
//! ```text
//! Disconnected --connect()--> Connecting --open ok--> Connected
//!      ^                          |                       |
//!      |                      open failed         close / error / heartbeat timeout
//!      |                          v                       |
//!      +------ delay(attempt) -- Disconnected <-----------+
//!                                 |
//!                      attempt >= max_attempts
//!                                 v
//!                               Failed  (until reconnect())
//! ```
//!
//! One driver task per generation owns the transport. Every transition and
//! every emitted event happens under one lock after checking the driver's
//! generation, so `disconnect()` silences a running driver atomically.

use parking_lot::Mutex;
use pulse_telemetry::metrics::{CONNECTION_STATE, HEARTBEAT_TIMEOUTS, RECONNECT_ATTEMPTS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::domain::{ConnectionEvent, ConnectionState, ConnectionStatus, ReconnectPolicy};
use crate::error::{ConnectionError, TransportError};
use crate::ports::{PushConnector, PushTransport, TransportEvent};

/// Runtime-adjustable connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub url: String,
    pub heartbeat_interval: Duration,
    pub connect_timeout: Duration,
    pub policy: ReconnectPolicy,
}

impl ConnectionSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            url: config.connection.ws_url.clone(),
            heartbeat_interval: config.connection.heartbeat_interval,
            connect_timeout: config.connection.connect_timeout,
            policy: config.reconnect.policy(),
        }
    }
}

struct DriverHandle {
    shutdown: watch::Sender<bool>,
    _task: JoinHandle<()>,
}

struct State {
    status: ConnectionStatus,
    generation: u64,
    driver: Option<DriverHandle>,
    settings: ConnectionSettings,
}

struct Core {
    connector: Arc<dyn PushConnector>,
    state: Mutex<State>,
    status_tx: watch::Sender<ConnectionStatus>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

enum SessionEnd {
    /// Stopped by `disconnect()`/`reconnect()` or superseded.
    Shutdown,
    /// Lost the connection; the reason is reported as a transient error.
    Lost(String),
}

impl Core {
    /// Apply `update` to the status; publish and emit if anything changed.
    /// Must be called with the state lock held.
    fn transition(&self, state: &mut State, update: impl FnOnce(&mut ConnectionStatus)) {
        let before = state.status.clone();
        update(&mut state.status);
        if state.status == before {
            return;
        }

        if state.status.state != before.state {
            debug!(
                from = %before.state,
                to = %state.status.state,
                attempt = state.status.reconnect_attempt,
                epoch = state.status.epoch,
                "Connection state changed"
            );
        }
        CONNECTION_STATE.set(state.status.state.gauge_value());
        self.status_tx.send_replace(state.status.clone());
        self.emit(ConnectionEvent::StateChanged(state.status.clone()));
    }

    fn emit(&self, event: ConnectionEvent) {
        // Receiver gone means the owner is shutting down.
        let _ = self.events.send(event);
    }

    /// Run `f` only if `generation` is still the live driver.
    fn with_current<R>(&self, generation: u64, f: impl FnOnce(&mut State) -> R) -> Option<R> {
        let mut state = self.state.lock();
        if state.generation != generation {
            return None;
        }
        Some(f(&mut state))
    }

    /// Record inbound traffic without waking status watchers.
    fn touch(&self, state: &mut State) {
        let now = Instant::now();
        state.status.last_activity = Some(now);
        self.status_tx.send_if_modified(|status| {
            status.last_activity = Some(now);
            false
        });
    }
}

/// Owner of the push connection. Construct one per client.
pub struct ConnectionManager {
    core: Arc<Core>,
}

impl ConnectionManager {
    /// Create a manager and the receiver of its ordered event stream.
    pub fn new(
        connector: Arc<dyn PushConnector>,
        settings: ConnectionSettings,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(ConnectionStatus::default());

        let core = Arc::new(Core {
            connector,
            state: Mutex::new(State {
                status: ConnectionStatus::default(),
                generation: 0,
                driver: None,
                settings,
            }),
            status_tx,
            events: events_tx,
        });

        (Self { core }, events_rx)
    }

    /// Start connecting.
    ///
    /// No-op while connecting, connected, or waiting for a scheduled retry.
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// `ConnectionError::Exhausted` in the `Failed` state; use
    /// [`reconnect`](Self::reconnect) instead.
    pub fn connect(&self) -> Result<(), ConnectionError> {
        let mut state = self.core.state.lock();
        match state.status.state {
            ConnectionState::Connecting | ConnectionState::Connected => return Ok(()),
            ConnectionState::Failed => {
                return Err(ConnectionError::Exhausted {
                    attempts: state.status.reconnect_attempt,
                })
            }
            ConnectionState::Disconnected => {}
        }
        if state.driver.is_some() {
            debug!("Reconnect already scheduled");
            return Ok(());
        }

        info!(url = %state.settings.url, "Connecting push channel");
        self.core.transition(&mut state, |status| {
            status.reconnect_attempt = 0;
            status.manually_closed = false;
        });
        spawn_driver(&self.core, &mut state);
        Ok(())
    }

    /// Close the connection and cancel any pending retry. Synchronous: no
    /// event from the previous driver is emitted after this returns.
    ///
    /// The state becomes `Disconnected`, except in `Failed`, which is kept
    /// (with `manually_closed` set) until `reconnect()`.
    pub fn disconnect(&self) {
        let mut state = self.core.state.lock();
        state.generation += 1;
        if let Some(driver) = state.driver.take() {
            let _ = driver.shutdown.send(true);
        }

        let failed = state.status.state == ConnectionState::Failed;
        self.core.transition(&mut state, |status| {
            if !failed {
                status.state = ConnectionState::Disconnected;
            }
            status.manually_closed = true;
            status.last_activity = None;
        });
        info!("Push channel disconnected");
    }

    /// Tear down the current connection, reset the retry counter and connect
    /// again. The only way out of `Failed`.
    pub fn reconnect(&self) {
        let mut state = self.core.state.lock();
        if let Some(driver) = state.driver.take() {
            let _ = driver.shutdown.send(true);
        }

        info!(url = %state.settings.url, "Manual reconnect");
        self.core.transition(&mut state, |status| {
            status.reconnect_attempt = 0;
            status.manually_closed = false;
            status.last_activity = None;
        });
        spawn_driver(&self.core, &mut state);
    }

    pub fn status(&self) -> ConnectionStatus {
        self.core.state.lock().status.clone()
    }

    /// Watch channel following every status transition.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.core.status_tx.subscribe()
    }

    pub fn settings(&self) -> ConnectionSettings {
        self.core.state.lock().settings.clone()
    }

    /// Replace the settings. The URL and heartbeat apply to the next
    /// connection; the policy applies to the next retry decision.
    pub fn update_settings(&self, settings: ConnectionSettings) {
        self.core.state.lock().settings = settings;
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let mut state = self.core.state.lock();
        state.generation += 1;
        if let Some(driver) = state.driver.take() {
            let _ = driver.shutdown.send(true);
        }
    }
}

/// Start a new driver generation in `Connecting`.
fn spawn_driver(core: &Arc<Core>, state: &mut State) {
    state.generation += 1;
    let generation = state.generation;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    core.transition(state, |status| status.state = ConnectionState::Connecting);

    let task = tokio::spawn(run_driver(core.clone(), generation, shutdown_rx));
    state.driver = Some(DriverHandle {
        shutdown: shutdown_tx,
        _task: task,
    });
}

/// Connection loop with reconnection logic.
async fn run_driver(core: Arc<Core>, generation: u64, mut shutdown: watch::Receiver<bool>) {
    loop {
        let Some((url, connect_timeout)) = core.with_current(generation, |state| {
            (state.settings.url.clone(), state.settings.connect_timeout)
        }) else {
            return;
        };

        let opened = tokio::select! {
            _ = shutdown.changed() => return,
            result = tokio::time::timeout(connect_timeout, core.connector.open(&url)) => {
                result.unwrap_or_else(|_| {
                    Err(TransportError::Connect(format!("timed out after {connect_timeout:?}")))
                })
            }
        };

        let failure = match opened {
            Ok(mut transport) => {
                let connected = core.with_current(generation, |state| {
                    core.transition(state, |status| {
                        status.state = ConnectionState::Connected;
                        status.reconnect_attempt = 0;
                        status.epoch += 1;
                        status.last_activity = Some(Instant::now());
                    });
                    (state.status.epoch, state.settings.heartbeat_interval)
                });
                let Some((epoch, heartbeat)) = connected else {
                    let _ = transport.close().await;
                    return;
                };
                info!(epoch, url = %url, "Push channel connected");

                match run_session(&core, generation, epoch, heartbeat, transport, &mut shutdown).await
                {
                    SessionEnd::Shutdown => return,
                    SessionEnd::Lost(reason) => reason,
                }
            }
            Err(err) => err.to_string(),
        };

        let retry = core.with_current(generation, |state| {
            warn!(error = %failure, attempt = state.status.reconnect_attempt, "Push channel unavailable");
            core.emit(ConnectionEvent::TransientError(failure));
            core.transition(state, |status| {
                status.state = ConnectionState::Disconnected;
                status.last_activity = None;
            });

            let attempt = state.status.reconnect_attempt;
            let policy = state.settings.policy;
            if policy.allows_retry(attempt) {
                return Some((attempt, policy.delay(attempt)));
            }

            error!(attempts = attempt, "Reconnection failed, giving up");
            core.transition(state, |status| status.state = ConnectionState::Failed);
            core.emit(ConnectionEvent::Exhausted { attempts: attempt });
            state.driver = None;
            None
        });
        let Some(Some((attempt, delay))) = retry else {
            return;
        };

        RECONNECT_ATTEMPTS.inc();
        info!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");

        tokio::select! {
            _ = shutdown.changed() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        let resumed = core.with_current(generation, |state| {
            core.transition(state, |status| {
                status.state = ConnectionState::Connecting;
                status.reconnect_attempt += 1;
            });
        });
        if resumed.is_none() {
            return;
        }
    }
}

/// Pump one open transport until it is lost or shut down.
async fn run_session(
    core: &Core,
    generation: u64,
    epoch: u64,
    heartbeat: Duration,
    mut transport: Box<dyn PushTransport>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_activity = Instant::now();
    // A probe left unanswered for a whole interval means the peer is gone.
    let mut probe_sent: Option<Instant> = None;

    let end = loop {
        tokio::select! {
            _ = shutdown.changed() => break SessionEnd::Shutdown,

            _ = ticker.tick() => {
                if probe_sent.is_some_and(|sent| last_activity < sent) {
                    HEARTBEAT_TIMEOUTS.inc();
                    break SessionEnd::Lost(format!(
                        "no traffic for {}ms, heartbeat timeout",
                        last_activity.elapsed().as_millis()
                    ));
                }
                if let Err(err) = transport.send_probe().await {
                    break SessionEnd::Lost(err.to_string());
                }
                probe_sent = Some(Instant::now());
                debug!(epoch, "Heartbeat probe sent");
            }

            event = transport.next_event() => match event {
                Some(Ok(TransportEvent::Text(text))) => {
                    last_activity = Instant::now();
                    let forwarded = core.with_current(generation, |state| {
                        core.touch(state);
                        core.emit(ConnectionEvent::Frame { epoch, text });
                    });
                    if forwarded.is_none() {
                        break SessionEnd::Shutdown;
                    }
                }
                Some(Ok(TransportEvent::Activity)) => {
                    last_activity = Instant::now();
                    if core.with_current(generation, |state| core.touch(state)).is_none() {
                        break SessionEnd::Shutdown;
                    }
                }
                Some(Ok(TransportEvent::Closed(reason))) => {
                    break SessionEnd::Lost(format!(
                        "closed by remote: {}",
                        reason.as_deref().unwrap_or("no reason")
                    ));
                }
                Some(Err(err)) => break SessionEnd::Lost(err.to_string()),
                None => break SessionEnd::Lost(TransportError::Closed.to_string()),
            },
        }
    };

    if let Err(err) = transport.close().await {
        debug!(epoch, error = %err, "Error closing transport");
    }
    end
}
