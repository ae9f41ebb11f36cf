//! Connection supervisor: owns the single shared connection
//!
//! One supervisor per process, passed by reference (or cheap clone) to every
//! collaborator. All state transitions happen under one mutex that is never
//! held across an `.await`; readers get snapshots through a `watch` channel.
//! Observers receive transitions in commit order, outside that mutex.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::driver::{Connector, DriverError};
use super::state::{ConnectionState, LoggingObserver, ObserverId, ObserverList, StateObserver};
use crate::common::{DatabaseError, DatabaseResult, RetryExhausted, retry_with_backoff};
use crate::mongodb::{ConnectionConfig, MongoConnector};

/// Final outcome of one connect sequence, shared by every joined caller
#[derive(Debug, Clone)]
struct ConnectFailure {
    attempts: u32,
    error: DriverError,
}

type ConnectOutcome<H> = Result<H, ConnectFailure>;
type InFlight<H> = Shared<BoxFuture<'static, ConnectOutcome<H>>>;

impl From<ConnectFailure> for DatabaseError {
    fn from(failure: ConnectFailure) -> Self {
        DatabaseError::ConnectionFailed {
            attempts: failure.attempts,
            source: failure.error,
        }
    }
}

struct Guarded<H> {
    state: ConnectionState,
    handle: Option<H>,
    config: Option<Arc<ConnectionConfig>>,
    in_flight: Option<InFlight<H>>,
    observers: ObserverList,
    observers_installed: bool,
    shutdown_handlers_installed: bool,
    /// Committed transitions not yet handed to observers
    pending: VecDeque<Transition>,
}

struct Inner<C: Connector> {
    connector: C,
    guarded: Mutex<Guarded<C::Handle>>,
    /// Held by the one caller currently delivering `pending`
    delivery: Mutex<()>,
    state_tx: watch::Sender<ConnectionState>,
    dial_attempts: AtomicU32,
}

/// A committed transition with the observers registered at commit time
struct Transition {
    from: ConnectionState,
    to: ConnectionState,
    observers: Vec<Arc<dyn StateObserver>>,
}

impl Transition {
    fn notify(self) {
        for observer in &self.observers {
            observer.on_transition(self.from, self.to);
        }
    }
}

impl<C: Connector> Inner<C> {
    fn lock(&self) -> MutexGuard<'_, Guarded<C::Handle>> {
        self.guarded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Commit `to` and queue it for observers; follow with `notify_observers`
    /// once the lock is released
    fn transition(&self, guarded: &mut Guarded<C::Handle>, to: ConnectionState) {
        let from = guarded.state;
        debug_assert!(
            from.can_transition_to(to),
            "illegal connection state transition {from} -> {to}"
        );
        guarded.state = to;
        self.state_tx.send_replace(to);
        let observers = guarded.observers.snapshot();
        guarded.pending.push_back(Transition {
            from,
            to,
            observers,
        });
    }

    /// Deliver queued transitions in commit order
    ///
    /// Only one caller delivers at a time; a caller that finds delivery busy
    /// leaves its transitions to the current deliverer, which drains the queue
    /// before it returns. Must not be called with the state lock held.
    fn notify_observers(&self) {
        loop {
            let delivering = match self.delivery.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return,
            };

            loop {
                let next = self.lock().pending.pop_front();
                let Some(transition) = next else { break };
                transition.notify();
            }
            drop(delivering);

            // A transition queued while we were releasing `delivery` has no
            // other deliverer.
            if self.lock().pending.is_empty() {
                return;
            }
        }
    }

    async fn run_sequence(
        self: Arc<Self>,
        config: Arc<ConnectionConfig>,
    ) -> ConnectOutcome<C::Handle> {
        let policy = config.retry;
        let inner: &Self = &self;
        let config_ref: &ConnectionConfig = &config;
        let result = retry_with_backoff(
            move |attempt| {
                async move {
                    inner.dial_attempts.fetch_add(1, Ordering::SeqCst);
                    debug!(attempt, max_attempts = policy.max_attempts, "Dialing MongoDB");
                    inner.connector.connect(config_ref).await
                }
            },
            policy,
            |failure| {
                warn!(
                    attempt = failure.attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = failure.delay.as_millis() as u64,
                    error = %failure.last_error,
                    "MongoDB connect attempt failed, backing off"
                );
            },
        )
        .await;

        self.complete(result)
    }

    fn complete(
        &self,
        result: Result<C::Handle, RetryExhausted<DriverError>>,
    ) -> ConnectOutcome<C::Handle> {
        let outcome = {
            let mut guarded = self.lock();
            guarded.in_flight = None;
            match result {
                Ok(handle) => {
                    guarded.handle = Some(handle.clone());
                    self.transition(&mut guarded, ConnectionState::Connected);
                    Ok(handle)
                }
                Err(exhausted) => {
                    self.transition(&mut guarded, ConnectionState::Disconnected);
                    Err(ConnectFailure {
                        attempts: exhausted.attempts,
                        error: exhausted.last_error,
                    })
                }
            }
        };
        self.notify_observers();
        outcome
    }
}

enum ConnectStep<H> {
    Join(InFlight<H>),
    AwaitTeardown(watch::Receiver<ConnectionState>),
}

enum DisconnectStep<H> {
    Join(InFlight<H>),
    Close(H),
}

/// Owns the connection state and the shared handle
///
/// # Example
/// ```ignore
/// use database::{ConnectionSupervisor, mongodb::ConnectionConfig};
/// use core_config::FromEnv;
///
/// let supervisor = ConnectionSupervisor::default();
/// let handle = supervisor.connect(&ConnectionConfig::from_env()?).await?;
/// ```
pub struct ConnectionSupervisor<C: Connector = MongoConnector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for ConnectionSupervisor<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for ConnectionSupervisor<MongoConnector> {
    fn default() -> Self {
        Self::new(MongoConnector::new())
    }
}

impl<C: Connector> ConnectionSupervisor<C> {
    pub fn new(connector: C) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                connector,
                guarded: Mutex::new(Guarded {
                    state: ConnectionState::Disconnected,
                    handle: None,
                    config: None,
                    in_flight: None,
                    observers: ObserverList::default(),
                    observers_installed: false,
                    shutdown_handlers_installed: false,
                    pending: VecDeque::new(),
                }),
                delivery: Mutex::new(()),
                state_tx,
                dial_attempts: AtomicU32::new(0),
            }),
        }
    }

    /// Connect, or join the connect sequence already in flight
    ///
    /// Returns the existing handle when already connected. Otherwise runs (or
    /// joins) a single retry sequence; every concurrent caller receives the
    /// same handle or the same final error. The sequence runs on its own task,
    /// so dropping this future does not cancel it.
    #[instrument(skip(self, config), fields(host = %config.display_host(), db = %config.database))]
    pub async fn connect(&self, config: &ConnectionConfig) -> DatabaseResult<C::Handle> {
        config.validate()?;

        loop {
            let step = {
                let mut guarded = self.inner.lock();
                let state = guarded.state;
                match state {
                    ConnectionState::Connected => {
                        if let Some(handle) = &guarded.handle {
                            debug!("Already connected, reusing handle");
                            return Ok(handle.clone());
                        }
                        return Err(DatabaseError::NotConnected);
                    }
                    ConnectionState::Connecting => match &guarded.in_flight {
                        Some(in_flight) => ConnectStep::Join(in_flight.clone()),
                        None => ConnectStep::AwaitTeardown(self.inner.state_tx.subscribe()),
                    },
                    ConnectionState::Disconnecting => {
                        ConnectStep::AwaitTeardown(self.inner.state_tx.subscribe())
                    }
                    ConnectionState::Disconnected => {
                        let in_flight = self.begin_sequence(&mut guarded, config);
                        drop(guarded);
                        self.inner.notify_observers();
                        ConnectStep::Join(in_flight)
                    }
                }
            };

            match step {
                ConnectStep::Join(in_flight) => return in_flight.await.map_err(Into::into),
                ConnectStep::AwaitTeardown(mut rx) => {
                    debug!("Waiting for the previous connection to finish closing");
                    let _ = rx
                        .wait_for(|state| *state == ConnectionState::Disconnected)
                        .await;
                }
            }
        }
    }

    /// Starts a sequence; caller holds the lock and state is `Disconnected`
    fn begin_sequence(
        &self,
        guarded: &mut Guarded<C::Handle>,
        config: &ConnectionConfig,
    ) -> InFlight<C::Handle> {
        let config = Arc::new(config.clone());

        if !guarded.observers_installed {
            guarded.observers.add(Arc::new(LoggingObserver {
                target: config.display_host(),
            }));
            guarded.observers_installed = true;
        }

        guarded.config = Some(Arc::clone(&config));
        self.inner.transition(guarded, ConnectionState::Connecting);

        let task = tokio::spawn(Arc::clone(&self.inner).run_sequence(config));
        let inner = Arc::clone(&self.inner);
        let in_flight = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(join_error) => inner.complete(Err(RetryExhausted {
                    attempts: inner.dial_attempts.load(Ordering::SeqCst),
                    last_error: DriverError::new(format!("connect task failed: {join_error}")),
                })),
            }
        }
        .boxed()
        .shared();

        guarded.in_flight = Some(in_flight.clone());
        in_flight
    }

    /// Close the connection
    ///
    /// `connected` goes through `disconnecting` to `disconnected`; a sequence
    /// in flight is awaited first. A no-op when already disconnected or
    /// disconnecting. The state ends at `disconnected` even when closing fails.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) -> DatabaseResult<()> {
        loop {
            let step = {
                let mut guarded = self.inner.lock();
                let state = guarded.state;
                match state {
                    ConnectionState::Disconnected | ConnectionState::Disconnecting => {
                        debug!(%state, "Nothing to disconnect");
                        return Ok(());
                    }
                    ConnectionState::Connecting => match &guarded.in_flight {
                        Some(in_flight) => DisconnectStep::Join(in_flight.clone()),
                        None => return Ok(()),
                    },
                    ConnectionState::Connected => match guarded.handle.take() {
                        Some(handle) => {
                            self.inner.transition(&mut guarded, ConnectionState::Disconnecting);
                            DisconnectStep::Close(handle)
                        }
                        None => return Err(DatabaseError::NotConnected),
                    },
                }
            };

            match step {
                DisconnectStep::Join(in_flight) => {
                    debug!("Connect sequence in flight, waiting for its outcome");
                    let _ = in_flight.await;
                }
                DisconnectStep::Close(handle) => {
                    self.inner.notify_observers();
                    let result = self.inner.connector.disconnect(handle).await;

                    {
                        let mut guarded = self.inner.lock();
                        self.inner.transition(&mut guarded, ConnectionState::Disconnected);
                    }
                    self.inner.notify_observers();

                    return match result {
                        Ok(()) => {
                            info!("MongoDB connection closed");
                            Ok(())
                        }
                        Err(e) => Err(DatabaseError::Disconnect(e)),
                    };
                }
            }
        }
    }

    /// Current state snapshot
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Receiver notified on every state change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Current handle, if connected
    pub fn handle(&self) -> Option<C::Handle> {
        let guarded = self.inner.lock();
        match guarded.state {
            ConnectionState::Connected => guarded.handle.clone(),
            _ => None,
        }
    }

    /// Config of the most recent connect sequence
    pub fn config(&self) -> Option<Arc<ConnectionConfig>> {
        self.inner.lock().config.clone()
    }

    pub fn connector(&self) -> &C {
        &self.inner.connector
    }

    /// Physical dial attempts made over the supervisor's lifetime
    pub fn dial_attempts(&self) -> u32 {
        self.inner.dial_attempts.load(Ordering::SeqCst)
    }

    /// Register an observer for every future state transition
    pub fn subscribe(&self, observer: Arc<dyn StateObserver>) -> ObserverId {
        self.inner.lock().observers.add(observer)
    }

    /// Remove an observer; returns whether it was registered
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.inner.lock().observers.remove(id)
    }

    /// Claim the one signal-handler registration this connection gets
    ///
    /// `true` for the first caller only, whichever coordinator it comes from.
    pub(crate) fn claim_shutdown_handlers(&self) -> bool {
        let mut guarded = self.inner.lock();
        !std::mem::replace(&mut guarded.shutdown_handlers_installed, true)
    }

    #[cfg(test)]
    pub(crate) fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }
}
