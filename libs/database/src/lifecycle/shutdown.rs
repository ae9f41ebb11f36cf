use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use super::driver::Connector;
use super::supervisor::ConnectionSupervisor;

/// Termination signals the coordinator can listen for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(ascii_case_insensitive)]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl+C
    #[strum(to_string = "interrupt", serialize = "sigint")]
    Interrupt,
    /// SIGTERM
    #[strum(to_string = "terminate", serialize = "sigterm")]
    Terminate,
}

/// What happened while handling one shutdown signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownOutcome {
    pub signal: ShutdownSignal,
    /// 0 when the connection closed cleanly, 1 otherwise
    pub exit_code: i32,
    pub error: Option<String>,
}

type ExitHook = Arc<dyn Fn(i32) + Send + Sync>;

fn exit_process(code: i32) {
    std::process::exit(code)
}

/// Closes the shared connection when the process is asked to stop
///
/// This handles:
/// - Signal reception (SIGTERM, SIGINT), installed once per process
/// - Broadcasting shutdown to subscribers (e.g. the HTTP server)
/// - Disconnecting the supervisor and reporting the outcome
/// - Exiting through an injectable hook
pub struct ShutdownCoordinator<C: Connector> {
    supervisor: ConnectionSupervisor<C>,
    /// Broadcast channel to notify all tasks of shutdown
    tx: broadcast::Sender<()>,
    /// Flag indicating if shutdown has been initiated
    shutdown_initiated: Arc<AtomicBool>,
    exit: ExitHook,
}

impl<C: Connector> Clone for ShutdownCoordinator<C> {
    fn clone(&self) -> Self {
        Self {
            supervisor: self.supervisor.clone(),
            tx: self.tx.clone(),
            shutdown_initiated: Arc::clone(&self.shutdown_initiated),
            exit: Arc::clone(&self.exit),
        }
    }
}

impl<C: Connector> ShutdownCoordinator<C> {
    /// Coordinator that exits the process once the connection is closed
    pub fn new(supervisor: &ConnectionSupervisor<C>) -> Self {
        Self::with_exit_hook(supervisor, exit_process)
    }

    /// Coordinator with a custom exit action, called with the exit code
    pub fn with_exit_hook(
        supervisor: &ConnectionSupervisor<C>,
        exit: impl Fn(i32) + Send + Sync + 'static,
    ) -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            supervisor: supervisor.clone(),
            tx,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
            exit: Arc::new(exit),
        }
    }

    /// Subscribe to shutdown notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Check if shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Completes once shutdown begins; for `axum::serve(..).with_graceful_shutdown`
    pub async fn shutdown_requested(&self) {
        let mut rx = self.tx.subscribe();
        if self.is_shutting_down() {
            return;
        }
        let _ = rx.recv().await;
    }

    /// Spawn the signal listener
    ///
    /// The registration is claimed on the supervisor under its state lock, so
    /// only the first call from any coordinator sharing the connection installs
    /// anything; later calls return `false`. Must be called inside a Tokio
    /// runtime.
    pub fn install(&self, signals: &[ShutdownSignal]) -> bool {
        if !self.supervisor.claim_shutdown_handlers() {
            warn!("Shutdown handlers already installed, ignoring");
            return false;
        }

        let coordinator = self.clone();
        let listening = signals.to_vec();
        tokio::spawn(async move {
            let signal = wait_for_signal(&listening).await;
            coordinator.shutdown_and_exit(signal).await;
        });

        info!(?signals, "Shutdown handlers installed");
        true
    }

    /// Run the shutdown sequence for `signal` without exiting
    ///
    /// Disconnect errors are logged and reported in the outcome, never raised.
    pub async fn handle_signal(&self, signal: ShutdownSignal) -> ShutdownOutcome {
        info!(%signal, "Received {signal} signal, closing MongoDB connection");
        self.initiate();

        match self.supervisor.disconnect().await {
            Ok(()) => {
                info!("MongoDB connection closed through app termination");
                ShutdownOutcome {
                    signal,
                    exit_code: 0,
                    error: None,
                }
            }
            Err(e) => {
                error!(error = %e, "Error during MongoDB disconnection");
                ShutdownOutcome {
                    signal,
                    exit_code: 1,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn shutdown_and_exit(&self, signal: ShutdownSignal) {
        let outcome = self.handle_signal(signal).await;
        (self.exit)(outcome.exit_code);
    }

    fn initiate(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Initiating graceful shutdown");
            let _ = self.tx.send(());
        }
    }
}

/// Wait for the first of `signals`
///
/// A handler that fails to install is logged and never fires.
async fn wait_for_signal(signals: &[ShutdownSignal]) -> ShutdownSignal {
    let listen_interrupt = signals.contains(&ShutdownSignal::Interrupt);
    let listen_terminate = signals.contains(&ShutdownSignal::Terminate);

    let ctrl_c = async {
        if !listen_interrupt {
            return std::future::pending::<()>().await;
        }
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        if !listen_terminate {
            return std::future::pending::<()>().await;
        }
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = {
        let _ = listen_terminate;
        std::future::pending::<()>()
    };

    tokio::select! {
        _ = ctrl_c => ShutdownSignal::Interrupt,
        _ = terminate => ShutdownSignal::Terminate,
    }
}
