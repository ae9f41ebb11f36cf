use std::time::Instant;

use serde::Serialize;

use super::driver::Connector;
use super::state::ConnectionState;
use super::supervisor::ConnectionSupervisor;

/// Point-in-time view of the connection, as served on `/health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub ok: bool,
    pub state: ConnectionState,
    pub host: String,
    pub db: String,
}

/// Result of a round-trip to the server
#[derive(Debug, Clone, Serialize)]
pub struct ProbeStatus {
    /// Whether the server answered
    pub healthy: bool,
    /// Error details, or why no round-trip was made
    pub message: Option<String>,
    /// Response time in milliseconds
    pub response_time_ms: u64,
}

/// Reports connection health without ever dialing
pub struct HealthReporter<C: Connector> {
    supervisor: ConnectionSupervisor<C>,
}

impl<C: Connector> Clone for HealthReporter<C> {
    fn clone(&self) -> Self {
        Self {
            supervisor: self.supervisor.clone(),
        }
    }
}

impl<C: Connector> HealthReporter<C> {
    pub fn new(supervisor: &ConnectionSupervisor<C>) -> Self {
        Self {
            supervisor: supervisor.clone(),
        }
    }

    /// Snapshot from the supervisor state; host and db are empty until the
    /// first connect
    pub fn health(&self) -> HealthSnapshot {
        let state = self.supervisor.state();
        let (host, db) = self
            .supervisor
            .config()
            .map(|config| (config.display_host(), config.database().to_string()))
            .unwrap_or_default();

        HealthSnapshot {
            ok: state.is_connected(),
            state,
            host,
            db,
        }
    }

    /// Ping the server through the current handle
    ///
    /// Reports unhealthy without a round-trip when not connected.
    ///
    /// # Example
    /// ```ignore
    /// let status = HealthReporter::new(&supervisor).probe().await;
    /// if !status.healthy {
    ///     warn!(message = ?status.message, "MongoDB not ready");
    /// }
    /// ```
    pub async fn probe(&self) -> ProbeStatus {
        let Some(handle) = self.supervisor.handle() else {
            return ProbeStatus {
                healthy: false,
                message: Some(format!("connection is {}", self.supervisor.state())),
                response_time_ms: 0,
            };
        };

        let start = Instant::now();
        let result = self.supervisor.connector().ping(&handle).await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => ProbeStatus {
                healthy: true,
                message: None,
                response_time_ms,
            },
            Err(e) => ProbeStatus {
                healthy: false,
                message: Some(e.to_string()),
                response_time_ms,
            },
        }
    }
}
