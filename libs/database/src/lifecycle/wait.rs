use std::time::Duration;

use tracing::debug;

use super::driver::Connector;
use super::state::ConnectionState;
use super::supervisor::ConnectionSupervisor;
use crate::common::{DatabaseError, DatabaseResult};

/// Lets callers block until the supervisor is connected
///
/// A pure observer: waiting never starts a connect sequence and a timeout has
/// no effect on the supervisor's own retries.
pub struct WaitGate<C: Connector> {
    supervisor: ConnectionSupervisor<C>,
}

impl<C: Connector> WaitGate<C> {
    pub fn new(supervisor: &ConnectionSupervisor<C>) -> Self {
        Self {
            supervisor: supervisor.clone(),
        }
    }

    /// Wait up to `timeout` for a live handle
    pub async fn wait(&self, timeout: Duration) -> DatabaseResult<C::Handle> {
        let mut state = self.supervisor.watch_state();

        let ready = async {
            loop {
                if state
                    .wait_for(|s| *s == ConnectionState::Connected)
                    .await
                    .is_err()
                {
                    // Sender lives as long as the supervisor; never observed in practice
                    return None;
                }
                if let Some(handle) = self.supervisor.handle() {
                    return Some(handle);
                }
                // Closed again between the notification and the read
                if state.changed().await.is_err() {
                    return None;
                }
            }
        };

        match tokio::time::timeout(timeout, ready).await {
            Ok(Some(handle)) => Ok(handle),
            Ok(None) => Err(DatabaseError::NotConnected),
            Err(_) => {
                debug!(
                    ?timeout,
                    state = %self.supervisor.state(),
                    "Gave up waiting for connection"
                );
                Err(DatabaseError::Timeout { waited: timeout })
            }
        }
    }
}
