use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

/// Connection state shared by every lifecycle component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionState {
    /// Whether `self -> next` is one of the allowed transitions
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnecting)
                | (Disconnecting, Disconnected)
        )
    }

    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Receives every state transition of a supervisor
///
/// Called after the transition is committed and outside the state lock, so an
/// observer may query the supervisor.
pub trait StateObserver: Send + Sync {
    fn on_transition(&self, from: ConnectionState, to: ConnectionState);
}

impl<F> StateObserver for F
where
    F: Fn(ConnectionState, ConnectionState) + Send + Sync,
{
    fn on_transition(&self, from: ConnectionState, to: ConnectionState) {
        self(from, to)
    }
}

/// Handle returned by `ConnectionSupervisor::subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// Built-in observer that logs each transition with the target host
pub(crate) struct LoggingObserver {
    pub(crate) target: String,
}

impl StateObserver for LoggingObserver {
    fn on_transition(&self, from: ConnectionState, to: ConnectionState) {
        info!(target_host = %self.target, %from, %to, "MongoDB connection state changed");
    }
}

/// Registered observers, keyed by id in registration order
#[derive(Default)]
pub(crate) struct ObserverList {
    next_id: u64,
    entries: Vec<(ObserverId, Arc<dyn StateObserver>)>,
}

impl ObserverList {
    pub(crate) fn add(&mut self, observer: Arc<dyn StateObserver>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, observer));
        id
    }

    pub(crate) fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn StateObserver>> {
        self.entries.iter().map(|(_, o)| Arc::clone(o)).collect()
    }
}
