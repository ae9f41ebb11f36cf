//! Driver seam
//!
//! The lifecycle components only talk to the database through these traits.
//! `crate::mongodb` implements them on top of the official driver; tests use
//! in-memory fakes.

use async_trait::async_trait;
use mongodb::IndexModel;

use crate::mongodb::ConnectionConfig;
use super::transaction::TransactionSettings;

/// Server error code for "ns not found"
pub const NAMESPACE_NOT_FOUND: i32 = 26;
/// Server error code for "index not found"
pub const INDEX_NOT_FOUND: i32 = 27;

/// A failure reported by the underlying driver
///
/// Cloneable so a single connect outcome can be handed to every waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DriverError {
    /// Server error code, when the server answered with one
    pub code: Option<i32>,
    /// Error labels attached by the driver (e.g. `TransientTransactionError`)
    pub labels: Vec<String>,
    pub message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            labels: Vec::new(),
            message: message.into(),
        }
    }

    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            labels: Vec::new(),
            message: message.into(),
        }
    }

    /// "Collection or index does not exist"
    pub fn is_not_found(&self) -> bool {
        matches!(self.code, Some(NAMESPACE_NOT_FOUND | INDEX_NOT_FOUND))
            || self.message.contains("ns not found")
            || self.message.contains("index not found")
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

impl From<mongodb::error::Error> for DriverError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        let code = match err.kind.as_ref() {
            ErrorKind::Command(command) => Some(command.code),
            _ => None,
        };

        Self {
            code,
            labels: err.labels().iter().cloned().collect(),
            message: err.to_string(),
        }
    }
}

/// Dials and closes the shared connection
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Live connection object handed out to callers once connected
    type Handle: Clone + Send + Sync + 'static;

    /// One physical connect attempt; must verify the server answers
    async fn connect(&self, config: &ConnectionConfig) -> Result<Self::Handle, DriverError>;

    /// Close the connection without waiting for in-flight operations
    async fn disconnect(&self, handle: Self::Handle) -> Result<(), DriverError>;

    /// Lightweight round-trip used by readiness probes
    async fn ping(&self, handle: &Self::Handle) -> Result<(), DriverError>;
}

/// A server-side session able to run one transaction at a time
#[async_trait]
pub trait TransactionSession: Send + Sized {
    async fn start_transaction(&mut self, settings: &TransactionSettings)
    -> Result<(), DriverError>;

    async fn commit_transaction(&mut self) -> Result<(), DriverError>;

    async fn abort_transaction(&mut self) -> Result<(), DriverError>;

    /// Release the session. Never fails; errors are the driver's to log.
    async fn end_session(self);
}

/// Hands out fresh sessions
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: TransactionSession;

    async fn start_session(&self) -> Result<Self::Session, DriverError>;
}

/// Index administration on named collections
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IndexManager: Send + Sync {
    /// Drop every index except `_id_`
    async fn drop_all_indexes(&self, collection: &str) -> Result<(), DriverError>;

    /// Every index on the collection, with its server-reported options
    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexModel>, DriverError>;

    async fn create_indexes(
        &self,
        collection: &str,
        indexes: Vec<IndexModel>,
    ) -> Result<(), DriverError>;

    async fn drop_index(&self, collection: &str, name: &str) -> Result<(), DriverError>;
}
