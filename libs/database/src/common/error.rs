use std::time::Duration;

use crate::lifecycle::DriverError;

/// Boxed error produced by a caller-supplied unit of work
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Where a transaction failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TransactionStage {
    /// Starting the session or the transaction itself
    Begin,
    /// The caller-supplied unit of work returned an error
    Work,
    /// The commit round-trip failed
    Commit,
}

/// Unified error type for the connection lifecycle manager
///
/// Every public operation of the manager returns this type; nothing is
/// swallowed except "not found" while dropping indexes.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Configuration error (missing credential, bad URI component). Never retried.
    #[error("Configuration error: {0}")]
    Config(#[from] core_config::ConfigError),

    /// Connection failed after every retry attempt was used
    #[error("Connection failed after {attempts} attempt(s): {source}")]
    ConnectionFailed {
        attempts: u32,
        #[source]
        source: DriverError,
    },

    /// The wait gate gave up before the supervisor reached `connected`
    #[error("Timed out after {waited:?} waiting for the database connection")]
    Timeout { waited: Duration },

    /// A transaction was rolled back (or never started); the original cause is kept
    #[error("Transaction failed during {stage} (aborted: {aborted}): {source}")]
    Transaction {
        stage: TransactionStage,
        aborted: bool,
        #[source]
        source: BoxError,
    },

    /// Index synchronization failed for a collection
    #[error("Index synchronization failed for collection '{collection}': {source}")]
    IndexSync {
        collection: String,
        #[source]
        source: DriverError,
    },

    /// Closing the connection failed; the supervisor is disconnected regardless
    #[error("Disconnect failed: {0}")]
    Disconnect(#[source] DriverError),

    /// An operation needed a live handle but the supervisor is not connected
    #[error("Not connected to the database")]
    NotConnected,
}

impl DatabaseError {
    /// Whether the caller may retry the operation that produced this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::NotConnected)
    }
}

/// Result type alias for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_error_keeps_cause() {
        let cause = std::io::Error::other("duplicate key");
        let err = DatabaseError::Transaction {
            stage: TransactionStage::Work,
            aborted: true,
            source: Box::new(cause),
        };

        assert_eq!(
            err.to_string(),
            "Transaction failed during work (aborted: true): duplicate key"
        );
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.downcast_ref::<std::io::Error>().is_some());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(
            DatabaseError::Timeout {
                waited: Duration::from_secs(1)
            }
            .is_recoverable()
        );
        assert!(
            !DatabaseError::ConnectionFailed {
                attempts: 5,
                source: DriverError::new("refused"),
            }
            .is_recoverable()
        );
    }
}
