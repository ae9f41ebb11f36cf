//! MongoDB connection lifecycle for services sharing one connection
//!
//! One [`ConnectionSupervisor`] per process owns the connection; everything
//! else borrows it:
//!
//! - [`WaitGate`] - wait (with a timeout) until the connection is up
//! - [`HealthReporter`] - non-blocking health snapshot and readiness probe
//! - [`TransactionRunner`] - run a unit of work in one transaction
//! - [`IndexSynchronizer`] - reconcile collection indexes (operator tooling only)
//! - [`ShutdownCoordinator`] - close the connection on SIGINT/SIGTERM
//!
//! # Example
//!
//! ```ignore
//! use core_config::FromEnv;
//! use database::mongodb::ConnectionConfig;
//! use database::{ConnectionSupervisor, ShutdownCoordinator, ShutdownSignal, TransactionRunner};
//!
//! let config = ConnectionConfig::from_env()?;
//! let supervisor = ConnectionSupervisor::default();
//! let handle = supervisor.connect(&config).await?;
//! ShutdownCoordinator::new(&supervisor)
//!     .install(&[ShutdownSignal::Interrupt, ShutdownSignal::Terminate]);
//!
//! let runner = TransactionRunner::new(handle);
//! ```

pub mod common;
pub mod lifecycle;
pub mod mongodb;

// Re-exports for convenience
pub use common::{DatabaseError, DatabaseResult, RetryPolicy, TransactionStage};
pub use lifecycle::{
    ConnectionState, ConnectionSupervisor, HealthReporter, HealthSnapshot, IndexSynchronizer,
    ModelIndexes, ShutdownCoordinator, ShutdownSignal, TransactionRunner, TransactionSettings,
    WaitGate,
};
