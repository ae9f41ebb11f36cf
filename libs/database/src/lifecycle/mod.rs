//! Connection lifecycle: supervise, await, observe, and tear down the shared
//! MongoDB connection, plus transaction and index helpers built on top of it.

mod driver;
mod health;
mod indexes;
mod shutdown;
mod state;
mod supervisor;
mod transaction;
mod wait;

pub use driver::{
    Connector, DriverError, INDEX_NOT_FOUND, IndexManager, NAMESPACE_NOT_FOUND, SessionFactory,
    TransactionSession,
};
pub use health::{HealthReporter, HealthSnapshot, ProbeStatus};
pub use indexes::{ID_INDEX, IndexSyncReport, IndexSynchronizer, ModelIndexes, index_name};
pub use shutdown::{ShutdownCoordinator, ShutdownOutcome, ShutdownSignal};
pub use state::{ConnectionState, ObserverId, StateObserver};
pub use supervisor::ConnectionSupervisor;
pub use transaction::{TransactionRunner, TransactionScope, TransactionSettings};
pub use wait::WaitGate;
