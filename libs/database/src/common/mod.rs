//! Common utilities shared across the lifecycle manager and the driver binding

pub mod error;
pub mod retry;

pub use error::{BoxError, DatabaseError, DatabaseResult, TransactionStage};
pub use retry::{RetryAttempt, RetryExhausted, RetryPolicy, retry_with_backoff};
