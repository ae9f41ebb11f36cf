//! Unit-of-work helper: run caller code inside one transaction

use std::time::Duration;

use futures::future::BoxFuture;
use mongodb::options::{ReadConcern, WriteConcern};
use tracing::{debug, instrument, warn};

use super::driver::{DriverError, SessionFactory, TransactionSession};
use crate::common::{BoxError, DatabaseError, DatabaseResult, TransactionStage};

/// Per-transaction tuning; unset fields fall back to the runner defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionSettings {
    pub read_concern: Option<ReadConcern>,
    pub write_concern: Option<WriteConcern>,
    pub max_commit_time: Option<Duration>,
}

impl TransactionSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read_concern(mut self, read_concern: ReadConcern) -> Self {
        self.read_concern = Some(read_concern);
        self
    }

    pub fn with_write_concern(mut self, write_concern: WriteConcern) -> Self {
        self.write_concern = Some(write_concern);
        self
    }

    pub fn with_max_commit_time(mut self, max_commit_time: Duration) -> Self {
        self.max_commit_time = Some(max_commit_time);
        self
    }

    /// Fill every unset field from `defaults`
    pub fn merged_over(&self, defaults: &TransactionSettings) -> TransactionSettings {
        TransactionSettings {
            read_concern: self
                .read_concern
                .clone()
                .or_else(|| defaults.read_concern.clone()),
            write_concern: self
                .write_concern
                .clone()
                .or_else(|| defaults.write_concern.clone()),
            max_commit_time: self.max_commit_time.or(defaults.max_commit_time),
        }
    }
}

/// The session a unit of work runs in
///
/// Owned by exactly one `run_in_transaction` call and lent to its work as
/// `&mut`, so it can never be used by two operations at once.
pub struct TransactionScope<S> {
    session: S,
}

impl<S> TransactionScope<S> {
    /// Session to pass to driver calls (`.session(scope.session())`)
    pub fn session(&mut self) -> &mut S {
        &mut self.session
    }
}

/// Runs units of work inside transactions on a shared handle
#[derive(Clone)]
pub struct TransactionRunner<H> {
    handle: H,
    defaults: TransactionSettings,
}

impl<H> TransactionRunner<H>
where
    H: SessionFactory,
{
    /// Runner with snapshot reads and majority writes by default
    pub fn new(handle: H) -> Self {
        Self::with_defaults(
            handle,
            TransactionSettings::new()
                .with_read_concern(ReadConcern::snapshot())
                .with_write_concern(WriteConcern::majority()),
        )
    }

    pub fn with_defaults(handle: H, defaults: TransactionSettings) -> Self {
        Self { handle, defaults }
    }

    pub fn defaults(&self) -> &TransactionSettings {
        &self.defaults
    }

    /// Execute `work` in a fresh transaction
    ///
    /// Commits when `work` succeeds and aborts when it fails; the session is
    /// ended exactly once on every path. Errors from `work` come back as
    /// `DatabaseError::Transaction` with the original error as `source`.
    ///
    /// # Example
    /// ```ignore
    /// let runner = TransactionRunner::new(handle.clone());
    /// let moved = runner
    ///     .run_in_transaction(TransactionSettings::new(), |scope| {
    ///         Box::pin(async move {
    ///             tasks.insert_one(task).session(scope.session()).await?;
    ///             calendar.delete_one(filter).session(scope.session()).await?;
    ///             Ok::<_, mongodb::error::Error>(())
    ///         })
    ///     })
    ///     .await?;
    /// ```
    #[instrument(skip_all)]
    pub async fn run_in_transaction<T, E, F>(
        &self,
        options: TransactionSettings,
        work: F,
    ) -> DatabaseResult<T>
    where
        F: for<'s> FnOnce(&'s mut TransactionScope<H::Session>) -> BoxFuture<'s, Result<T, E>>,
        E: Into<BoxError>,
    {
        let settings = options.merged_over(&self.defaults);

        let session = self
            .handle
            .start_session()
            .await
            .map_err(|e| begin_failed(e, false))?;
        let mut scope = TransactionScope { session };

        if let Err(e) = scope.session.start_transaction(&settings).await {
            scope.session.end_session().await;
            debug!("Transaction session released");
            return Err(begin_failed(e, false));
        }

        let outcome = match work(&mut scope).await {
            Ok(value) => match scope.session.commit_transaction().await {
                Ok(()) => {
                    debug!("Transaction committed");
                    Ok(value)
                }
                Err(e) => {
                    warn!(error = %e, "Transaction commit failed, aborting");
                    let aborted = abort(&mut scope.session).await;
                    Err(DatabaseError::Transaction {
                        stage: TransactionStage::Commit,
                        aborted,
                        source: Box::new(e),
                    })
                }
            },
            Err(e) => {
                let aborted = abort(&mut scope.session).await;
                Err(DatabaseError::Transaction {
                    stage: TransactionStage::Work,
                    aborted,
                    source: e.into(),
                })
            }
        };

        scope.session.end_session().await;
        debug!("Transaction session released");
        outcome
    }
}

fn begin_failed(error: DriverError, aborted: bool) -> DatabaseError {
    DatabaseError::Transaction {
        stage: TransactionStage::Begin,
        aborted,
        source: Box::new(error),
    }
}

/// Abort, logging instead of failing; returns whether the abort went through
async fn abort<S: TransactionSession>(session: &mut S) -> bool {
    match session.abort_transaction().await {
        Ok(()) => {
            debug!("Transaction aborted");
            true
        }
        Err(e) => {
            warn!(error = %e, "Transaction abort failed");
            false
        }
    }
}
