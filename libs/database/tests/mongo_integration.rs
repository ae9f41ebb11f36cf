//! End-to-end checks against a real MongoDB replica set
//!
//! Run with `cargo test -p database -- --ignored` (requires Docker).

use std::time::Duration;

use database::common::BoxError;
use database::lifecycle::{HealthReporter, IndexSynchronizer, ModelIndexes, ShutdownCoordinator};
use database::mongodb::bson::{Document, doc};
use database::mongodb::options::IndexOptions;
use database::mongodb::{ConnectionConfig, IndexModel};
use database::{
    ConnectionState, ConnectionSupervisor, DatabaseError, ShutdownSignal, TransactionRunner,
    TransactionSettings, TransactionStage, WaitGate,
};
use test_utils::{TestDataBuilder, TestMongo};

fn config(mongo: &TestMongo, test_name: &str) -> ConnectionConfig {
    ConnectionConfig::from_uri(
        mongo.connection_string(),
        TestDataBuilder::from_test_name(test_name).database_name(),
    )
}

#[derive(Debug, thiserror::Error)]
#[error("rejected by business rule")]
struct Rejected;

#[tokio::test]
#[ignore] // Requires Docker
async fn test_connect_wait_and_health() {
    let mongo = TestMongo::new().await;
    let supervisor: ConnectionSupervisor = ConnectionSupervisor::default();
    let gate = WaitGate::new(&supervisor);

    let waiter = tokio::spawn(async move { gate.wait(Duration::from_secs(30)).await });
    supervisor
        .connect(&config(&mongo, "test_connect_wait_and_health"))
        .await
        .unwrap();
    waiter.await.unwrap().unwrap();

    let reporter = HealthReporter::new(&supervisor);
    let health = reporter.health();
    assert!(health.ok);
    assert_eq!(health.state, ConnectionState::Connected);
    assert!(reporter.probe().await.healthy);

    supervisor.disconnect().await.unwrap();
    assert!(!reporter.health().ok);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_transaction_commit_and_rollback() {
    let mongo = TestMongo::new().await;
    let supervisor: ConnectionSupervisor = ConnectionSupervisor::default();
    let handle = supervisor
        .connect(&config(&mongo, "test_transaction_commit_and_rollback"))
        .await
        .unwrap();

    let tasks = handle.collection::<Document>("tasks");
    // Collections must exist before they are written inside a transaction on older servers
    tasks.insert_one(doc! { "title": "seed" }).await.unwrap();

    let runner = TransactionRunner::new(handle.clone());

    let committed = tasks.clone();
    runner
        .run_in_transaction(TransactionSettings::new(), move |scope| {
            Box::pin(async move {
                committed
                    .insert_one(doc! { "title": "write report" })
                    .session(scope.session())
                    .await?;
                Ok::<_, mongodb::error::Error>(())
            })
        })
        .await
        .unwrap();

    let rolled_back = tasks.clone();
    let err = runner
        .run_in_transaction(TransactionSettings::new(), move |scope| {
            Box::pin(async move {
                rolled_back
                    .insert_one(doc! { "title": "never visible" })
                    .session(scope.session())
                    .await?;
                Err::<(), BoxError>(Box::new(Rejected))
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DatabaseError::Transaction {
            stage: TransactionStage::Work,
            aborted: true,
            ..
        }
    ));
    assert_eq!(
        tasks
            .count_documents(doc! { "title": "write report" })
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        tasks
            .count_documents(doc! { "title": "never visible" })
            .await
            .unwrap(),
        0
    );

    supervisor.disconnect().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_sync_indexes_on_fresh_database() {
    let mongo = TestMongo::new().await;
    let supervisor: ConnectionSupervisor = ConnectionSupervisor::default();
    let handle = supervisor
        .connect(&config(&mongo, "test_sync_indexes_on_fresh_database"))
        .await
        .unwrap();

    let models = vec![
        ModelIndexes::new("notes")
            .with_index(IndexModel::builder().keys(doc! { "owner_id": 1 }).build()),
    ];

    // Collection does not exist yet: drop-first must tolerate it
    let reports = IndexSynchronizer::new(&handle)
        .sync_indexes(&models, true)
        .await
        .unwrap();
    assert_eq!(reports[0].created, vec!["owner_id_1"]);

    let reports = IndexSynchronizer::new(&handle)
        .sync_indexes(&models, false)
        .await
        .unwrap();
    assert!(reports[0].created.is_empty());
    assert!(reports[0].dropped.is_empty());

    supervisor.disconnect().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_sync_indexes_rebuilds_changed_definitions() {
    let mongo = TestMongo::new().await;
    let supervisor: ConnectionSupervisor = ConnectionSupervisor::default();
    let handle = supervisor
        .connect(&config(&mongo, "test_sync_indexes_rebuilds_changed_definitions"))
        .await
        .unwrap();

    let plain = vec![
        ModelIndexes::new("users")
            .with_index(IndexModel::builder().keys(doc! { "email": 1 }).build()),
    ];
    let unique = vec![
        ModelIndexes::new("users").with_index(
            IndexModel::builder()
                .keys(doc! { "email": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
        ),
        ModelIndexes::new("tasks").with_index(
            IndexModel::builder()
                .keys(doc! { "title": "text", "description": "text" })
                .options(IndexOptions::builder().name("task_search".to_string()).build())
                .build(),
        ),
    ];

    IndexSynchronizer::new(&handle)
        .sync_indexes(&plain, false)
        .await
        .unwrap();

    let reports = IndexSynchronizer::new(&handle)
        .sync_indexes(&unique, false)
        .await
        .unwrap();
    assert_eq!(reports[0].dropped, vec!["email_1"]);
    assert_eq!(reports[0].created, vec!["email_1"]);
    assert_eq!(reports[1].created, vec!["task_search"]);

    // Server-reported definitions now match what is declared
    let reports = IndexSynchronizer::new(&handle)
        .sync_indexes(&unique, false)
        .await
        .unwrap();
    assert!(reports.iter().all(|r| r.dropped.is_empty() && r.created.is_empty()));

    supervisor.disconnect().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_shutdown_closes_live_connection() {
    let mongo = TestMongo::new().await;
    let supervisor: ConnectionSupervisor = ConnectionSupervisor::default();
    supervisor
        .connect(&config(&mongo, "test_shutdown_closes_live_connection"))
        .await
        .unwrap();

    let coordinator = ShutdownCoordinator::with_exit_hook(&supervisor, |_| {});
    let outcome = coordinator.handle_signal(ShutdownSignal::Terminate).await;

    assert_eq!(outcome.exit_code, 0);
    assert_eq!(supervisor.state(), ConnectionState::Disconnected);
}
