//! Liveness and readiness endpoints for the shared connection

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use database::lifecycle::{Connector, HealthReporter, ShutdownCoordinator};
use serde_json::json;
use tracing::info;

use crate::config::HealthListener;

/// Creates a router with the `/health` and `/ready` endpoints.
pub fn health_router<C: Connector>(reporter: HealthReporter<C>) -> Router {
    Router::new()
        .route("/health", get(health_handler::<C>))
        .route("/ready", get(ready_handler::<C>))
        .with_state(reporter)
}

/// Health snapshot; always 200 while the process is up
async fn health_handler<C: Connector>(State(reporter): State<HealthReporter<C>>) -> Response {
    (StatusCode::OK, Json(reporter.health())).into_response()
}

/// 200 once connected and the server answers a ping, 503 otherwise
async fn ready_handler<C: Connector>(State(reporter): State<HealthReporter<C>>) -> Response {
    let health = reporter.health();
    let probe = reporter.probe().await;
    let ready = health.ok && probe.healthy;

    if !ready {
        tracing::warn!(state = %health.state, message = ?probe.message, "Readiness check failed");
    }

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "ready": ready,
            "health": health,
            "probe": probe,
        })),
    )
        .into_response()
}

/// Serve until the coordinator starts shutting down
pub async fn serve<C: Connector>(
    router: Router,
    listener_config: &HealthListener,
    coordinator: ShutdownCoordinator<C>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listener_config.address()).await?;

    info!("Server starting on {}", listener.local_addr()?);
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move { coordinator.shutdown_requested().await })
        .await?;

    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use database::ConnectionSupervisor;
    use database::lifecycle::DriverError;
    use database::mongodb::ConnectionConfig;
    use serde_json::Value;
    use tower::ServiceExt;

    #[derive(Clone, Default)]
    struct InstantConnector;

    #[async_trait]
    impl Connector for InstantConnector {
        type Handle = ();

        async fn connect(&self, _config: &ConnectionConfig) -> Result<(), DriverError> {
            Ok(())
        }

        async fn disconnect(&self, _handle: ()) -> Result<(), DriverError> {
            Ok(())
        }

        async fn ping(&self, _handle: &()) -> Result<(), DriverError> {
            Ok(())
        }
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_is_always_ok() {
        let supervisor = ConnectionSupervisor::new(InstantConnector);
        let router = health_router(HealthReporter::new(&supervisor));

        let (status, body) = get(router, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], false);
        assert_eq!(body["state"], "disconnected");
    }

    #[tokio::test]
    async fn test_ready_before_connect_is_unavailable() {
        let supervisor = ConnectionSupervisor::new(InstantConnector);
        let router = health_router(HealthReporter::new(&supervisor));

        let (status, body) = get(router, "/ready").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["ready"], false);
    }

    #[tokio::test]
    async fn test_ready_after_connect() {
        let supervisor = ConnectionSupervisor::new(InstantConnector);
        supervisor
            .connect(&ConnectionConfig::new("db.local", "planner"))
            .await
            .unwrap();
        let router = health_router(HealthReporter::new(&supervisor));

        let (status, body) = get(router, "/ready").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["health"]["host"], "db.local:27017");
        assert_eq!(body["health"]["db"], "planner");
    }
}
