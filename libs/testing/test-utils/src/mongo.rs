//! MongoDB test infrastructure
//!
//! Provides a `TestMongo` helper that starts a single-node replica set, so
//! transactions work against it.

use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::mongo::Mongo;

/// Test MongoDB wrapper that ensures proper cleanup
///
/// The container is automatically stopped and removed when this struct is dropped.
///
/// # Example
///
/// ```no_run
/// use test_utils::TestMongo;
///
/// # async fn example() {
/// let mongo = TestMongo::new().await;
/// let uri = mongo.connection_string();
/// // Build a ConnectionConfig from `uri` and connect
/// # }
/// ```
pub struct TestMongo {
    #[allow(dead_code)]
    container: ContainerAsync<Mongo>,
    pub connection_string: String,
    pub port: u16,
}

impl TestMongo {
    /// Start a single-node replica set
    pub async fn new() -> Self {
        let container = Mongo::repl_set()
            .start()
            .await
            .expect("Failed to start MongoDB container");

        let port = container
            .get_host_port_ipv4(27017)
            .await
            .expect("Failed to get MongoDB port");

        // The replica set advertises the container hostname; connect directly
        let connection_string = format!("mongodb://127.0.0.1:{}/?directConnection=true", port);

        tracing::info!(port, "Test MongoDB ready (single-node replica set)");

        Self {
            container,
            connection_string,
            port,
        }
    }

    /// Get the connection string for manual client creation
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

// Container is automatically cleaned up when TestMongo is dropped
impl Drop for TestMongo {
    fn drop(&mut self) {
        tracing::debug!("Cleaning up test MongoDB container");
    }
}
