use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Document, doc};
use mongodb::event::EventHandler;
use mongodb::event::command::CommandEvent;
use mongodb::options::{ClientOptions, TransactionOptions};
use mongodb::{Client, ClientSession, Database, IndexModel};
use tracing::{debug, info};

use super::ConnectionConfig;
use crate::lifecycle::{
    Connector, DriverError, IndexManager, SessionFactory, TransactionSession, TransactionSettings,
};

/// Live MongoDB connection: the client (pool) plus the configured database
///
/// Cheap to clone; every clone shares the same connection pool.
#[derive(Clone, Debug)]
pub struct MongoHandle {
    pub client: Client,
    pub database: Database,
}

impl MongoHandle {
    pub fn new(client: Client, database_name: &str) -> Self {
        let database = client.database(database_name);
        Self { client, database }
    }

    /// Typed collection in the configured database
    pub fn collection<T: Send + Sync>(&self, name: &str) -> mongodb::Collection<T> {
        self.database.collection(name)
    }
}

/// Dials MongoDB with the official driver
#[derive(Clone, Debug, Default)]
pub struct MongoConnector;

impl MongoConnector {
    pub fn new() -> Self {
        Self
    }

    async fn client_options(config: &ConnectionConfig) -> Result<ClientOptions, DriverError> {
        let mut options = ClientOptions::parse(config.connection_uri()).await?;

        // Apply config settings
        options.max_pool_size = Some(config.max_pool_size);
        options.min_pool_size = Some(config.min_pool_size);
        options.connect_timeout = Some(config.connect_timeout);
        options.server_selection_timeout = Some(config.server_selection_timeout);

        if let Some(ref app_name) = config.app_name {
            options.app_name = Some(app_name.clone());
        }

        if config.debug {
            options.command_event_handler = Some(EventHandler::callback(log_command_event));
        }

        Ok(options)
    }
}

fn log_command_event(event: CommandEvent) {
    match event {
        CommandEvent::Started(started) => debug!(
            command = %started.command_name,
            db = %started.db,
            request_id = started.request_id,
            "mongodb command started"
        ),
        CommandEvent::Succeeded(succeeded) => debug!(
            command = %succeeded.command_name,
            request_id = succeeded.request_id,
            duration_ms = succeeded.duration.as_millis() as u64,
            "mongodb command succeeded"
        ),
        CommandEvent::Failed(failed) => debug!(
            command = %failed.command_name,
            request_id = failed.request_id,
            duration_ms = failed.duration.as_millis() as u64,
            error = %failed.failure,
            "mongodb command failed"
        ),
        #[allow(unreachable_patterns)]
        _ => {}
    }
}

/// Run the `ping` admin command
async fn ping(client: &Client) -> Result<(), DriverError> {
    client
        .database("admin")
        .run_command(doc! { "ping": 1 })
        .await?;
    Ok(())
}

#[async_trait]
impl Connector for MongoConnector {
    type Handle = MongoHandle;

    async fn connect(&self, config: &ConnectionConfig) -> Result<MongoHandle, DriverError> {
        info!("Attempting to connect to MongoDB at {}", config.redacted_uri());

        let options = Self::client_options(config).await?;
        let client = Client::with_options(options)?;

        // Verify connection; the client itself connects lazily
        tokio::time::timeout(config.socket_timeout, ping(&client))
            .await
            .map_err(|_| {
                DriverError::new(format!(
                    "ping did not complete within {:?}",
                    config.socket_timeout
                ))
            })??;

        info!("Successfully connected to MongoDB");
        Ok(MongoHandle::new(client, config.database()))
    }

    async fn disconnect(&self, handle: MongoHandle) -> Result<(), DriverError> {
        // Immediate: in-flight sessions and cursors fail instead of blocking shutdown
        handle.client.shutdown().immediate(true).await;
        Ok(())
    }

    async fn ping(&self, handle: &MongoHandle) -> Result<(), DriverError> {
        ping(&handle.client).await
    }
}

#[async_trait]
impl SessionFactory for MongoHandle {
    type Session = ClientSession;

    async fn start_session(&self) -> Result<ClientSession, DriverError> {
        Ok(self.client.start_session().await?)
    }
}

#[async_trait]
impl TransactionSession for ClientSession {
    async fn start_transaction(
        &mut self,
        settings: &TransactionSettings,
    ) -> Result<(), DriverError> {
        let mut options = TransactionOptions::default();
        options.read_concern = settings.read_concern.clone();
        options.write_concern = settings.write_concern.clone();
        options.max_commit_time = settings.max_commit_time;

        ClientSession::start_transaction(self)
            .with_options(options)
            .await?;
        Ok(())
    }

    async fn commit_transaction(&mut self) -> Result<(), DriverError> {
        ClientSession::commit_transaction(self).await?;
        Ok(())
    }

    async fn abort_transaction(&mut self) -> Result<(), DriverError> {
        ClientSession::abort_transaction(self).await?;
        Ok(())
    }

    async fn end_session(self) {
        // The driver returns the server session to its pool on drop
        drop(self);
    }
}

#[async_trait]
impl IndexManager for MongoHandle {
    async fn drop_all_indexes(&self, collection: &str) -> Result<(), DriverError> {
        self.collection::<Document>(collection).drop_indexes().await?;
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexModel>, DriverError> {
        let cursor = self.collection::<Document>(collection).list_indexes().await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }

    async fn create_indexes(
        &self,
        collection: &str,
        indexes: Vec<IndexModel>,
    ) -> Result<(), DriverError> {
        self.collection::<Document>(collection)
            .create_indexes(indexes)
            .await?;
        Ok(())
    }

    async fn drop_index(&self, collection: &str, name: &str) -> Result<(), DriverError> {
        self.collection::<Document>(collection).drop_index(name).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_options_apply_config() {
        let config = ConnectionConfig::new("db.local", "app")
            .with_pool_size(2, 20)
            .with_app_name("planner")
            .with_debug(true);

        let options = MongoConnector::client_options(&config).await.unwrap();
        assert_eq!(options.max_pool_size, Some(20));
        assert_eq!(options.min_pool_size, Some(2));
        assert_eq!(options.app_name.as_deref(), Some("planner"));
        assert!(options.command_event_handler.is_some());
    }

    #[tokio::test]
    async fn test_client_options_reject_malformed_uri() {
        let config = ConnectionConfig::from_uri("mongodb://", "app");
        assert!(MongoConnector::client_options(&config).await.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires actual MongoDB
    async fn test_connect() {
        let mongo_url = std::env::var("MONGODB_URL")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let config = ConnectionConfig::from_uri(mongo_url, "test");
        let handle = MongoConnector::new().connect(&config).await;
        assert!(handle.is_ok());
    }
}
