//! MongoDB connection bootstrap with pool configuration and health checking

use bson::{doc, Document as BsonDocument};
use mongodb::{
    options::{ClientOptions, ServerApi, ServerApiVersion},
    Client, Collection, Database,
};
use tracing::{info, instrument};

use crate::config::{ConnectionUrl, PoolConfig};
use crate::{AdapterError, Result};

/// MongoDB connection: one client and the database named by the URL
#[derive(Debug, Clone)]
pub struct Connection {
    client: Client,
    database: Database,
    database_name: String,
}

impl Connection {
    /// Connect and verify the server answers a ping
    ///
    /// # Errors
    /// - `InvalidConfiguration` if the driver rejects the URL options
    /// - `Connection` if the initial ping fails
    #[instrument(skip_all, fields(database = url.database_name()))]
    pub async fn connect(url: &ConnectionUrl, config: &PoolConfig) -> Result<Self> {
        info!(url = %url.redacted(), "Connecting to MongoDB");

        let mut client_options = ClientOptions::parse(url.as_str())
            .await
            .map_err(|e| AdapterError::InvalidConfiguration(e.to_string()))?;

        if let Some(min) = config.min_pool_size {
            client_options.min_pool_size = Some(min);
        }
        if let Some(max) = config.max_pool_size {
            client_options.max_pool_size = Some(max);
        }
        if let Some(idle) = config.max_idle_time {
            client_options.max_idle_time = Some(idle);
        }
        if let Some(connect) = config.connect_timeout {
            client_options.connect_timeout = Some(connect);
        }
        if let Some(server_sel) = config.server_selection_timeout {
            client_options.server_selection_timeout = Some(server_sel);
        }
        if let Some(app) = &config.app_name {
            client_options.app_name = Some(app.clone());
        }

        let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
        client_options.server_api = Some(server_api);

        let client = Client::with_options(client_options)
            .map_err(|e| AdapterError::InvalidConfiguration(e.to_string()))?;
        let database = client.database(url.database_name());

        let connection = Self {
            client,
            database,
            database_name: url.database_name().to_string(),
        };
        connection.ping().await?;

        info!("MongoDB connection established");
        Ok(connection)
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Untyped collection handle
    pub fn get_collection(&self, name: &str) -> Collection<BsonDocument> {
        self.database.collection(name)
    }

    /// Check the server answers a ping
    pub async fn ping(&self) -> Result<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(|e| AdapterError::Connection(format!("Ping failed: {}", e)))
    }

    /// Close every pooled connection
    pub async fn shutdown(&self) {
        info!(database = %self.database_name, "Closing MongoDB connection");
        self.client.clone().shutdown().await;
    }
}
