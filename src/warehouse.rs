//! Warehouse bulk loading via `COPY ... FROM 's3://...'`.
//!
//! The COPY runs on an autocommit connection opened for the call and
//! released on every exit path. Failures are logged and returned; the staged
//! object is left where it is.

use crate::secrets::{fetch_json, SecretError, SecretStore};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_postgres::NoTls;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("Credential lookup failed: {0}")]
    Secret(#[from] SecretError),

    #[error("Database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("COPY failed: {0}")]
    Execution(String),
}

/// Contents of the warehouse credentials secret
#[derive(Clone, Deserialize)]
pub struct WarehouseCredentials {
    pub host: String,
    pub username: String,
    pub password: String,
    /// IAM role ARN the warehouse assumes to read the staged object
    pub service_role: String,
}

impl std::fmt::Debug for WarehouseCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseCredentials")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"****")
            .field("service_role", &self.service_role)
            .finish()
    }
}

/// Executes statements against the warehouse
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn execute(&self, credentials: &WarehouseCredentials, sql: &str)
        -> Result<(), WarehouseError>;
}

/// An open connection plus the task driving it.
///
/// Dropping the session aborts the driver, so the socket is released even
/// when the caller bails out early. [`close`](Self::close) is the orderly path.
pub struct WarehouseSession {
    client: Option<tokio_postgres::Client>,
    driver: Option<JoinHandle<()>>,
}

impl WarehouseSession {
    pub async fn open(
        credentials: &WarehouseCredentials,
        dbname: &str,
        port: u16,
    ) -> Result<Self, WarehouseError> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&credentials.host)
            .port(port)
            .dbname(dbname)
            .user(&credentials.username)
            .password(&credentials.password);

        let (client, connection) = pg.connect(NoTls).await.map_err(|e| {
            error!("Error connecting to warehouse at {}: {}", credentials.host, e);
            e
        })?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Warehouse connection error: {}", e);
            }
        });

        Ok(Self {
            client: Some(client),
            driver: Some(driver),
        })
    }

    /// Run one or more statements outside any explicit transaction.
    pub async fn batch_execute(&self, sql: &str) -> Result<(), WarehouseError> {
        match &self.client {
            Some(client) => Ok(client.batch_execute(sql).await?),
            None => Err(WarehouseError::Execution("session already closed".to_string())),
        }
    }

    pub async fn close(mut self) {
        // Dropping the last client handle ends the connection future
        drop(self.client.take());
        if let Some(driver) = self.driver.take() {
            let _ = driver.await;
        }
    }
}

impl Drop for WarehouseSession {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

/// Redshift over the Postgres wire protocol
pub struct Redshift {
    dbname: String,
    port: u16,
}

impl Redshift {
    pub fn new(dbname: &str, port: u16) -> Self {
        Self {
            dbname: dbname.to_string(),
            port,
        }
    }
}

#[async_trait]
impl Warehouse for Redshift {
    async fn execute(
        &self,
        credentials: &WarehouseCredentials,
        sql: &str,
    ) -> Result<(), WarehouseError> {
        let session = WarehouseSession::open(credentials, &self.dbname, self.port).await?;
        let result = session.batch_execute(sql).await;
        session.close().await;
        result
    }
}

/// Build the bulk-copy statement for a staged CSV object.
pub fn copy_statement(schema: &str, table: &str, bucket: &str, key: &str, iam_role: &str) -> String {
    format!(
        "COPY {}.{} FROM 's3://{}/{}' IAM_ROLE '{}' FORMAT AS CSV IGNOREHEADER 1;",
        schema, table, bucket, key, iam_role
    )
}

pub struct WarehouseLoader {
    secrets: Arc<dyn SecretStore>,
    warehouse: Arc<dyn Warehouse>,
    credentials_secret_id: String,
    bucket: String,
}

impl WarehouseLoader {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        warehouse: Arc<dyn Warehouse>,
        credentials_secret_id: &str,
        bucket: &str,
    ) -> Self {
        Self {
            secrets,
            warehouse,
            credentials_secret_id: credentials_secret_id.to_string(),
            bucket: bucket.to_string(),
        }
    }

    /// Ingest a staged object into `schema.table`.
    pub async fn load(&self, object_key: &str, schema: &str, table: &str) -> Result<(), WarehouseError> {
        let credentials: WarehouseCredentials =
            fetch_json(self.secrets.as_ref(), &self.credentials_secret_id).await?;

        let sql = copy_statement(schema, table, &self.bucket, object_key, &credentials.service_role);
        debug!(
            "Executing COPY command: {}",
            copy_statement(schema, table, &self.bucket, object_key, "<service_role>")
        );

        if let Err(e) = self.warehouse.execute(&credentials, &sql).await {
            error!(
                "COPY of s3://{}/{} into {}.{} failed: {}",
                self.bucket, object_key, schema, table, e
            );
            return Err(e);
        }

        info!("Data successfully copied from S3 to {}.{}", schema, table);
        Ok(())
    }
}
