//! Secret store access.
//!
//! Secrets are JSON blobs looked up by a fixed identifier. AWS Secrets Manager
//! is the production store.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("Secret store error for {id}: {message}")]
    Service { id: String, message: String },

    #[error("Secret {0} has no string value")]
    Empty(String),

    #[error("Secret {id} is not valid JSON: {source}")]
    Json {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Secret {id} is missing field {field}")]
    MissingField { id: String, field: &'static str },
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Raw `SecretString` of the secret
    async fn secret_string(&self, id: &str) -> Result<String, SecretError>;
}

/// Fetch a secret and decode its JSON body.
pub async fn fetch_json<T: DeserializeOwned>(
    store: &dyn SecretStore,
    id: &str,
) -> Result<T, SecretError> {
    let raw = store.secret_string(id).await?;
    serde_json::from_str(&raw).map_err(|source| SecretError::Json {
        id: id.to_string(),
        source,
    })
}

#[derive(Deserialize)]
struct ApiKeySecret {
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
}

/// Explorer API key from a `{"apiKey": "..."}` secret.
pub async fn explorer_api_key(store: &dyn SecretStore, id: &str) -> Result<String, SecretError> {
    info!("Fetching {}", id);
    let secret: ApiKeySecret = fetch_json(store, id).await?;
    secret
        .api_key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| SecretError::MissingField {
            id: id.to_string(),
            field: "apiKey",
        })
}

/// AWS Secrets Manager backed store
pub struct AwsSecretsManager {
    client: aws_sdk_secretsmanager::Client,
}

impl AwsSecretsManager {
    pub fn new(client: aws_sdk_secretsmanager::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretStore for AwsSecretsManager {
    async fn secret_string(&self, id: &str) -> Result<String, SecretError> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(id)
            .send()
            .await
            .map_err(|e| SecretError::Service {
                id: id.to_string(),
                message: aws_sdk_secretsmanager::error::DisplayErrorContext(&e).to_string(),
            })?;

        output
            .secret_string()
            .map(|s| s.to_string())
            .ok_or_else(|| SecretError::Empty(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticSecrets;

    #[tokio::test]
    async fn test_explorer_api_key() {
        let store = StaticSecrets::new().with("polygonscan", r#"{"apiKey": "ABC123"}"#);
        let key = explorer_api_key(&store, "polygonscan").await.unwrap();
        assert_eq!(key, "ABC123");
    }

    #[tokio::test]
    async fn test_explorer_api_key_missing_field() {
        let store = StaticSecrets::new().with("polygonscan", r#"{"key": "ABC123"}"#);
        let err = explorer_api_key(&store, "polygonscan").await.unwrap_err();
        assert!(matches!(err, SecretError::MissingField { field: "apiKey", .. }));
    }

    #[tokio::test]
    async fn test_fetch_json_rejects_non_json() {
        let store = StaticSecrets::new().with("broken", "not json");
        let err = fetch_json::<serde_json::Value>(&store, "broken")
            .await
            .unwrap_err();
        assert!(matches!(err, SecretError::Json { .. }));
    }
}
