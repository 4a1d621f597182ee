//! AWS session bootstrap.
//!
//! Built once at startup; the S3 and Secrets Manager clients handed to the
//! pipeline all share this configuration.

use crate::config::AwsConfig;
use aws_config::{BehaviorVersion, ConfigLoader, Region, SdkConfig};
use aws_credential_types::provider::ProvideCredentials;
use tracing::{info, warn};

/// Where a session's credentials come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Instance, task or function role via the default provider chain
    DefaultChain,
    /// Named profile from the local AWS config
    Profile(String),
}

/// Pick the credential source.
///
/// A configured profile always wins. Otherwise the default chain is used when
/// it resolves credentials, and the fallback profile when it does not.
pub fn credential_source(
    configured: Option<&str>,
    default_chain_resolves: bool,
    fallback: Option<&str>,
) -> CredentialSource {
    match (configured, default_chain_resolves, fallback) {
        (Some(profile), _, _) => CredentialSource::Profile(profile.to_string()),
        (None, true, _) => CredentialSource::DefaultChain,
        (None, false, Some(profile)) => CredentialSource::Profile(profile.to_string()),
        (None, false, None) => CredentialSource::DefaultChain,
    }
}

pub struct AwsContext {
    sdk_config: SdkConfig,
}

impl AwsContext {
    /// Resolve credentials for the configured region.
    pub async fn load(settings: &AwsConfig) -> Self {
        let loader = || {
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(settings.region.clone()))
        };

        let sdk_config = match &settings.profile {
            Some(profile) => Self::load_profile(loader(), profile).await,
            None => {
                let default_chain = loader().load().await;
                let resolves = Self::default_chain_resolves(&default_chain).await;

                match credential_source(None, resolves, settings.fallback_profile.as_deref()) {
                    CredentialSource::DefaultChain => {
                        info!("Running with instance profile credentials");
                        default_chain
                    }
                    CredentialSource::Profile(profile) => {
                        Self::load_profile(loader(), &profile).await
                    }
                }
            }
        };

        warn!(
            "AWS connection variables: region={}, bucket={}",
            settings.region, settings.bucket
        );

        Self { sdk_config }
    }

    async fn load_profile(loader: ConfigLoader, profile: &str) -> SdkConfig {
        warn!("Running with local credentials from profile {}", profile);
        loader.profile_name(profile).load().await
    }

    async fn default_chain_resolves(config: &SdkConfig) -> bool {
        match config.credentials_provider() {
            Some(provider) => provider.provide_credentials().await.is_ok(),
            None => false,
        }
    }

    pub fn s3(&self) -> aws_sdk_s3::Client {
        aws_sdk_s3::Client::new(&self.sdk_config)
    }

    pub fn secrets_manager(&self) -> aws_sdk_secretsmanager::Client {
        aws_sdk_secretsmanager::Client::new(&self.sdk_config)
    }
}
