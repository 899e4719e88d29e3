//! Provider configuration
//!
//! Built from the `provider aws { ... }` block, falling back to the
//! environment and then to defaults.

use std::env;
use std::time::Duration;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use keel_core::parser::ProviderConfig;

use crate::schemas::types::is_valid_region;

pub const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsConfig {
    pub region: String,
    /// Custom endpoint, e.g. a local emulator
    pub endpoint_url: Option<String>,
    /// Delay between status polls while waiting on a resource
    pub poll_interval: Duration,
    pub create_timeout: Duration,
    pub update_timeout: Duration,
    pub delete_timeout: Duration,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            endpoint_url: None,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            create_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            update_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            delete_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl AwsConfig {
    /// Configuration from the environment only
    pub fn from_env() -> Self {
        Self::from_provider_config(None)
    }

    /// Configuration from a `provider aws` block, with environment fallbacks
    pub fn from_provider_config(block: Option<&ProviderConfig>) -> Self {
        let mut config = Self::default();

        config.region = block
            .and_then(|b| b.get_string("region"))
            .map(str::to_string)
            .or_else(|| env::var("AWS_REGION").ok())
            .unwrap_or(config.region);

        config.endpoint_url = block
            .and_then(|b| b.get_string("endpoint_url"))
            .map(str::to_string)
            .or_else(|| env::var("AWS_ENDPOINT_URL").ok());

        let secs = |key: &str| {
            block
                .and_then(|b| b.get_int(key))
                .and_then(|n| u64::try_from(n).ok())
                .map(Duration::from_secs)
        };
        if let Some(d) = secs("poll_interval_secs") {
            config.poll_interval = d;
        }
        if let Some(d) = secs("create_timeout_secs") {
            config.create_timeout = d;
        }
        if let Some(d) = secs("update_timeout_secs") {
            config.update_timeout = d;
        }
        if let Some(d) = secs("delete_timeout_secs") {
            config.delete_timeout = d;
        }

        config
    }

    /// Check that the configured region is well formed
    pub fn validate(&self) -> Result<(), String> {
        if is_valid_region(&self.region) {
            Ok(())
        } else {
            Err(format!(
                "Invalid region '{}', expected a region like us-east-1",
                self.region
            ))
        }
    }

    /// Poll immediately; used with in-memory backends
    pub fn without_delays(mut self) -> Self {
        self.poll_interval = Duration::ZERO;
        self
    }

    /// Load the shared SDK configuration for this region and endpoint
    pub async fn load_sdk_config(&self) -> SdkConfig {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(self.region.clone()));
        if let Some(endpoint) = &self.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        loader.load().await
    }
}
