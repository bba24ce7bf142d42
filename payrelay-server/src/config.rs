//! Environment-based configuration.
//!
//! The backing store is named by a single `REDIS_URL` variable; the two
//! processor base URLs default to the conventional in-network hostnames and
//! can be overridden per environment.

use thiserror::Error;

/// Environment variable naming the backing-store endpoint.
const STORE_URL_VAR: &str = "REDIS_URL";
/// Overrides for the processor base URLs.
const DEFAULT_PROVIDER_VAR: &str = "PROCESSOR_DEFAULT_URL";
const FALLBACK_PROVIDER_VAR: &str = "PROCESSOR_FALLBACK_URL";

const DEFAULT_PROVIDER_URL: &str = "http://payment-processor-default:8080";
const FALLBACK_PROVIDER_URL: &str = "http://payment-processor-fallback:8080";

/// Errors that can occur while reading the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("REDIS_URL environment variable not set")]
    MissingStoreUrl,
}

/// Read the backing-store URL from the environment.
pub fn get_store_url() -> Result<String, ConfigError> {
    std::env::var(STORE_URL_VAR).map_err(|_| ConfigError::MissingStoreUrl)
}

/// Base URLs of the two external payment processors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub default_url: String,
    pub fallback_url: String,
}

impl ProviderEndpoints {
    /// Read the processor endpoints, falling back to the conventional
    /// in-network hostnames.
    pub fn from_env() -> Self {
        Self {
            default_url: std::env::var(DEFAULT_PROVIDER_VAR)
                .unwrap_or_else(|_| DEFAULT_PROVIDER_URL.to_string()),
            fallback_url: std::env::var(FALLBACK_PROVIDER_VAR)
                .unwrap_or_else(|_| FALLBACK_PROVIDER_URL.to_string()),
        }
    }
}
