//! Client configuration.
//!
//! A `ClientConfig` can be built in code, deserialized from whatever format
//! the host application uses, or read from `CIMI_*` environment variables.

use std::env;
use std::time::Duration;

use serde::Deserialize;

use crate::auth::Credentials;
use crate::error::CimiError;

pub const ENV_ENDPOINT: &str = "CIMI_ENDPOINT";
pub const ENV_USERNAME: &str = "CIMI_USERNAME";
pub const ENV_PASSWORD: &str = "CIMI_PASSWORD";
pub const ENV_TOKEN: &str = "CIMI_TOKEN";
pub const ENV_TIMEOUT_SECS: &str = "CIMI_TIMEOUT_SECS";

/// Settings needed to construct a `CimiClient`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Entry point of the CIMI service, e.g. `https://cloud.example.org/cimi`.
    pub base_url: String,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    /// Global per-request timeout. `None` leaves the transport default.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            credentials: None,
            timeout_secs: None,
        }
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Read configuration from the process environment.
    ///
    /// `CIMI_TOKEN` wins over `CIMI_USERNAME`/`CIMI_PASSWORD` when both are set.
    pub fn from_env() -> Result<Self, CimiError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CimiError> {
        let base_url = lookup(ENV_ENDPOINT)
            .ok_or_else(|| CimiError::Config(format!("{ENV_ENDPOINT} must be set")))?;
        let mut config = Self::new(base_url);

        if let Some(token) = lookup(ENV_TOKEN) {
            config.credentials = Some(Credentials::bearer(token));
        } else if let Some(username) = lookup(ENV_USERNAME) {
            let password = lookup(ENV_PASSWORD).ok_or_else(|| {
                CimiError::Config(format!("{ENV_PASSWORD} must be set with {ENV_USERNAME}"))
            })?;
            config.credentials = Some(Credentials::basic(username, password));
        }

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs = raw
                .parse()
                .map_err(|e| CimiError::Config(format!("{ENV_TIMEOUT_SECS}={raw}: {e}")))?;
            config.timeout_secs = Some(secs);
        }
        Ok(config)
    }
}
