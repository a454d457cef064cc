// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Bridge configuration: credentials, polling cadence, timeouts and retry budgets

use crate::errors::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_COGNITO_CLIENT_ID: &str = "2tbuisnbl1t2a5gc36lhb2b6c3";
pub const DEFAULT_COGNITO_REGION: &str = "eu-west-1";
pub const DEFAULT_API_BASE_URL: &str = "https://end-user-api.prod.garo-next-gen.com";

fn default_client_id() -> String {
    DEFAULT_COGNITO_CLIENT_ID.to_owned()
}

fn default_region() -> String {
    DEFAULT_COGNITO_REGION.to_owned()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_owned()
}

fn default_900() -> u64 {
    900
}

fn default_connector() -> u32 {
    1
}

fn default_30() -> u64 {
    30
}

fn default_60() -> u64 {
    60
}

fn default_15() -> u64 {
    15
}

fn default_3() -> u32 {
    3
}

fn default_500() -> u64 {
    500
}

fn default_10() -> u32 {
    10
}

fn default_2() -> u64 {
    2
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub credentials: Credentials,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub trigger: TriggerConfig,
}

/// Credentials for one Garo account. Immutable once handed to a token manager.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_client_id")]
    pub cognito_client_id: String,

    #[serde(default = "default_region")]
    pub cognito_region: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Overrides the regional Cognito endpoint (tests, proxies)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_endpoint: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn identity_endpoint(&self) -> String {
        self.identity_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://cognito-idp.{}.amazonaws.com/", self.cognito_region))
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            cognito_client_id: default_client_id(),
            cognito_region: default_region(),
            api_base_url: default_api_base_url(),
            identity_endpoint: None,
        }
    }
}

// Keep the identity and password out of logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &"<redacted>")
            .field("password", &"<redacted>")
            .field("cognito_client_id", &self.cognito_client_id)
            .field("cognito_region", &self.cognito_region)
            .field("api_base_url", &self.api_base_url)
            .field("identity_endpoint", &self.identity_endpoint)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Seconds between refresh cycles
    #[serde(default = "default_900")]
    pub update_interval_secs: u64,

    /// Connector addressed by meter, trigger and transaction calls
    #[serde(default = "default_connector")]
    pub connector_id: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: 900,
            connector_id: 1,
        }
    }
}

impl PollingConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }
}

/// Per-call and per-resource-type time budgets, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_30")]
    pub call_secs: u64,

    #[serde(default = "default_30")]
    pub count_secs: u64,

    #[serde(default = "default_60")]
    pub meter_values_secs: u64,

    #[serde(default = "default_30")]
    pub connector_status_secs: u64,

    #[serde(default = "default_30")]
    pub configuration_secs: u64,

    #[serde(default = "default_30")]
    pub transactions_secs: u64,

    #[serde(default = "default_15")]
    pub user_info_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            call_secs: 30,
            count_secs: 30,
            meter_values_secs: 60,
            connector_status_secs: 30,
            configuration_secs: 30,
            transactions_secs: 30,
            user_info_secs: 15,
        }
    }
}

impl TimeoutConfig {
    /// Every budget with its TOML key
    fn entries(&self) -> [(&'static str, u64); 7] {
        [
            ("call_secs", self.call_secs),
            ("count_secs", self.count_secs),
            ("meter_values_secs", self.meter_values_secs),
            ("connector_status_secs", self.connector_status_secs),
            ("configuration_secs", self.configuration_secs),
            ("transactions_secs", self.transactions_secs),
            ("user_info_secs", self.user_info_secs),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_3")]
    pub max_retries: u32,

    #[serde(default = "default_500")]
    pub retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

impl RetryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default = "default_10")]
    pub max_attempts: u32,

    #[serde(default = "default_2")]
    pub delay_secs: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay_secs: 2,
        }
    }
}

impl TriggerConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

impl BridgeConfig {
    /// Parse a TOML document, then fill missing credentials from the environment
    pub fn from_toml_str(content: &str) -> ApiResult<Self> {
        let mut config: Self = toml::from_str(content)
            .map_err(|e| ApiError::Config(format!("Failed to parse config: {e}")))?;
        config.apply_env_fallbacks(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file; a missing file means "defaults + environment"
    pub fn load(path: &Path) -> ApiResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                ApiError::Config(format!("Failed to read {}: {e}", path.display()))
            })?;
            info!("Loading configuration from {}", path.display());
            Self::from_toml_str(&content)
        } else {
            info!(
                "No configuration file at {}, using defaults and environment",
                path.display()
            );
            Self::from_toml_str("")
        }
    }

    fn apply_env_fallbacks(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.credentials.username.is_empty()
            && let Some(username) = lookup("GARO_USERNAME")
        {
            self.credentials.username = username;
        }
        if self.credentials.password.is_empty()
            && let Some(password) = lookup("GARO_PASSWORD")
        {
            self.credentials.password = password;
        }
        if self.credentials.api_base_url == DEFAULT_API_BASE_URL
            && let Some(base_url) = lookup("GARO_API_BASE_URL")
        {
            self.credentials.api_base_url = base_url;
        }
    }

    fn validate(&self) -> ApiResult<()> {
        if self.credentials.username.is_empty() || self.credentials.password.is_empty() {
            return Err(ApiError::Config(
                "Garo username/password not found in config or GARO_USERNAME/GARO_PASSWORD"
                    .to_owned(),
            ));
        }
        if self.trigger.max_attempts == 0 {
            return Err(ApiError::Config(
                "trigger.max_attempts must be at least 1".to_owned(),
            ));
        }
        if self.polling.update_interval_secs == 0 {
            return Err(ApiError::Config(
                "polling.update_interval_secs must be at least 1".to_owned(),
            ));
        }
        if let Some((key, _)) = self.timeouts.entries().into_iter().find(|(_, secs)| *secs == 0) {
            return Err(ApiError::Config(format!("timeouts.{key} must be at least 1")));
        }
        Ok(())
    }
}
