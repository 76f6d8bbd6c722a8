//! Client configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::duration::serde_duration;
use crate::error::{ConfigError, ConfigResult};

/// Reconnect backoff settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay used for the first retry and after a stable connection
    #[serde(with = "serde_duration")]
    pub initial: Duration,

    /// Growth factor applied to the previous delay
    pub multiplier: f64,

    /// Upper bound for a delay
    #[serde(with = "serde_duration")]
    pub max: Duration,

    /// Lower bound for a delay
    #[serde(with = "serde_duration")]
    pub min: Duration,

    /// Symmetric random spread added to every delay
    #[serde(with = "serde_duration")]
    pub jitter: Duration,

    /// How long a connection must stay open before backoff resets
    #[serde(with = "serde_duration")]
    pub stable_after: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            multiplier: 2.0,
            max: Duration::from_secs(30),
            min: Duration::from_millis(500),
            jitter: Duration::from_millis(250),
            stable_after: Duration::from_secs(10),
        }
    }
}

/// Configuration for a client connection to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server base URL, e.g. `http://openhab:8080`
    pub url: String,

    /// API token sent as a bearer token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Basic auth user name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Basic auth password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Timeout for REST requests (not applied to the event stream)
    #[serde(with = "serde_duration")]
    pub request_timeout: Duration,

    /// Server-side topic filter for the event stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_topics: Option<String>,

    /// Reconnect backoff settings
    pub backoff: BackoffConfig,

    /// Default log filter when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            api_token: None,
            username: None,
            password: None,
            request_timeout: Duration::from_secs(30),
            event_topics: None,
            backoff: BackoffConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden from the process environment
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|var| std::env::var(var).ok());
    }

    /// Override fields using the given variable lookup
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("OPENHAB_URL") {
            self.url = url;
        }
        if let Some(token) = lookup("OPENHAB_TOKEN") {
            self.api_token = Some(token);
        }
        if let Some(user) = lookup("OPENHAB_USER") {
            self.username = Some(user);
        }
        if let Some(password) = lookup("OPENHAB_PASSWORD") {
            self.password = Some(password);
        }
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Check the configuration for values that cannot work
    pub fn validate(&self) -> ConfigResult<()> {
        if self.url.trim().is_empty() {
            return Err(invalid("url", "must not be empty"));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(invalid("url", "must start with http:// or https://"));
        }

        let backoff = &self.backoff;
        if !backoff.multiplier.is_finite() || backoff.multiplier < 1.0 {
            return Err(invalid("backoff.multiplier", "must be at least 1.0"));
        }
        if backoff.min > backoff.max {
            return Err(invalid("backoff.min", "must not exceed backoff.max"));
        }
        if backoff.initial.is_zero() {
            return Err(invalid("backoff.initial", "must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.backoff.initial, Duration::from_secs(1));
        assert_eq!(config.backoff.multiplier, 2.0);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPENHAB_URL", "https://home.example:8443/"),
            ("OPENHAB_TOKEN", "oh.token"),
        ]
        .into_iter()
        .collect();

        let mut config = ClientConfig::default();
        config.apply_env_from(|var| env.get(var).map(|v| v.to_string()));

        assert_eq!(config.url, "https://home.example:8443/");
        assert_eq!(config.base_url(), "https://home.example:8443");
        assert_eq!(config.api_token.as_deref(), Some("oh.token"));
        assert!(config.username.is_none());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = ClientConfig::default();
        config.url = String::new();
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.url = "ftp://x".to_string();
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.backoff.multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.backoff.min = Duration::from_secs(60);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "backoff.min"
        ));
    }
}
