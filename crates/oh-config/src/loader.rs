//! YAML configuration loader
//!
//! Supports the `!env_var VAR` tag for individual values, then applies the
//! `OPENHAB_*` environment overrides and validates the result.

use serde_yaml::value::TaggedValue;
use serde_yaml::Value;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ConfigError, ConfigResult};

/// Load a client configuration file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<ClientConfig> {
    let path = path.as_ref();
    debug!("Loading config file: {:?}", path);

    let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_str(&content, path)
}

/// Load a client configuration from YAML text
///
/// `source_path` is only used for error messages.
pub fn load_config_str(content: &str, source_path: &Path) -> ConfigResult<ClientConfig> {
    let parse_error = |e| ConfigError::ParseYaml {
        path: source_path.to_path_buf(),
        source: e,
    };

    let value: Value = serde_yaml::from_str(content).map_err(parse_error)?;
    let value = resolve_env_tags(value, &|var| std::env::var(var).ok())?;

    let mut config: ClientConfig = if value.is_null() {
        ClientConfig::default()
    } else {
        serde_yaml::from_value(value).map_err(parse_error)?
    };

    config.apply_env();
    config.validate()?;
    Ok(config)
}

fn resolve_env_tags(value: Value, lookup: &dyn Fn(&str) -> Option<String>) -> ConfigResult<Value> {
    match value {
        Value::Tagged(tagged) => resolve_tag(*tagged, lookup),
        Value::Mapping(map) => {
            let mut resolved = serde_yaml::Mapping::with_capacity(map.len());
            for (k, v) in map {
                resolved.insert(k, resolve_env_tags(v, lookup)?);
            }
            Ok(Value::Mapping(resolved))
        }
        Value::Sequence(seq) => seq
            .into_iter()
            .map(|v| resolve_env_tags(v, lookup))
            .collect::<ConfigResult<Vec<_>>>()
            .map(Value::Sequence),
        other => Ok(other),
    }
}

fn resolve_tag(tagged: TaggedValue, lookup: &dyn Fn(&str) -> Option<String>) -> ConfigResult<Value> {
    if tagged.tag != "env_var" {
        return Err(ConfigError::InvalidValue {
            key: tagged.tag.to_string(),
            reason: "unsupported YAML tag".to_string(),
        });
    }

    let var = tagged
        .value
        .as_str()
        .ok_or_else(|| ConfigError::InvalidValue {
            key: "!env_var".to_string(),
            reason: "expected a variable name".to_string(),
        })?;

    lookup(var)
        .map(Value::String)
        .ok_or_else(|| ConfigError::EnvVarNotFound {
            var: var.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            r#"
url: http://openhab.local:8080
request_timeout: 10s
event_topics: "openhab/items/*"
backoff:
  initial: 250ms
  max: "01:00"
  jitter: 0
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.base_url(), "http://openhab.local:8080");
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.event_topics.as_deref(), Some("openhab/items/*"));
        assert_eq!(config.backoff.initial, Duration::from_millis(250));
        assert_eq!(config.backoff.max, Duration::from_secs(60));
        assert_eq!(config.backoff.jitter, Duration::ZERO);
        // Unset fields keep their defaults
        assert_eq!(config.backoff.multiplier, 2.0);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_missing_file() {
        let result = load_config("/nonexistent/config.yaml");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_invalid_yaml() {
        let result = load_config_str("url: [unclosed", &PathBuf::from("inline"));
        assert!(matches!(result, Err(ConfigError::ParseYaml { .. })));
    }

    #[test]
    fn test_out_of_range_duration() {
        let result = load_config_str("request_timeout: 1.0e30\n", &PathBuf::from("inline"));
        assert!(matches!(result, Err(ConfigError::ParseYaml { .. })));

        let result = load_config_str(
            "request_timeout: \"9999999999999999:00:00\"\n",
            &PathBuf::from("inline"),
        );
        assert!(matches!(result, Err(ConfigError::ParseYaml { .. })));
    }

    #[test]
    fn test_env_var_tag() {
        let value: Value = serde_yaml::from_str("api_token: !env_var MY_TOKEN\n").unwrap();
        let resolved = resolve_env_tags(value, &|var| {
            (var == "MY_TOKEN").then(|| "secret".to_string())
        })
        .unwrap();
        assert_eq!(resolved["api_token"], Value::String("secret".to_string()));

        let value: Value = serde_yaml::from_str("api_token: !env_var MISSING\n").unwrap();
        let result = resolve_env_tags(value, &|_| None);
        assert!(matches!(result, Err(ConfigError::EnvVarNotFound { var }) if var == "MISSING"));
    }

    #[test]
    fn test_unknown_tag() {
        let value: Value = serde_yaml::from_str("url: !secret url\n").unwrap();
        assert!(resolve_env_tags(value, &|_| None).is_err());
    }
}
