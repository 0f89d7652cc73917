//! Runtime configuration
//!
//! Loaded from JSON (`from_json_str`) and/or the environment (`apply_env`).
//! Durations are written in humantime form, e.g. `"750ms"` or `"5s"`.

use std::time::Duration;

use herald_core::{HeraldError, HeraldResult};
use herald_state::{Backpressure, DEFAULT_MAILBOX_CAPACITY};
use serde::{Deserialize, Deserializer};

pub const ENV_LOG: &str = "HERALD_LOG";
pub const ENV_LOG_FORMAT: &str = "HERALD_LOG_FORMAT";
pub const ENV_MAILBOX_CAPACITY: &str = "HERALD_MAILBOX_CAPACITY";
pub const ENV_OPERATION_TIMEOUT: &str = "HERALD_OPERATION_TIMEOUT";

/// Log output format
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            filter: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Subscriber mailbox configuration
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct MailboxConfig {
    /// Queue every outcome instead of coalescing
    pub unbounded: bool,
    /// Coalescing capacity
    pub capacity: usize,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        MailboxConfig {
            unbounded: false,
            capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

impl MailboxConfig {
    pub fn backpressure(&self) -> HeraldResult<Backpressure> {
        if self.unbounded {
            Ok(Backpressure::Unbounded)
        } else {
            Backpressure::coalesce(self.capacity)
        }
    }
}

/// Runtime configuration
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub log: LogConfig,
    pub mailbox: MailboxConfig,
    /// Upper bound on any single backend call
    #[serde(deserialize_with = "deserialize_timeout")]
    pub operation_timeout: Option<Duration>,
    /// Key fetched by the strings feature's bound operation
    pub greeting_key: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            log: LogConfig::default(),
            mailbox: MailboxConfig::default(),
            operation_timeout: Some(Duration::from_secs(10)),
            greeting_key: "greeting".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Configuration for tests: verbose logs, unbounded mailboxes, short timeout
    pub fn for_tests() -> Self {
        RuntimeConfig {
            log: LogConfig {
                filter: "debug".to_string(),
                format: LogFormat::Pretty,
            },
            mailbox: MailboxConfig {
                unbounded: true,
                capacity: DEFAULT_MAILBOX_CAPACITY,
            },
            operation_timeout: Some(Duration::from_secs(1)),
            greeting_key: "greeting".to_string(),
        }
    }

    /// Parse and validate a JSON document; missing fields take defaults
    pub fn from_json_str(json: &str) -> HeraldResult<Self> {
        let config: RuntimeConfig =
            serde_json::from_str(json).map_err(|e| HeraldError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> HeraldResult<Self> {
        let mut config = RuntimeConfig::default();
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> HeraldResult<()> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, then validate
    pub fn apply_vars<F>(&mut self, lookup: F) -> HeraldResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(filter) = lookup(ENV_LOG) {
            self.log.filter = filter;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.log.format = match format.trim().to_ascii_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                other => {
                    return Err(HeraldError::InvalidConfig(format!(
                        "{ENV_LOG_FORMAT}: unknown format {other:?}"
                    )))
                }
            };
        }
        if let Some(capacity) = lookup(ENV_MAILBOX_CAPACITY) {
            let capacity = capacity.trim();
            if capacity.eq_ignore_ascii_case("unbounded") {
                self.mailbox.unbounded = true;
            } else {
                self.mailbox.unbounded = false;
                self.mailbox.capacity = capacity.parse().map_err(|e| {
                    HeraldError::InvalidConfig(format!("{ENV_MAILBOX_CAPACITY}: {e}"))
                })?;
            }
        }
        if let Some(timeout) = lookup(ENV_OPERATION_TIMEOUT) {
            self.operation_timeout = parse_timeout(&timeout)
                .map_err(|e| HeraldError::InvalidConfig(format!("{ENV_OPERATION_TIMEOUT}: {e}")))?;
        }
        self.validate()
    }

    pub fn validate(&self) -> HeraldResult<()> {
        if self.log.filter.trim().is_empty() {
            return Err(HeraldError::InvalidConfig("log filter is empty".to_string()));
        }
        self.mailbox.backpressure()?;
        if self.operation_timeout == Some(Duration::ZERO) {
            return Err(HeraldError::InvalidConfig(
                "operation timeout must be > 0".to_string(),
            ));
        }
        if self.greeting_key.is_empty() {
            return Err(HeraldError::InvalidConfig("greeting key is empty".to_string()));
        }
        Ok(())
    }
}

/// `"none"` disables the timeout
fn parse_timeout(raw: &str) -> Result<Option<Duration>, humantime::DurationError> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    humantime::parse_duration(raw).map(Some)
}

fn deserialize_timeout<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(raw) => parse_timeout(&raw).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mailbox.backpressure().unwrap(), Backpressure::default());
        assert!(RuntimeConfig::for_tests().validate().is_ok());
    }

    #[test]
    fn test_json_with_humantime_timeout() {
        let config = RuntimeConfig::from_json_str(
            r#"{
                "log": { "filter": "herald_state=trace", "format": "json" },
                "mailbox": { "capacity": 4 },
                "operation_timeout": "750ms"
            }"#,
        )
        .unwrap();

        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.filter, "herald_state=trace");
        assert_eq!(
            config.mailbox.backpressure().unwrap(),
            Backpressure::Coalesce { capacity: 4 }
        );
        assert_eq!(config.operation_timeout, Some(Duration::from_millis(750)));
        assert_eq!(config.greeting_key, "greeting");
    }

    #[test]
    fn test_json_rejects_unknown_fields_and_zero_capacity() {
        assert!(matches!(
            RuntimeConfig::from_json_str(r#"{ "mailbox": { "size": 3 } }"#),
            Err(HeraldError::InvalidConfig(_))
        ));
        assert!(matches!(
            RuntimeConfig::from_json_str(r#"{ "mailbox": { "capacity": 0 } }"#),
            Err(HeraldError::ZeroMailboxCapacity)
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = RuntimeConfig::default();
        config
            .apply_vars(vars(&[
                (ENV_LOG, "warn"),
                (ENV_LOG_FORMAT, "JSON"),
                (ENV_MAILBOX_CAPACITY, "unbounded"),
                (ENV_OPERATION_TIMEOUT, "none"),
            ]))
            .unwrap();

        assert_eq!(config.log.filter, "warn");
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.mailbox.backpressure().unwrap(), Backpressure::Unbounded);
        assert_eq!(config.operation_timeout, None);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = RuntimeConfig::default();
        assert!(config
            .apply_vars(vars(&[(ENV_OPERATION_TIMEOUT, "soon")]))
            .is_err());
        assert!(config
            .apply_vars(vars(&[(ENV_MAILBOX_CAPACITY, "lots")]))
            .is_err());
        assert!(config
            .apply_vars(vars(&[(ENV_LOG_FORMAT, "xml")]))
            .is_err());
    }
}
