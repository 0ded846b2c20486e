//! TOML-based application configuration.
//!
//! Stores operator settings including:
//! - Liveness thresholds, sweep interval and worker concurrency
//! - Timeouts for the store and the external capabilities
//! - Enrichment endpoint (absent means enrichment is disabled)
//! - Notification webhook
//! - Log level
//!
//! Configuration is stored at `~/.config/howubeen/config.toml`.

use std::path::PathBuf;
use std::time::Duration as StdDuration;

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::liveness::Thresholds;

/// Inactivity escalation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    #[serde(default = "default_warning_after_hours")]
    pub warning_after_hours: u32,
    #[serde(default = "default_emergency_after_hours")]
    pub emergency_after_hours: u32,
    #[serde(default = "default_sweep_interval_minutes")]
    pub sweep_interval_minutes: u32,
    /// Users evaluated in parallel during one sweep.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

/// Per-call timeouts, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_store_ms")]
    pub store_ms: u64,
    #[serde(default = "default_enrichment_ms")]
    pub enrichment_ms: u64,
    #[serde(default = "default_notification_ms")]
    pub notification_ms: u64,
}

/// Enrichment capability settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Base URL exposing `/transcribe` and `/extract`.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Notification transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Webhook receiving `{to, subject, body, from}`. Unset means log only.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_sender")]
    pub sender: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/howubeen/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default functions
fn default_warning_after_hours() -> u32 {
    24
}
fn default_emergency_after_hours() -> u32 {
    48
}
fn default_sweep_interval_minutes() -> u32 {
    60
}
fn default_max_concurrency() -> usize {
    8
}
fn default_store_ms() -> u64 {
    5_000
}
fn default_enrichment_ms() -> u64 {
    15_000
}
fn default_notification_ms() -> u64 {
    10_000
}
fn default_sender() -> String {
    "HowUBeen Safety <safety@howubeen.app>".into()
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            warning_after_hours: default_warning_after_hours(),
            emergency_after_hours: default_emergency_after_hours(),
            sweep_interval_minutes: default_sweep_interval_minutes(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            store_ms: default_store_ms(),
            enrichment_ms: default_enrichment_ms(),
            notification_ms: default_notification_ms(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            sender: default_sender(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LivenessConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            warning_after: chrono::Duration::hours(i64::from(self.warning_after_hours)),
            emergency_after: chrono::Duration::hours(i64::from(self.emergency_after_hours)),
        }
    }

    pub fn sweep_interval(&self) -> StdDuration {
        StdDuration::from_secs(u64::from(self.sweep_interval_minutes) * 60)
    }
}

impl TimeoutsConfig {
    pub fn store(&self) -> StdDuration {
        StdDuration::from_millis(self.store_ms)
    }
    pub fn enrichment(&self) -> StdDuration {
        StdDuration::from_millis(self.enrichment_ms)
    }
    pub fn notification(&self) -> StdDuration {
        StdDuration::from_millis(self.notification_ms)
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    // Optional strings are stored as null until set; "none" clears them.
                    serde_json::Value::Null | serde_json::Value::String(_)
                        if value.eq_ignore_ascii_case("none") =>
                    {
                        serde_json::Value::Null
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Reject combinations the monitor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let liveness = &self.liveness;
        if liveness.warning_after_hours == 0 {
            return Err(ConfigError::InvalidValue {
                key: "liveness.warning_after_hours".into(),
                message: "must be at least 1".into(),
            });
        }
        if liveness.emergency_after_hours <= liveness.warning_after_hours {
            return Err(ConfigError::InvalidValue {
                key: "liveness.emergency_after_hours".into(),
                message: format!(
                    "must exceed warning_after_hours ({})",
                    liveness.warning_after_hours
                ),
            });
        }
        if liveness.sweep_interval_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "liveness.sweep_interval_minutes".into(),
                message: "must be at least 1".into(),
            });
        }
        if liveness.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "liveness.max_concurrency".into(),
                message: "must be at least 1".into(),
            });
        }
        for (key, url) in [
            ("enrichment.endpoint", &self.enrichment.endpoint),
            ("notifications.webhook_url", &self.notifications.webhook_url),
        ] {
            if let Some(url) = url {
                url::Url::parse(url).map_err(|e| ConfigError::InvalidValue {
                    key: key.into(),
                    message: e.to_string(),
                })?;
            }
        }
        Ok(())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("config.toml"))
            .map_err(|e| ConfigError::LoadFailed {
                path: PathBuf::from("config.toml"),
                message: e.to_string(),
            })
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing defaults there when it is missing.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config =
                    toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without persisting. Returns error if key is
    /// unknown or the result fails validation.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a config value by key and persist it.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.set_value(key, value)?;
        self.save()
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.liveness.warning_after_hours, 24);
        assert_eq!(parsed.liveness.emergency_after_hours, 48);
        assert!(!parsed.enrichment.enabled);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[liveness]\nwarning_after_hours = 12\n").unwrap();
        assert_eq!(parsed.liveness.warning_after_hours, 12);
        assert_eq!(parsed.liveness.emergency_after_hours, 48);
        assert_eq!(parsed.timeouts.store_ms, 5_000);
    }

    #[test]
    fn thresholds_follow_config() {
        let mut cfg = Config::default();
        cfg.liveness.warning_after_hours = 2;
        cfg.liveness.emergency_after_hours = 3;
        let t = cfg.liveness.thresholds();
        assert_eq!(t.warning_after, chrono::Duration::hours(2));
        assert_eq!(t.emergency_after, chrono::Duration::hours(3));
        assert_eq!(cfg.liveness.sweep_interval(), StdDuration::from_secs(3600));
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("liveness.max_concurrency").as_deref(), Some("8"));
        assert_eq!(cfg.get("enrichment.enabled").as_deref(), Some("false"));
        assert!(cfg.get("liveness.missing_key").is_none());
    }

    #[test]
    fn set_value_updates_nested_number_and_bool() {
        let mut cfg = Config::default();
        cfg.set_value("timeouts.enrichment_ms", "250").unwrap();
        cfg.set_value("enrichment.enabled", "true").unwrap();
        assert_eq!(cfg.timeouts.enrichment_ms, 250);
        assert!(cfg.enrichment.enabled);
    }

    #[test]
    fn set_value_fills_and_clears_optional_string() {
        let mut cfg = Config::default();
        cfg.set_value("notifications.webhook_url", "https://hooks.example.com/x")
            .unwrap();
        assert_eq!(
            cfg.notifications.webhook_url.as_deref(),
            Some("https://hooks.example.com/x")
        );
        cfg.set_value("notifications.webhook_url", "none").unwrap();
        assert!(cfg.notifications.webhook_url.is_none());
    }

    #[test]
    fn set_value_rejects_unknown_key() {
        let mut cfg = Config::default();
        let err = cfg.set_value("liveness.nonexistent", "1").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(_)));
    }

    #[test]
    fn set_value_rejects_invalid_type() {
        let mut cfg = Config::default();
        assert!(cfg.set_value("enrichment.enabled", "not_a_bool").is_err());
        assert!(cfg.set_value("liveness.max_concurrency", "-3").is_err());
    }

    #[test]
    fn set_value_rejects_inverted_thresholds() {
        let mut cfg = Config::default();
        let err = cfg
            .set_value("liveness.emergency_after_hours", "24")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        // Rejected values leave the config untouched.
        assert_eq!(cfg.liveness.emergency_after_hours, 48);
    }

    #[test]
    fn validate_rejects_bad_url() {
        let mut cfg = Config::default();
        cfg.notifications.webhook_url = Some("not a url".into());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_from_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.liveness.sweep_interval_minutes, 60);
        assert!(path.exists());

        std::fs::write(&path, "[liveness]\nmax_concurrency = 2\n").unwrap();
        assert_eq!(Config::load_from(&path).unwrap().liveness.max_concurrency, 2);
    }
}
