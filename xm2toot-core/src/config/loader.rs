//! Configuration loading and management

use super::schema::Config;
use super::validate::validate_config;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment prefix for path overrides, e.g. `XM2TOOT__XMPP__MUC_NICK`
const ENV_PREFIX: &str = "XM2TOOT__";

/// Configuration loader
pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Create a loader reading the given file
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    /// Load configuration from file and environment
    ///
    /// Defaults are overlaid with the file (if present), then with alias
    /// and path environment variables. The result is validated as a whole.
    pub fn load(&self) -> crate::Result<Config> {
        let mut merged = serde_json::to_value(Config::default())?;

        if self.config_path.exists() {
            debug!("Reading config from {}", self.config_path.display());
            let content = std::fs::read_to_string(&self.config_path)?;
            let file_value: Value = serde_json::from_str(&content).map_err(|e| {
                crate::Error::Config(format!("{}: {}", self.config_path.display(), e))
            })?;
            merge_values(&mut merged, file_value);
        } else {
            debug!(
                "Config file {} not found, using environment only",
                self.config_path.display()
            );
        }

        apply_alias_overrides(&mut merged);
        apply_path_overrides(&mut merged);

        let config: Config = serde_json::from_value(merged)?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Get the config file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if let Some(existing) = base_map.get_mut(&key) {
                    merge_values(existing, value);
                } else {
                    base_map.insert(key, value);
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value;
        }
    }
}

fn parse_env_value(raw: &str) -> Value {
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        return v;
    }
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    Value::String(raw.to_string())
}

fn set_path_value(root: &mut Value, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return;
    };

    let mut current = root;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Some(map) = current.as_object_mut() {
        map.insert(last.clone(), value);
    }
}

fn apply_alias_overrides(config: &mut Value) {
    let aliases = [
        ("XMPP_PASSWORD", "xmpp.password"),
        ("MASTODON_TOKEN", "mastodon.token"),
    ];

    for (env_key, target_path) in aliases {
        if let Ok(value) = std::env::var(env_key) {
            let path: Vec<String> = target_path.split('.').map(ToString::to_string).collect();
            set_path_value(config, &path, Value::String(value));
        }
    }
}

fn apply_path_overrides(config: &mut Value) {
    for (key, value) in std::env::vars() {
        let Some(suffix) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let segments: Vec<String> = suffix
            .split("__")
            .filter(|s| !s.is_empty())
            .map(|s| s.to_ascii_lowercase())
            .collect();
        if segments.is_empty() {
            continue;
        }
        // Secrets and nicknames stay strings even if they look like numbers.
        let parsed = match parse_env_value(&value) {
            Value::Number(_) | Value::Bool(_) if is_string_field(&segments) => {
                Value::String(value.clone())
            }
            other => other,
        };
        set_path_value(config, &segments, parsed);
    }
}

fn is_string_field(segments: &[String]) -> bool {
    !matches!(
        segments.first().map(String::as_str),
        Some("bridge")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::{Mutex, MutexGuard};
    use tempfile::TempDir;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    struct EnvVarGuard {
        key: String,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &str, value: &str) -> Self {
            let original = std::env::var(key).ok();
            // SAFETY: tests serialize env mutations with ENV_LOCK.
            unsafe { std::env::set_var(key, value) };
            Self {
                key: key.to_string(),
                original,
            }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.original {
                // SAFETY: tests serialize env mutations with ENV_LOCK.
                unsafe { std::env::set_var(&self.key, value) };
            } else {
                // SAFETY: tests serialize env mutations with ENV_LOCK.
                unsafe { std::env::remove_var(&self.key) };
            }
        }
    }

    fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    const COMPLETE: &str = r#"{
  "xmpp": {
    "username": "bot@example.org",
    "password": "secret",
    "muc": "meetup@conference.example.org",
    "muc_nick": "bot",
    "admins": ["admin@example.org"]
  },
  "mastodon": {
    "instance": "mastodon.example",
    "token": "file-token",
    "account": "bot"
  }
}"#;

    fn write_config(dir: &TempDir, content: &str) -> ConfigLoader {
        std::fs::write(dir.path().join("config.json"), content).unwrap();
        ConfigLoader::with_path(dir.path().join("config.json"))
    }

    #[test]
    fn test_load_complete_file() {
        let _lock = lock_env();
        let temp_dir = TempDir::new().unwrap();
        let config = write_config(&temp_dir, COMPLETE).load().unwrap();

        assert_eq!(config.xmpp.muc_nick, "bot");
        assert_eq!(config.xmpp.admins, vec!["admin@example.org"]);
        assert_eq!(config.mastodon.token, "file-token");
        assert_eq!(config.bridge.retry_delay_secs, 10);
    }

    #[test]
    fn test_missing_file_fails_validation() {
        let _lock = lock_env();
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_path(temp_dir.path().join("config.json"));

        let err = loader.load().unwrap_err();
        assert!(err.to_string().contains("xmpp.username is required"));
    }

    #[test]
    fn test_malformed_file_names_path() {
        let _lock = lock_env();
        let temp_dir = TempDir::new().unwrap();
        let loader = write_config(&temp_dir, "{ not json");

        let err = loader.load().unwrap_err();
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn test_alias_env_overrides_file() {
        let _lock = lock_env();
        let _token = EnvVarGuard::set("MASTODON_TOKEN", "env-token");

        let temp_dir = TempDir::new().unwrap();
        let config = write_config(&temp_dir, COMPLETE).load().unwrap();
        assert_eq!(config.mastodon.token, "env-token");
    }

    #[test]
    fn test_path_env_overrides() {
        let _lock = lock_env();
        let _nick = EnvVarGuard::set("XM2TOOT__XMPP__MUC_NICK", "tooter");
        let _retry = EnvVarGuard::set("XM2TOOT__BRIDGE__RETRY_DELAY_SECS", "3");
        let _admins = EnvVarGuard::set("XM2TOOT__XMPP__ADMINS", r#"["a@example.org"]"#);

        let temp_dir = TempDir::new().unwrap();
        let config = write_config(&temp_dir, COMPLETE).load().unwrap();

        assert_eq!(config.xmpp.muc_nick, "tooter");
        assert_eq!(config.bridge.retry_delay_secs, 3);
        assert_eq!(config.xmpp.admins, vec!["a@example.org"]);
    }

    #[test]
    fn test_numeric_secret_stays_string() {
        let _lock = lock_env();
        let _password = EnvVarGuard::set("XM2TOOT__XMPP__PASSWORD", "123456");

        let temp_dir = TempDir::new().unwrap();
        let config = write_config(&temp_dir, COMPLETE).load().unwrap();
        assert_eq!(config.xmpp.password, "123456");
    }
}
