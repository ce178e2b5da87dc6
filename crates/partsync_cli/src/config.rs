//! CLI configuration: JSON file, then `PARTSYNC_*` environment overrides.

use crate::error::{CliError, CliResult};
use partsync_engine::{RetryConfig, SyncConfig};
use partsync_protocol::SyncableTable;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Backend base URL, e.g. `https://shop.example.com/api`.
    pub server_url: String,
    /// Local database file.
    pub db_path: PathBuf,
    /// Bearer token, passed through as-is.
    pub auth_token: Option<String>,
    /// Signed-in user, for favorites.
    pub user_id: Option<String>,
    /// Tables pulled by default. Empty means the built-in set.
    pub default_tables: Vec<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Interval between `watch` cycles in seconds.
    pub watch_interval_secs: u64,
    /// Attempts per pull, the first one included.
    pub max_attempts: u32,
}

fn home() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            db_path: home().join(".partsync").join("partsync.db"),
            auth_token: None,
            user_id: None,
            default_tables: Vec::new(),
            timeout_secs: 30,
            watch_interval_secs: 300,
            max_attempts: 3,
        }
    }
}

impl CliConfig {
    /// Loads configuration with priority: env vars > config file > defaults.
    pub fn load(config_path: Option<PathBuf>) -> CliResult<Self> {
        let path = config_path.unwrap_or_else(Self::default_config_path);
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|source| CliError::ConfigRead {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&contents)
                .map_err(|source| CliError::ConfigParse { path, source })?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `PARTSYNC_SERVER_URL`, `PARTSYNC_DB_PATH`, `PARTSYNC_TOKEN`
    /// and `PARTSYNC_USER_ID`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("PARTSYNC_SERVER_URL") {
            self.server_url = url;
        }
        if let Some(path) = lookup("PARTSYNC_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(token) = lookup("PARTSYNC_TOKEN") {
            self.auth_token = Some(token);
        }
        if let Some(user) = lookup("PARTSYNC_USER_ID") {
            self.user_id = Some(user);
        }
    }

    /// Default config file path: `~/.config/partsync/config.json`.
    pub fn default_config_path() -> PathBuf {
        home().join(".config").join("partsync").join("config.json")
    }

    /// Builds the engine configuration.
    pub fn sync_config(&self) -> CliResult<SyncConfig> {
        if self.server_url.is_empty() {
            return Err(CliError::InvalidConfig(
                "server_url is not set (config file or PARTSYNC_SERVER_URL)".into(),
            ));
        }

        let tables = parse_tables(&self.default_tables)?;
        let mut config = SyncConfig::new(&self.server_url)
            .with_default_tables(tables)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_sync_interval(Duration::from_secs(self.watch_interval_secs.max(1)))
            .with_retry(RetryConfig::new(self.max_attempts.max(1)));
        if let Some(token) = &self.auth_token {
            config = config.with_auth_token(token);
        }
        Ok(config)
    }

    /// Returns the configured user or the explicit override.
    pub fn user(&self, explicit: Option<String>) -> CliResult<String> {
        explicit
            .or_else(|| self.user_id.clone())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                CliError::InvalidConfig("no user id (pass --user or set PARTSYNC_USER_ID)".into())
            })
    }
}

/// Parses wire table names.
pub fn parse_tables(names: &[String]) -> CliResult<Vec<SyncableTable>> {
    names
        .iter()
        .map(|name| {
            SyncableTable::from_name(name.trim())
                .ok_or_else(|| CliError::InvalidConfig(format!("unknown table '{name}'")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn default_config() {
        let config = CliConfig::default();
        assert!(config.db_path.to_string_lossy().ends_with("partsync.db"));
        assert_eq!(config.timeout_secs, 30);
        assert!(config.sync_config().is_err());
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = CliConfig::load(Some(dir.path().join("nope.json"))).unwrap();
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "server_url": "https://shop.example.com/api",
                "default_tables": ["products"],
                "timeout_secs": 5
            }"#,
        )
        .unwrap();

        let config = CliConfig::load(Some(path)).unwrap();
        let sync = config.sync_config().unwrap();
        assert_eq!(sync.default_tables, vec![SyncableTable::Products]);
        assert_eq!(sync.timeout, Duration::from_secs(5));
    }

    #[test]
    fn bad_file_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "server_url = 1").unwrap();
        assert!(matches!(
            CliConfig::load(Some(path)),
            Err(CliError::ConfigParse { .. })
        ));
    }

    #[test]
    fn env_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("PARTSYNC_SERVER_URL", "http://localhost:8001/api"),
            ("PARTSYNC_DB_PATH", "/tmp/x.db"),
            ("PARTSYNC_USER_ID", "u42"),
        ]
        .into_iter()
        .collect();

        let mut config = CliConfig {
            server_url: "https://file.example.com".into(),
            ..CliConfig::default()
        };
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server_url, "http://localhost:8001/api");
        assert_eq!(config.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.user(None).unwrap(), "u42");
        assert_eq!(config.user(Some("u7".into())).unwrap(), "u7");
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn unknown_table_is_rejected() {
        let err = parse_tables(&["products".into(), "orders".into()]).unwrap_err();
        assert!(err.to_string().contains("orders"));
    }
}
