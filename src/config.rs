//! CLI configuration.
//!
//! Values come from, in increasing priority: built-in defaults, the YAML
//! config file, then `TRAFEGO_*` environment variables. Each user-facing
//! value remembers where it came from so `trafego config show` can say so.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::SyncSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl ConfigSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigSource::Default => "default",
            ConfigSource::File => "file",
            ConfigSource::Environment => "environment",
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value tagged with the layer that set it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    fn default_value(value: T) -> Self {
        Self::new(value, ConfigSource::Default)
    }

    /// Replaces the value when a higher layer provides one.
    fn layer(&mut self, value: Option<T>, source: ConfigSource) {
        if let Some(value) = value {
            *self = Self::new(value, source);
        }
    }
}

/// Hosted server the CLI talks to instead of the local database.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackendConfig {
    pub server_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl BackendConfig {
    /// Both the URL and the key are needed to reach a server.
    pub fn is_configured(&self) -> bool {
        self.server_url.is_some() && self.api_key.is_some()
    }
}

/// Timings of the sync layer, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncTimings {
    /// Wait before opening the realtime subscription after a load
    pub subscribe_delay_ms: u64,
    /// How long a save result stays visible
    pub status_reset_ms: u64,
    /// Quiet period before a ledger row is saved
    pub autosave_debounce_ms: u64,
}

impl Default for SyncTimings {
    fn default() -> Self {
        Self {
            subscribe_delay_ms: 100,
            status_reset_ms: 2000,
            autosave_debounce_ms: 1500,
        }
    }
}

impl SyncTimings {
    pub fn settings(&self) -> SyncSettings {
        SyncSettings {
            subscribe_delay: Duration::from_millis(self.subscribe_delay_ms),
            status_reset: Duration::from_millis(self.status_reset_ms),
        }
    }

    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub database_path: ConfigValue<PathBuf>,
    /// Identity used against the local database
    pub local_user: ConfigValue<String>,
    /// File that was read, when one existed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub backend: BackendConfig,
    pub sync: SyncTimings,
}

/// On-disk shape of the config file; every key is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FileLayer {
    database_path: Option<PathBuf>,
    local_user: Option<String>,
    backend: Option<BackendConfig>,
    sync: Option<SyncTimings>,
}

impl Config {
    /// Resolves the configuration, reading `config_path` (or the platform
    /// default) when it exists.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::defaults();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            config.apply_file(&path)?;
        }
        config.apply_env();

        Ok(config)
    }

    fn defaults() -> Self {
        Self {
            database_path: ConfigValue::default_value(Self::default_data_dir().join("trafego.db")),
            local_user: ConfigValue::default_value("local_user".to_string()),
            config_file: None,
            backend: BackendConfig::default(),
            sync: SyncTimings::default(),
        }
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let layer: FileLayer =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        // Relative database paths are anchored at the config file's directory
        let database_path = layer.database_path.map(|db| match path.parent() {
            Some(dir) if db.is_relative() => dir.join(db),
            _ => db,
        });

        self.database_path.layer(database_path, ConfigSource::File);
        self.local_user.layer(layer.local_user, ConfigSource::File);
        if let Some(backend) = layer.backend {
            self.backend = backend;
        }
        if let Some(sync) = layer.sync {
            self.sync = sync;
        }
        self.config_file = Some(path.to_path_buf());
        Ok(())
    }

    fn apply_env(&mut self) {
        let var = |name: &str| std::env::var(name).ok();

        self.database_path.layer(
            var("TRAFEGO_DATABASE_PATH").map(PathBuf::from),
            ConfigSource::Environment,
        );
        self.local_user
            .layer(var("TRAFEGO_LOCAL_USER"), ConfigSource::Environment);
        if let Some(url) = var("TRAFEGO_SERVER_URL") {
            self.backend.server_url = Some(url);
        }
        if let Some(key) = var("TRAFEGO_API_KEY") {
            self.backend.api_key = Some(key);
        }
    }

    /// `~/.config/trafego` on Linux, the platform equivalent elsewhere.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("trafego")
    }

    /// `~/.local/share/trafego` on Linux, the platform equivalent elsewhere.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("trafego")
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Cannot read config '{}': {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Invalid config '{}': {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(contents: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(Some(dir.path().join("absent.yaml"))).unwrap();

        assert!(config.database_path.value.ends_with("trafego.db"));
        assert_eq!(config.database_path.source, ConfigSource::Default);
        assert_eq!(config.local_user.value, "local_user");
        assert_eq!(config.sync, SyncTimings::default());
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_file_values_are_tagged() {
        let (_dir, path) = write_config(
            "database_path: /srv/trafego/db.sqlite\nlocal_user: maria\nsync:\n  subscribe_delay_ms: 250\n",
        );
        let config = Config::load(Some(path.clone())).unwrap();

        assert_eq!(
            config.database_path,
            ConfigValue::new(PathBuf::from("/srv/trafego/db.sqlite"), ConfigSource::File)
        );
        assert_eq!(
            config.local_user,
            ConfigValue::new("maria".to_string(), ConfigSource::File)
        );
        assert_eq!(config.config_file, Some(path));

        let settings = config.sync.settings();
        assert_eq!(settings.subscribe_delay, Duration::from_millis(250));
        assert_eq!(settings.status_reset, Duration::from_millis(2000));
        assert_eq!(config.sync.autosave_delay(), Duration::from_millis(1500));
    }

    #[test]
    fn test_relative_database_path_follows_config_dir() {
        let (dir, path) = write_config("database_path: data/trafego.db\n");
        let config = Config::load(Some(path)).unwrap();
        assert_eq!(
            config.database_path.value,
            dir.path().join("data/trafego.db")
        );
    }

    #[test]
    fn test_backend_section_and_key_not_serialized() {
        let (_dir, path) =
            write_config("backend:\n  server_url: http://localhost:8080\n  api_key: secret\n");
        let config = Config::load(Some(path)).unwrap();

        assert!(config.backend.is_configured());
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("http://localhost:8080"));
        assert!(!json.contains("secret"));
    }

    #[test]
    #[ignore] // Run with --ignored; env vars can pollute parallel tests
    fn test_environment_beats_file() {
        let (_dir, path) = write_config("local_user: fromfile\n");
        std::env::set_var("TRAFEGO_LOCAL_USER", "fromenv");

        let config = Config::load(Some(path)).unwrap();
        assert_eq!(config.local_user.value, "fromenv");
        assert_eq!(config.local_user.source, ConfigSource::Environment);

        std::env::remove_var("TRAFEGO_LOCAL_USER");
    }

    #[test]
    fn test_malformed_yaml_is_a_parse_error() {
        let (_dir, path) = write_config("sync: [unclosed\n");
        assert!(matches!(
            Config::load(Some(path)),
            Err(ConfigError::Parse { .. })
        ));
    }
}
