//! Server configuration loading from file and environment variables.

use quill_db::{DatabaseSettings, SchemaSource};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file (the `DATABASE` setting).
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Schema script replacing the bundled one.
    #[serde(default)]
    pub schema: Option<String>,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Whether foreign key enforcement is enabled on every connection.
    #[serde(default = "default_foreign_keys")]
    pub foreign_keys: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "quill_db=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    5000
}

fn default_db_path() -> String {
    "quill.sqlite".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_foreign_keys() -> bool {
    false
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            schema: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            foreign_keys: default_foreign_keys(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl DatabaseConfig {
    /// Resolves this section into driver settings.
    ///
    /// Relative paths are taken relative to `root`, the application root.
    /// `:memory:` and `file:` URIs are passed through untouched.
    pub fn settings(&self, root: &Path) -> DatabaseSettings {
        let path = if self.path == ":memory:" || self.path.starts_with("file:") {
            PathBuf::from(&self.path)
        } else {
            root.join(&self.path)
        };

        DatabaseSettings {
            path,
            schema: self
                .schema
                .as_ref()
                .map_or(SchemaSource::Bundled, |s| SchemaSource::File(root.join(s))),
            busy_timeout_ms: self.busy_timeout_ms,
            foreign_keys: self.foreign_keys,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Directory that relative paths in the config file at `path` resolve
/// against: the file's parent, or the working directory.
pub fn app_root(path: Option<&Path>) -> PathBuf {
    path.and_then(Path::parent)
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `QUILL_HOST` overrides `server.host`
/// - `QUILL_PORT` overrides `server.port`
/// - `QUILL_DATABASE` overrides `database.path`
/// - `QUILL_LOG_LEVEL` overrides `logging.level`
/// - `QUILL_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = load_file(path)?;

    if let Ok(host) = std::env::var("QUILL_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("QUILL_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(db_path) = std::env::var("QUILL_DATABASE") {
        config.database.path = db_path;
    }
    if let Ok(level) = std::env::var("QUILL_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("QUILL_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}

fn load_file(path: Option<&Path>) -> Result<Config, ConfigError> {
    let Some(p) = path else {
        return Ok(Config::default());
    };

    match std::fs::read_to_string(p) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %p.display(), "config file not found, using defaults");
            Ok(Config::default())
        }
        Err(e) => Err(ConfigError::FileRead(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_file() {
        let config = load_file(None).unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.database.path, "quill.sqlite");
        assert!(config.database.schema.is_none());
        assert!(!config.database.foreign_keys);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_file(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.database.busy_timeout_ms, 5_000);
    }

    #[test]
    fn parses_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quill.toml");
        std::fs::write(
            &path,
            r#"
                [server]
                port = 8080

                [database]
                path = "instance/blog.sqlite"
                schema = "sql/schema.sql"
                foreign_keys = true
            "#,
        )
        .unwrap();

        let config = load_file(Some(&path)).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, default_host());
        assert_eq!(config.database.path, "instance/blog.sqlite");
        assert_eq!(config.database.schema.as_deref(), Some("sql/schema.sql"));
        assert!(config.database.foreign_keys);
        assert!(!config.logging.json);
    }

    #[test]
    fn invalid_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quill.toml");
        std::fs::write(&path, "[database\npath = 3").unwrap();

        assert!(matches!(load_file(Some(&path)), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn settings_resolve_against_root() {
        let db = DatabaseConfig {
            path: "instance/blog.sqlite".to_string(),
            schema: Some("schema.sql".to_string()),
            busy_timeout_ms: 100,
            foreign_keys: true,
        };

        let settings = db.settings(Path::new("/srv/quill"));
        assert_eq!(settings.path, PathBuf::from("/srv/quill/instance/blog.sqlite"));
        assert_eq!(
            settings.schema,
            SchemaSource::File(PathBuf::from("/srv/quill/schema.sql"))
        );
        assert_eq!(settings.busy_timeout_ms, 100);
    }

    #[test]
    fn absolute_and_memory_paths_are_kept() {
        let mut db = DatabaseConfig {
            path: "/var/lib/quill.sqlite".to_string(),
            ..DatabaseConfig::default()
        };
        assert_eq!(
            db.settings(Path::new("/srv")).path,
            PathBuf::from("/var/lib/quill.sqlite")
        );

        db.path = ":memory:".to_string();
        assert_eq!(db.settings(Path::new("/srv")).path, PathBuf::from(":memory:"));
        assert_eq!(db.settings(Path::new("/srv")).schema, SchemaSource::Bundled);
    }

    #[test]
    fn app_root_is_config_parent() {
        assert_eq!(
            app_root(Some(Path::new("/etc/quill/quill.toml"))),
            PathBuf::from("/etc/quill")
        );
        assert_eq!(app_root(Some(Path::new("quill.toml"))), PathBuf::from("."));
        assert_eq!(app_root(None), PathBuf::from("."));
    }
}
