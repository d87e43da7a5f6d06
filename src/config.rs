// Configuration loading and parsing (winspool.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// winspool.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire winspool.toml file.
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    server: ServerConfig,
    database: DatabaseConfig,
    #[serde(default)]
    sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Feature flag. When off the sync endpoint refuses to run.
    #[serde(default)]
    pub enabled: bool,
    /// When on, sync cycles compute their update set without writing.
    #[serde(default)]
    pub dry_run: bool,
    /// Which wins provider to use: "espn" (live) or "stub" (fixed).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Bearer token required by the sync endpoint. Falls back to the
    /// WINSPOOL_ADMIN_TOKEN environment variable when absent here.
    #[serde(default)]
    pub admin_token: Option<String>,
    /// Season override; defaults to the current year at sync time.
    #[serde(default)]
    pub season: Option<i32>,
}

// A derived Default would leave `provider` empty, which validation
// rejects; a config file with no [sync] table must come out identical
// to one with an empty [sync] table.
impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dry_run: false,
            provider: default_provider(),
            admin_token: None,
            season: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_provider() -> String {
    "espn".to_string()
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/winspool.toml` relative
/// to `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_path = base_dir.join("config").join("winspool.toml");
    let text = read_file(&config_path)?;
    let file: ConfigFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: config_path.clone(),
        source: e,
    })?;

    let mut config = Config {
        server: file.server,
        database: file.database,
        sync: file.sync,
    };

    // The admin token is a secret; the environment wins over the file.
    if let Ok(token) = std::env::var("WINSPOOL_ADMIN_TOKEN") {
        if !token.is_empty() {
            config.sync.admin_token = Some(token);
        }
    }

    validate(&config)?;

    Ok(config)
}

/// Ensure the config file exists by copying it from `defaults/` when
/// missing. Returns the list of files that were copied.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // File already exists in config/, skip it
            }
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Ensures default config files are copied before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError {
            field: "server.port".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.database.path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "database.path".into(),
            message: "must not be empty".into(),
        });
    }

    match config.sync.provider.as_str() {
        "espn" | "stub" => {}
        other => {
            return Err(ConfigError::ValidationError {
                field: "sync.provider".into(),
                message: format!("must be \"espn\" or \"stub\", got {other:?}"),
            });
        }
    }

    if config.sync.enabled && config.sync.admin_token.as_deref().unwrap_or("").is_empty() {
        return Err(ConfigError::ValidationError {
            field: "sync.admin_token".into(),
            message: "required when sync.enabled is true \
                      (set it in winspool.toml or via WINSPOOL_ADMIN_TOKEN)"
                .into(),
        });
    }

    Ok(())
}
