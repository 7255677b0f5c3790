//! Relay settings: bind address, frame cap, room cap, and log filter.
//!
//! Each setting is taken from the first source that sets it:
//! 1. CLI flags (or their `RELAY_*` environment variables)
//! 2. The TOML file (`--config`, else `~/.config/prochat-relay/config.toml`)
//! 3. Compiled defaults
//!
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0:5000"
//! max_payload_size = 65536
//!
//! [relay]
//! max_rooms_per_connection = 256
//!
//! [log]
//! level = "info,prochat_relay=debug"
//! ```
//!
//! The merged result is checked before the server starts: both caps must be
//! at least one and the log level must parse as a tracing filter.

use std::path::{Path, PathBuf};

use tracing_subscriber::EnvFilter;

use crate::registry::DEFAULT_MAX_ROOMS_PER_CONNECTION;
use crate::relay::DEFAULT_MAX_PAYLOAD_SIZE;

/// Default bind address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

/// Default tracing filter.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Errors that can occur when loading relay configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML or has unknown keys.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A cap is below its minimum.
    #[error("{setting} must be at least {min}, got {value}")]
    OutOfRange {
        /// Name of the setting as written in the file.
        setting: &'static str,
        /// Value that was given.
        value: usize,
        /// Smallest accepted value.
        min: usize,
    },

    /// The log level is not a valid tracing filter directive.
    #[error("invalid log level {filter:?}: {reason}")]
    InvalidLogLevel {
        /// Filter as given.
        filter: String,
        /// Parser message.
        reason: String,
    },
}

/// Contents of the TOML file. Unknown keys are rejected so a misspelled
/// cap does not silently fall back to its default.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    server: ServerSection,
    relay: RelaySection,
    log: LogSection,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ServerSection {
    bind_addr: Option<String>,
    max_payload_size: Option<usize>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RelaySection {
    max_rooms_per_connection: Option<usize>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LogSection {
    level: Option<String>,
}

/// Command-line flags of the `prochat-relay` binary.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "ProChat realtime presence and call-signaling relay")]
pub struct RelayCliArgs {
    /// Address to listen on.
    #[arg(short, long, env = "RELAY_ADDR")]
    pub bind: Option<String>,

    /// Config file (default: `~/.config/prochat-relay/config.toml`).
    #[arg(short, long, env = "RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Largest accepted inbound frame, in bytes.
    #[arg(long, env = "RELAY_MAX_PAYLOAD_SIZE")]
    pub max_payload_size: Option<usize>,

    /// Most rooms one connection may be in at once.
    #[arg(long, env = "RELAY_MAX_ROOMS")]
    pub max_rooms_per_connection: Option<usize>,

    /// Tracing filter, e.g. `info` or `warn,prochat_relay=debug`.
    #[arg(long, env = "RELAY_LOG")]
    pub log_level: Option<String>,
}

/// One source of settings. Unset fields fall through to the next source.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Layer {
    bind_addr: Option<String>,
    max_payload_size: Option<usize>,
    max_rooms_per_connection: Option<usize>,
    log_level: Option<String>,
}

impl Layer {
    /// Fills the fields this layer leaves unset from `lower`.
    fn over(self, lower: Self) -> Self {
        Self {
            bind_addr: self.bind_addr.or(lower.bind_addr),
            max_payload_size: self.max_payload_size.or(lower.max_payload_size),
            max_rooms_per_connection: self
                .max_rooms_per_connection
                .or(lower.max_rooms_per_connection),
            log_level: self.log_level.or(lower.log_level),
        }
    }
}

impl From<&RelayCliArgs> for Layer {
    fn from(cli: &RelayCliArgs) -> Self {
        Self {
            bind_addr: cli.bind.clone(),
            max_payload_size: cli.max_payload_size,
            max_rooms_per_connection: cli.max_rooms_per_connection,
            log_level: cli.log_level.clone(),
        }
    }
}

impl From<ConfigFile> for Layer {
    fn from(file: ConfigFile) -> Self {
        Self {
            bind_addr: file.server.bind_addr,
            max_payload_size: file.server.max_payload_size,
            max_rooms_per_connection: file.relay.max_rooms_per_connection,
            log_level: file.log.level,
        }
    }
}

/// Validated relay settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Address to listen on.
    pub bind_addr: String,
    /// Largest accepted inbound frame, in bytes.
    pub max_payload_size: usize,
    /// Most rooms one connection may be in at once.
    pub max_rooms_per_connection: usize,
    /// Tracing filter directive.
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_rooms_per_connection: DEFAULT_MAX_ROOMS_PER_CONNECTION,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl RelayConfig {
    /// Reads the config file and merges it under the CLI flags.
    ///
    /// An explicit `--config` must exist; the default path may be absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or if
    /// the merged settings are out of range.
    pub fn load(cli: &RelayCliArgs) -> Result<Self, ConfigError> {
        let file = match cli.config.as_deref() {
            Some(path) => read_config_file(path)?,
            None => default_config_path()
                .map(|path| read_optional_config_file(&path))
                .transpose()?
                .unwrap_or_default(),
        };
        Self::from_layer(Layer::from(cli).over(file.into()))
    }

    /// Applies defaults to the unset settings and validates the result.
    fn from_layer(layer: Layer) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            bind_addr: layer.bind_addr.unwrap_or(defaults.bind_addr),
            max_payload_size: layer.max_payload_size.unwrap_or(defaults.max_payload_size),
            max_rooms_per_connection: layer
                .max_rooms_per_connection
                .unwrap_or(defaults.max_rooms_per_connection),
            log_level: layer.log_level.unwrap_or(defaults.log_level),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        at_least("max_payload_size", self.max_payload_size, 1)?;
        at_least("max_rooms_per_connection", self.max_rooms_per_connection, 1)?;
        EnvFilter::try_new(&self.log_level).map_err(|e| ConfigError::InvalidLogLevel {
            filter: self.log_level.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    /// Builds the tracing filter: `RUST_LOG` when set and valid, otherwise
    /// the configured level.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.log_level))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
    }
}

fn at_least(setting: &'static str, value: usize, min: usize) -> Result<(), ConfigError> {
    if value < min {
        return Err(ConfigError::OutOfRange { setting, value, min });
    }
    Ok(())
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("prochat-relay").join("config.toml"))
}

fn read_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&contents)?)
}

fn read_optional_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    match read_config_file(path) {
        Err(ConfigError::ReadFile { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            Ok(ConfigFile::default())
        }
        other => other,
    }
}
