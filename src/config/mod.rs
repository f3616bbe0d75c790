//! Configuration module for flownet
//!
//! Network behavior knobs and logging setup, stored as TOML.
//!
//! # Settings Location
//!
//! `default_settings_path()` resolves to the platform config directory:
//! - **Linux**: `~/.config/flownet/settings.toml`
//! - **macOS**: `~/Library/Application Support/flownet/settings.toml`
//! - **Windows**: `%APPDATA%\flownet\settings.toml`
//!
//! # Example
//!
//! ```ignore
//! use flownet::config::NetworkSettings;
//!
//! let settings = NetworkSettings::load_or_default("settings.toml");
//! let _guard = flownet::config::init_logging(&settings.logging)?;
//! let network = flownet::ProcessorNetwork::with_settings(settings);
//! ```

use crate::error::{NetworkError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Application identifier for config directories
pub const APP_ID: &str = "flownet";

/// Settings filename
pub const SETTINGS_FILE: &str = "settings.toml";

/// Top-level settings for a processor network
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub evaluation: EvaluationSettings,
    pub links: LinkSettings,
    pub logging: LoggingSettings,
}

/// Evaluation loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
    /// Extra passes allowed when processors invalidate the network from
    /// inside their hooks
    pub max_follow_up_passes: u32,
    /// Log the duration of every pass at debug level
    pub log_pass_timings: bool,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            max_follow_up_passes: 8,
            log_pass_timings: false,
        }
    }
}

/// Property link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Whether `auto_link_processor` creates links
    pub enable_auto_link: bool,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            enable_auto_link: true,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    pub filter: String,
    /// Also write logs to this file
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info,flownet=debug".to_string(),
            log_file: None,
        }
    }
}

impl NetworkSettings {
    /// Parse settings from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| NetworkError::Config(format!("Failed to parse settings: {}", e)))
    }

    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            NetworkError::Config(format!("Failed to read settings file {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load settings, falling back to defaults if the file is missing or invalid
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save settings as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                NetworkError::Config(format!("Failed to create settings directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| NetworkError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| NetworkError::Config(format!("Failed to write settings: {}", e)))
    }
}

/// Platform config directory for flownet
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Default location of the settings file
pub fn default_settings_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(SETTINGS_FILE))
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `settings.filter`. When a log file is
/// configured the returned guard must be kept alive to flush it.
pub fn init_logging(settings: &LoggingSettings) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .map_err(|e| NetworkError::Config(format!("Invalid log filter: {}", e)))?;

    let (file_layer, guard) = match &settings.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().ok_or_else(|| {
                NetworkError::Config(format!("Invalid log file path: {:?}", path))
            })?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| NetworkError::Config(format!("Failed to install logger: {}", e)))?;

    Ok(guard)
}
