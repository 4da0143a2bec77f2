//! Configuration management for PureRate
//!
//! This module provides:
//! - User settings (enabled, notifications, target device) and monitor tuning
//! - TOML persistence through [`ConfigManager`]
//! - Command bus types for runtime settings changes
//! - Hot-reload support via file system watcher

use crate::domain::audio::DeviceId;
use crate::domain::history::DEFAULT_HISTORY_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("File watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// User-facing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Automatic switching on/off
    pub enabled: bool,

    /// Notify after each successful switch
    pub notifications_enabled: bool,

    /// Device to reconcile (None = system default output)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_device_id: Option<DeviceId>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            notifications_enabled: false,
            target_device_id: None,
        }
    }
}

/// Polling and log-filter tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Period between poll cycles in milliseconds
    pub poll_interval_ms: u64,

    /// Trailing log window read on each cycle, in seconds
    pub log_window_secs: u64,

    /// Number of rate-change events kept
    pub history_capacity: usize,

    /// Process whose messages are read (None = any process)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,

    /// Exact subsystems to read
    pub subsystems: Vec<String>,

    /// Subsystem prefixes to read
    pub subsystem_prefixes: Vec<String>,
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(100))
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            log_window_secs: 3,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            process: Some("Music".to_string()),
            subsystems: vec![
                "com.apple.Music".to_string(),
                "com.apple.coremedia".to_string(),
                "com.apple.coreaudio".to_string(),
            ],
            subsystem_prefixes: vec!["com.apple.audio".to_string()],
        }
    }
}

/// Complete PureRate configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PureRateConfig {
    pub settings: Settings,
    pub monitor: MonitorConfig,
}

impl PureRateConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        if contents.trim().is_empty() {
            return Err(ConfigError::Invalid("config file is empty".to_string()));
        }
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.monitor.log_window_secs == 0 {
            return Err(ConfigError::Invalid("log_window_secs must be at least 1".to_string()));
        }
        if self.monitor.history_capacity == 0 {
            return Err(ConfigError::Invalid("history_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Runtime settings changes
#[derive(Debug, Clone)]
pub enum Command {
    SetEnabled(bool),
    SetNotificationsEnabled(bool),
    SetTargetDevice(Option<DeviceId>),
    RefreshDevices,
    /// Apply a settings section read back from disk
    ApplySettings(Settings),
}

/// Result of command execution
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    EnabledChanged(bool),
    NotificationsChanged(bool),
    TargetDeviceChanged(Option<DeviceId>),
    DevicesRefreshed(usize),
    SettingsApplied,
    Error(String),
}

/// Trait for command execution
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: Command) -> CommandResult;
}

/// Persistence of the settings section
#[async_trait::async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load_settings(&self) -> Result<Settings>;
    async fn save_settings(&self, settings: &Settings) -> Result<()>;
}

/// File system watcher for hot-reload of the config file
pub struct ConfigWatcher {
    _watcher: notify::RecommendedWatcher,
    config_tx: broadcast::Sender<PathBuf>,
}

impl ConfigWatcher {
    /// Watch `config_path` for external edits
    pub async fn new(config_path: PathBuf) -> Result<Self> {
        use notify::Watcher;

        let (config_tx, _config_rx) = broadcast::channel(32);

        let config_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ConfigError::Invalid("Config path has no parent directory".to_string()))?;
        fs::create_dir_all(&config_dir).await?;

        let file_name = config_path.file_name().map(|n| n.to_os_string());
        let tx_clone = config_tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if matches!(
                    event.kind,
                    notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                ) {
                    for path in event.paths {
                        if path.file_name().map(|n| n.to_os_string()) == file_name {
                            if let Err(e) = tx_clone.send(path) {
                                debug!("No subscriber for config change event: {}", e);
                            }
                        }
                    }
                }
            }
        })?;

        watcher.watch(&config_dir, notify::RecursiveMode::NonRecursive)?;

        info!(
            path = %config_path.display(),
            "Config watcher started"
        );

        Ok(Self {
            _watcher: watcher,
            config_tx,
        })
    }

    /// Subscribe to config change events
    pub fn subscribe(&self) -> broadcast::Receiver<PathBuf> {
        self.config_tx.subscribe()
    }
}

/// Configuration manager for the main PureRate config
///
/// Manages the configuration file at `~/.config/purerate/config.toml` by
/// default.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Manage `config.toml` inside `config_dir`
    pub fn new(config_dir: PathBuf) -> Self {
        Self {
            config_path: config_dir.join("config.toml"),
        }
    }

    /// Manage an explicit file path
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Get the default config directory path
    ///
    /// Returns `~/Library/Application Support/purerate` on macOS and
    /// `~/.config/purerate` on Linux
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("purerate"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    /// Get the config file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// If the config file doesn't exist, writes and returns the default.
    /// If the config file is corrupt, backs it up and returns the default.
    #[instrument(skip(self))]
    pub async fn load(&self) -> PureRateConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating default"
            );

            let config = PureRateConfig::default();

            if let Err(e) = config.save_to_file(&self.config_path).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save default config"
                );
            }

            return config;
        }

        match PureRateConfig::load_from_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using defaults"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                PureRateConfig::default()
            }
        }
    }

    /// Save configuration to file
    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &PureRateConfig) -> Result<()> {
        config.save_to_file(&self.config_path).await
    }

    /// Check if config file exists
    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}

#[async_trait::async_trait]
impl SettingsStore for ConfigManager {
    /// Unlike [`ConfigManager::load`], an unreadable file is an error here so
    /// a bad edit is never mistaken for the defaults
    async fn load_settings(&self) -> Result<Settings> {
        if !self.exists() {
            return Ok(self.load().await.settings);
        }
        Ok(PureRateConfig::load_from_file(&self.config_path).await?.settings)
    }

    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        let mut config = if self.exists() {
            PureRateConfig::load_from_file(&self.config_path).await?
        } else {
            PureRateConfig::default()
        };
        config.settings = settings.clone();
        self.save(&config).await
    }
}
