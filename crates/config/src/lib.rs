//! Configuration management for Warden
//!
//! Loads and saves runtime parameters, and resolves the few settings that
//! can be overridden from the environment.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;

pub use paths::{config_path, data_dir, workspace_path};

/// Environment override for the idle timeout, in seconds
pub const IDLE_TIMEOUT_ENV: &str = "WARDEN_IDLE_TIMEOUT";

/// Environment override for the identifier worker id
pub const WORKER_ID_ENV: &str = "WARDEN_WORKER_ID";

/// Errors in configuration handling
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("CONFIG I/O ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("CONFIG PARSE ERROR: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CONFIG NOT FOUND: {0}")]
    NotFound(PathBuf),

    #[error("INVALID VALUE FOR {key}: {value}")]
    InvalidValue { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Runtime-wide parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Identifier worker id (0..=1023). Random when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<u16>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            worker_id: None,
        }
    }
}

fn default_idle_timeout_secs() -> u64 {
    3600
}

/// Agent loop parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperativeConfig {
    #[serde(default = "default_workspace")]
    pub workspace: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Run multiple tool calls from one model turn concurrently
    #[serde(default = "default_true")]
    pub parallel_tools: bool,
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,
}

impl Default for OperativeConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            model: default_model(),
            max_iterations: default_max_iterations(),
            parallel_tools: true,
            batch_timeout_secs: default_batch_timeout_secs(),
        }
    }
}

fn default_workspace() -> String {
    "~/.warden/workspace".to_string()
}

fn default_model() -> String {
    "loopback".to_string()
}

fn default_max_iterations() -> u32 {
    20
}

fn default_batch_timeout_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

/// Tool discovery and execution parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolkitConfig {
    /// Namespaces scanned at discovery. Empty means all known namespaces.
    #[serde(default)]
    pub namespaces: Vec<String>,
    /// Per-tool availability flags; tools absent from the map are enabled
    #[serde(default)]
    pub tools: HashMap<String, bool>,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_exec_timeout_secs")]
    pub exec_timeout_secs: u64,
}

impl Default for ToolkitConfig {
    fn default() -> Self {
        Self {
            namespaces: Vec::new(),
            tools: HashMap::new(),
            call_timeout_secs: default_call_timeout_secs(),
            exec_timeout_secs: default_exec_timeout_secs(),
        }
    }
}

fn default_call_timeout_secs() -> u64 {
    120
}

fn default_exec_timeout_secs() -> u64 {
    60
}

impl ToolkitConfig {
    /// Whether a tool is enabled by its availability flag
    pub fn is_enabled(&self, name: &str) -> bool {
        self.tools.get(name).copied().unwrap_or(true)
    }

    /// Whether a namespace should be scanned at discovery
    pub fn scans(&self, namespace: &str) -> bool {
        self.namespaces.is_empty() || self.namespaces.iter().any(|n| n == namespace)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Session parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,
    /// Terminate the connection on a malformed inbound message
    #[serde(default = "default_true")]
    pub close_on_protocol_error: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history_messages: default_max_history_messages(),
            close_on_protocol_error: true,
        }
    }
}

fn default_max_history_messages() -> usize {
    100
}

/// Process supervisor parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            stop_grace_ms: default_stop_grace_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_stop_grace_ms() -> u64 {
    5000
}

impl SupervisorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// Idle watchdog parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

fn default_check_interval_secs() -> u64 {
    30
}

/// Server deployment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    18790
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub operative: OperativeConfig,
    #[serde(default)]
    pub toolkit: ToolkitConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
}

impl Config {
    /// Load from the default location
    pub async fn load() -> Result<Self> {
        let path = config_path();
        Self::load_from(&path).await
    }

    /// Load from specific location
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("◆ NO CONFIG AT {:?}, USING DEFAULTS", path);
            return Ok(Config::default());
        }

        debug!("◆ LOADING CONFIG FROM {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    /// Save to specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("◆ WRITING CONFIG TO {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Workspace directory with `~` expanded
    pub fn workspace_path(&self) -> PathBuf {
        let path = &self.operative.workspace;
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        } else if path == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
        PathBuf::from(path)
    }

    /// Idle timeout: environment, then config file, then the built-in default
    pub fn idle_timeout(&self) -> Duration {
        match std::env::var(IDLE_TIMEOUT_ENV) {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) => return Duration::from_secs(secs),
                Err(_) => warn!(
                    "◆ IGNORING {}={:?}: not a number of seconds",
                    IDLE_TIMEOUT_ENV, raw
                ),
            },
            Err(std::env::VarError::NotPresent) => {}
            Err(e) => warn!("◆ IGNORING {}: {}", IDLE_TIMEOUT_ENV, e),
        }
        Duration::from_secs(self.runtime.idle_timeout_secs)
    }

    /// Worker id: environment, then config file. `None` means unassigned.
    pub fn worker_id(&self) -> Result<Option<u16>> {
        match std::env::var(WORKER_ID_ENV) {
            Ok(raw) => raw
                .trim()
                .parse::<u16>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue {
                    key: WORKER_ID_ENV.to_string(),
                    value: raw,
                }),
            Err(_) => Ok(self.runtime.worker_id),
        }
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.operative.batch_timeout_secs)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog.check_interval_secs)
    }
}

/// Initialize config file and workspace
pub async fn init() -> Result<Config> {
    let config_path = config_path();

    if config_path.exists() {
        warn!("◆ CONFIG ALREADY EXISTS AT {:?}", config_path);
    } else {
        let config = Config::default();
        config.save().await?;
        info!("◆ CONFIG WRITTEN TO {:?}", config_path);
    }

    let config = Config::load().await?;
    let workspace = config.workspace_path();
    tokio::fs::create_dir_all(&workspace).await?;
    info!("◆ WORKSPACE READY AT {:?}", workspace);

    Ok(config)
}
