//! Configuration management for qkernel.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::{Args, Command};
use crate::execution::ExecuteOptions;
use crate::session::TeardownPolicy;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Kernel selection and lifecycle timing.
    pub kernel: KernelSection,
    /// Per-cell execution limits.
    pub execution: ExecutionSection,
    /// Where state, outputs and connection files live.
    pub paths: PathsSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Kernel configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelSection {
    /// Kernelspec name to launch.
    pub name: String,
    /// Seconds to wait for a kernel to answer after connecting.
    pub ready_timeout_secs: u64,
    /// Seconds a kernel gets to exit after a shutdown request.
    pub shutdown_grace_secs: u64,
}

impl Default for KernelSection {
    fn default() -> Self {
        Self {
            name: "python3".to_string(),
            ready_timeout_secs: 30,
            shutdown_grace_secs: 5,
        }
    }
}

/// Execution configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    /// Longest wait for a single kernel message, in seconds.
    pub timeout_secs: u64,
    /// Cap on a whole cell, in seconds.
    pub overall_timeout_secs: Option<u64>,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            overall_timeout_secs: None,
        }
    }
}

/// Paths configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    /// Directory holding the session record.
    pub state_dir: PathBuf,
    /// Root of the per-document output cache.
    pub cache_dir: PathBuf,
    /// Directory for kernel connection files.
    pub runtime_dir: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        let data = dirs::data_dir().unwrap_or_else(|| PathBuf::from(".local/share"));
        let cache = dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache"));
        Self {
            state_dir: data.join("qkernel"),
            cache_dir: cache.join("qkernel"),
            runtime_dir: data.join("jupyter").join("runtime"),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let mut config: Self = serde_json::from_str(&content).map_err(ConfigError::Json)?;
        config.paths.state_dir = expand_home(&config.paths.state_dir);
        config.paths.cache_dir = expand_home(&config.paths.cache_dir);
        config.paths.runtime_dir = expand_home(&config.paths.runtime_dir);
        Ok(config)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_env_from<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(kernel) = var("QKERNEL_KERNEL").filter(|k| !k.is_empty()) {
            self.kernel.name = kernel;
        }

        if let Some(timeout) = var("QKERNEL_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.execution.timeout_secs = secs;
            }
        }

        if let Some(dir) = var("QKERNEL_STATE_DIR") {
            self.paths.state_dir = expand_home(Path::new(&dir));
        }

        if let Some(dir) = var("QKERNEL_CACHE_DIR") {
            self.paths.cache_dir = expand_home(Path::new(&dir));
        }

        if let Some(dir) = var("JUPYTER_RUNTIME_DIR") {
            self.paths.runtime_dir = expand_home(Path::new(&dir));
        }

        if let Some(level) = var("QKERNEL_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }

        match &args.command {
            Some(Command::Start { kernel }) | Some(Command::Restart { kernel }) => {
                if let Some(kernel) = kernel {
                    self.kernel.name = kernel.clone();
                }
            }
            Some(Command::Run(run)) => {
                if let Some(ref kernel) = run.kernel {
                    self.kernel.name = kernel.clone();
                }
                if let Some(secs) = run.timeout {
                    self.execution.timeout_secs = secs;
                }
            }
            _ => {}
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env();
        config.apply_args(args);
        config.validate()?;

        Ok(config)
    }

    /// Reject values no run could work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kernel.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue("kernel.name", String::new()));
        }
        if self.execution.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("execution.timeout_secs", "0".into()));
        }
        if self.kernel.ready_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("kernel.ready_timeout_secs", "0".into()));
        }
        Ok(())
    }

    /// Limits for each executed cell.
    pub fn execute_options(&self) -> ExecuteOptions {
        let options =
            ExecuteOptions::default().receive_timeout(Duration::from_secs(self.execution.timeout_secs));
        match self.execution.overall_timeout_secs {
            Some(secs) => options.overall_timeout(Duration::from_secs(secs)),
            None => options,
        }
    }

    /// How long to wait for a kernel to report ready.
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.kernel.ready_timeout_secs)
    }

    /// Teardown behaviour for `stop`.
    pub fn teardown_policy(&self) -> TeardownPolicy {
        TeardownPolicy::default().with_grace(Duration::from_secs(self.kernel.shutdown_grace_secs))
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Replace a leading `~` with the home directory.
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// A setting holds a value that cannot work.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidValue(key, value) => write!(f, "invalid value for {}: '{}'", key, value),
        }
    }
}

impl std::error::Error for ConfigError {}
