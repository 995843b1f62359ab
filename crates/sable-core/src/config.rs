//! Configuration for the editor shell core.
//!
//! Every field has a default, so a partial JSON file only overrides what it
//! names:
//!
//! ```json
//! {
//!   "source": { "tab_size": 4, "extensions": ["rs", "toml"] },
//!   "parse": { "debounce_ms": 300 },
//!   "process": { "shell": "bash" }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable that points at an explicit config file.
pub const CONFIG_ENV: &str = "SABLE_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source buffer settings.
    pub source: SourceConfig,
    /// Background parse scheduling.
    pub parse: ParseConfig,
    /// Progress line ticking.
    pub progress: ProgressConfig,
    /// External process execution.
    pub process: ProcessConfig,
}

/// Source buffer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Width of a tab stop.
    pub tab_size: usize,
    /// File extensions handled by the analysis engine (without the dot).
    pub extensions: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            tab_size: 2,
            extensions: ["c", "cc", "cpp", "cxx", "h", "hh", "hpp", "hxx"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl SourceConfig {
    /// Whether files with this extension are handed to the analysis engine.
    ///
    /// Accepts the extension with or without a leading dot.
    pub fn legal_extension(&self, ext: &str) -> bool {
        let ext = ext.strip_prefix('.').unwrap_or(ext);
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Whether the file at `path` has a legal extension.
    pub fn legal_path(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.legal_extension(ext))
    }
}

/// Background parse scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseConfig {
    /// How long a request must stay unsuperseded before the worker picks it up.
    pub debounce_ms: u64,
    /// Worker poll interval.
    pub poll_ms: u64,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 150,
            poll_ms: 10,
        }
    }
}

impl ParseConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(1))
    }
}

/// Progress line ticking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Timer thread poll interval; bounds teardown latency.
    pub poll_ms: u64,
    /// Number of polls between two "still working" ticks.
    pub ticks_per_report: u32,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            poll_ms: 10,
            ticks_per_report: 100,
        }
    }
}

impl ProgressConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(1))
    }
}

/// External process execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Shell used to interpret commands (`<shell> -c <command>`).
    pub shell: String,
    /// Size of each read from a child's output pipes.
    pub chunk_size: usize,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            chunk_size: 1024,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Locate and load the configuration.
    ///
    /// Checks `$SABLE_CONFIG`, then `<config_dir>/sable/config.json`, and
    /// falls back to defaults when neither exists.
    pub fn discover() -> Result<Self> {
        match Self::discover_path() {
            Some(path) => {
                tracing::debug!("Loading config from {}", path.display());
                Self::load(path)
            }
            None => Ok(Self::default()),
        }
    }

    fn discover_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            tracing::warn!("{} points at missing file {}", CONFIG_ENV, path.display());
        }

        let path = dirs::config_dir()?.join("sable").join("config.json");
        path.exists().then_some(path)
    }

    fn validate(&self) -> Result<()> {
        if self.process.chunk_size == 0 {
            return Err(Error::Config("process.chunk_size must be > 0".to_string()));
        }
        if self.process.shell.trim().is_empty() {
            return Err(Error::Config("process.shell must not be empty".to_string()));
        }
        if self.progress.ticks_per_report == 0 {
            return Err(Error::Config(
                "progress.ticks_per_report must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
