//! Configuration loading and parsing for Arbor.
//!
//! The config file lives at `~/.arbor/config.toml`. Every section and key is
//! optional; an empty file yields [`ArborConfig::default`].
//!
//! ```toml
//! [coordinator]
//! command_capacity = 256
//!
//! [gc]
//! enabled = true
//! interval_ms = 5000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Default bound on the client-to-coordinator mailbox.
pub const DEFAULT_COMMAND_CAPACITY: usize = 256;

// Default value functions for serde (bool::default() is false, so only true needs a fn)
const fn default_true() -> bool {
    true
}

const fn default_command_capacity() -> usize {
    DEFAULT_COMMAND_CAPACITY
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArborConfig {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub gc: GcConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    /// Bounded capacity of the mailbox clients send commands through.
    /// Zero is clamped to one.
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            command_capacity: DEFAULT_COMMAND_CAPACITY,
        }
    }
}

/// Periodic compaction trigger.
#[derive(Debug, Clone, Deserialize)]
pub struct GcConfig {
    /// Master switch for the periodic trigger. Manual triggers always work.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Milliseconds between triggers. Absent or zero means no periodic GC.
    pub interval_ms: Option<u64>,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

impl ArborConfig {
    /// Load the user config if one exists.
    ///
    /// Returns `Ok(None)` when there is no home directory or no file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match dirs::home_dir() {
            Some(home) => Self::load_at(&home),
            None => Ok(None),
        }
    }

    /// Load `.arbor/config.toml` under `home`, or `Ok(None)` if it is absent.
    pub fn load_at(home: &Path) -> Result<Option<Self>, ConfigError> {
        let path = config_path_in(home);
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn command_capacity(&self) -> usize {
        self.coordinator.command_capacity.max(1)
    }

    /// Interval of the periodic GC trigger, if one should run.
    #[must_use]
    pub fn gc_interval(&self) -> Option<Duration> {
        if !self.gc.enabled {
            return None;
        }
        match self.gc.interval_ms {
            Some(0) | None => None,
            Some(ms) => Some(Duration::from_millis(ms)),
        }
    }
}

fn config_path_in(home: &Path) -> PathBuf {
    home.join(".arbor").join("config.toml")
}
