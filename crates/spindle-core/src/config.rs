//! Configuration, read from `spindle.toml`.
//!
//! Every field has a default, so an absent file or an empty table is a
//! valid configuration.
//!
//! ```toml
//! tasks_dir = "~/.spindle/tasks"
//! poll_interval_ms = 5000
//!
//! [lock]
//! timeout_ms = 10000
//!
//! [commands.rip]
//! program = "makemkvcon"
//! args = ["--robot"]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::TaskType;
use crate::error::{Result, SpindleError};
use crate::queue::LockOptions;

pub const TASKS_DIR_ENV: &str = "SPINDLE_TASKS_DIR";
pub const CONFIG_ENV: &str = "SPINDLE_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub tasks_dir: String,
    pub poll_interval_ms: u64,
    /// Fallback filter when `RUST_LOG` is unset.
    pub log_level: String,
    pub lock: LockConfig,
    pub retention: RetentionConfig,
    pub reaper: ReaperConfig,
    pub gc: GcConfig,
    /// External command per task type, keyed by type name.
    pub commands: BTreeMap<String, CommandConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub timeout_ms: u64,
    pub stale_after_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// How long terminal records stay in `complete`.
    pub complete_hours: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    pub stale_after_secs: u64,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tasks_dir: "~/.spindle/tasks".to_string(),
            poll_interval_ms: 5_000,
            log_level: "info".to_string(),
            lock: LockConfig::default(),
            retention: RetentionConfig::default(),
            reaper: ReaperConfig::default(),
            gc: GcConfig::default(),
            commands: BTreeMap::new(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            stale_after_secs: 60,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            complete_hours: 24 * 7,
        }
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 6 * 60 * 60,
            interval_secs: 5 * 60,
        }
    }
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60 * 60,
        }
    }
}

impl Config {
    /// `$SPINDLE_CONFIG`, else `~/.spindle/spindle.toml`.
    pub fn default_path() -> PathBuf {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => expand_tilde("~/.spindle/spindle.toml"),
        }
    }

    /// Load from `path` (or the default path), then apply environment
    /// overrides. An explicit path must exist; the default one may not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (Self::default_path(), false),
        };
        debug!(path = %path.display(), "loading config");

        let mut config = match fs::read_to_string(&path) {
            Ok(raw) => Self::from_toml_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                debug!("config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(SpindleError::io(&path, e)),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = var(TASKS_DIR_ENV).filter(|d| !d.is_empty()) {
            debug!(tasks_dir = %dir, "tasks_dir overridden from environment");
            self.tasks_dir = dir;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(SpindleError::Config("poll_interval_ms must be positive".into()));
        }
        if self.tasks_dir.trim().is_empty() {
            return Err(SpindleError::Config("tasks_dir must not be empty".into()));
        }
        for (name, command) in &self.commands {
            name.parse::<TaskType>()
                .map_err(|_| SpindleError::Config(format!("unknown task type in [commands.{name}]")))?;
            if command.program.trim().is_empty() {
                return Err(SpindleError::Config(format!("[commands.{name}] program is empty")));
            }
        }
        Ok(())
    }

    pub fn tasks_dir(&self) -> PathBuf {
        expand_tilde(&self.tasks_dir)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            timeout: Duration::from_millis(self.lock.timeout_ms),
            stale_after: Duration::from_secs(self.lock.stale_after_secs),
        }
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention.complete_hours as i64)
    }

    pub fn reaper_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reaper.stale_after_secs as i64)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper.interval_secs)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc.interval_secs)
    }

    pub fn command_for(&self, task_type: TaskType) -> Option<&CommandConfig> {
        self.commands.get(task_type.as_str())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return PathBuf::from(home).join(rest);
    }
    PathBuf::from(path)
}
