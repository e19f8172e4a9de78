//! Map persistence configuration.
//!
//! Loaded from a TOML file; any missing field takes its default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Configuration file name.
pub const CONFIG_FILE: &str = "strata.toml";

/// Upper bound on save worker threads.
pub const MAX_SAVE_WORKERS: usize = 256;

/// Map persistence parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// World directory; map files live under `<world_root>/maps`
    pub world_root: PathBuf,
    /// Threads used by `save_all` (0 = available parallelism)
    pub save_workers: usize,
    /// Minimum time between progress updates during a save, in milliseconds
    pub progress_interval_ms: u64,
    /// Evict quads outside the active area after saving them, regardless of
    /// the caller's eviction flag
    pub evict_inactive_on_save: bool,
    /// Indent quad files
    pub pretty_json: bool,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            world_root: PathBuf::from("saves/world"),
            save_workers: 0,
            progress_interval_ms: 500,
            evict_inactive_on_save: true,
            pretty_json: false,
        }
    }
}

impl MapConfig {
    /// Default configuration for the world at `world_root`.
    #[must_use]
    pub fn for_world(world_root: impl Into<PathBuf>) -> Self {
        Self {
            world_root: world_root.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to read config file {}: {e}", path.display());
                return Self::default();
            },
        };

        match toml::from_str::<Self>(&contents) {
            Ok(mut config) => {
                config.validate();
                info!("Loaded config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            },
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Clamp values to sensible ranges.
    pub fn validate(&mut self) {
        self.save_workers = self.save_workers.min(MAX_SAVE_WORKERS);
        self.progress_interval_ms = self.progress_interval_ms.clamp(50, 10_000);
    }

    /// Interval between progress updates.
    #[must_use]
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Number of save workers to start for `jobs` quads.
    #[must_use]
    pub fn worker_count(&self, jobs: usize) -> usize {
        let wanted = if self.save_workers == 0 {
            std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
        } else {
            self.save_workers
        };
        wanted.min(jobs).max(1)
    }
}
