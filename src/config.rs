// src/config.rs
//! Acquisition configuration stored as JSON

use crate::{
    error::{FixError, Result},
    gps::reader::DEFAULT_IDLE_DELAY,
    manager::ReaderSettings,
};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    pub path: String,
    #[serde(default = "default_baudrate")]
    pub baudrate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub ports: Vec<PortConfig>,
    /// Seconds without a merged fragment before the fix is flagged stale
    pub watchdog_secs: Option<f64>,
    pub idle_delay_ms: u64,
    pub join_timeout_ms: u64,
    pub read_timeout_ms: Option<u64>,
}

fn default_baudrate() -> u32 {
    4800
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            ports: Vec::new(),
            watchdog_secs: None,
            idle_delay_ms: DEFAULT_IDLE_DELAY.as_millis() as u64,
            join_timeout_ms: 1000,
            read_timeout_ms: Some(1000),
        }
    }
}

impl AcquisitionConfig {
    /// Load from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = Self::get_config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| FixError::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;

        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// `$HOME/.config/nmea-fusion/config.json`
    pub fn get_config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| FixError::Config("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home).join(".config").join("nmea-fusion").join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(secs) = self.watchdog_secs {
            match Duration::try_from_secs_f64(secs) {
                Ok(interval) if !interval.is_zero() => {}
                _ => {
                    return Err(FixError::Config(format!(
                        "watchdog_secs must be a positive number of seconds, got {}",
                        secs
                    )))
                }
            }
        }
        if let Some(port) = self.ports.iter().find(|p| p.path.is_empty()) {
            return Err(FixError::Config(format!("port with baudrate {} has an empty path", port.baudrate)));
        }
        Ok(())
    }

    /// Add a port, replacing the baudrate if the path is already listed
    pub fn add_port(&mut self, path: impl Into<String>, baudrate: u32) {
        let path = path.into();
        match self.ports.iter_mut().find(|p| p.path == path) {
            Some(existing) => existing.baudrate = baudrate,
            None => self.ports.push(PortConfig { path, baudrate }),
        }
    }

    pub fn reader_settings(&self) -> ReaderSettings {
        ReaderSettings {
            idle_delay: Duration::from_millis(self.idle_delay_ms),
            join_timeout: Duration::from_millis(self.join_timeout_ms),
        }
    }

    /// Per-read timeout applied to opened ports
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    /// `None` when unset or not representable; `validate()` reports the latter
    pub fn watchdog_interval(&self) -> Option<Duration> {
        self.watchdog_secs.and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}
