//! Runtime configuration
//!
//! Loaded from an optional JSON file; any field left out takes its default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AudioExpertError, Result};
use crate::metering::DEFAULT_SMOOTHING;

/// Default parameter ramp time in seconds
const DEFAULT_RAMP_TIME_SECS: f32 = 0.05;

/// Default meter polling cadence (~30 Hz)
const DEFAULT_POLL_INTERVAL_MS: u64 = 33;

/// Default peak hold
const DEFAULT_PEAK_HOLD_MS: u64 = 1500;

/// Default durable storage key
pub const DEFAULT_STORAGE_KEY: &str = "audio-expert-storage";

/// Default control bus capacity
const DEFAULT_BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ramp time constant for live parameter changes, seconds
    pub ramp_time_secs: f32,
    /// Meter smoothing coefficient in `[0, 1)`
    pub meter_smoothing: f32,
    /// Meter polling interval, milliseconds
    pub poll_interval_ms: u64,
    /// Peak hold time, milliseconds
    pub peak_hold_ms: u64,
    /// Key the snapshot is stored under
    pub storage_key: String,
    /// Directory for file-backed storage; the CLI falls back to `.audio-expert`
    pub storage_dir: Option<PathBuf>,
    /// Commands buffered on the bus before new ones are dropped
    pub bus_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ramp_time_secs: DEFAULT_RAMP_TIME_SECS,
            meter_smoothing: DEFAULT_SMOOTHING,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            peak_hold_ms: DEFAULT_PEAK_HOLD_MS,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            storage_dir: None,
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

impl Config {
    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.ramp_time_secs > 0.0) {
            return Err(AudioExpertError::InvalidConfig {
                reason: format!("ramp_time_secs must be positive, got {}", self.ramp_time_secs),
            });
        }
        if !(0.0..1.0).contains(&self.meter_smoothing) {
            return Err(AudioExpertError::InvalidConfig {
                reason: format!("meter_smoothing must be in [0, 1), got {}", self.meter_smoothing),
            });
        }
        if self.poll_interval_ms == 0 || self.peak_hold_ms == 0 {
            return Err(AudioExpertError::InvalidConfig {
                reason: "poll_interval_ms and peak_hold_ms must be non-zero".to_string(),
            });
        }
        if self.bus_capacity == 0 {
            return Err(AudioExpertError::InvalidConfig {
                reason: "bus_capacity must be non-zero".to_string(),
            });
        }
        if self.storage_key.is_empty() {
            return Err(AudioExpertError::InvalidConfig {
                reason: "storage_key must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn peak_hold(&self) -> Duration {
        Duration::from_millis(self.peak_hold_ms)
    }

    /// Settings the orchestrator needs
    pub fn chain(&self) -> ChainConfig {
        ChainConfig {
            ramp_time: self.ramp_time_secs,
            meter_smoothing: self.meter_smoothing,
        }
    }
}

/// Orchestrator settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainConfig {
    /// Ramp time constant in seconds
    pub ramp_time: f32,
    pub meter_smoothing: f32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Config::default().chain()
    }
}
