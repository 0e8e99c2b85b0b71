use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Environment variable naming the daemon's JSON config file.
pub const CONFIG_PATH_ENV: &str = "AICLK_THROTTLER_CONFIG";

/// Chip limits section of the firmware table.
///
/// Integer watts, amps and degrees Celsius, as stored in SPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChipLimits {
    pub tdp_limit: u32,
    pub tdc_fast_limit: u32,
    pub tdc_limit: u32,
    pub thm_limit: u32,
    pub gddr_thm_limit: u32,
    /// Ceiling for board power limits received from the control plane.
    /// Not used to initialize the board power channel.
    pub board_power_limit: u32,
}

impl Default for ChipLimits {
    fn default() -> Self {
        Self {
            tdp_limit: 300,
            tdc_fast_limit: 400,
            tdc_limit: 300,
            thm_limit: 90,
            gddr_thm_limit: 90,
            board_power_limit: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThrottlerConfig {
    pub chip_limits: ChipLimits,

    /// Control period (ms). The throttler itself has no notion of time;
    /// this only drives the interval in [`Throttler::run`](super::Throttler::run).
    pub tick_period_ms: u64,
}

impl Default for ThrottlerConfig {
    fn default() -> Self {
        Self {
            chip_limits: ChipLimits::default(),
            tick_period_ms: 10,
        }
    }
}

impl ThrottlerConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Load from the file named by [`CONFIG_PATH_ENV`], or fall back to
    /// defaults when the variable is unset.
    pub fn load_from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }
}
