use std::{fs, io, path::Path, time::Duration};

use anyhow::Context;
use calibration::{procedure::ProcedureConfig, AxisRemap};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    engine::ChannelMap,
    peripheral::{ak8963::Ak8963, mpu9250::Mpu9250},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggerConfig {
    pub log_level: LogLevel,

    pub serial: SerialConfig,
    pub imu: ImuConfig,
    pub engine: ChannelMap,
    pub timing: TimingConfig,
    pub recording: RecordingConfig,
    pub calibration: CalibrationConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SerialConfig {
    /// UART the ISP2 chain is wired to
    pub port: String,
    pub baud: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImuConfig {
    pub enabled: bool,
    pub i2c_bus: u8,
    pub mpu_address: u8,
    pub mag_address: u8,
    /// Chip axes feeding vehicle forward, right and down
    pub remap: AxisRemap,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    pub sample_ms: u64,
    pub broadcast_ms: u64,
    pub console_ms: u64,
    pub fix_stale_ms: u64,
    pub flush_ms: u64,
    pub live_debug_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecordingConfig {
    pub directory: String,
    /// Base of the log file name, the local time as DDHHMM when unset
    pub name_hint: Option<String>,
    pub max_write_errors: u32,
    /// Write a DD/MM/YY HH:MM:SS line before the header
    pub date_line: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CalibrationConfig {
    pub record_path: String,
    #[serde(flatten)]
    pub procedure: ProcedureConfig,
}

impl LoggerConfig {
    /// Defaults if `path` does not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Read config {}", path.display()));
            }
        };

        let config: Self =
            toml::from_str(&contents).with_context(|| format!("Parse config {}", path.display()))?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.imu.remap.validate().context("imu.remap")?;

        anyhow::ensure!(self.timing.sample_ms > 0, "timing.sample_ms must be non zero");
        anyhow::ensure!(
            self.recording.max_write_errors > 0,
            "recording.max_write_errors must be non zero"
        );

        Ok(())
    }
}

impl LogLevel {
    pub fn level(&self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl TimingConfig {
    pub fn sample(&self) -> Duration {
        Duration::from_millis(self.sample_ms)
    }

    pub fn broadcast(&self) -> Duration {
        Duration::from_millis(self.broadcast_ms)
    }

    pub fn console(&self) -> Duration {
        Duration::from_millis(self.console_ms)
    }

    pub fn fix_stale(&self) -> Duration {
        Duration::from_millis(self.fix_stale_ms)
    }

    pub fn flush(&self) -> Duration {
        Duration::from_millis(self.flush_ms)
    }

    pub fn live_debug(&self) -> Duration {
        Duration::from_millis(self.live_debug_ms)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/serial0".to_owned(),
            baud: isp2::BAUD,
        }
    }
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            i2c_bus: Mpu9250::I2C_BUS,
            mpu_address: Mpu9250::I2C_ADDRESS,
            mag_address: Ak8963::I2C_ADDRESS,
            remap: AxisRemap::IDENTITY,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sample_ms: 80,
            broadcast_ms: 200,
            console_ms: 100,
            fix_stale_ms: 2000,
            flush_ms: 1000,
            live_debug_ms: 500,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            directory: "logs".to_owned(),
            name_hint: None,
            max_write_errors: 3,
            date_line: true,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            record_path: "calibration.toml".to_owned(),
            procedure: ProcedureConfig::default(),
        }
    }
}
