//! Inertial sensor calibration: bias and scale correction, axis remapping,
//! the calibration procedures and the versioned calibration store.

pub mod correction;
pub mod error;
pub mod procedure;
pub mod remap;
pub mod store;

use std::fmt::{self, Display};

use glam::Vec3A;
use serde::{Deserialize, Serialize};

pub use error::{CalibrationError, RemapError, StoreError};
pub use remap::{AxisRemap, AxisSource, ChipAxis};
pub use store::{CalibrationRecord, CalibrationStore, LoadResult};

/// Version tag written with every record, anything else is ignored on load
pub const CALIBRATION_VERSION: u16 = 0xAB01;

/// Corrections applied to raw chip frame readings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    /// g, persisted
    pub accel_bias: Vec3A,
    /// uT hard iron offset, persisted
    pub mag_bias: Vec3A,
    /// Soft iron per axis scale, persisted
    pub mag_scale: Vec3A,

    /// dps, measured every boot and never persisted
    #[serde(skip)]
    pub gyro_bias: Vec3A,
}

/// Result of a successful magnetometer calibration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagCalibration {
    pub bias: Vec3A,
    pub scale: Vec3A,
}

impl CalibrationProfile {
    pub const DEFAULT: Self = Self {
        accel_bias: Vec3A::ZERO,
        mag_bias: Vec3A::ZERO,
        mag_scale: Vec3A::ONE,
        gyro_bias: Vec3A::ZERO,
    };

    pub fn correct_accel(&self, raw: Vec3A) -> Vec3A {
        raw - self.accel_bias
    }

    pub fn correct_gyro(&self, raw: Vec3A) -> Vec3A {
        raw - self.gyro_bias
    }

    pub fn correct_mag(&self, raw: Vec3A) -> Vec3A {
        (raw - self.mag_bias) * self.mag_scale
    }

    pub fn with_accel_bias(self, accel_bias: Vec3A) -> Self {
        Self { accel_bias, ..self }
    }

    pub fn with_gyro_bias(self, gyro_bias: Vec3A) -> Self {
        Self { gyro_bias, ..self }
    }

    pub fn with_mag(self, mag: MagCalibration) -> Self {
        Self {
            mag_bias: mag.bias,
            mag_scale: mag.scale,
            ..self
        }
    }

    /// Defaults for every persisted field, the session gyro bias is kept
    pub fn without_persisted(self) -> Self {
        Self {
            gyro_bias: self.gyro_bias,
            ..Self::DEFAULT
        }
    }

    pub fn record(&self) -> CalibrationRecord {
        CalibrationRecord {
            version: CALIBRATION_VERSION,
            accel_bias: self.accel_bias.to_array(),
            mag_bias: self.mag_bias.to_array(),
            mag_scale: self.mag_scale.to_array(),
        }
    }

    /// The version is not checked here, see [`CalibrationStore::load`]
    pub fn from_record(record: &CalibrationRecord) -> Self {
        Self {
            accel_bias: record.accel_bias.into(),
            mag_bias: record.mag_bias.into(),
            mag_scale: record.mag_scale.into(),
            gyro_bias: Vec3A::ZERO,
        }
    }
}

impl Default for CalibrationProfile {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Display for CalibrationProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [ax, ay, az] = self.accel_bias.to_array();
        let [gx, gy, gz] = self.gyro_bias.to_array();
        let [mx, my, mz] = self.mag_bias.to_array();
        let [sx, sy, sz] = self.mag_scale.to_array();

        writeln!(f, "Accel bias (g):   {ax:.4}, {ay:.4}, {az:.4}")?;
        writeln!(f, "Gyro bias (dps):  {gx:.4}, {gy:.4}, {gz:.4}")?;
        writeln!(f, "Mag bias (uT):    {mx:.2}, {my:.2}, {mz:.2}")?;
        write!(f, "Mag scale:        {sx:.4}, {sy:.4}, {sz:.4}")
    }
}
