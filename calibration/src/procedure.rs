//! Operator driven calibration routines
//!
//! Each routine blocks the caller for its whole duration and never touches the
//! profile it was given, the caller decides whether to keep the result.

use std::{thread, time::Duration};

use common::types::hw::{InertialFrame, MagneticFrame};
use glam::Vec3A;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{error::CalibrationError, AxisRemap, CalibrationProfile, MagCalibration};

/// Raw chip frame readings in physical units
pub trait InertialSampler {
    fn read_inertial(&mut self) -> anyhow::Result<InertialFrame>;
    fn read_magnetic(&mut self) -> anyhow::Result<MagneticFrame>;

    /// Waits between samples
    fn pause(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

impl<S: InertialSampler + ?Sized> InertialSampler for &mut S {
    fn read_inertial(&mut self) -> anyhow::Result<InertialFrame> {
        (**self).read_inertial()
    }

    fn read_magnetic(&mut self) -> anyhow::Result<MagneticFrame> {
        (**self).read_magnetic()
    }

    fn pause(&mut self, duration: Duration) {
        (**self).pause(duration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcedureConfig {
    pub gyro_samples: u32,
    pub accel_samples: u32,
    pub sample_interval_ms: u64,
    pub mag_duration_ms: u64,
    /// Smallest mean half range (uT) accepted from a magnetometer sweep
    pub min_mag_half_range: f32,
}

impl ProcedureConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    /// Samples taken during a magnetometer sweep, at least one
    pub fn mag_samples(&self) -> u64 {
        (self.mag_duration_ms / self.sample_interval_ms.max(1)).max(1)
    }
}

impl Default for ProcedureConfig {
    fn default() -> Self {
        Self {
            gyro_samples: 256,
            accel_samples: 256,
            sample_interval_ms: 10,
            mag_duration_ms: 15_000,
            min_mag_half_range: 1.0,
        }
    }
}

fn average(
    sampler: &mut impl InertialSampler,
    samples: u32,
    interval: Duration,
    pick: impl Fn(&InertialFrame) -> [f32; 3],
) -> Result<Vec3A, CalibrationError> {
    let samples = samples.max(1);
    let mut sum = Vec3A::ZERO;

    for _ in 0..samples {
        let frame = sampler.read_inertial()?;
        sum += Vec3A::from(pick(&frame));

        sampler.pause(interval);
    }

    Ok(sum / samples as f32)
}

/// Measures the gyro bias, assumes the vehicle is not moving
#[instrument(level = "debug", skip(sampler))]
pub fn zero_gyro(
    sampler: &mut impl InertialSampler,
    config: &ProcedureConfig,
) -> Result<Vec3A, CalibrationError> {
    let bias = average(
        sampler,
        config.gyro_samples,
        config.sample_interval(),
        InertialFrame::gyro,
    )?;

    info!("Gyro bias: {bias}");

    Ok(bias)
}

/// Level calibration, the device must lie still in its mounted orientation
///
/// After correction the vehicle down axis reads +1 g and the other two read 0.
#[instrument(level = "debug", skip(sampler, profile))]
pub fn level_accel(
    sampler: &mut impl InertialSampler,
    profile: &CalibrationProfile,
    remap: &AxisRemap,
    config: &ProcedureConfig,
) -> Result<CalibrationProfile, CalibrationError> {
    let mean = average(
        sampler,
        config.accel_samples,
        config.sample_interval(),
        InertialFrame::accel,
    )?;

    let gravity = remap.invert(Vec3A::Z);
    let bias = mean - gravity;

    info!("Accel bias: {bias}");

    Ok(profile.with_accel_bias(bias))
}

/// Hard and soft iron calibration, the device must be turned through every orientation
///
/// Rejected without touching anything if the sweep covered too small a range.
#[instrument(level = "debug", skip(sampler, profile))]
pub fn sweep_mag(
    sampler: &mut impl InertialSampler,
    profile: &CalibrationProfile,
    config: &ProcedureConfig,
) -> Result<CalibrationProfile, CalibrationError> {
    let mut min = Vec3A::splat(f32::INFINITY);
    let mut max = Vec3A::splat(f32::NEG_INFINITY);

    for _ in 0..config.mag_samples() {
        let mag = Vec3A::from(sampler.read_magnetic()?.mag());
        min = min.min(mag);
        max = max.max(mag);

        sampler.pause(config.sample_interval());
    }

    let mag = fit_mag(min, max, config.min_mag_half_range)?;
    info!("Mag bias: {}, scale: {}", mag.bias, mag.scale);

    Ok(profile.with_mag(mag))
}

/// Bias is the centre of the range, scale stretches every axis to the mean half range
pub fn fit_mag(min: Vec3A, max: Vec3A, threshold: f32) -> Result<MagCalibration, CalibrationError> {
    let half_range = (max - min) / 2.0;
    let mean_half_range = (half_range.x + half_range.y + half_range.z) / 3.0;

    let degenerate = half_range.min_element() <= 0.0 || !half_range.is_finite();
    if degenerate || mean_half_range < threshold {
        return Err(CalibrationError::InsufficientExcitation {
            mean_half_range: if mean_half_range.is_finite() {
                mean_half_range
            } else {
                0.0
            },
            threshold,
        });
    }

    Ok(MagCalibration {
        bias: (max + min) / 2.0,
        scale: Vec3A::splat(mean_half_range) / half_range,
    })
}
