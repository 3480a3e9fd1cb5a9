//! The fused sample shared between the producer and consumer threads

use serde::{Deserialize, Serialize};

use crate::types::{
    hw::PositionFix,
    units::{Afr, Celsius, Degrees, Dps, Fahrenheit, Feet, GForce, InHg, Microtesla, Mph, Psi},
};

/// One fully populated reading of every source
///
/// Sources that are absent leave their group at the default (zero) values.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SensorSample {
    pub position: PositionGroup,
    pub inertial: InertialGroup,
    pub engine: EngineGroup,
    pub status: SampleStatus,
}

#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PositionGroup {
    /// Latitude in degrees * 1e7
    pub lat_e7: i32,
    /// Longitude in degrees * 1e7
    pub lon_e7: i32,
    pub speed: Mph,
    pub altitude: Feet,
    pub heading: Degrees,
    pub satellites: u8,
}

/// Inertial readings in the vehicle frame (X forward, Y right, Z down)
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InertialGroup {
    pub accel_x: GForce,
    pub accel_y: GForce,
    pub accel_z: GForce,

    pub gyro_x: Dps,
    pub gyro_y: Dps,
    pub gyro_z: Dps,

    pub mag_x: Microtesla,
    pub mag_y: Microtesla,
    pub mag_z: Microtesla,

    pub temperature: Celsius,
}

#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineGroup {
    pub afr_bank1: Afr,
    pub afr_bank2: Afr,
    pub vehicle_speed: Mph,
    pub manifold_pressure: InHg,
    pub oil_pressure: Psi,
    pub coolant: Fahrenheit,
}

#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SampleStatus {
    /// No valid fix has been seen recently, position fields are the last known values
    pub fix_stale: bool,
    /// Keyframe counter to mark this sample with, set only on the copy handed to the log sink
    pub keyframe: Option<u32>,
}

impl PositionGroup {
    pub fn apply_fix(&mut self, fix: &PositionFix) {
        self.lat_e7 = degrees_to_e7(fix.lat);
        self.lon_e7 = degrees_to_e7(fix.lon);
        self.speed = fix.speed;
        self.altitude = fix.altitude;
        self.heading = fix.heading;
        self.satellites = fix.satellites;
    }

    pub fn latitude(&self) -> f64 {
        self.lat_e7 as f64 / 1e7
    }

    pub fn longitude(&self) -> f64 {
        self.lon_e7 as f64 / 1e7
    }
}

pub fn degrees_to_e7(degrees: f64) -> i32 {
    (degrees * 1e7).round() as i32
}

/// Formats a fixed point degE7 value as signed decimal degrees with all 7 fractional digits
pub fn format_deg_e7(deg_e7: i32) -> String {
    let sign = if deg_e7 < 0 { "-" } else { "" };
    let magnitude = deg_e7.unsigned_abs();

    format!(
        "{sign}{}.{:07}",
        magnitude / 10_000_000,
        magnitude % 10_000_000
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deg_e7_formatting() {
        assert_eq!(format_deg_e7(377_598_000), "37.7598000");
        assert_eq!(format_deg_e7(-1_223_927_000), "-122.3927000");
        assert_eq!(format_deg_e7(-5), "-0.0000005");
        assert_eq!(format_deg_e7(0), "0.0000000");
        assert_eq!(format_deg_e7(i32::MIN), "-214.7483648");
    }

    #[test]
    fn fix_is_stored_as_fixed_point() {
        let mut position = PositionGroup::default();
        position.apply_fix(&PositionFix {
            lat: 37.7598,
            lon: -122.3927,
            satellites: 9,
            valid: true,
            ..Default::default()
        });

        assert_eq!(position.lat_e7, 377_598_000);
        assert_eq!(position.lon_e7, -1_223_927_000);
        assert_eq!(position.satellites, 9);
        assert!((position.latitude() - 37.7598).abs() < 1e-6);
    }
}
