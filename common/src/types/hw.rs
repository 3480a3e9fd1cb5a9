use serde::{Deserialize, Serialize};

use super::units::{Celsius, Degrees, Dps, Feet, GForce, Microtesla, Mph};

//
// Input
//

/// One burst read of the accelerometer, die temperature and gyroscope.
///
/// Values are in the sensor's own frame with no calibration applied.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InertialFrame {
    pub accel_x: GForce,
    pub accel_y: GForce,
    pub accel_z: GForce,

    pub tempature: Celsius,

    pub gyro_x: Dps,
    pub gyro_y: Dps,
    pub gyro_z: Dps,
}

/// Magnetometer reading in the sensor's own frame, uncorrected
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MagneticFrame {
    pub mag_x: Microtesla,
    pub mag_y: Microtesla,
    pub mag_z: Microtesla,
}

impl InertialFrame {
    pub fn accel(&self) -> [f32; 3] {
        [self.accel_x.0, self.accel_y.0, self.accel_z.0]
    }

    pub fn gyro(&self) -> [f32; 3] {
        [self.gyro_x.0, self.gyro_y.0, self.gyro_z.0]
    }
}

impl MagneticFrame {
    pub fn mag(&self) -> [f32; 3] {
        [self.mag_x.0, self.mag_y.0, self.mag_z.0]
    }
}

/// A fix handed back by the satellite receiver collaborator
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PositionFix {
    /// Decimal degrees, positive north
    pub lat: f64,
    /// Decimal degrees, positive east
    pub lon: f64,
    pub speed: Mph,
    pub altitude: Feet,
    pub heading: Degrees,
    pub satellites: u8,
    pub valid: bool,
}
