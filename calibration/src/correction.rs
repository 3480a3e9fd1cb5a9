use common::types::hw::{InertialFrame, MagneticFrame};
use glam::Vec3A;

use crate::{AxisRemap, CalibrationProfile};

/// Calibrated readings in the vehicle frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CorrectedImu {
    /// g
    pub accel: Vec3A,
    /// dps
    pub gyro: Vec3A,
    /// uT, zero if the magnetometer was not read
    pub mag: Vec3A,
    /// C
    pub temperature: f32,
}

/// Subtracts biases, applies the soft iron scale and then rotates into the vehicle frame
pub fn correct(
    profile: &CalibrationProfile,
    remap: &AxisRemap,
    inertial: &InertialFrame,
    magnetic: Option<&MagneticFrame>,
) -> CorrectedImu {
    let accel = profile.correct_accel(inertial.accel().into());
    let gyro = profile.correct_gyro(inertial.gyro().into());
    let mag = magnetic
        .map(|it| remap.apply(profile.correct_mag(it.mag().into())))
        .unwrap_or(Vec3A::ZERO);

    CorrectedImu {
        accel: remap.apply(accel),
        gyro: remap.apply(gyro),
        mag,
        temperature: inertial.tempature.0,
    }
}

#[cfg(test)]
mod tests {
    use common::types::units::{Celsius, Dps, GForce, Microtesla};
    use glam::vec3a;

    use super::*;
    use crate::AxisSource;

    #[test]
    fn bias_then_remap() {
        let profile = CalibrationProfile::default()
            .with_accel_bias(vec3a(0.5, 0.0, 0.0))
            .with_gyro_bias(vec3a(0.0, 1.0, 0.0));
        let remap = AxisRemap {
            forward: AxisSource::Y,
            right: AxisSource::X.neg(),
            down: AxisSource::Z,
        };

        let inertial = InertialFrame {
            accel_x: GForce(1.5),
            accel_y: GForce(0.25),
            accel_z: GForce(1.0),
            tempature: Celsius(30.0),
            gyro_x: Dps(2.0),
            gyro_y: Dps(4.0),
            gyro_z: Dps(-1.0),
        };
        let magnetic = MagneticFrame {
            mag_x: Microtesla(20.0),
            mag_y: Microtesla(-10.0),
            mag_z: Microtesla(40.0),
        };

        let corrected = correct(&profile, &remap, &inertial, Some(&magnetic));

        assert_eq!(corrected.accel, vec3a(0.25, -1.0, 1.0));
        assert_eq!(corrected.gyro, vec3a(3.0, -2.0, -1.0));
        assert_eq!(corrected.mag, vec3a(-10.0, -20.0, 40.0));
        assert_eq!(corrected.temperature, 30.0);
    }

    #[test]
    fn missing_magnetometer_reads_zero() {
        let corrected = correct(
            &CalibrationProfile::default(),
            &AxisRemap::IDENTITY,
            &InertialFrame::default(),
            None,
        );

        assert_eq!(corrected.mag, Vec3A::ZERO);
    }
}
