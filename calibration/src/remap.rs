//! Mapping from the sensor's mounting frame to the vehicle frame

use std::fmt::{self, Display};

use glam::{vec3a, Vec3A};
use serde::{Deserialize, Serialize};

use crate::error::RemapError;

/// An axis of the sensor chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipAxis {
    X,
    Y,
    Z,
}

impl ChipAxis {
    pub const fn index(self) -> usize {
        match self {
            ChipAxis::X => 0,
            ChipAxis::Y => 1,
            ChipAxis::Z => 2,
        }
    }

    fn name(self) -> char {
        match self {
            ChipAxis::X => 'x',
            ChipAxis::Y => 'y',
            ChipAxis::Z => 'z',
        }
    }
}

/// One vehicle axis, taken from a chip axis with a sign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AxisSource {
    axis: ChipAxis,
    negate: bool,
}

impl AxisSource {
    pub const X: Self = Self::new(ChipAxis::X, false);
    pub const Y: Self = Self::new(ChipAxis::Y, false);
    pub const Z: Self = Self::new(ChipAxis::Z, false);

    pub const fn new(axis: ChipAxis, negate: bool) -> Self {
        Self { axis, negate }
    }

    pub const fn axis(&self) -> ChipAxis {
        self.axis
    }

    pub const fn is_negated(&self) -> bool {
        self.negate
    }

    pub const fn neg(self) -> Self {
        Self {
            negate: !self.negate,
            ..self
        }
    }

    pub fn sign(&self) -> f32 {
        if self.negate {
            -1.0
        } else {
            1.0
        }
    }

    pub fn pick(&self, chip: Vec3A) -> f32 {
        chip[self.axis.index()] * self.sign()
    }
}

impl TryFrom<String> for AxisSource {
    type Error = RemapError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let mut chars = value.trim().chars();

        let (negate, axis) = match (chars.next(), chars.next(), chars.next()) {
            (Some('+'), Some(axis), None) => (false, axis),
            (Some('-'), Some(axis), None) => (true, axis),
            (Some(axis), None, None) => (false, axis),
            _ => return Err(RemapError::BadAxis(value)),
        };

        let axis = match axis.to_ascii_lowercase() {
            'x' => ChipAxis::X,
            'y' => ChipAxis::Y,
            'z' => ChipAxis::Z,
            _ => return Err(RemapError::BadAxis(value)),
        };

        Ok(Self::new(axis, negate))
    }
}

impl From<AxisSource> for String {
    fn from(value: AxisSource) -> Self {
        value.to_string()
    }
}

impl Display for AxisSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.negate { '-' } else { '+' };
        write!(f, "{sign}{}", self.axis.name())
    }
}

/// Where each vehicle axis (X forward, Y right, Z down) comes from on the chip
///
/// Applied the same way to acceleration, angular rate and magnetic field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisRemap {
    pub forward: AxisSource,
    pub right: AxisSource,
    pub down: AxisSource,
}

impl AxisRemap {
    pub const IDENTITY: Self = Self {
        forward: AxisSource::X,
        right: AxisSource::Y,
        down: AxisSource::Z,
    };

    /// Every chip axis must be used exactly once
    pub fn validate(&self) -> Result<(), RemapError> {
        let mut used = [false; 3];

        for source in [self.forward, self.right, self.down] {
            let slot = &mut used[source.axis.index()];
            if *slot {
                return Err(RemapError::NotPermutation(source.axis.name()));
            }
            *slot = true;
        }

        Ok(())
    }

    pub fn apply(&self, chip: Vec3A) -> Vec3A {
        vec3a(
            self.forward.pick(chip),
            self.right.pick(chip),
            self.down.pick(chip),
        )
    }

    /// The chip frame vector a reading of `vehicle` came from
    pub fn invert(&self, vehicle: Vec3A) -> Vec3A {
        let mut chip = Vec3A::ZERO;

        for (idx, source) in [self.forward, self.right, self.down].iter().enumerate() {
            chip[source.axis.index()] = vehicle[idx] * source.sign();
        }

        chip
    }
}

impl Default for AxisRemap {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_axes() {
        assert_eq!(AxisSource::try_from("+x".to_owned()), Ok(AxisSource::X));
        assert_eq!(AxisSource::try_from("-Z".to_owned()), Ok(AxisSource::Z.neg()));
        assert_eq!(AxisSource::try_from("y".to_owned()), Ok(AxisSource::Y));
        assert!(AxisSource::try_from("+w".to_owned()).is_err());
        assert!(AxisSource::try_from("+-x".to_owned()).is_err());
        assert!(AxisSource::try_from(String::new()).is_err());

        assert_eq!(AxisSource::Y.neg().to_string(), "-y");
    }

    #[test]
    fn every_source_picks_a_chip_axis() {
        let chip = vec3a(1.0, 2.0, 3.0);

        for axis in [ChipAxis::X, ChipAxis::Y, ChipAxis::Z] {
            let source = AxisSource::new(axis, true);
            assert_eq!(source.pick(chip), -chip[axis.index()]);
            assert_eq!(source.axis(), axis);
            assert!(source.is_negated());
        }
    }

    #[test]
    fn permutation_check() {
        assert_eq!(AxisRemap::IDENTITY.validate(), Ok(()));

        let repeated = AxisRemap {
            forward: AxisSource::X,
            right: AxisSource::X.neg(),
            down: AxisSource::Z,
        };
        assert_eq!(repeated.validate(), Err(RemapError::NotPermutation('x')));
    }

    #[test]
    fn rotated_mounting() {
        // Chip mounted upside down and turned 90 degrees
        let remap = AxisRemap {
            forward: AxisSource::Y,
            right: AxisSource::X,
            down: AxisSource::Z.neg(),
        };
        let chip = vec3a(1.0, 2.0, 3.0);

        assert_eq!(remap.apply(chip), vec3a(2.0, 1.0, -3.0));
        assert_eq!(remap.invert(remap.apply(chip)), chip);
    }

    #[test]
    fn toml_form() {
        #[derive(Deserialize)]
        struct Wrapper {
            remap: AxisRemap,
        }

        let parsed: Wrapper = toml::from_str(
            r#"
            [remap]
            forward = "-y"
            right = "+x"
            down = "+z"
            "#,
        )
        .expect("Parse");

        assert_eq!(parsed.remap.forward, AxisSource::Y.neg());
        assert_eq!(parsed.remap.validate(), Ok(()));
    }
}
