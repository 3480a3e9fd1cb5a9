//! Runs calibration procedures against the live IMU and keeps the shared profile current

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::anyhow;
use calibration::{
    error::{CalibrationError, StoreError},
    procedure::{self, InertialSampler, ProcedureConfig},
    store::{Backing, CalibrationStore, LoadResult},
    AxisRemap, CalibrationProfile,
};
use glam::Vec3A;
use tracing::{info, instrument};

use crate::fusion::SharedProfile;

/// `S` is normally a [`crate::imu::RemoteImu`], the sampling thread keeps ownership of the bus
pub struct Calibrator<S, B> {
    imu: Option<S>,
    profile: SharedProfile,
    store: CalibrationStore<B>,
    remap: AxisRemap,
    config: ProcedureConfig,

    /// The store holds a record for the current profile
    persisted: bool,
}

impl<S: InertialSampler, B: Backing> Calibrator<S, B> {
    /// Starts from whatever the store holds
    pub fn new(
        imu: Option<S>,
        mut store: CalibrationStore<B>,
        remap: AxisRemap,
        config: ProcedureConfig,
    ) -> Self {
        let loaded = store.load();
        match loaded {
            LoadResult::Valid(profile) => info!("Loaded calibration\n{profile}"),
            LoadResult::Absent => info!("No calibration stored"),
            LoadResult::VersionMismatch { found } => {
                info!("Ignoring calibration with version {found:#06x}")
            }
        }

        Self {
            imu,
            profile: Arc::new(Mutex::new(loaded.profile())),
            store,
            remap,
            config,
            persisted: loaded.is_valid(),
        }
    }

    /// The profile read by the sampling thread
    pub fn shared_profile(&self) -> SharedProfile {
        self.profile.clone()
    }

    pub fn current(&self) -> CalibrationProfile {
        *self.profile.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn imu_ready(&self) -> bool {
        self.imu.is_some()
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn procedure(&self) -> &ProcedureConfig {
        &self.config
    }

    pub fn store(&self) -> &CalibrationStore<B> {
        &self.store
    }

    /// Session only, nothing is written to the store
    #[instrument(level = "debug", skip(self))]
    pub fn zero_gyro(&mut self) -> Result<Vec3A, CalibrationError> {
        let imu = sampler(&mut self.imu)?;
        let bias = procedure::zero_gyro(imu, &self.config)?;

        let mut profile = self.profile.lock().unwrap_or_else(PoisonError::into_inner);
        *profile = profile.with_gyro_bias(bias);

        Ok(bias)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn level_accel(&mut self) -> Result<CalibrationProfile, CalibrationError> {
        let current = self.current();
        let imu = sampler(&mut self.imu)?;
        let updated = procedure::level_accel(imu, &current, &self.remap, &self.config)?;

        self.commit(updated)
    }

    /// A rejected sweep leaves both the store and the profile untouched
    #[instrument(level = "debug", skip(self))]
    pub fn sweep_mag(&mut self) -> Result<CalibrationProfile, CalibrationError> {
        let current = self.current();
        let imu = sampler(&mut self.imu)?;
        let updated = procedure::sweep_mag(imu, &current, &self.config)?;

        self.commit(updated)
    }

    /// Drops the stored record, keeps the session gyro bias
    #[instrument(level = "debug", skip(self))]
    pub fn erase(&mut self) -> Result<CalibrationProfile, StoreError> {
        self.store.erase()?;
        self.persisted = false;

        let mut profile = self.profile.lock().unwrap_or_else(PoisonError::into_inner);
        *profile = profile.without_persisted();

        Ok(*profile)
    }

    /// Saved first, only a stored profile becomes active
    fn commit(&mut self, updated: CalibrationProfile) -> Result<CalibrationProfile, CalibrationError> {
        self.store.save(&updated)?;
        self.persisted = true;

        *self.profile.lock().unwrap_or_else(PoisonError::into_inner) = updated;

        Ok(updated)
    }
}

fn sampler<S>(imu: &mut Option<S>) -> Result<&mut S, CalibrationError> {
    imu.as_mut()
        .ok_or_else(|| CalibrationError::Sensor(anyhow!("IMU not available")))
}

#[cfg(test)]
pub(crate) mod tests {
    use calibration::store::MemoryBacking;
    use common::types::{
        hw::{InertialFrame, MagneticFrame},
        units::{Dps, GForce, Microtesla},
    };
    use glam::vec3a;

    use super::*;

    /// Stationary IMU, the magnetometer traces a circle in the XY plane
    pub struct Bench {
        pub accel: [f32; 3],
        pub gyro: [f32; 3],
        pub mag_radius: f32,
        pub reads: u32,
    }

    impl Bench {
        pub fn level() -> Self {
            Self {
                accel: [0.02, -0.01, 1.03],
                gyro: [0.5, -0.25, 1.0],
                mag_radius: 30.0,
                reads: 0,
            }
        }
    }

    impl InertialSampler for Bench {
        fn read_inertial(&mut self) -> anyhow::Result<InertialFrame> {
            let [ax, ay, az] = self.accel;
            let [gx, gy, gz] = self.gyro;

            Ok(InertialFrame {
                accel_x: GForce(ax),
                accel_y: GForce(ay),
                accel_z: GForce(az),
                gyro_x: Dps(gx),
                gyro_y: Dps(gy),
                gyro_z: Dps(gz),
                ..Default::default()
            })
        }

        fn read_magnetic(&mut self) -> anyhow::Result<MagneticFrame> {
            let step = self.reads % 4;
            self.reads += 1;

            let r = self.mag_radius;
            let (x, y, z) = match step {
                0 => (r, 0.0, r),
                1 => (0.0, r, -r),
                2 => (-r, 0.0, r),
                _ => (0.0, -r, -r),
            };

            Ok(MagneticFrame {
                mag_x: Microtesla(x + 5.0),
                mag_y: Microtesla(y),
                mag_z: Microtesla(z),
            })
        }
    }

    pub fn fast_config() -> ProcedureConfig {
        ProcedureConfig {
            gyro_samples: 8,
            accel_samples: 8,
            sample_interval_ms: 0,
            mag_duration_ms: 8,
            min_mag_half_range: 1.0,
        }
    }

    pub fn calibrator(bench: Bench) -> Calibrator<Bench, MemoryBacking> {
        Calibrator::new(
            Some(bench),
            CalibrationStore::new(MemoryBacking::default()),
            AxisRemap::IDENTITY,
            fast_config(),
        )
    }

    #[test]
    fn starts_from_store() {
        let mut store = CalibrationStore::new(MemoryBacking::default());
        let saved = CalibrationProfile::default().with_accel_bias(vec3a(0.1, 0.0, 0.0));
        store.save(&saved).expect("Save");

        let calibrator: Calibrator<Bench, _> =
            Calibrator::new(None, store, AxisRemap::IDENTITY, fast_config());

        assert!(calibrator.is_persisted());
        assert!(!calibrator.imu_ready());
        assert_eq!(calibrator.current(), saved);
    }

    #[test]
    fn gyro_zero_is_session_only() {
        let mut calibrator = calibrator(Bench::level());

        let bias = calibrator.zero_gyro().expect("Zero gyro");
        assert_eq!(bias, vec3a(0.5, -0.25, 1.0));
        assert_eq!(calibrator.shared_profile().lock().expect("Lock").gyro_bias, bias);

        assert!(!calibrator.is_persisted());
        assert!(calibrator.store().backing().contents().is_none());
    }

    #[test]
    fn level_is_saved_then_applied() {
        let mut calibrator = calibrator(Bench::level());
        calibrator.zero_gyro().expect("Zero gyro");

        let profile = calibrator.level_accel().expect("Level");

        assert!((profile.accel_bias - vec3a(0.02, -0.01, 0.03)).abs().max_element() < 1e-5);
        assert_eq!(profile.gyro_bias, vec3a(0.5, -0.25, 1.0));
        assert_eq!(calibrator.current(), profile);
        assert!(calibrator.is_persisted());
        assert!(calibrator.store().backing().contents().is_some());
    }

    #[test]
    fn rejected_sweep_changes_nothing() {
        let mut calibrator = calibrator(Bench {
            mag_radius: 0.2,
            ..Bench::level()
        });
        let before = calibrator.current();

        let rst = calibrator.sweep_mag();

        assert!(matches!(
            rst,
            Err(CalibrationError::InsufficientExcitation { .. })
        ));
        assert_eq!(calibrator.current(), before);
        assert!(calibrator.store().backing().contents().is_none());
    }

    #[test]
    fn sweep_centres_the_circle() {
        let mut calibrator = calibrator(Bench::level());

        let profile = calibrator.sweep_mag().expect("Sweep");

        assert_eq!(profile.mag_bias, vec3a(5.0, 0.0, 0.0));
        assert_eq!(profile.mag_scale, Vec3A::ONE);
    }

    #[test]
    fn erase_keeps_gyro() {
        let mut calibrator = calibrator(Bench::level());
        calibrator.zero_gyro().expect("Zero gyro");
        calibrator.level_accel().expect("Level");

        let profile = calibrator.erase().expect("Erase");

        assert_eq!(profile.accel_bias, Vec3A::ZERO);
        assert_eq!(profile.gyro_bias, vec3a(0.5, -0.25, 1.0));
        assert!(!calibrator.is_persisted());
        assert!(calibrator.store().backing().contents().is_none());
    }

    #[test]
    fn no_imu() {
        let mut calibrator: Calibrator<Bench, _> = Calibrator::new(
            None,
            CalibrationStore::new(MemoryBacking::default()),
            AxisRemap::IDENTITY,
            fast_config(),
        );

        assert!(matches!(
            calibrator.level_accel(),
            Err(CalibrationError::Sensor(_))
        ));
    }
}
