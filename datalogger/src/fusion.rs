//! Builds one [`SensorSample`] per sampling period and publishes it

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use anyhow::Context;
use calibration::{correction, procedure::InertialSampler, AxisRemap, CalibrationProfile};
use common::{
    sample::{InertialGroup, SensorSample},
    snapshot::Publisher,
    types::units::{Celsius, Dps, GForce, Microtesla},
};
use crossbeam::channel::Receiver;
use glam::Vec3A;
use tracing::{debug, instrument};

use crate::{
    engine::EngineUpdate,
    imu::ImuRequest,
    position::{PositionSource, PositionTracker},
};

pub type SharedProfile = Arc<Mutex<CalibrationProfile>>;

pub struct Fusion<S, P> {
    publisher: Publisher<SensorSample>,
    /// The back sample, only this thread writes it
    sample: SensorSample,

    engine: Receiver<EngineUpdate>,
    /// Only this thread touches the bus, calibration reads come in as [`ImuRequest`]s
    imu: Option<S>,
    profile: SharedProfile,
    remap: AxisRemap,

    position: P,
    tracker: PositionTracker,
}

impl<S: InertialSampler, P: PositionSource> Fusion<S, P> {
    pub fn new(
        publisher: Publisher<SensorSample>,
        engine: Receiver<EngineUpdate>,
        imu: Option<S>,
        profile: SharedProfile,
        remap: AxisRemap,
        position: P,
        fix_stale_after: Duration,
    ) -> Self {
        Self {
            publisher,
            sample: SensorSample::default(),
            engine,
            imu,
            profile,
            remap,
            position,
            tracker: PositionTracker::new(fix_stale_after),
        }
    }

    /// Folds in every source and publishes
    ///
    /// Sensor errors leave the previous inertial values in place and are returned
    /// after the sample has been published.
    #[instrument(level = "trace", skip(self))]
    pub fn step(&mut self, now: Instant) -> anyhow::Result<()> {
        for update in self.engine.try_iter() {
            update.apply(&mut self.sample.engine);
        }

        let fix = self.position.latest_fix();
        self.sample.status.fix_stale = self.tracker.update(&mut self.sample.position, fix, now);

        let rst = self.read_inertial();

        self.publisher.publish(&self.sample);

        rst
    }

    /// Raw read on behalf of another thread
    pub fn serve(&mut self, request: ImuRequest) {
        request.answer(self.imu.as_mut());
    }

    fn read_inertial(&mut self) -> anyhow::Result<()> {
        let Some(imu) = &mut self.imu else {
            return Ok(());
        };

        let inertial = imu.read_inertial().context("Read inertial frame")?;
        let magnetic = imu.read_magnetic();

        let magnetic = match magnetic {
            Ok(magnetic) => Some(magnetic),
            Err(err) => {
                debug!("Magnetometer read failed: {err:#}");
                None
            }
        };

        let profile = *self.profile.lock().unwrap_or_else(PoisonError::into_inner);
        let corrected = correction::correct(&profile, &self.remap, &inertial, magnetic.as_ref());

        let previous = &self.sample.inertial;
        let mag = if magnetic.is_some() {
            corrected.mag
        } else {
            Vec3A::new(previous.mag_x.0, previous.mag_y.0, previous.mag_z.0)
        };

        self.sample.inertial = InertialGroup {
            accel_x: GForce(corrected.accel.x),
            accel_y: GForce(corrected.accel.y),
            accel_z: GForce(corrected.accel.z),
            gyro_x: Dps(corrected.gyro.x),
            gyro_y: Dps(corrected.gyro.y),
            gyro_z: Dps(corrected.gyro.z),
            mag_x: Microtesla(mag.x),
            mag_y: Microtesla(mag.y),
            mag_z: Microtesla(mag.z),
            temperature: Celsius(corrected.temperature),
        };

        Ok(())
    }
}
