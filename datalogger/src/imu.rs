use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use calibration::procedure::InertialSampler;
use common::types::hw::{InertialFrame, MagneticFrame};
use crossbeam::channel::{self, Receiver, Sender};
use tracing::{info, instrument, warn};

use crate::{
    config::ImuConfig,
    peripheral::{ak8963::Ak8963, mpu9250::Mpu9250},
};

/// MPU-9250 with its AK8963 magnetometer reached through the I2C bypass
pub struct Imu {
    mpu: Mpu9250,
    mag: Option<Ak8963>,
}

impl Imu {
    /// A missing magnetometer is tolerated, a missing accelerometer/gyro is not
    #[instrument(level = "debug")]
    pub fn new(config: &ImuConfig) -> anyhow::Result<Self> {
        let mpu = Mpu9250::new(config.i2c_bus, config.mpu_address)
            .context("Inertial Sensor (MPU9250)")?;

        // The magnetometer only shows up on the bus once the MPU has enabled bypass
        let mag = match Ak8963::new(config.i2c_bus, config.mag_address) {
            Ok(mag) => Some(mag),
            Err(err) => {
                warn!("Magnetic Sensor (AK8963) unavailable: {err:#}");
                None
            }
        };

        info!("IMU ready, magnetometer {}", if mag.is_some() { "present" } else { "absent" });

        Ok(Self { mpu, mag })
    }

    pub fn has_magnetometer(&self) -> bool {
        self.mag.is_some()
    }
}

impl InertialSampler for Imu {
    fn read_inertial(&mut self) -> anyhow::Result<InertialFrame> {
        self.mpu.read_frame()
    }

    fn read_magnetic(&mut self) -> anyhow::Result<MagneticFrame> {
        let Some(mag) = &mut self.mag else {
            bail!("No magnetometer");
        };

        mag.read_frame()
    }
}

/// How long a remote read waits for the sampling thread
const REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// A raw read asked of the thread that owns the IMU
#[derive(Debug)]
pub enum ImuRequest {
    Inertial(Sender<anyhow::Result<InertialFrame>>),
    Magnetic(Sender<anyhow::Result<MagneticFrame>>),
}

impl ImuRequest {
    /// Performs the read on `imu` and sends back the result
    pub fn answer<S: InertialSampler>(self, imu: Option<&mut S>) {
        // The requester may have timed out already
        match (self, imu) {
            (ImuRequest::Inertial(reply), Some(imu)) => {
                let _ = reply.send(imu.read_inertial());
            }
            (ImuRequest::Magnetic(reply), Some(imu)) => {
                let _ = reply.send(imu.read_magnetic());
            }
            (ImuRequest::Inertial(reply), None) => {
                let _ = reply.send(Err(anyhow!("IMU not available")));
            }
            (ImuRequest::Magnetic(reply), None) => {
                let _ = reply.send(Err(anyhow!("IMU not available")));
            }
        }
    }
}

/// Reads the IMU through the thread that owns it
#[derive(Debug, Clone)]
pub struct RemoteImu {
    requests: Sender<ImuRequest>,
}

pub fn request_channel() -> (RemoteImu, Receiver<ImuRequest>) {
    let (tx, rx) = channel::bounded(4);

    (RemoteImu { requests: tx }, rx)
}

impl RemoteImu {
    fn request<T>(
        &self,
        request: impl FnOnce(Sender<anyhow::Result<T>>) -> ImuRequest,
    ) -> anyhow::Result<T> {
        let (reply_tx, reply_rx) = channel::bounded(1);

        self.requests
            .send_timeout(request(reply_tx), REPLY_TIMEOUT)
            .map_err(|_| anyhow!("IMU owner is not accepting reads"))?;

        reply_rx.recv_timeout(REPLY_TIMEOUT).context("Wait for IMU read")?
    }
}

impl InertialSampler for RemoteImu {
    fn read_inertial(&mut self) -> anyhow::Result<InertialFrame> {
        self.request(ImuRequest::Inertial)
    }

    fn read_magnetic(&mut self) -> anyhow::Result<MagneticFrame> {
        self.request(ImuRequest::Magnetic)
    }
}
