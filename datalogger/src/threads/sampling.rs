use std::{
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::Context;
use calibration::procedure::InertialSampler;
use common::{error::Errors, over_run::Ticker};
use crossbeam::channel::Receiver;
use tracing::{debug, span, Level};

use crate::{fusion::Fusion, imu::ImuRequest, position::PositionSource, threads::ExitSignal};

/// Samples on a fixed cadence and serves raw IMU reads in the time between
pub fn start_sampling_thread<S, P>(
    mut fusion: Fusion<S, P>,
    imu_requests: Receiver<ImuRequest>,
    interval: Duration,
    exit: ExitSignal,
    errors: Errors,
) -> anyhow::Result<JoinHandle<()>>
where
    S: InertialSampler + Send + 'static,
    P: PositionSource + Send + 'static,
{
    thread::Builder::new()
        .name("Sampling Thread".to_owned())
        .spawn(move || {
            let _span = span!(Level::INFO, "Sampling thread").entered();

            let mut ticker = Ticker::new("Sampling", interval);

            loop {
                if exit.should_exit() {
                    return;
                }

                // Sensor faults keep the previous values and stay out of the error channel
                if let Err(err) = fusion.step(Instant::now()) {
                    debug!("Sample incomplete: {err:#}");
                }

                ticker.wait_serving_or_report(&imu_requests, |it| fusion.serve(it), &errors);
            }
        })
        .context("Spawn thread")
}
