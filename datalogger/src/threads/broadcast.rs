use std::{
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::Context;
use common::{error::Errors, over_run::Ticker, sample::SensorSample, snapshot::SharedSnapshot};
use tracing::{span, Level};

use crate::{broadcast::Broadcast, recording::SessionStatus, threads::ExitSignal};

pub fn start_broadcast_thread(
    mut broadcast: impl Broadcast + Send + 'static,
    samples: SharedSnapshot<SensorSample>,
    session: SharedSnapshot<SessionStatus>,
    interval: Duration,
    exit: ExitSignal,
    errors: Errors,
) -> anyhow::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("Broadcast Thread".to_owned())
        .spawn(move || {
            let _span = span!(Level::INFO, "Broadcast thread").entered();

            let mut ticker = Ticker::new("Broadcast", interval);

            loop {
                if exit.should_exit() {
                    return;
                }

                let rst = broadcast
                    .ship(&samples.read(), &session.read(), Instant::now())
                    .context("Broadcast");
                errors.handle(rst);

                ticker.wait_or_report(&errors);
            }
        })
        .context("Spawn thread")
}
