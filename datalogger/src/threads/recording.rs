use std::{
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::Context;
use common::{
    error::Errors,
    over_run::Ticker,
    sample::SensorSample,
    snapshot::{Publisher, SharedSnapshot},
};
use crossbeam::channel::Receiver;
use tracing::{span, warn, Level};

use crate::{
    logger::LocalClock,
    recording::{Logger, RecordingCommand, RecordingController, SessionStatus, StopOutcome},
    threads::ExitSignal,
};

/// Used when the clock cannot be formatted
pub const FALLBACK_NAME_HINT: &str = "CLOG";

/// Where new log names come from
#[derive(Debug, Clone)]
pub struct LogNames {
    fixed: Option<String>,
    clock: LocalClock,
}

impl LogNames {
    pub fn new(fixed: Option<String>, clock: LocalClock) -> Self {
        Self { fixed, clock }
    }

    pub fn hint(&self) -> String {
        if let Some(fixed) = &self.fixed {
            return fixed.clone();
        }

        self.clock.name_hint().unwrap_or_else(|err| {
            warn!("Could not build log name from clock: {err:#}");
            FALLBACK_NAME_HINT.to_owned()
        })
    }
}

/// Applies one operator request, reporting the outcome
pub fn apply<L: Logger>(
    controller: &mut RecordingController<L>,
    command: RecordingCommand,
    names: &LogNames,
    now: Instant,
) {
    match command {
        RecordingCommand::Start => controller.start(&names.hint(), now).report(),
        RecordingCommand::Stop => controller.stop(now).report(),
        RecordingCommand::Keyframe => controller.keyframe().report(),
    }
}

/// Closes the open session at shutdown, an idle controller is left alone
pub fn finish<L: Logger>(
    controller: &mut RecordingController<L>,
    now: Instant,
) -> Option<StopOutcome> {
    controller.is_active().then(|| controller.stop(now))
}

#[allow(clippy::too_many_arguments)]
pub fn start_recording_thread<L>(
    mut controller: RecordingController<L>,
    commands: Receiver<RecordingCommand>,
    samples: SharedSnapshot<SensorSample>,
    mut status: Publisher<SessionStatus>,
    names: LogNames,
    interval: Duration,
    exit: ExitSignal,
    errors: Errors,
) -> anyhow::Result<JoinHandle<()>>
where
    L: Logger + Send + 'static,
{
    thread::Builder::new()
        .name("Recording Thread".to_owned())
        .spawn(move || {
            let _span = span!(Level::INFO, "Recording thread").entered();

            let mut ticker = Ticker::new("Recording", interval);
            let mut applied = 0;

            loop {
                let now = Instant::now();

                for command in commands.try_iter() {
                    apply(&mut controller, command, &names, now);
                    applied += 1;
                }

                controller.tick(&samples.read(), now).report();
                status.publish(&SessionStatus {
                    commands_applied: applied,
                    ..controller.status(now)
                });

                if exit.should_exit() {
                    let now = Instant::now();
                    if let Some(outcome) = finish(&mut controller, now) {
                        outcome.report();
                    }

                    status.publish(&SessionStatus {
                        commands_applied: applied,
                        ..controller.status(now)
                    });
                    return;
                }

                ticker.wait_or_report(&errors);
            }
        })
        .context("Spawn thread")
}
