use std::{
    io::{self, Read},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::Context;
use calibration::{procedure::InertialSampler, store::Backing};
use common::{error::Errors, over_run::Ticker};
use crossbeam::channel::{self, Receiver};
use tracing::{debug, span, Level};

use crate::{console::Console, recording::RecordingControl, threads::ExitSignal};

/// Forwards stdin one character at a time
///
/// Blocks on stdin so it is never joined, it ends with the process or on EOF.
pub fn start_stdin_thread() -> anyhow::Result<Receiver<char>> {
    let (tx, rx) = channel::bounded(64);

    thread::Builder::new()
        .name("Stdin Thread".to_owned())
        .spawn(move || {
            let _span = span!(Level::INFO, "Stdin thread").entered();

            for byte in io::stdin().lock().bytes() {
                let Ok(byte) = byte else {
                    debug!("Stdin closed");
                    return;
                };

                if tx.send(byte as char).is_err() {
                    return;
                }
            }
        })
        .context("Spawn thread")?;

    Ok(rx)
}

pub fn start_console_thread<R, S, B, W>(
    mut console: Console<R, S, B, W>,
    input: Receiver<char>,
    interval: Duration,
    exit: ExitSignal,
    errors: Errors,
) -> anyhow::Result<JoinHandle<()>>
where
    R: RecordingControl + Send + 'static,
    S: InertialSampler + Send + 'static,
    B: Backing + Send + 'static,
    W: io::Write + Send + 'static,
{
    thread::Builder::new()
        .name("Console Thread".to_owned())
        .spawn(move || {
            let _span = span!(Level::INFO, "Console thread").entered();

            let mut ticker = Ticker::new("Console", interval);

            loop {
                if exit.should_exit() {
                    return;
                }

                for command in input.try_iter() {
                    let rst = console
                        .handle(command, Instant::now())
                        .with_context(|| format!("Console command {command:?}"));
                    errors.handle(rst);
                }

                // Calibration holds this loop for seconds, those over runs are expected
                ticker.wait();
            }
        })
        .context("Spawn thread")
}
