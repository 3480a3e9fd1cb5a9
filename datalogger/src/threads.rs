//! Worker threads and the shutdown signal they share

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};

pub mod broadcast;
pub mod console;
pub mod isp2;
pub mod recording;
pub mod sampling;

/// Held by the main thread, dropping it stops every worker
#[derive(Debug)]
pub struct ExitSender(#[allow(dead_code)] Sender<()>);

/// Polled by workers once per cycle
#[derive(Debug, Clone)]
pub struct ExitSignal(Receiver<()>);

pub fn exit_channel() -> (ExitSender, ExitSignal) {
    let (tx, rx) = channel::bounded(1);

    (ExitSender(tx), ExitSignal(rx))
}

impl ExitSignal {
    pub fn should_exit(&self) -> bool {
        matches!(self.0.try_recv(), Err(TryRecvError::Disconnected))
    }
}
