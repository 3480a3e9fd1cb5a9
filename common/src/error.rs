use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use tracing::{error, warn};

/// Creates the error reporting channel shared by every worker thread
pub fn channel() -> (Errors, ErrorDrain) {
    let (tx, rx) = channel::bounded(30);

    (Errors(tx), ErrorDrain(rx))
}

/// Sending half, cloned into each thread that can hit a non fatal error
#[derive(Clone, Debug)]
pub struct Errors(Sender<anyhow::Error>);

/// Receiving half, drained by the main thread
#[derive(Debug)]
pub struct ErrorDrain(Receiver<anyhow::Error>);

impl Errors {
    /// Never blocks, errors are dropped if the drain falls behind
    pub fn send(&self, error: anyhow::Error) {
        match self.0.try_send(error) {
            Ok(()) => {}
            Err(TrySendError::Full(error)) => {
                warn!("Error channel full, dropping: {error:?}");
            }
            Err(TrySendError::Disconnected(error)) => {
                error!("Error: {error:?}");
            }
        }
    }

    /// For thread bodies that produce a result
    pub fn handle(&self, rst: anyhow::Result<()>) {
        if let Err(err) = rst {
            self.send(err);
        }
    }
}

impl ErrorDrain {
    /// Logs every pending error, returns how many were read
    pub fn read_errors(&self) -> usize {
        let mut count = 0;

        for error in self.0.try_iter() {
            error!("Error: {error:?}");
            count += 1;
        }

        count
    }
}
