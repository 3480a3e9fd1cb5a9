use std::time::Duration;

use anyhow::Context;
use rppal::uart::{Parity, Uart};
use tracing::instrument;

/// Serial link to the ISP2 device chain, 8N1
pub struct Isp2Uart {
    uart: Uart,
}

impl Isp2Uart {
    #[instrument(level = "debug")]
    pub fn new(path: &str, baud: u32) -> anyhow::Result<Self> {
        let mut uart = Uart::with_path(path, baud, Parity::None, 8, 1).context("Open uart")?;

        // Return immediately with whatever is buffered
        uart.set_read_mode(0, Duration::ZERO)
            .context("Set non-blocking read mode")?;

        Ok(Self { uart })
    }

    /// Never waits for data, returns the number of bytes read
    #[instrument(level = "trace", skip_all, ret)]
    pub fn read_available(&mut self, buffer: &mut [u8]) -> anyhow::Result<usize> {
        self.uart.read(buffer).context("Read uart")
    }
}
