use std::{
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::Context;
use common::{error::Errors, snapshot::Publisher};
use crossbeam::channel::{Sender, TrySendError};
use isp2::Decoder;
use tracing::{debug, span, trace, warn, Level};

use crate::{
    engine::{ChannelMap, DecoderStatus, EngineUpdate},
    peripheral::isp2_uart::Isp2Uart,
    threads::ExitSignal,
};

/// Non blocking byte stream carrying ISP2 packets
pub trait ByteSource {
    /// Returns immediately with however many bytes were buffered
    fn read_available(&mut self, buffer: &mut [u8]) -> anyhow::Result<usize>;
}

impl ByteSource for Isp2Uart {
    fn read_available(&mut self, buffer: &mut [u8]) -> anyhow::Result<usize> {
        Isp2Uart::read_available(self, buffer)
    }
}

/// Decodes bytes and forwards engine values to the sampling thread
pub struct Isp2Pump {
    decoder: Decoder,
    map: ChannelMap,
    engine: Sender<EngineUpdate>,
    status: Publisher<DecoderStatus>,
    published: DecoderStatus,
}

impl Isp2Pump {
    pub fn new(map: ChannelMap, engine: Sender<EngineUpdate>, status: Publisher<DecoderStatus>) -> Self {
        Self {
            decoder: Decoder::new(),
            map,
            engine,
            status,
            published: DecoderStatus::default(),
        }
    }

    /// Returns false once the sampling thread is gone
    pub fn pump(&mut self, bytes: &[u8], now: Instant) -> bool {
        let mut connected = true;
        let (map, engine) = (&self.map, &self.engine);

        self.decoder.feed(bytes, now, |frame| {
            match engine.try_send(map.update(&frame)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => trace!("Engine channel full, dropping update"),
                Err(TrySendError::Disconnected(_)) => connected = false,
            }
        });

        let status = DecoderStatus {
            state: self.decoder.state(),
            stats: self.decoder.stats(),
        };
        if status != self.published {
            self.status.publish(&status);
            self.published = status;
        }

        connected
    }
}

pub fn start_isp2_thread(
    mut source: impl ByteSource + Send + 'static,
    mut pump: Isp2Pump,
    exit: ExitSignal,
    errors: Errors,
) -> anyhow::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("ISP2 Thread".to_owned())
        .spawn(move || {
            let _span = span!(Level::INFO, "ISP2 thread").entered();

            let mut buffer = [0; 64];
            let mut failing = false;

            loop {
                if exit.should_exit() {
                    return;
                }

                match source.read_available(&mut buffer) {
                    Ok(len) => {
                        if failing {
                            debug!("Serial port recovered");
                            failing = false;
                        }

                        if !pump.pump(&buffer[..len], Instant::now()) {
                            warn!("Sampling thread gone, stopping");
                            return;
                        }
                    }
                    Err(err) => {
                        // Reported once per outage
                        if !failing {
                            errors.send(err.context("Read ISP2 serial"));
                            failing = true;
                        }
                    }
                }

                thread::sleep(Duration::from_millis(1));
            }
        })
        .context("Spawn thread")
}

#[cfg(test)]
mod tests {
    use common::snapshot;
    use crossbeam::channel;
    use isp2::{FrameBuilder, StateKind};

    use super::*;

    #[test]
    fn frames_become_engine_updates() {
        let (tx, rx) = channel::bounded(4);
        let (publisher, status) = snapshot::channel(DecoderStatus::default());
        let mut pump = Isp2Pump::new(ChannelMap::default(), tx, publisher);

        let bytes = FrameBuilder::data()
            .wideband(0, 147, 500)
            .aux_volts(1.9)
            .build();
        let now = Instant::now();

        assert!(pump.pump(&bytes[..3], now));
        assert_eq!(status.read().state, StateKind::ReadingPayload);
        assert!(rx.try_recv().is_err());

        assert!(pump.pump(&bytes[3..], now));
        let update = rx.try_recv().expect("Update");
        let afr = update.afr_bank1.expect("AFR").0;
        let coolant = update.coolant.expect("Coolant").0;
        assert!((afr - 14.7).abs() < 1e-4);
        assert!((coolant - 190.0).abs() < 0.5);
        assert!(update.afr_bank2.is_none());

        let status = status.read();
        assert_eq!(status.state, StateKind::SyncHigh);
        assert_eq!(status.stats.frames, 1);
        assert_eq!(status.stats.last_wideband, 1);
        assert_eq!(status.stats.last_aux, 1);
    }

    #[test]
    fn stops_without_consumer() {
        let (tx, rx) = channel::bounded(4);
        let (publisher, _status) = snapshot::channel(DecoderStatus::default());
        let mut pump = Isp2Pump::new(ChannelMap::default(), tx, publisher);
        drop(rx);

        let bytes = FrameBuilder::data().aux(512).build();
        assert!(!pump.pump(&bytes, Instant::now()));
    }

    #[test]
    fn full_channel_drops_updates() {
        let (tx, rx) = channel::bounded(1);
        let (publisher, _status) = snapshot::channel(DecoderStatus::default());
        let mut pump = Isp2Pump::new(ChannelMap::default(), tx, publisher);

        let bytes = FrameBuilder::data().aux(512).build();
        for _ in 0..5 {
            assert!(pump.pump(&bytes, Instant::now()));
        }

        assert_eq!(rx.try_iter().count(), 1);
    }
}
