//! Decoder for the Innovate serial protocol (ISP2) spoken by LC-1 wideband
//! controllers and SSI-4 auxiliary input modules.

pub mod encode;
pub mod error;
pub mod frame;
pub mod header;

use std::{
    mem,
    time::{Duration, Instant},
};

use tracing::{instrument, trace};

pub use encode::FrameBuilder;
pub use error::DecodeError;
pub use frame::ProtocolFrame;
use header::{Header, MAX_WORDS};

pub const BAUD: u32 = 19200;

/// A partial packet older than this is abandoned
pub const RESYNC_TIMEOUT: Duration = Duration::from_millis(200);

/// Byte at a time packet decoder
///
/// Never blocks and never fails, anything malformed is dropped and the decoder
/// hunts for the next header.
#[derive(Debug)]
pub struct Decoder {
    state: State,
    timeout: Duration,
    last_byte: Option<Instant>,
    stats: DecoderStats,
}

#[derive(Debug)]
enum State {
    SyncHigh,
    SyncLow { header: u8 },
    ReadingPayload(Payload),
}

#[derive(Debug)]
struct Payload {
    is_data: bool,
    expected: usize,
    buffer: [u8; MAX_WORDS as usize * 2],
    filled: usize,
}

/// The decoder state without its data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    SyncHigh,
    SyncLow,
    ReadingPayload,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Data packets decoded and handed out
    pub frames: u64,
    /// Command packets, read and ignored
    pub commands: u64,
    /// Headers with a bad word count and payloads that failed to decode
    pub dropped: u64,
    /// Partial packets abandoned by the timeout
    pub resyncs: u64,

    pub last_aux: usize,
    pub last_wideband: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_timeout(RESYNC_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            state: State::SyncHigh,
            timeout,
            last_byte: None,
            stats: DecoderStats::default(),
        }
    }

    /// Consumes every byte currently available, `on_frame` is called once per decoded data packet
    #[instrument(level = "trace", skip(self, bytes, on_frame), fields(len = bytes.len()))]
    pub fn feed(&mut self, bytes: &[u8], now: Instant, mut on_frame: impl FnMut(ProtocolFrame)) {
        self.check_stall(now);

        for &byte in bytes {
            if let Some(frame) = self.step(byte) {
                on_frame(frame);
            }
        }

        if !bytes.is_empty() {
            self.last_byte = Some(now);
        }
    }

    /// Single byte version of [`Decoder::feed`]
    pub fn push(&mut self, byte: u8, now: Instant) -> Option<ProtocolFrame> {
        self.check_stall(now);

        let frame = self.step(byte);
        self.last_byte = Some(now);

        frame
    }

    pub fn state(&self) -> StateKind {
        match self.state {
            State::SyncHigh => StateKind::SyncHigh,
            State::SyncLow { .. } => StateKind::SyncLow,
            State::ReadingPayload(_) => StateKind::ReadingPayload,
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    pub fn reset(&mut self) {
        self.state = State::SyncHigh;
        self.last_byte = None;
    }

    fn check_stall(&mut self, now: Instant) {
        let State::ReadingPayload(_) = self.state else {
            return;
        };

        let stalled = self
            .last_byte
            .is_some_and(|last| now.saturating_duration_since(last) > self.timeout);

        if stalled {
            trace!("Partial packet timed out");

            self.state = State::SyncHigh;
            self.stats.resyncs += 1;
        }
    }

    fn step(&mut self, byte: u8) -> Option<ProtocolFrame> {
        let (next, frame) = match mem::replace(&mut self.state, State::SyncHigh) {
            State::SyncHigh => {
                if header::is_high_sync(byte) {
                    (State::SyncLow { header: byte }, None)
                } else {
                    (State::SyncHigh, None)
                }
            }
            State::SyncLow { header: h0 } => {
                if header::is_high_sync(byte) {
                    (State::SyncLow { header: byte }, None)
                } else if header::is_low_sync(byte) {
                    match Header::parse(h0, byte) {
                        Ok(parsed) => (
                            State::ReadingPayload(Payload {
                                is_data: parsed.is_data,
                                expected: parsed.payload_len(),
                                buffer: [0; MAX_WORDS as usize * 2],
                                filled: 0,
                            }),
                            None,
                        ),
                        Err(err) => {
                            trace!(?err, "Dropped header");
                            self.stats.dropped += 1;

                            (State::SyncHigh, None)
                        }
                    }
                } else {
                    (State::SyncHigh, None)
                }
            }
            State::ReadingPayload(mut payload) => {
                payload.buffer[payload.filled] = byte;
                payload.filled += 1;

                if payload.filled < payload.expected {
                    (State::ReadingPayload(payload), None)
                } else {
                    (State::SyncHigh, self.finish(&payload))
                }
            }
        };

        self.state = next;

        frame
    }

    fn finish(&mut self, payload: &Payload) -> Option<ProtocolFrame> {
        if !payload.is_data {
            self.stats.commands += 1;
            return None;
        }

        match ProtocolFrame::decode(&payload.buffer[..payload.filled]) {
            Ok(frame) => {
                self.stats.frames += 1;
                self.stats.last_aux = frame.aux_seen;
                self.stats.last_wideband = frame.wideband_seen;

                Some(frame)
            }
            Err(err) => {
                trace!(?err, "Dropped packet");
                self.stats.dropped += 1;

                None
            }
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
