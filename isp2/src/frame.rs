//! Payload word decoding

use tracing::instrument;

use crate::error::{DecodeError, DecodeResult};

/// Set in a word's high byte when it starts a wideband sub-packet
pub const WIDEBAND_FLAG: u8 = 0x40;

pub const MAX_AUX_CHANNELS: usize = 8;
pub const MAX_WIDEBAND_CHANNELS: usize = 4;

/// Full scale of an auxiliary input
pub const AUX_FULL_SCALE: f32 = 5.0;
pub const AUX_MAX_RAW: u16 = 1023;

/// Wideband function codes that carry a usable reading
pub const FUNCTION_LAMBDA: u8 = 0;
pub const FUNCTION_O2_LEVEL: u8 = 1;

/// One decoded data packet
///
/// Readings are in wire order. The position of a reading is the only thing
/// identifying which physical input it came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtocolFrame {
    /// Auxiliary inputs in volts
    pub aux: Vec<f32>,
    /// Wideband air fuel ratios, 0.0 while a controller is warming up or faulted
    pub afr: Vec<f32>,

    /// Auxiliary readings in the packet, including ones past the cap
    pub aux_seen: usize,
    /// Wideband readings in the packet, including ones past the cap
    pub wideband_seen: usize,
}

impl ProtocolFrame {
    /// Decodes a data payload
    ///
    /// A wideband header with no lambda word after it poisons the whole payload.
    #[instrument(level = "trace", skip_all, ret)]
    pub fn decode(payload: &[u8]) -> DecodeResult<Self> {
        if payload.len() % 2 != 0 {
            return Err(DecodeError::OddPayload(payload.len()));
        }

        let mut frame = ProtocolFrame::default();
        let mut words = payload.chunks_exact(2).enumerate();

        while let Some((idx, word)) = words.next() {
            let (hi, lo) = (word[0], word[1]);

            if hi & WIDEBAND_FLAG != 0 {
                let Some((_, lambda_word)) = words.next() else {
                    return Err(DecodeError::TruncatedWideband(idx));
                };

                let function = (hi >> 2) & 0x07;
                let multiplier = ((hi as u16 & 0x01) << 7) | (lo as u16 & 0x7F);
                let lambda = ((lambda_word[0] as u16 & 0x3F) << 7) | (lambda_word[1] as u16 & 0x7F);

                frame.wideband_seen += 1;
                if frame.afr.len() < MAX_WIDEBAND_CHANNELS {
                    frame.afr.push(afr(function, multiplier, lambda));
                }
            } else {
                let raw = ((hi as u16 & 0x07) << 7) | (lo as u16 & 0x7F);

                frame.aux_seen += 1;
                if frame.aux.len() < MAX_AUX_CHANNELS {
                    frame.aux.push(aux_volts(raw));
                }
            }
        }

        Ok(frame)
    }
}

/// Air fuel ratio from a wideband reading, 0.0 for function codes without a reading
pub fn afr(function: u8, multiplier: u16, lambda: u16) -> f32 {
    match function {
        FUNCTION_LAMBDA | FUNCTION_O2_LEVEL => {
            (lambda as f32 + 500.0) * multiplier as f32 / 10_000.0
        }
        _ => 0.0,
    }
}

/// Scales a 10 bit auxiliary reading to volts
pub fn aux_volts(raw: u16) -> f32 {
    raw as f32 / AUX_MAX_RAW as f32 * AUX_FULL_SCALE
}
