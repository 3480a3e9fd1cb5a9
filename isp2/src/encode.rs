//! Reference encoder, produces the byte stream a well behaved device chain sends

use crate::{
    frame::{AUX_FULL_SCALE, AUX_MAX_RAW, WIDEBAND_FLAG},
    header::Header,
};

/// Builds one packet word by word
#[derive(Debug, Clone, Default)]
pub struct FrameBuilder {
    is_data: bool,
    words: Vec<[u8; 2]>,
}

impl FrameBuilder {
    pub fn data() -> Self {
        Self {
            is_data: true,
            words: Vec::new(),
        }
    }

    pub fn command() -> Self {
        Self {
            is_data: false,
            words: Vec::new(),
        }
    }

    /// A 10 bit auxiliary reading, higher bits are dropped
    pub fn aux(mut self, raw: u16) -> Self {
        let raw = raw & AUX_MAX_RAW;
        self.words.push([(raw >> 7) as u8 & 0x07, raw as u8 & 0x7F]);
        self
    }

    /// The auxiliary reading closest to `volts`
    pub fn aux_volts(self, volts: f32) -> Self {
        let raw = (volts / AUX_FULL_SCALE * AUX_MAX_RAW as f32).round();
        self.aux(raw.clamp(0.0, AUX_MAX_RAW as f32) as u16)
    }

    /// A wideband header followed by its lambda word
    pub fn wideband(mut self, function: u8, multiplier: u8, lambda: u16) -> Self {
        let hi = WIDEBAND_FLAG | 0x02 | ((function & 0x07) << 2) | (multiplier >> 7);
        self.words.push([hi, multiplier & 0x7F]);
        self.words
            .push([(lambda >> 7) as u8 & 0x3F, lambda as u8 & 0x7F]);
        self
    }

    /// An arbitrary word, used to build malformed packets
    pub fn raw_word(mut self, hi: u8, lo: u8) -> Self {
        self.words.push([hi, lo]);
        self
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// The header and payload bytes
    ///
    /// The word count is written as is, packets the decoder rejects can be built on purpose.
    pub fn build(&self) -> Vec<u8> {
        let header = Header {
            is_data: self.is_data,
            words: self.words.len() as u16,
        };

        let mut bytes = Vec::with_capacity(2 + self.words.len() * 2);
        bytes.extend_from_slice(&header.write());
        bytes.extend(self.words.iter().flatten());

        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ProtocolFrame;

    #[test]
    fn wideband_words() {
        let bytes = FrameBuilder::data().wideband(0, 147, 500).build();

        assert_eq!(bytes, vec![0xB2, 0x82, 0x43, 0x13, 0x03, 0x74]);

        let frame = ProtocolFrame::decode(&bytes[2..]).expect("Valid payload");
        assert_eq!(frame.afr, vec![14.7]);
    }

    #[test]
    fn aux_volts_rounds_to_nearest() {
        let bytes = FrameBuilder::data().aux_volts(2.5).build();

        // 2.5V is 511.5 counts
        assert_eq!(&bytes[2..], &[0x04, 0x00]);
    }
}
