use tracing::instrument;

use crate::error::{DecodeError, DecodeResult};

/// Bits that must all be set in header byte 0
pub const HIGH_SYNC_MASK: u8 = 0xA2;
/// Bits that must all be set in header byte 1
pub const LOW_SYNC_MASK: u8 = 0x80;
/// Set in header byte 0 for data packets, clear for command packets
pub const DATA_FLAG: u8 = 0x10;
/// Largest packet accepted, in 16 bit words
pub const MAX_WORDS: u16 = 16;

pub const HEADER_SIZE: usize = 2;

pub fn is_high_sync(byte: u8) -> bool {
    byte & HIGH_SYNC_MASK == HIGH_SYNC_MASK
}

pub fn is_low_sync(byte: u8) -> bool {
    byte & LOW_SYNC_MASK == LOW_SYNC_MASK
}

/// The two byte packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub is_data: bool,
    /// Payload length in words, 9 bits on the wire
    pub words: u16,
}

impl Header {
    /// Validates both sync patterns and the word count
    #[instrument(level = "trace", ret)]
    pub fn parse(h0: u8, h1: u8) -> DecodeResult<Self> {
        if !is_high_sync(h0) {
            return Err(DecodeError::BadHighSync(h0));
        }
        if !is_low_sync(h1) {
            return Err(DecodeError::BadLowSync(h1));
        }

        let header = Self {
            is_data: h0 & DATA_FLAG != 0,
            words: ((h0 as u16 & 0x01) << 7) | (h1 as u16 & 0x7F),
        };

        if header.words == 0 || header.words > MAX_WORDS {
            return Err(DecodeError::InvalidWordCount(header.words));
        }

        Ok(header)
    }

    /// Payload length in bytes
    pub fn payload_len(&self) -> usize {
        self.words as usize * 2
    }

    /// Only the low 9 bits of `words` fit on the wire
    pub fn write(&self) -> [u8; HEADER_SIZE] {
        let data = if self.is_data { DATA_FLAG } else { 0 };
        let h0 = HIGH_SYNC_MASK | data | ((self.words >> 7) & 0x01) as u8;
        let h1 = LOW_SYNC_MASK | (self.words & 0x7F) as u8;

        [h0, h1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_header() {
        let header = Header::parse(0xB2, 0x82).expect("Valid header");

        assert_eq!(
            header,
            Header {
                is_data: true,
                words: 2
            }
        );
        assert_eq!(header.payload_len(), 4);
        assert_eq!(header.write(), [0xB2, 0x82]);
    }

    #[test]
    fn command_header() {
        let header = Header::parse(0xA2, 0x81).expect("Valid header");

        assert!(!header.is_data);
        assert_eq!(header.words, 1);
    }

    #[test]
    fn word_count_uses_ninth_bit() {
        assert_eq!(
            Header::parse(0xB3, 0x80),
            Err(DecodeError::InvalidWordCount(128))
        );
        assert_eq!(Header::parse(0xB2, 0x80), Err(DecodeError::InvalidWordCount(0)));
        assert_eq!(Header::parse(0xB2, 0x91), Err(DecodeError::InvalidWordCount(17)));
    }

    #[test]
    fn sync_patterns() {
        assert_eq!(Header::parse(0x12, 0x82), Err(DecodeError::BadHighSync(0x12)));
        assert_eq!(Header::parse(0xB2, 0x02), Err(DecodeError::BadLowSync(0x02)));

        // Valid low header bytes never look like a high header byte
        for words in 1..=MAX_WORDS {
            let [_, h1] = Header {
                is_data: true,
                words,
            }
            .write();
            assert!(!is_high_sync(h1));
        }
    }
}
