use thiserror::Error;

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Reasons a header or frame is thrown away
///
/// None of these are fatal, the decoder drops the frame and waits for the next header.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Header byte 0 {0:#04x} does not carry the high sync pattern")]
    BadHighSync(u8),
    #[error("Header byte 1 {0:#04x} does not carry the low sync pattern")]
    BadLowSync(u8),
    #[error("Packet word count {0} is outside 1..={}", crate::header::MAX_WORDS)]
    InvalidWordCount(u16),
    #[error("Payload length {0} is not a whole number of words")]
    OddPayload(usize),
    #[error("Wideband header at word {0} has no lambda word after it")]
    TruncatedWideband(usize),
}
