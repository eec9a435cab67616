use thiserror::Error;

pub mod basic;
pub mod binary;
pub mod charset;
pub mod constants;
pub mod error_codes;
pub mod packet;

/// Codec-level failures. `MalformedPacket` covers every decode defect: a
/// declared length running past the end of the payload, a `0xfb` marker where
/// a count is required, or an inner length byte disagreeing with the data
/// that follows it. `ValueOutOfRange` is the encoder-side dual.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
    #[error("value out of range for {0}")]
    ValueOutOfRange(&'static str),
}

impl From<CodecError> for std::io::Error {
    fn from(e: CodecError) -> Self {
        std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
    }
}
