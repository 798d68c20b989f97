//! Error types for the codec.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding wire payloads.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Encoding a value to CBOR failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// Decoding a CBOR payload failed.
    #[error("decode error: {0}")]
    Decode(String),
}

impl CodecError {
    /// Creates an encode error from any serializer failure.
    pub fn encode(err: impl std::fmt::Display) -> Self {
        Self::Encode(err.to_string())
    }

    /// Creates a decode error from any deserializer failure.
    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}
