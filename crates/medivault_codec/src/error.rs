//! Error types for codec operations.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding records.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Encoding a value to CBOR failed.
    #[error("CBOR encode error: {0}")]
    Encode(String),

    /// Decoding CBOR bytes failed.
    ///
    /// This is also what surfaces when decrypted bytes are not a valid
    /// record, e.g. after decrypting with a mismatched key version.
    #[error("CBOR decode error: {0}")]
    Decode(String),
}
