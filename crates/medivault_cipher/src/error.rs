//! Error types for cipher operations.

use thiserror::Error;

/// Result type for cipher operations.
pub type CipherResult<T> = Result<T, CipherError>;

/// Errors that can occur during encryption, decryption, or key handling.
#[derive(Debug, Error)]
pub enum CipherError {
    /// Encryption failed, including serialization of the plaintext value.
    #[error("encryption failed: {message}")]
    Encryption {
        /// Description of the failure.
        message: String,
    },

    /// Decryption failed: wrong key, truncated input, or tampered
    /// ciphertext. AES-GCM tag verification makes these indistinguishable
    /// from each other on purpose.
    #[error("decryption failed: {message}")]
    Decryption {
        /// Description of the failure.
        message: String,
    },

    /// A raw key had the wrong length.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },

    /// The printable key form could not be decoded.
    #[error("invalid key encoding: {message}")]
    KeyDecode {
        /// Description of the failure.
        message: String,
    },
}

impl CipherError {
    /// Creates an encryption failure error.
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption {
            message: message.into(),
        }
    }

    /// Creates a decryption failure error.
    pub fn decryption(message: impl Into<String>) -> Self {
        Self::Decryption {
            message: message.into(),
        }
    }

    /// Creates a key decode error.
    pub fn key_decode(message: impl Into<String>) -> Self {
        Self::KeyDecode {
            message: message.into(),
        }
    }
}
