//! Symmetric keys and one-way key digests.

use crate::error::{CipherError, CipherResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;

/// Symmetric encryption key for a user account.
///
/// Generated once at signup and held only in session memory; the key is
/// zeroized when dropped and its `Debug` output is redacted. The only
/// key-derived value that may be persisted server-side is the one-way
/// [`KeyDigest`] returned by [`CipherKey::digest`].
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKey {
    bytes: [u8; KEY_SIZE],
}

impl CipherKey {
    /// Generates a new random 256-bit key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> CipherResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CipherError::InvalidKeySize {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Derives a key from a passphrase using HKDF-SHA256.
    ///
    /// The salt should be random, unique per account, and stored alongside
    /// the account record. HKDF assumes high-entropy input material; for
    /// weak user-chosen passwords a password hash such as Argon2id would
    /// be the better front-end.
    pub fn derive_from_passphrase(passphrase: &[u8], salt: &[u8]) -> CipherResult<Self> {
        use hkdf::Hkdf;

        let hk = Hkdf::<Sha256>::new(Some(salt), passphrase);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(b"medivault-account-key-v1", &mut bytes)
            .map_err(|_| CipherError::key_decode("HKDF expand failed"))?;
        Ok(Self { bytes })
    }

    /// Decodes a key from its printable base64 form.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid base64 or does not
    /// decode to exactly 32 bytes.
    pub fn decode(encoded: &str) -> CipherResult<Self> {
        let mut raw = BASE64
            .decode(encoded)
            .map_err(|e| CipherError::key_decode(e.to_string()))?;
        let key = Self::from_bytes(&raw);
        raw.zeroize();
        key
    }

    /// Returns the printable base64 form of the key.
    ///
    /// This is the form handed to the session layer at login; it must
    /// never be persisted or logged.
    #[must_use]
    pub fn encode(&self) -> String {
        BASE64.encode(self.bytes)
    }

    /// Returns the key as a byte slice.
    ///
    /// # Security
    ///
    /// Be careful with this method - don't log or serialize the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Returns the one-way digest of this key.
    ///
    /// The digest is deterministic and safe to store server-side for
    /// possession checks; it cannot be inverted to recover the key.
    #[must_use]
    pub fn digest(&self) -> KeyDigest {
        use std::fmt::Write;

        let hash = Sha256::digest(self.bytes);
        let mut hex = String::with_capacity(hash.len() * 2);
        for byte in hash {
            let _ = write!(hex, "{byte:02x}");
        }
        KeyDigest(hex)
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// One-way digest of a [`CipherKey`], hex-encoded SHA-256.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyDigest(String);

impl KeyDigest {
    /// Returns the digest as a hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for KeyDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
