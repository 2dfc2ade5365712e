//! Encryption and decryption of record payloads.

use crate::error::{CipherError, CipherResult};
use crate::key::CipherKey;
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Encrypts and decrypts record payloads with AES-256-GCM.
///
/// Structured values are serialized to CBOR before encryption; the binary
/// variants ([`encrypt_bytes`](Self::encrypt_bytes) /
/// [`decrypt_bytes`](Self::decrypt_bytes)) skip serialization and are used
/// for file payloads. The output format is
/// `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
///
/// A pure transformation given key and input: no I/O, and neither the key
/// nor any plaintext is ever logged.
pub struct CipherService {
    cipher: Aes256Gcm,
}

impl CipherService {
    /// Creates a cipher service for the given key.
    #[must_use]
    pub fn new(key: &CipherKey) -> Self {
        // Infallible: CipherKey is always exactly 32 bytes, matching the
        // AES-256 key size.
        let key_array = GenericArray::from_slice(key.as_bytes());
        Self {
            cipher: Aes256Gcm::new(key_array),
        }
    }

    /// Serializes `value` to CBOR and encrypts it.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Encryption`] if serialization or the cipher
    /// operation fails.
    pub fn encrypt<T: Serialize>(&self, value: &T) -> CipherResult<Vec<u8>> {
        let plaintext = medivault_codec::to_cbor(value)
            .map_err(|e| CipherError::encryption(e.to_string()))?;
        self.encrypt_bytes(&plaintext)
    }

    /// Decrypts a payload produced by [`encrypt`](Self::encrypt) and
    /// deserializes the plaintext.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Decryption`] if the key is wrong, the
    /// ciphertext is truncated or tampered with (GCM tag verification), or
    /// the decrypted bytes do not decode as `T`.
    pub fn decrypt<T: DeserializeOwned>(&self, ciphertext: &[u8]) -> CipherResult<T> {
        let plaintext = self.decrypt_bytes(ciphertext)?;
        medivault_codec::from_cbor(&plaintext).map_err(|e| CipherError::decryption(e.to_string()))
    }

    /// Encrypts a raw byte buffer.
    ///
    /// Used by the cloud file backend, which stores ciphertext directly as
    /// file contents.
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> CipherResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CipherError::encryption("cipher operation failed"))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend(ciphertext);
        Ok(result)
    }

    /// Decrypts a raw byte buffer produced by
    /// [`encrypt_bytes`](Self::encrypt_bytes).
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Decryption`] on wrong key, truncation, or
    /// tampering.
    pub fn decrypt_bytes(&self, ciphertext: &[u8]) -> CipherResult<Vec<u8>> {
        if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CipherError::decryption("ciphertext too short"));
        }

        let nonce = Nonce::from_slice(&ciphertext[..NONCE_SIZE]);
        let encrypted = &ciphertext[NONCE_SIZE..];

        self.cipher
            .decrypt(nonce, encrypted)
            .map_err(|_| CipherError::decryption("authentication failed"))
    }
}

impl std::fmt::Debug for CipherService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherService")
            .field("cipher", &"Aes256Gcm")
            .finish()
    }
}
