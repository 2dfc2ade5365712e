//! # MediVault Cipher
//!
//! Client-side encryption for MediVault.
//!
//! Every record payload that leaves the application passes through this
//! crate: storage backends persist only the opaque ciphertext it produces.
//!
//! ## Security Model
//!
//! - AES-256-GCM authenticated encryption, unique random nonce per
//!   operation
//! - Keys are generated client-side, zeroized on drop, never persisted in
//!   plaintext; only the one-way [`KeyDigest`] may be stored server-side
//!   for possession checks
//! - Tampered or wrong-key ciphertext is rejected at tag verification
//!   rather than surfacing as garbage plaintext
//!
//! ## Usage
//!
//! ```
//! use medivault_cipher::{CipherKey, CipherService};
//!
//! let key = CipherKey::generate();
//! let service = CipherService::new(&key);
//!
//! let ciphertext = service.encrypt(&serde_json::json!({"name": "Paracetamol"})).unwrap();
//! let value: serde_json::Value = service.decrypt(&ciphertext).unwrap();
//! assert_eq!(value["name"], "Paracetamol");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod key;
mod service;

pub use error::{CipherError, CipherResult};
pub use key::{CipherKey, KeyDigest, KEY_SIZE};
pub use service::{CipherService, NONCE_SIZE, TAG_SIZE};
