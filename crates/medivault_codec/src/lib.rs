//! # MediVault Codec
//!
//! CBOR encoding and decoding for MediVault records.
//!
//! This crate is the serialization boundary between structured values and
//! the opaque byte payloads the cipher layer encrypts. Everything that is
//! persisted (record payloads, the local enumeration index, device-store
//! snapshots) passes through [`to_cbor`] / [`from_cbor`].
//!
//! CBOR was chosen over JSON for the persisted form because it is compact,
//! binary-safe (ciphertext embeds without escaping), and has a stable
//! field order for `serde`-derived structs.
//!
//! ## Usage
//!
//! ```
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Medicine {
//!     name: String,
//!     stock: u32,
//! }
//!
//! let medicine = Medicine { name: "Paracetamol".into(), stock: 40 };
//! let bytes = medivault_codec::to_cbor(&medicine).unwrap();
//! let decoded: Medicine = medivault_codec::from_cbor(&bytes).unwrap();
//! assert_eq!(medicine, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;

pub use error::{CodecError, CodecResult};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value to CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if the value cannot be represented in
/// CBOR (e.g. a map with non-string keys coming from a custom `Serialize`
/// impl).
pub fn to_cbor<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Decodes a value from CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the bytes are not valid CBOR or do
/// not match the shape of `T`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Batch {
        medicine: String,
        quantity: u32,
        expiry: Option<String>,
    }

    #[test]
    fn roundtrip_struct() {
        let batch = Batch {
            medicine: "Amoxicillin".into(),
            quantity: 120,
            expiry: Some("2027-03".into()),
        };
        let bytes = to_cbor(&batch).unwrap();
        let decoded: Batch = from_cbor(&bytes).unwrap();
        assert_eq!(batch, decoded);
    }

    #[test]
    fn roundtrip_json_document() {
        let doc = serde_json::json!({
            "name": "Ibuprofen",
            "tags": ["painkiller", "otc"],
            "stock": 12,
        });
        let bytes = to_cbor(&doc).unwrap();
        let decoded: serde_json::Value = from_cbor(&bytes).unwrap();
        assert_eq!(doc, decoded);
    }

    #[test]
    fn encode_is_deterministic_for_same_value() {
        let batch = Batch {
            medicine: "Cetirizine".into(),
            quantity: 7,
            expiry: None,
        };
        assert_eq!(to_cbor(&batch).unwrap(), to_cbor(&batch).unwrap());
    }

    #[test]
    fn decode_garbage_fails() {
        let result: CodecResult<Batch> = from_cbor(&[0xFF, 0x00, 0x13, 0x37]);
        assert!(matches!(result, Err(CodecError::Decode(_))));
    }

    #[test]
    fn decode_wrong_shape_fails() {
        let bytes = to_cbor(&vec![1u8, 2, 3]).unwrap();
        let result: CodecResult<Batch> = from_cbor(&bytes);
        assert!(matches!(result, Err(CodecError::Decode(_))));
    }

    #[test]
    fn decode_truncated_fails() {
        let batch = Batch {
            medicine: "Loratadine".into(),
            quantity: 30,
            expiry: None,
        };
        let bytes = to_cbor(&batch).unwrap();
        let result: CodecResult<Batch> = from_cbor(&bytes[..bytes.len() / 2]);
        assert!(result.is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn roundtrip_arbitrary_strings(name in ".*", quantity in any::<u32>()) {
                let batch = Batch { medicine: name, quantity, expiry: None };
                let bytes = to_cbor(&batch).unwrap();
                let decoded: Batch = from_cbor(&bytes).unwrap();
                prop_assert_eq!(batch, decoded);
            }

            #[test]
            fn roundtrip_byte_blobs(data in proptest::collection::vec(any::<u8>(), 0..512)) {
                let bytes = to_cbor(&data).unwrap();
                let decoded: Vec<u8> = from_cbor(&bytes).unwrap();
                prop_assert_eq!(data, decoded);
            }
        }
    }
}
