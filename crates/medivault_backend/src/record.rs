//! Encrypted record types and identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Unique identifier for a stored record.
///
/// Record IDs are UUIDv4, generated at write time. They are unique within
/// a backend but carry no cross-backend identity: the same logical value
/// written to two backends gets two unrelated IDs.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Creates a new random record ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a record ID from a UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Converts to a UUID.
    #[must_use]
    pub fn to_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// One of the three physical storage destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageLocation {
    /// Device-resident key-value store.
    Local,
    /// Hosted relational store.
    Relational,
    /// Remote file store behind an OAuth-style handshake.
    CloudFile,
}

impl StorageLocation {
    /// All locations, in the conventional default priority order.
    pub const ALL: [StorageLocation; 3] = [Self::Local, Self::Relational, Self::CloudFile];

    /// Returns the stable string tag for this location.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Relational => "relational",
            Self::CloudFile => "cloud_file",
        }
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "relational" => Ok(Self::Relational),
            "cloud_file" => Ok(Self::CloudFile),
            other => Err(format!("unknown storage location: {other}")),
        }
    }
}

/// The unit of storage: an encrypted payload plus routing metadata.
///
/// The payload is produced and consumed only by the cipher layer; no
/// backend ever stores or returns plaintext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedRecord {
    /// Identifier generated at write time.
    pub id: RecordId,
    /// Owning user.
    pub owner_id: String,
    /// Logical collection name, e.g. `"medicines"` or `"sales"`.
    pub data_type: String,
    /// Opaque ciphertext payload.
    pub payload: Vec<u8>,
    /// The backend that holds this record.
    pub location: StorageLocation,
    /// Creation timestamp, Unix milliseconds.
    pub created_at_ms: u64,
    /// Last update timestamp, Unix milliseconds.
    pub updated_at_ms: u64,
}

impl EncryptedRecord {
    /// Builds a fresh record with a new ID and current timestamps.
    #[must_use]
    pub fn new(
        owner_id: impl Into<String>,
        data_type: impl Into<String>,
        payload: Vec<u8>,
        location: StorageLocation,
    ) -> Self {
        let now = now_millis();
        Self {
            id: RecordId::new(),
            owner_id: owner_id.into(),
            data_type: data_type.into(),
            payload,
            location,
            created_at_ms: now,
            updated_at_ms: now,
        }
    }
}

/// Current wall-clock time as Unix milliseconds.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
