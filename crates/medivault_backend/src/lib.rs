//! # MediVault Backend
//!
//! Storage backend trait and implementations for MediVault.
//!
//! A backend is one physical destination for encrypted records. All three
//! variants implement the same capability interface and know nothing about
//! each other; fan-out, failover, and sync live in `medivault_manager`.
//!
//! ## Design Principles
//!
//! - Backends persist ciphertext only; encryption happens at the boundary
//!   with a caller-supplied key
//! - Remote services are reached through client traits
//!   ([`RelationalClient`], [`CloudFileApi`]) so tests run against
//!   in-memory implementations with failure injection
//! - Backends must be `Send + Sync`; the manager shares them across
//!   concurrent operations
//!
//! ## Available Backends
//!
//! - [`LocalBackend`] - device-resident key-value store with an
//!   enumeration index and quota eviction
//! - [`RelationalBackend`] - hosted relational store with a profile-document
//!   fallback when the dedicated table is unavailable
//! - [`CloudFileBackend`] - remote file store behind an OAuth-style
//!   handshake with a device-cached bearer token

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod cloud;
mod device;
mod error;
mod local;
mod record;
mod relational;

pub use backend::{BackendStats, Document, StorageBackend};
pub use cloud::{
    AccessToken, CloudApiError, CloudAuthenticator, CloudFileApi, CloudFileBackend, MemoryCloudApi,
    RemoteFile, StaticAuthenticator, TokenCache, DEFAULT_FOLDER,
};
pub use device::{
    DeviceStore, DeviceStoreError, DeviceStoreResult, FileDeviceStore, MemoryDeviceStore,
};
pub use error::{BackendError, BackendResult};
pub use local::LocalBackend;
pub use record::{now_millis, EncryptedRecord, RecordId, StorageLocation};
pub use relational::{
    MemoryRelationalClient, ProfileVault, RelationalApiError, RelationalBackend, RelationalClient,
    RowStats,
};
