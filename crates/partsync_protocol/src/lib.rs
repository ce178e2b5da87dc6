//! # partsync Protocol
//!
//! Wire types and JSON codecs for the storefront pull/push protocol.
//!
//! This crate provides:
//! - `SyncableTable`, the closed set of replicated tables
//! - `RemoteRecord`, the backend's opaque row representation
//! - `TableChanges`, the created/updated/deleted triple per table
//! - Protocol messages (`PullRequest`, `PullResponse`, `PushRequest`)
//! - JSON encoding/decoding
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod messages;
mod record;
mod table;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{ChangeMap, PullRequest, PullResponse, PushRequest, TableChanges};
pub use record::RemoteRecord;
pub use table::SyncableTable;
