//! # partsync Testkit
//!
//! Test utilities for partsync.
//!
//! This crate provides:
//! - `FakeBackend`, an in-process stand-in for the backend sync endpoints
//! - Test fixtures and database helpers
//! - Record builders shaped like backend documents
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use partsync_testkit::prelude::*;
//!
//! #[test]
//! fn pulls_brands() {
//!     let backend = Arc::new(FakeBackend::new());
//!     backend.upsert(SyncableTable::CarBrands, car_brand("cb1", "Toyota"));
//!     let db = TestDatabase::memory();
//!     let engine = loopback_engine(backend, db.handle());
//!     assert!(engine.synchronize(&[SyncableTable::CarBrands]).success);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod fixtures;
pub mod generators;
pub mod records;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backend::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::records::*;
}

pub use backend::FakeBackend;
pub use fixtures::*;
pub use generators::*;
pub use records::*;
