//! Storage - Backend Trait and Implementations
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    StorageBackend Trait                      │
//! └─────────────────────────────────────────────────────────────┘
//!          ↑                              ↑
//!          │                              │
//! ┌────────┴────────┐           ┌────────┴────────┐
//! │   FileBackend   │           │ PostgresBackend │
//! │  (flat files)   │           │   (relational)  │
//! └─────────────────┘           └─────────────────┘
//! ```
//!
//! Exactly one backend is active per process, chosen at startup by
//! [`crate::config::open`]. Behavioral parity is enforced by a shared
//! black-box contract suite run against both implementations, not by
//! sharing code between them.

mod backend;
mod error;
mod file;

#[cfg(feature = "postgres")]
mod postgres;

pub use backend::{DatasetFilter, DatasetPatch, OrganizationPatch, Page, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;

#[cfg(feature = "postgres")]
pub use postgres::PostgresBackend;
