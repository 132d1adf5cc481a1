//! Kura Core - Dataset Metadata Catalog
//!
//! A metadata catalog for datasets (title, description, owning organization,
//! tags, license, downloadable resources) built around one storage contract
//! with two interchangeable backends.
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
//! The backend is chosen exactly once at startup ([`config::open`]) and
//! handed to callers as an immutable `Arc<dyn StorageBackend>`. Both
//! backends are exercised by the same black-box contract suite, so their
//! externally observable behavior is identical: same entities, same
//! ordering, same failure kinds.
//!
//! # Usage
//!
//! ```no_run
//! use kura_core::{config, Dataset, StorageConfig};
//!
//! # async fn demo() -> kura_core::StorageResult<()> {
//! let backend = config::open(&StorageConfig::file("./data")).await?;
//!
//! let dataset = Dataset::builder("air-quality-2025", "Air Quality 2025")
//!     .with_description("Hourly PM2.5 readings")
//!     .with_license_id("cc-by")
//!     .with_tag("environment")
//!     .build()?;
//!
//! backend.create_dataset(&dataset).await?;
//! let fetched = backend.get_dataset("air-quality-2025").await?;
//! assert_eq!(fetched, dataset);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod config;
pub mod constants;
pub mod storage;

// Re-export common types
pub use catalog::{
    Dataset, DatasetBuilder, Organization, OrganizationBuilder, Resource, Violation, Violations,
};
pub use config::{StorageConfig, StorageMode};
pub use constants::*;
pub use storage::{
    DatasetFilter, DatasetPatch, FileBackend, OrganizationPatch, Page, StorageBackend,
    StorageError, StorageResult,
};

#[cfg(feature = "postgres")]
pub use storage::PostgresBackend;
