//! Crate-wide constants.
//!
//! TigerStyle: every limit is named, bounded, and lives in one place.

/// Maximum identifier (slug) length in bytes
pub const SLUG_BYTES_MAX: usize = 100;

/// Maximum title length in bytes
pub const TITLE_BYTES_MAX: usize = 255;

/// Maximum number of tags per dataset
pub const TAGS_COUNT_MAX: usize = 64;

/// Maximum number of resources per dataset
pub const RESOURCES_COUNT_MAX: usize = 256;

/// Default page size for list operations
pub const LIST_LIMIT_DEFAULT: usize = 100;

/// Maximum page size for list operations
pub const LIST_LIMIT_MAX: usize = 1000;

/// File extension for flat-file catalog records
pub const RECORD_FILE_EXT: &str = "json";

/// Maximum connections in the database pool
pub const DB_POOL_CONNECTIONS_MAX: u32 = 10;

/// Seconds to wait for a pooled connection before reporting a timeout
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;
