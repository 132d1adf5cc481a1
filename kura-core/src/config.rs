//! Storage selection and startup configuration.
//!
//! The backend is chosen exactly once, from configuration resolved at
//! startup, and handed to callers as an immutable `Arc<dyn StorageBackend>`.
//! There is no runtime switching and no global mutable singleton; switching
//! backends means restarting with different configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::storage::{FileBackend, StorageBackend, StorageError, StorageResult};

// =============================================================================
// Environment Variables
// =============================================================================

/// Storage mode: `"file"` (default) or `"database"`
pub const ENV_STORAGE_MODE: &str = "KURA_STORAGE_MODE";

/// Root directory for flat-file storage
pub const ENV_DATA_DIR: &str = "KURA_DATA_DIR";

/// Postgres connection string for database storage
pub const ENV_DATABASE_URL: &str = "KURA_DATABASE_URL";

/// Default data directory for flat-file storage
pub const DATA_DIR_DEFAULT: &str = "data";

// =============================================================================
// Storage Mode
// =============================================================================

/// Which backend implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Flat files: one JSON document per entity
    File,
    /// Relational: Postgres tables
    Postgres,
}

impl StorageMode {
    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Postgres => "database",
        }
    }
}

impl FromStr for StorageMode {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" | "flat-file" => Ok(Self::File),
            "database" | "postgres" => Ok(Self::Postgres),
            other => Err(StorageError::invalid(format!(
                "unknown storage mode '{other}' (expected 'file' or 'database')"
            ))),
        }
    }
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Storage Config
// =============================================================================

/// Startup configuration consumed by [`open`].
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Backend selection
    pub mode: StorageMode,
    /// Root for flat-file storage; datasets live under `<root>/datasets`,
    /// organizations under `<root>/organizations`
    pub data_dir: PathBuf,
    /// Postgres connection string (required in database mode)
    pub database_url: Option<String>,
}

impl StorageConfig {
    /// Flat-file configuration rooted at `data_dir`.
    #[must_use]
    pub fn file(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode: StorageMode::File,
            data_dir: data_dir.into(),
            database_url: None,
        }
    }

    /// Database configuration for the given connection string.
    #[must_use]
    pub fn postgres(database_url: impl Into<String>) -> Self {
        Self {
            mode: StorageMode::Postgres,
            data_dir: PathBuf::from(DATA_DIR_DEFAULT),
            database_url: Some(database_url.into()),
        }
    }

    /// Read configuration from the environment.
    ///
    /// # Errors
    /// `InvalidArgument` for an unknown storage mode.
    pub fn from_env() -> StorageResult<Self> {
        let mode = match std::env::var(ENV_STORAGE_MODE) {
            Ok(value) => value.parse()?,
            Err(_) => StorageMode::File,
        };
        Ok(Self {
            mode,
            data_dir: std::env::var(ENV_DATA_DIR)
                .map_or_else(|_| PathBuf::from(DATA_DIR_DEFAULT), PathBuf::from),
            database_url: std::env::var(ENV_DATABASE_URL).ok(),
        })
    }

    /// Directory holding dataset records in file mode.
    #[must_use]
    pub fn datasets_dir(&self) -> PathBuf {
        self.data_dir.join("datasets")
    }

    /// Directory holding organization records in file mode.
    #[must_use]
    pub fn organizations_dir(&self) -> PathBuf {
        self.data_dir.join("organizations")
    }

    /// Check the configuration is internally consistent.
    ///
    /// # Errors
    /// `InvalidArgument` when database mode lacks a usable connection string.
    pub fn validate(&self) -> StorageResult<()> {
        match self.mode {
            StorageMode::File => Ok(()),
            StorageMode::Postgres => match &self.database_url {
                Some(url)
                    if url.starts_with("postgres://") || url.starts_with("postgresql://") =>
                {
                    Ok(())
                }
                Some(url) => Err(StorageError::invalid(format!(
                    "database url '{url}' must be a postgres:// URL"
                ))),
                None => Err(StorageError::invalid(format!(
                    "database mode requires {ENV_DATABASE_URL}"
                ))),
            },
        }
    }
}

// =============================================================================
// Backend Selection
// =============================================================================

/// Resolve the configuration into the process's single active backend.
///
/// An invalid or unreachable target is an error here, before any request is
/// served, never a per-request failure.
///
/// # Errors
/// `InvalidArgument` for inconsistent configuration; `Unavailable` when the
/// selected target cannot be opened (or postgres support is not compiled in).
pub async fn open(config: &StorageConfig) -> StorageResult<Arc<dyn StorageBackend>> {
    config.validate()?;

    match config.mode {
        StorageMode::File => {
            let backend = FileBackend::open(config.datasets_dir(), config.organizations_dir())?;
            tracing::info!(data_dir = %config.data_dir.display(), "flat-file storage ready");
            Ok(Arc::new(backend))
        }
        #[cfg(feature = "postgres")]
        StorageMode::Postgres => {
            // validate() guarantees the URL is present and well-formed.
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| StorageError::invalid("database mode requires a connection url"))?;
            let backend = crate::storage::PostgresBackend::new(url).await?;
            tracing::info!("database storage ready");
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "postgres"))]
        StorageMode::Postgres => Err(StorageError::unavailable(
            "database mode requires the 'postgres' feature",
        )),
    }
}

// =============================================================================
// Tests
// =============================================================================
