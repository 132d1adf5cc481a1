//! FileBackend - Flat-File Storage
//!
//! One pretty-printed JSON document per entity, named `<id>.json`, under a
//! datasets root and a separate organizations root. The parsed file is the
//! canonical representation of the entity; identifier uniqueness is enforced
//! by filesystem uniqueness.
//!
//! # Crash Safety
//!
//! Every write serializes to a temp file in the target directory, fsyncs,
//! then atomically renames over the target. A crash leaves either the old
//! file or the new file, never a corrupt merge.
//!
//! # Concurrency
//!
//! Create/update/delete on the same identifier are serialized by an advisory
//! per-identifier lock; the whole file is rewritten, so unserialized writers
//! would race and lose updates. Reads take no lock and may observe either
//! the pre- or post-write state.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;

use crate::catalog::{Dataset, Organization};
use crate::constants::RECORD_FILE_EXT;

use super::backend::{DatasetFilter, DatasetPatch, OrganizationPatch, Page, StorageBackend};
use super::error::{StorageError, StorageResult};

// =============================================================================
// Lock Map
// =============================================================================

/// Advisory per-identifier locks, honored only by this backend's writers.
#[derive(Debug, Default)]
struct LockMap {
    inner: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LockMap {
    /// Get (or create) the lock guarding one identifier.
    fn entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut map = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        map.entry(key.to_string()).or_default().clone()
    }
}

fn lock_key(namespace: &str, id: &str) -> String {
    format!("{namespace}/{id}")
}

// =============================================================================
// Record I/O
// =============================================================================

fn record_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{id}.{RECORD_FILE_EXT}"))
}

/// Translate an I/O failure into the storage taxonomy. `NotFound` is handled
/// at call sites where it has entity-level meaning.
fn map_io_error(context: &str, err: &io::Error) -> StorageError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => {
            StorageError::unavailable(format!("{context}: {err}"))
        }
        _ => StorageError::internal(format!("{context}: {err}")),
    }
}

/// Serialize a record to a temp file in `dir`, fsync, and atomically rename
/// it over `<id>.json`. With `overwrite` false, an existing target is the
/// `DuplicateIdentifier` failure.
fn write_record<T: Serialize>(
    dir: &Path,
    id: &str,
    record: &T,
    overwrite: bool,
) -> StorageResult<()> {
    let bytes = serde_json::to_vec_pretty(record)
        .map_err(|e| StorageError::internal(format!("serialize record {id}: {e}")))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| map_io_error("create temp file", &e))?;
    tmp.write_all(&bytes)
        .map_err(|e| map_io_error("write temp file", &e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| map_io_error("sync temp file", &e))?;

    let target = record_path(dir, id);
    if overwrite {
        tmp.persist(&target)
            .map_err(|e| map_io_error("replace record", &e.error))?;
    } else {
        match tmp.persist_noclobber(&target) {
            Ok(_) => {}
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StorageError::duplicate(id));
            }
            Err(e) => return Err(map_io_error("create record", &e.error)),
        }
    }
    Ok(())
}

/// Read and parse one record. A missing file is `NotFound`; a file that no
/// longer parses is `Internal` (the caller asked for it by id, so the
/// failure must surface rather than be skipped).
fn read_record<T: DeserializeOwned>(dir: &Path, id: &str) -> StorageResult<T> {
    let path = record_path(dir, id);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StorageError::not_found(id));
        }
        Err(e) => return Err(map_io_error("read record", &e)),
    };
    serde_json::from_slice(&bytes).map_err(|e| {
        StorageError::internal(format!("malformed record {}: {e}", path.display()))
    })
}

fn remove_record(dir: &Path, id: &str) -> StorageResult<()> {
    match fs::remove_file(record_path(dir, id)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::not_found(id)),
        Err(e) => Err(map_io_error("remove record", &e)),
    }
}

/// Scan a directory of records in identifier order, parsing each lazily.
/// A record that fails to parse, or whose embedded id disagrees with its
/// filename, is skipped with a diagnostic; one corrupt file must not make
/// the rest of the catalog inaccessible.
fn scan_records<T, F>(dir: &Path, id_of: F) -> StorageResult<Vec<T>>
where
    T: DeserializeOwned,
    F: Fn(&T) -> &str,
{
    let entries = fs::read_dir(dir)
        .map_err(|e| StorageError::unavailable(format!("scan {}: {e}", dir.display())))?;

    let mut stems: Vec<String> = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|e| StorageError::unavailable(format!("scan {}: {e}", dir.display())))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(RECORD_FILE_EXT) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            stems.push(stem.to_string());
        }
    }
    stems.sort();

    let mut records = Vec::with_capacity(stems.len());
    for stem in &stems {
        match read_record::<T>(dir, stem) {
            Ok(record) => {
                if id_of(&record) == stem {
                    records.push(record);
                } else {
                    tracing::warn!(
                        file = %record_path(dir, stem).display(),
                        embedded_id = id_of(&record),
                        "record id disagrees with filename, skipping"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    file = %record_path(dir, stem).display(),
                    error = %e,
                    "skipping unreadable record"
                );
            }
        }
    }
    Ok(records)
}

// =============================================================================
// FileBackend
// =============================================================================

/// Flat-file storage backend over two directories of JSON records.
#[derive(Debug)]
pub struct FileBackend {
    datasets_dir: PathBuf,
    organizations_dir: PathBuf,
    locks: LockMap,
}

impl FileBackend {
    /// Open (creating if needed) the backing directories.
    ///
    /// # Errors
    /// `Unavailable` when a directory cannot be created or written; callers
    /// treat this as a fatal startup error.
    pub fn open(
        datasets_dir: impl Into<PathBuf>,
        organizations_dir: impl Into<PathBuf>,
    ) -> StorageResult<Self> {
        let datasets_dir = datasets_dir.into();
        let organizations_dir = organizations_dir.into();

        for dir in [&datasets_dir, &organizations_dir] {
            fs::create_dir_all(dir).map_err(|e| {
                StorageError::unavailable(format!("create {}: {e}", dir.display()))
            })?;
        }

        Ok(Self {
            datasets_dir,
            organizations_dir,
            locks: LockMap::default(),
        })
    }

    /// Directory holding dataset records.
    #[must_use]
    pub fn datasets_dir(&self) -> &Path {
        &self.datasets_dir
    }

    /// Directory holding organization records.
    #[must_use]
    pub fn organizations_dir(&self) -> &Path {
        &self.organizations_dir
    }

    /// Non-fatal integrity check: a dataset may reference an organization
    /// that does not (or no longer) exists. Dangling references are allowed
    /// but reported.
    fn warn_if_dangling(&self, dataset: &Dataset) {
        if let Some(org) = &dataset.owner_org {
            if !record_path(&self.organizations_dir, org).exists() {
                tracing::warn!(
                    dataset = %dataset.id,
                    owner_org = %org,
                    "dataset references a missing organization"
                );
            }
        }
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn create_dataset(&self, dataset: &Dataset) -> StorageResult<Dataset> {
        dataset.validate().into_result(())?;

        let lock = self.locks.entry(&lock_key("datasets", &dataset.id));
        let _guard = lock.lock().await;

        write_record(&self.datasets_dir, &dataset.id, dataset, false)?;
        self.warn_if_dangling(dataset);
        Ok(dataset.clone())
    }

    async fn get_dataset(&self, id: &str) -> StorageResult<Dataset> {
        read_record(&self.datasets_dir, id)
    }

    async fn update_dataset(&self, id: &str, patch: &DatasetPatch) -> StorageResult<Dataset> {
        let lock = self.locks.entry(&lock_key("datasets", id));
        let _guard = lock.lock().await;

        let current: Dataset = read_record(&self.datasets_dir, id)?;
        let updated = patch.apply(&current)?;
        write_record(&self.datasets_dir, id, &updated, true)?;
        self.warn_if_dangling(&updated);
        Ok(updated)
    }

    async fn delete_dataset(&self, id: &str) -> StorageResult<()> {
        let lock = self.locks.entry(&lock_key("datasets", id));
        let _guard = lock.lock().await;

        remove_record(&self.datasets_dir, id)
    }

    async fn list_datasets(
        &self,
        filter: &DatasetFilter,
        page: Page,
    ) -> StorageResult<Vec<Dataset>> {
        page.validate()?;

        let records = scan_records::<Dataset, _>(&self.datasets_dir, |d| d.id.as_str())?;
        Ok(records
            .into_iter()
            .filter(|d| filter.matches(d))
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }

    async fn create_organization(
        &self,
        organization: &Organization,
    ) -> StorageResult<Organization> {
        organization.validate().into_result(())?;

        let lock = self.locks.entry(&lock_key("organizations", &organization.id));
        let _guard = lock.lock().await;

        write_record(&self.organizations_dir, &organization.id, organization, false)?;
        Ok(organization.clone())
    }

    async fn get_organization(&self, id: &str) -> StorageResult<Organization> {
        read_record(&self.organizations_dir, id)
    }

    async fn update_organization(
        &self,
        id: &str,
        patch: &OrganizationPatch,
    ) -> StorageResult<Organization> {
        let lock = self.locks.entry(&lock_key("organizations", id));
        let _guard = lock.lock().await;

        let current: Organization = read_record(&self.organizations_dir, id)?;
        let updated = patch.apply(&current)?;
        write_record(&self.organizations_dir, id, &updated, true)?;
        Ok(updated)
    }

    async fn delete_organization(&self, id: &str) -> StorageResult<()> {
        let lock = self.locks.entry(&lock_key("organizations", id));
        let _guard = lock.lock().await;

        remove_record(&self.organizations_dir, id)?;

        // The relation is weak: datasets stay behind with a dangling
        // reference, which must remain detectable.
        let dangling = scan_records::<Dataset, _>(&self.datasets_dir, |d| d.id.as_str())?
            .into_iter()
            .filter(|d| d.is_owned_by(id))
            .count();
        if dangling > 0 {
            tracing::warn!(
                organization = %id,
                datasets = dangling,
                "deleted organization still referenced by datasets"
            );
        }
        Ok(())
    }

    async fn list_organizations(&self, page: Page) -> StorageResult<Vec<Organization>> {
        page.validate()?;

        let records = scan_records::<Organization, _>(&self.organizations_dir, |o| o.id.as_str())?;
        Ok(records
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }
}

// =============================================================================
// Tests
// =============================================================================
