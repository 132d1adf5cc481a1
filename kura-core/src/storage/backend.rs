//! StorageBackend - the contract every backend satisfies.
//!
//! Five operations per entity type (resources travel only inside their
//! parent dataset). All operations complete or fail before returning; no
//! partial result is ever observable. This trait is the entire surface the
//! API/CLI layers above are permitted to depend on.

use async_trait::async_trait;

use crate::catalog::{normalize_tags, Dataset, Organization, Resource, Violations};
use crate::constants::{LIST_LIMIT_DEFAULT, LIST_LIMIT_MAX};

use super::error::{StorageError, StorageResult};

// =============================================================================
// Filter and Pagination
// =============================================================================

/// Optional filter for dataset listings.
#[derive(Debug, Clone, Default)]
pub struct DatasetFilter {
    /// Keep only datasets owned by this organization
    pub owner_org: Option<String>,
    /// Keep only datasets carrying this tag (matched in normalized form)
    pub tag: Option<String>,
}

impl DatasetFilter {
    /// True when no criteria are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owner_org.is_none() && self.tag.is_none()
    }

    /// Whether a dataset passes the filter.
    #[must_use]
    pub fn matches(&self, dataset: &Dataset) -> bool {
        if let Some(org) = &self.owner_org {
            if !dataset.is_owned_by(org) {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !dataset.has_tag(tag) {
                return false;
            }
        }
        true
    }
}

/// Offset/limit pagination window.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    /// Entities to skip from the start of the ordered sequence
    pub offset: usize,
    /// Maximum entities to return
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: LIST_LIMIT_DEFAULT,
        }
    }
}

impl Page {
    /// Create a pagination window.
    #[must_use]
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// Reject out-of-bounds pagination.
    ///
    /// # Errors
    /// `InvalidArgument` when the limit is zero or exceeds `LIST_LIMIT_MAX`.
    pub fn validate(&self) -> StorageResult<()> {
        if self.limit == 0 {
            return Err(StorageError::invalid("limit must be positive"));
        }
        if self.limit > LIST_LIMIT_MAX {
            return Err(StorageError::invalid(format!(
                "limit {} exceeds max {LIST_LIMIT_MAX}",
                self.limit
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Patches
// =============================================================================

/// Partial update for a dataset.
///
/// The identifier is deliberately not representable here: it is immutable
/// after creation, and the type enforces that instead of a runtime check.
/// Both backends apply a patch by rewriting the whole entity, so their
/// consistency stories stay identical.
#[derive(Debug, Clone, Default)]
pub struct DatasetPatch {
    /// New title
    pub title: Option<String>,
    /// New description
    pub description: Option<String>,
    /// Set (`Some(Some(id))`) or clear (`Some(None)`) the owning organization
    pub owner_org: Option<Option<String>>,
    /// New license identifier
    pub license_id: Option<String>,
    /// Replacement tag list (normalized on apply)
    pub tags: Option<Vec<String>>,
    /// Replacement resource list
    pub resources: Option<Vec<Resource>>,
}

impl DatasetPatch {
    /// Apply the patch to an existing dataset, producing the replacement
    /// entity. Tags are re-normalized, every field is re-validated, and
    /// `updated_at` is bumped; `id` and `created_at` carry over unchanged.
    ///
    /// # Errors
    /// Returns every violated rule of the patched entity.
    pub fn apply(&self, base: &Dataset) -> Result<Dataset, Violations> {
        let mut violations = Violations::new();
        if let Some(tags) = &self.tags {
            if tags.iter().any(|t| t.trim().is_empty()) {
                violations.push("tags", "must not contain empty tags");
            }
        }

        let updated = Dataset {
            id: base.id.clone(),
            title: self.title.clone().unwrap_or_else(|| base.title.clone()),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| base.description.clone()),
            owner_org: self
                .owner_org
                .clone()
                .unwrap_or_else(|| base.owner_org.clone()),
            license_id: self
                .license_id
                .clone()
                .unwrap_or_else(|| base.license_id.clone()),
            tags: self
                .tags
                .as_ref()
                .map_or_else(|| base.tags.clone(), normalize_tags),
            resources: self
                .resources
                .clone()
                .unwrap_or_else(|| base.resources.clone()),
            created_at: base.created_at,
            updated_at: crate::catalog::now(),
        };

        for violation in updated.validate().iter() {
            violations.push(violation.field.clone(), violation.message.clone());
        }
        violations.into_result(updated)
    }
}

/// Partial update for an organization. The identifier is immutable and not
/// representable here.
#[derive(Debug, Clone, Default)]
pub struct OrganizationPatch {
    /// New display name
    pub title: Option<String>,
}

impl OrganizationPatch {
    /// Apply the patch to an existing organization.
    ///
    /// # Errors
    /// Returns every violated rule of the patched entity.
    pub fn apply(&self, base: &Organization) -> Result<Organization, Violations> {
        let updated = Organization {
            id: base.id.clone(),
            title: self.title.clone().unwrap_or_else(|| base.title.clone()),
            created_at: base.created_at,
            updated_at: crate::catalog::now(),
        };
        let violations = updated.validate();
        violations.into_result(updated)
    }
}

// =============================================================================
// StorageBackend Trait
// =============================================================================

/// Abstract storage contract, independent of medium.
///
/// Implementations perform blocking I/O internally and are designed to be
/// called from a pool of concurrent request handlers; they own no
/// concurrency of their own beyond per-identifier write serialization.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Persist a new dataset.
    ///
    /// Fails with `DuplicateIdentifier` if the identifier already exists;
    /// re-validates the entity and returns the stored copy.
    async fn create_dataset(&self, dataset: &Dataset) -> StorageResult<Dataset>;

    /// Fetch a dataset with its resources in original order.
    ///
    /// Fails with `NotFound` if absent.
    async fn get_dataset(&self, id: &str) -> StorageResult<Dataset>;

    /// Apply a patch atomically and return the updated dataset.
    ///
    /// Fails with `NotFound` if absent; a failed update leaves the prior
    /// entity fully intact.
    async fn update_dataset(&self, id: &str, patch: &DatasetPatch) -> StorageResult<Dataset>;

    /// Remove a dataset and all of its resources.
    ///
    /// Fails with `NotFound` if absent, including on repeated deletes.
    async fn delete_dataset(&self, id: &str) -> StorageResult<()>;

    /// List datasets matching the filter, ordered by identifier ascending.
    ///
    /// Fails only with `InvalidArgument` on bad pagination bounds.
    async fn list_datasets(
        &self,
        filter: &DatasetFilter,
        page: Page,
    ) -> StorageResult<Vec<Dataset>>;

    /// Persist a new organization.
    async fn create_organization(&self, organization: &Organization)
        -> StorageResult<Organization>;

    /// Fetch an organization.
    async fn get_organization(&self, id: &str) -> StorageResult<Organization>;

    /// Apply a patch atomically and return the updated organization.
    async fn update_organization(
        &self,
        id: &str,
        patch: &OrganizationPatch,
    ) -> StorageResult<Organization>;

    /// Remove an organization. Its datasets are left in place; their
    /// `owner_org` references degrade to detectable dangling references.
    async fn delete_organization(&self, id: &str) -> StorageResult<()>;

    /// List organizations ordered by identifier ascending.
    async fn list_organizations(&self, page: Page) -> StorageResult<Vec<Organization>>;
}

// =============================================================================
// Tests
// =============================================================================
