//! Organization - the owning entity datasets reference.
//!
//! Datasets point at organizations by identifier only (relation + lookup,
//! never ownership). Deleting an organization leaves its datasets in place
//! with a dangling reference that stays detectable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::TITLE_BYTES_MAX;

use super::validate::{check_max_bytes, check_non_empty, check_slug, Violations};

// =============================================================================
// Organization
// =============================================================================

/// A catalog organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    /// Unique identifier (URL-safe slug, immutable after creation)
    pub id: String,
    /// Display name
    pub title: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    /// Start building an organization from its identifier and display name.
    #[must_use]
    pub fn builder(id: impl Into<String>, title: impl Into<String>) -> OrganizationBuilder {
        OrganizationBuilder::new(id, title)
    }

    /// Check every validation rule, collecting all violations.
    pub(crate) fn validate(&self) -> Violations {
        let mut violations = Violations::new();
        check_slug(&mut violations, "id", &self.id);
        check_non_empty(&mut violations, "title", &self.title);
        check_max_bytes(&mut violations, "title", &self.title, TITLE_BYTES_MAX);
        violations
    }
}

// =============================================================================
// Organization Builder
// =============================================================================

/// Builder for [`Organization`].
#[derive(Debug)]
pub struct OrganizationBuilder {
    id: String,
    title: String,
}

impl OrganizationBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }

    /// Validate and build the organization.
    ///
    /// # Errors
    /// Returns every violated rule, not just the first.
    pub fn build(self) -> Result<Organization, Violations> {
        let now = super::now();
        let organization = Organization {
            id: self.id,
            title: self.title,
            created_at: now,
            updated_at: now,
        };
        let violations = organization.validate();
        violations.into_result(organization)
    }
}

// =============================================================================
// Tests
// =============================================================================
