//! Catalog - Entity Model
//!
//! In-memory representation of datasets, resources, and organizations,
//! plus the validation rules their constructors enforce.
//!
//! Entities are built through validated builders: `build()` either returns
//! the entity or a [`Violations`] list naming every broken rule at once.
//! After construction an entity is only ever changed through a backend's
//! `update` operation, never by mutating a fetched copy in place.

use chrono::{DateTime, SubsecRound, Utc};

mod dataset;
mod organization;
mod validate;

pub use dataset::{Dataset, DatasetBuilder, Resource};
pub use organization::{Organization, OrganizationBuilder};
pub use validate::{is_valid_slug, normalize_tags, Violation, Violations};

/// Current time truncated to microseconds, the finest precision both
/// storage media preserve (TIMESTAMPTZ stores microseconds). Keeps
/// create-then-get round trips exact on every backend.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
