//! Dataset - the primary catalog entity.
//!
//! A dataset owns an ordered list of resources; resources never exist
//! outside their parent. The identifier is immutable after construction and
//! unique across whichever backend is in use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{RESOURCES_COUNT_MAX, TAGS_COUNT_MAX, TITLE_BYTES_MAX};

use super::validate::{
    check_max_bytes, check_non_empty, check_slug, is_valid_slug, normalize_tags, Violations,
};

// =============================================================================
// Resource
// =============================================================================

/// A downloadable resource owned by a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Display name
    pub name: String,
    /// Free-text description
    #[serde(default)]
    pub description: String,
    /// Source URL or stored file reference
    pub url: String,
    /// Declared format token, e.g. `"csv"`
    pub format: String,
    /// File size in bytes, when known
    #[serde(default)]
    pub filesize: Option<u64>,
}

impl Resource {
    /// Create a resource with the required fields.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            url: url.into(),
            format: format.into(),
            filesize: None,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the file size in bytes.
    #[must_use]
    pub fn with_filesize(mut self, filesize: u64) -> Self {
        self.filesize = Some(filesize);
        self
    }
}

// =============================================================================
// Dataset
// =============================================================================

/// A catalog dataset.
///
/// Constructed only through [`Dataset::builder`]; the builder's `build()`
/// validates every field and reports all violations at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Unique identifier (URL-safe slug, immutable after creation)
    pub id: String,
    /// Display title
    pub title: String,
    /// Free-text description
    pub description: String,
    /// Owning organization identifier (weak reference, may dangle)
    #[serde(default)]
    pub owner_org: Option<String>,
    /// License identifier, e.g. `"cc-by"`
    pub license_id: String,
    /// Normalized tags (trimmed, lowercased, deduplicated, order-preserving)
    #[serde(default)]
    pub tags: Vec<String>,
    /// Owned resources in their original order
    #[serde(default)]
    pub resources: Vec<Resource>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Dataset {
    /// Start building a dataset from its required identifier and title.
    #[must_use]
    pub fn builder(id: impl Into<String>, title: impl Into<String>) -> DatasetBuilder {
        DatasetBuilder::new(id, title)
    }

    /// True if this dataset references the given organization.
    #[must_use]
    pub fn is_owned_by(&self, org_id: &str) -> bool {
        self.owner_org.as_deref() == Some(org_id)
    }

    /// True if this dataset carries the given (normalized) tag.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Check every validation rule, collecting all violations.
    pub(crate) fn validate(&self) -> Violations {
        let mut violations = Violations::new();

        check_slug(&mut violations, "id", &self.id);
        check_non_empty(&mut violations, "title", &self.title);
        check_max_bytes(&mut violations, "title", &self.title, TITLE_BYTES_MAX);
        check_non_empty(&mut violations, "description", &self.description);
        check_non_empty(&mut violations, "license_id", &self.license_id);

        if let Some(org) = &self.owner_org {
            if !is_valid_slug(org) {
                violations.push("owner_org", "must be a valid organization slug");
            }
        }

        if self.tags.len() > TAGS_COUNT_MAX {
            violations.push(
                "tags",
                format!("at most {TAGS_COUNT_MAX} tags allowed ({} given)", self.tags.len()),
            );
        }

        if self.resources.len() > RESOURCES_COUNT_MAX {
            violations.push(
                "resources",
                format!(
                    "at most {RESOURCES_COUNT_MAX} resources allowed ({} given)",
                    self.resources.len()
                ),
            );
        }
        for (index, resource) in self.resources.iter().enumerate() {
            check_non_empty(
                &mut violations,
                &format!("resources[{index}].name"),
                &resource.name,
            );
            check_non_empty(
                &mut violations,
                &format!("resources[{index}].url"),
                &resource.url,
            );
        }

        violations
    }
}

// =============================================================================
// Dataset Builder
// =============================================================================

/// Builder for [`Dataset`] with a fluent API.
#[derive(Debug)]
pub struct DatasetBuilder {
    id: String,
    title: String,
    description: String,
    owner_org: Option<String>,
    license_id: String,
    tags: Vec<String>,
    resources: Vec<Resource>,
}

impl DatasetBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            owner_org: None,
            license_id: String::new(),
            tags: Vec::new(),
            resources: Vec::new(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the owning organization identifier.
    #[must_use]
    pub fn with_owner_org(mut self, org_id: impl Into<String>) -> Self {
        self.owner_org = Some(org_id.into());
        self
    }

    /// Set the license identifier.
    #[must_use]
    pub fn with_license_id(mut self, license_id: impl Into<String>) -> Self {
        self.license_id = license_id.into();
        self
    }

    /// Add a single tag (normalized during `build`).
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Replace the tag list (normalized during `build`).
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Add a resource.
    #[must_use]
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    /// Replace the resource list.
    #[must_use]
    pub fn with_resources(mut self, resources: Vec<Resource>) -> Self {
        self.resources = resources;
        self
    }

    /// Validate and build the dataset.
    ///
    /// # Errors
    /// Returns every violated rule, not just the first.
    pub fn build(self) -> Result<Dataset, Violations> {
        let mut violations = Violations::new();
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            violations.push("tags", "must not contain empty tags");
        }

        let tags = normalize_tags(&self.tags);
        let now = super::now();
        let dataset = Dataset {
            id: self.id,
            title: self.title,
            description: self.description,
            owner_org: self.owner_org,
            license_id: self.license_id,
            tags,
            resources: self.resources,
            created_at: now,
            updated_at: now,
        };

        for violation in dataset.validate().iter() {
            violations.push(violation.field.clone(), violation.message.clone());
        }
        violations.into_result(dataset)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_builder() -> DatasetBuilder {
        Dataset::builder("air-quality-2025", "Air Quality 2025")
            .with_description("Hourly PM2.5 readings")
            .with_license_id("cc-by")
    }

    #[test]
    fn test_build_valid_dataset() {
        let dataset = valid_builder()
            .with_owner_org("city-of-utrecht")
            .with_tags(["Environment", "  air ", "environment"])
            .with_resource(
                Resource::new("readings.csv", "https://example.org/readings.csv", "csv")
                    .with_description("Raw readings")
                    .with_filesize(1_048_576),
            )
            .build()
            .unwrap();

        assert_eq!(dataset.id, "air-quality-2025");
        assert_eq!(dataset.tags, vec!["environment", "air"]);
        assert_eq!(dataset.resources.len(), 1);
        assert_eq!(dataset.resources[0].filesize, Some(1_048_576));
        assert!(dataset.is_owned_by("city-of-utrecht"));
        assert!(dataset.has_tag("air"));
        assert_eq!(dataset.created_at, dataset.updated_at);
    }

    #[test]
    fn test_build_reports_all_violations() {
        let result = Dataset::builder("Bad Slug!", "")
            .with_resource(Resource::new("", "", "csv"))
            .build();

        let violations = result.unwrap_err();
        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert!(fields.contains(&"id"));
        assert!(fields.contains(&"title"));
        assert!(fields.contains(&"description"));
        assert!(fields.contains(&"license_id"));
        assert!(fields.contains(&"resources[0].name"));
        assert!(fields.contains(&"resources[0].url"));
    }

    #[test]
    fn test_build_rejects_empty_tag() {
        let violations = valid_builder().with_tag("   ").build().unwrap_err();
        assert!(violations.iter().any(|v| v.field == "tags"));
    }

    #[test]
    fn test_build_rejects_invalid_owner_org() {
        let violations = valid_builder().with_owner_org("Not A Slug").build().unwrap_err();
        assert!(violations.iter().any(|v| v.field == "owner_org"));
    }

    #[test]
    fn test_json_round_trip() {
        let dataset = valid_builder()
            .with_tag("environment")
            .with_resource(Resource::new("readings.csv", "https://example.org/r.csv", "csv"))
            .build()
            .unwrap();

        let encoded = serde_json::to_string_pretty(&dataset).unwrap();
        let decoded: Dataset = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, dataset);
    }
}
