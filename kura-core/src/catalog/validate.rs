//! Field validation shared by all catalog entities.
//!
//! TigerStyle: validation never short-circuits. Every broken rule is
//! collected into a [`Violations`] list so the caller sees the full picture
//! in one round trip.

use std::fmt;

use serde::Serialize;

use crate::constants::SLUG_BYTES_MAX;

// =============================================================================
// Violations
// =============================================================================

/// A single violated validation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Field path the rule applies to, e.g. `"title"` or `"resources[2].url"`
    pub field: String,
    /// Human-readable description of the broken rule
    pub message: String,
}

/// Every rule an entity violated, collected before reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Violations(Vec<Violation>);

impl Violations {
    /// Create an empty violation list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation.
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(Violation {
            field: field.into(),
            message: message.into(),
        });
    }

    /// True if no rule was violated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of violated rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the recorded violations.
    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.0.iter()
    }

    /// Return `value` if nothing was violated, otherwise `self` as the error.
    ///
    /// # Errors
    /// Returns the violation list when at least one rule was broken.
    pub fn into_result<T>(self, value: T) -> Result<T, Violations> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for v in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", v.field, v.message)?;
            first = false;
        }
        Ok(())
    }
}

// =============================================================================
// Field Checks
// =============================================================================

/// Check whether a string is a valid slug: non-empty, bounded, and made of
/// lowercase ASCII alphanumerics and hyphens only.
#[must_use]
pub fn is_valid_slug(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= SLUG_BYTES_MAX
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Record violations for an invalid slug field.
pub(crate) fn check_slug(violations: &mut Violations, field: &str, value: &str) {
    if value.is_empty() {
        violations.push(field, "must not be empty");
        return;
    }
    if value.len() > SLUG_BYTES_MAX {
        violations.push(
            field,
            format!("exceeds {SLUG_BYTES_MAX} bytes ({} given)", value.len()),
        );
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        violations.push(
            field,
            "must contain only lowercase letters, digits, and hyphens",
        );
    }
}

/// Record a violation if a required string field is empty.
pub(crate) fn check_non_empty(violations: &mut Violations, field: &str, value: &str) {
    if value.is_empty() {
        violations.push(field, "must not be empty");
    }
}

/// Record a violation if a string field exceeds `max` bytes.
pub(crate) fn check_max_bytes(violations: &mut Violations, field: &str, value: &str, max: usize) {
    if value.len() > max {
        violations.push(field, format!("exceeds {max} bytes ({} given)", value.len()));
    }
}

// =============================================================================
// Tag Normalization
// =============================================================================

/// Normalize a tag sequence: trim, lowercase, and collapse duplicates while
/// keeping first-occurrence order. Empty-after-trim tags are dropped here;
/// entity validation rejects them separately so the caller is told.
#[must_use]
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: Vec<String> = Vec::new();
    for tag in tags {
        let normalized = tag.as_ref().trim().to_lowercase();
        if normalized.is_empty() {
            continue;
        }
        if !seen.contains(&normalized) {
            seen.push(normalized);
        }
    }
    seen
}

// =============================================================================
// Tests
// =============================================================================
