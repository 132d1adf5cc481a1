//! Black-box contract tests.
//!
//! One scenario script, run unchanged against every backend: the two
//! implementations must produce observably identical results — same
//! entities, same ordering, same failure kinds. The file backend always
//! runs; the postgres backend runs when `TEST_POSTGRES_URL` is set and the
//! `postgres` feature is enabled.

use kura_core::{
    Dataset, DatasetFilter, DatasetPatch, FileBackend, Organization, OrganizationPatch, Page,
    Resource, StorageBackend,
};

fn dataset(id: &str, owner_org: Option<&str>, tags: &[&str]) -> Dataset {
    let mut builder = Dataset::builder(id, format!("Dataset {id}"))
        .with_description("Contract scenario dataset")
        .with_license_id("cc-by")
        .with_tags(tags.iter().copied());
    if let Some(org) = owner_org {
        builder = builder.with_owner_org(org);
    }
    builder
        .with_resource(
            Resource::new("data.csv", format!("https://example.org/{id}.csv"), "csv")
                .with_description("Primary file")
                .with_filesize(4_096),
        )
        .build()
        .unwrap()
}

async fn check_round_trip(backend: &dyn StorageBackend) {
    let input = dataset("trip-ds", None, &["roundtrip"]);
    let stored = backend.create_dataset(&input).await.unwrap();
    assert_eq!(stored, input);

    let fetched = backend.get_dataset("trip-ds").await.unwrap();
    assert_eq!(fetched, input);
    assert_eq!(fetched.resources, input.resources);
}

async fn check_duplicate_create(backend: &dyn StorageBackend) {
    let original = dataset("dup-ds", None, &["first"]);
    backend.create_dataset(&original).await.unwrap();

    let imposter = dataset("dup-ds", None, &["second"]);
    let err = backend.create_dataset(&imposter).await.unwrap_err();
    assert_eq!(err.kind(), "duplicate_identifier");

    // The prior entity is unchanged.
    let fetched = backend.get_dataset("dup-ds").await.unwrap();
    assert_eq!(fetched, original);
}

async fn check_delete_then_get(backend: &dyn StorageBackend) {
    backend
        .create_dataset(&dataset("gone-ds", None, &[]))
        .await
        .unwrap();
    backend.delete_dataset("gone-ds").await.unwrap();

    let err = backend.get_dataset("gone-ds").await.unwrap_err();
    assert_eq!(err.kind(), "not_found");

    // Repeated delete reports NotFound, not success.
    let err = backend.delete_dataset("gone-ds").await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

async fn check_update(backend: &dyn StorageBackend) {
    let original = dataset("edit-ds", None, &["v1"]);
    backend.create_dataset(&original).await.unwrap();

    let patch = DatasetPatch {
        title: Some("Edited".into()),
        tags: Some(vec!["V2 ".into(), "v2".into()]),
        resources: Some(vec![Resource::new(
            "v2.parquet",
            "https://example.org/v2.parquet",
            "parquet",
        )]),
        ..DatasetPatch::default()
    };
    let updated = backend.update_dataset("edit-ds", &patch).await.unwrap();
    assert_eq!(updated.id, "edit-ds");
    assert_eq!(updated.title, "Edited");
    assert_eq!(updated.tags, vec!["v2"]);
    assert_eq!(updated.resources.len(), 1);
    assert_eq!(updated.created_at, original.created_at);

    let fetched = backend.get_dataset("edit-ds").await.unwrap();
    assert_eq!(fetched, updated);

    let err = backend
        .update_dataset("no-such-ds", &DatasetPatch::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

async fn check_update_failure_preserves_state(backend: &dyn StorageBackend) {
    let original = dataset("atomic-ds", None, &["stable"]);
    backend.create_dataset(&original).await.unwrap();

    // A patch that fails validation mid-update must leave no trace.
    let bad = DatasetPatch {
        title: Some(String::new()),
        tags: Some(vec!["changed".into()]),
        ..DatasetPatch::default()
    };
    let err = backend.update_dataset("atomic-ds", &bad).await.unwrap_err();
    assert_eq!(err.kind(), "validation_failed");

    let fetched = backend.get_dataset("atomic-ds").await.unwrap();
    assert_eq!(fetched, original);
}

async fn check_resources_die_with_dataset(backend: &dyn StorageBackend) {
    let with_resources = dataset("cascade-ds", None, &[]);
    assert!(!with_resources.resources.is_empty());
    backend.create_dataset(&with_resources).await.unwrap();
    backend.delete_dataset("cascade-ds").await.unwrap();

    // Re-creating the identifier must not resurrect the old resources.
    let bare = Dataset::builder("cascade-ds", "Reborn")
        .with_description("No resources this time")
        .with_license_id("cc-by")
        .build()
        .unwrap();
    backend.create_dataset(&bare).await.unwrap();

    let fetched = backend.get_dataset("cascade-ds").await.unwrap();
    assert!(fetched.resources.is_empty());
}

async fn check_pagination(backend: &dyn StorageBackend) {
    for id in ["page-b", "page-c", "page-a"] {
        backend
            .create_dataset(&dataset(id, None, &["paged"]))
            .await
            .unwrap();
    }
    let filter = DatasetFilter {
        tag: Some("paged".into()),
        ..DatasetFilter::default()
    };

    let first = backend
        .list_datasets(&filter, Page::new(0, 2))
        .await
        .unwrap();
    let ids: Vec<&str> = first.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["page-a", "page-b"]);

    let second = backend
        .list_datasets(&filter, Page::new(2, 2))
        .await
        .unwrap();
    let ids: Vec<&str> = second.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["page-c"]);

    let err = backend
        .list_datasets(&filter, Page::new(0, 0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_argument");
}

async fn check_filters(backend: &dyn StorageBackend) {
    let org = Organization::builder("filter-org", "Filter Org")
        .build()
        .unwrap();
    backend.create_organization(&org).await.unwrap();

    backend
        .create_dataset(&dataset("filter-owned", Some("filter-org"), &["shared-tag"]))
        .await
        .unwrap();
    backend
        .create_dataset(&dataset("filter-stray", None, &["shared-tag", "stray"]))
        .await
        .unwrap();

    let by_org = backend
        .list_datasets(
            &DatasetFilter {
                owner_org: Some("filter-org".into()),
                ..DatasetFilter::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
    let ids: Vec<&str> = by_org.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["filter-owned"]);

    let by_tag = backend
        .list_datasets(
            &DatasetFilter {
                tag: Some("shared-tag".into()),
                ..DatasetFilter::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
    let ids: Vec<&str> = by_tag.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["filter-owned", "filter-stray"]);

    let both = backend
        .list_datasets(
            &DatasetFilter {
                owner_org: Some("filter-org".into()),
                tag: Some("stray".into()),
            },
            Page::default(),
        )
        .await
        .unwrap();
    assert!(both.is_empty());
}

async fn check_organizations(backend: &dyn StorageBackend) {
    let org = Organization::builder("org-crud", "Org CRUD").build().unwrap();
    let stored = backend.create_organization(&org).await.unwrap();
    assert_eq!(stored, org);

    let err = backend.create_organization(&org).await.unwrap_err();
    assert_eq!(err.kind(), "duplicate_identifier");

    let patch = OrganizationPatch {
        title: Some("Org CRUD (renamed)".into()),
    };
    let updated = backend.update_organization("org-crud", &patch).await.unwrap();
    assert_eq!(updated.title, "Org CRUD (renamed)");
    assert_eq!(backend.get_organization("org-crud").await.unwrap(), updated);

    backend.delete_organization("org-crud").await.unwrap();
    let err = backend.get_organization("org-crud").await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
    let err = backend.delete_organization("org-crud").await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

async fn check_dangling_reference_survives(backend: &dyn StorageBackend) {
    let org = Organization::builder("weak-org", "Weak Org").build().unwrap();
    backend.create_organization(&org).await.unwrap();
    backend
        .create_dataset(&dataset("weak-ds", Some("weak-org"), &[]))
        .await
        .unwrap();

    backend.delete_organization("weak-org").await.unwrap();

    // No cascade: the dataset survives and the reference stays detectable.
    let fetched = backend.get_dataset("weak-ds").await.unwrap();
    assert_eq!(fetched.owner_org.as_deref(), Some("weak-org"));
    assert_eq!(
        backend.get_organization("weak-org").await.unwrap_err().kind(),
        "not_found"
    );
}

async fn check_create_rejects_invalid(backend: &dyn StorageBackend) {
    let mut invalid = dataset("casing-ds", None, &[]);
    invalid.id = "Casing-DS".into();
    invalid.title = String::new();

    let err = backend.create_dataset(&invalid).await.unwrap_err();
    assert_eq!(err.kind(), "validation_failed");
    // Both broken rules are reported together.
    let rendered = err.to_string();
    assert!(rendered.contains("id:"));
    assert!(rendered.contains("title:"));
}

/// The full scenario script. Identifier prefixes are unique per scenario so
/// the script is self-contained on a shared backend.
async fn run_contract_suite(backend: &dyn StorageBackend) {
    check_round_trip(backend).await;
    check_duplicate_create(backend).await;
    check_delete_then_get(backend).await;
    check_update(backend).await;
    check_update_failure_preserves_state(backend).await;
    check_resources_die_with_dataset(backend).await;
    check_pagination(backend).await;
    check_filters(backend).await;
    check_organizations(backend).await;
    check_dangling_reference_survives(backend).await;
    check_create_rejects_invalid(backend).await;
}

// =============================================================================
// File Backend
// =============================================================================

#[tokio::test]
async fn file_backend_contract() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FileBackend::open(
        dir.path().join("datasets"),
        dir.path().join("organizations"),
    )
    .unwrap();

    run_contract_suite(&backend).await;
}

#[tokio::test]
async fn file_backend_plain_pagination() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FileBackend::open(
        dir.path().join("datasets"),
        dir.path().join("organizations"),
    )
    .unwrap();

    for id in ["c", "a", "b"] {
        backend.create_dataset(&dataset(id, None, &[])).await.unwrap();
    }

    let first = backend
        .list_datasets(&DatasetFilter::default(), Page::new(0, 2))
        .await
        .unwrap();
    let ids: Vec<&str> = first.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);

    let second = backend
        .list_datasets(&DatasetFilter::default(), Page::new(2, 2))
        .await
        .unwrap();
    let ids: Vec<&str> = second.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["c"]);
}

#[tokio::test]
async fn file_backend_tolerates_corrupt_neighbor() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FileBackend::open(
        dir.path().join("datasets"),
        dir.path().join("organizations"),
    )
    .unwrap();

    backend.create_dataset(&dataset("ok-a", None, &[])).await.unwrap();
    backend.create_dataset(&dataset("ok-b", None, &[])).await.unwrap();
    std::fs::write(dir.path().join("datasets/mangled.json"), b"]]]").unwrap();

    let listed = backend
        .list_datasets(&DatasetFilter::default(), Page::default())
        .await
        .unwrap();
    let ids: Vec<&str> = listed.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["ok-a", "ok-b"]);
}

// =============================================================================
// Postgres Backend (requires running Postgres)
// =============================================================================

#[cfg(feature = "postgres")]
mod postgres {
    use super::*;
    use kura_core::PostgresBackend;

    macro_rules! require_db {
        () => {
            match std::env::var("TEST_POSTGRES_URL") {
                Ok(url) => url,
                Err(_) => {
                    eprintln!("Skipping test: TEST_POSTGRES_URL not set");
                    return;
                }
            }
        };
    }

    #[tokio::test]
    async fn postgres_backend_contract() {
        let url = require_db!();
        let backend = PostgresBackend::new(&url).await.unwrap();
        backend.clear().await.unwrap();

        run_contract_suite(&backend).await;

        backend.close().await;
    }
}
