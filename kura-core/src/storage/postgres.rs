//! PostgresBackend - Relational Storage
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PostgresBackend                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pool: sqlx::PgPool (bounded, acquire timeout)               │
//! │  Tables: organizations, datasets, resources                  │
//! │  One transaction per logical operation                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Resources reference their parent dataset with a cascading foreign key, so
//! deleting a dataset removes its resources in the same statement. The
//! `owner_org` column is nullable and deliberately unconstrained: an
//! enforced foreign key would reject datasets whose organization is absent
//! and erase the reference on organization delete, diverging from the
//! flat-file backend's weak-reference semantics.
//!
//! `update` replaces the full resource set (delete-then-reinsert) inside one
//! transaction, matching the flat-file backend's whole-entity-replace
//! contract so behavior is observably identical across backends.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};

use crate::catalog::{Dataset, Organization, Resource};
use crate::constants::{DB_ACQUIRE_TIMEOUT_SECS, DB_POOL_CONNECTIONS_MAX};

use super::backend::{DatasetFilter, DatasetPatch, OrganizationPatch, Page, StorageBackend};
use super::error::{StorageError, StorageResult};

// =============================================================================
// Schema
// =============================================================================

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS organizations (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS datasets (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        owner_org TEXT,
        license_id TEXT NOT NULL,
        tags TEXT[] NOT NULL DEFAULT '{}',
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS resources (
        dataset_id TEXT NOT NULL REFERENCES datasets(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        url TEXT NOT NULL,
        format TEXT NOT NULL,
        filesize BIGINT,
        PRIMARY KEY (dataset_id, position)
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_datasets_owner ON datasets(owner_org)",
    "CREATE INDEX IF NOT EXISTS idx_datasets_tags ON datasets USING GIN(tags)",
];

// =============================================================================
// Error Translation
// =============================================================================

/// Translate a sqlx failure into the storage taxonomy. Unique violations
/// are handled at call sites where the identifier is known.
fn map_db_error(context: &str, err: &sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::PoolTimedOut => {
            StorageError::timeout(format!("{context}: connection pool exhausted"))
        }
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
            StorageError::unavailable(format!("{context}: {err}"))
        }
        _ => StorageError::internal(format!("{context}: {err}")),
    }
}

/// SQLSTATE 23505: unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

// =============================================================================
// Row Mapping
// =============================================================================

fn row_to_resource(row: &PgRow) -> StorageResult<Resource> {
    let filesize: Option<i64> = row
        .try_get("filesize")
        .map_err(|e| StorageError::internal(e.to_string()))?;

    Ok(Resource {
        name: row
            .try_get("name")
            .map_err(|e| StorageError::internal(e.to_string()))?,
        description: row
            .try_get("description")
            .map_err(|e| StorageError::internal(e.to_string()))?,
        url: row
            .try_get("url")
            .map_err(|e| StorageError::internal(e.to_string()))?,
        format: row
            .try_get("format")
            .map_err(|e| StorageError::internal(e.to_string()))?,
        filesize: filesize.map(|v| v as u64),
    })
}

fn row_to_dataset(row: &PgRow, resources: Vec<Resource>) -> StorageResult<Dataset> {
    let created_at: DateTime<Utc> = row
        .try_get("created_at")
        .map_err(|e| StorageError::internal(e.to_string()))?;
    let updated_at: DateTime<Utc> = row
        .try_get("updated_at")
        .map_err(|e| StorageError::internal(e.to_string()))?;

    Ok(Dataset {
        id: row
            .try_get("id")
            .map_err(|e| StorageError::internal(e.to_string()))?,
        title: row
            .try_get("title")
            .map_err(|e| StorageError::internal(e.to_string()))?,
        description: row
            .try_get("description")
            .map_err(|e| StorageError::internal(e.to_string()))?,
        owner_org: row
            .try_get("owner_org")
            .map_err(|e| StorageError::internal(e.to_string()))?,
        license_id: row
            .try_get("license_id")
            .map_err(|e| StorageError::internal(e.to_string()))?,
        tags: row
            .try_get("tags")
            .map_err(|e| StorageError::internal(e.to_string()))?,
        resources,
        created_at,
        updated_at,
    })
}

fn row_to_organization(row: &PgRow) -> StorageResult<Organization> {
    Ok(Organization {
        id: row
            .try_get("id")
            .map_err(|e| StorageError::internal(e.to_string()))?,
        title: row
            .try_get("title")
            .map_err(|e| StorageError::internal(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::internal(e.to_string()))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| StorageError::internal(e.to_string()))?,
    })
}

// =============================================================================
// PostgresBackend
// =============================================================================

/// PostgreSQL storage backend.
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Connect with a bounded pool and initialize the schema.
    ///
    /// # Errors
    /// `Unavailable` if the database cannot be reached; callers treat this
    /// as a fatal startup error.
    ///
    /// # Panics
    /// Panics if the connection string is empty or not a postgres URL;
    /// [`crate::config::StorageConfig::validate`] rejects both earlier.
    pub async fn new(connection_string: &str) -> StorageResult<Self> {
        // Preconditions
        assert!(
            !connection_string.is_empty(),
            "connection string cannot be empty"
        );
        assert!(
            connection_string.starts_with("postgres://")
                || connection_string.starts_with("postgresql://"),
            "connection string must be a postgres URL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(DB_POOL_CONNECTIONS_MAX)
            .acquire_timeout(Duration::from_secs(DB_ACQUIRE_TIMEOUT_SECS))
            .connect(connection_string)
            .await
            .map_err(|e| StorageError::unavailable(format!("failed to connect: {e}")))?;

        let backend = Self { pool };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Create from an existing pool (useful when sharing a pool).
    ///
    /// # Errors
    /// Fails if the schema cannot be initialized.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let backend = Self { pool };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Initialize tables and indexes, idempotently.
    async fn init_schema(&self) -> StorageResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_db_error("create schema", &e))?;
        }
        Ok(())
    }

    /// Get the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close all connections in the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Remove every row. Test support only.
    ///
    /// # Errors
    /// Fails if the truncation cannot be executed.
    #[doc(hidden)]
    pub async fn clear(&self) -> StorageResult<()> {
        sqlx::query("TRUNCATE resources, datasets, organizations")
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error("clear tables", &e))?;
        Ok(())
    }

    async fn fetch_resources(&self, dataset_id: &str) -> StorageResult<Vec<Resource>> {
        let rows = sqlx::query(
            r"
            SELECT name, description, url, format, filesize
            FROM resources WHERE dataset_id = $1
            ORDER BY position ASC
            ",
        )
        .bind(dataset_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_error("fetch resources", &e))?;

        rows.iter().map(row_to_resource).collect()
    }

    /// Non-fatal integrity check mirroring the flat-file backend: dangling
    /// organization references are allowed but reported.
    async fn warn_if_dangling(&self, dataset: &Dataset) {
        if let Some(org) = &dataset.owner_org {
            let exists: Result<bool, _> =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM organizations WHERE id = $1)")
                    .bind(org)
                    .fetch_one(&self.pool)
                    .await;
            if matches!(exists, Ok(false)) {
                tracing::warn!(
                    dataset = %dataset.id,
                    owner_org = %org,
                    "dataset references a missing organization"
                );
            }
        }
    }
}

async fn insert_resources(
    tx: &mut Transaction<'_, Postgres>,
    dataset_id: &str,
    resources: &[Resource],
) -> StorageResult<()> {
    for (position, resource) in resources.iter().enumerate() {
        sqlx::query(
            r"
            INSERT INTO resources (dataset_id, position, name, description, url, format, filesize)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(dataset_id)
        .bind(position as i32)
        .bind(&resource.name)
        .bind(&resource.description)
        .bind(&resource.url)
        .bind(&resource.format)
        .bind(resource.filesize.map(|v| v as i64))
        .execute(&mut **tx)
        .await
        .map_err(|e| map_db_error("insert resource", &e))?;
    }
    Ok(())
}

// =============================================================================
// StorageBackend Implementation
// =============================================================================

#[async_trait]
impl StorageBackend for PostgresBackend {
    async fn create_dataset(&self, dataset: &Dataset) -> StorageResult<Dataset> {
        dataset.validate().into_result(())?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_error("begin transaction", &e))?;

        let inserted = sqlx::query(
            r"
            INSERT INTO datasets (id, title, description, owner_org, license_id, tags, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(&dataset.id)
        .bind(&dataset.title)
        .bind(&dataset.description)
        .bind(&dataset.owner_org)
        .bind(&dataset.license_id)
        .bind(&dataset.tags)
        .bind(dataset.created_at)
        .bind(dataset.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                return Err(StorageError::duplicate(&dataset.id));
            }
            return Err(map_db_error("insert dataset", &e));
        }

        insert_resources(&mut tx, &dataset.id, &dataset.resources).await?;
        tx.commit()
            .await
            .map_err(|e| map_db_error("commit create", &e))?;

        self.warn_if_dangling(dataset).await;
        Ok(dataset.clone())
    }

    async fn get_dataset(&self, id: &str) -> StorageResult<Dataset> {
        let row = sqlx::query("SELECT * FROM datasets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_error("get dataset", &e))?
            .ok_or_else(|| StorageError::not_found(id))?;

        let resources = self.fetch_resources(id).await?;
        row_to_dataset(&row, resources)
    }

    async fn update_dataset(&self, id: &str, patch: &DatasetPatch) -> StorageResult<Dataset> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_error("begin transaction", &e))?;

        let row = sqlx::query("SELECT * FROM datasets WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_db_error("lock dataset", &e))?
            .ok_or_else(|| StorageError::not_found(id))?;

        let resource_rows = sqlx::query(
            r"
            SELECT name, description, url, format, filesize
            FROM resources WHERE dataset_id = $1
            ORDER BY position ASC
            ",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_db_error("fetch resources", &e))?;
        let resources = resource_rows
            .iter()
            .map(row_to_resource)
            .collect::<StorageResult<Vec<_>>>()?;

        let current = row_to_dataset(&row, resources)?;
        let updated = patch.apply(&current)?;

        sqlx::query(
            r"
            UPDATE datasets
            SET title = $2, description = $3, owner_org = $4, license_id = $5,
                tags = $6, updated_at = $7
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(&updated.title)
        .bind(&updated.description)
        .bind(&updated.owner_org)
        .bind(&updated.license_id)
        .bind(&updated.tags)
        .bind(updated.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_db_error("update dataset", &e))?;

        // Whole-entity replace: the resource set is rewritten, not diffed.
        sqlx::query("DELETE FROM resources WHERE dataset_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_db_error("clear resources", &e))?;
        insert_resources(&mut tx, id, &updated.resources).await?;

        tx.commit()
            .await
            .map_err(|e| map_db_error("commit update", &e))?;

        self.warn_if_dangling(&updated).await;
        Ok(updated)
    }

    async fn delete_dataset(&self, id: &str) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM datasets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error("delete dataset", &e))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(id));
        }
        Ok(())
    }

    async fn list_datasets(
        &self,
        filter: &DatasetFilter,
        page: Page,
    ) -> StorageResult<Vec<Dataset>> {
        page.validate()?;

        let rows = sqlx::query(
            r#"
            SELECT * FROM datasets
            WHERE ($1::text IS NULL OR owner_org = $1)
              AND ($2::text IS NULL OR $2 = ANY(tags))
            ORDER BY id COLLATE "C" ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(&filter.owner_org)
        .bind(&filter.tag)
        .bind(page.limit as i64)
        .bind(page.offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_error("list datasets", &e))?;

        let mut datasets = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row
                .try_get("id")
                .map_err(|e| StorageError::internal(e.to_string()))?;
            let resources = self.fetch_resources(&id).await?;
            datasets.push(row_to_dataset(row, resources)?);
        }
        Ok(datasets)
    }

    async fn create_organization(
        &self,
        organization: &Organization,
    ) -> StorageResult<Organization> {
        organization.validate().into_result(())?;

        let inserted = sqlx::query(
            r"
            INSERT INTO organizations (id, title, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(&organization.id)
        .bind(&organization.title)
        .bind(organization.created_at)
        .bind(organization.updated_at)
        .execute(&self.pool)
        .await;

        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                return Err(StorageError::duplicate(&organization.id));
            }
            return Err(map_db_error("insert organization", &e));
        }
        Ok(organization.clone())
    }

    async fn get_organization(&self, id: &str) -> StorageResult<Organization> {
        let row = sqlx::query("SELECT * FROM organizations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_error("get organization", &e))?
            .ok_or_else(|| StorageError::not_found(id))?;

        row_to_organization(&row)
    }

    async fn update_organization(
        &self,
        id: &str,
        patch: &OrganizationPatch,
    ) -> StorageResult<Organization> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_error("begin transaction", &e))?;

        let row = sqlx::query("SELECT * FROM organizations WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_db_error("lock organization", &e))?
            .ok_or_else(|| StorageError::not_found(id))?;

        let current = row_to_organization(&row)?;
        let updated = patch.apply(&current)?;

        sqlx::query("UPDATE organizations SET title = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(&updated.title)
            .bind(updated.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_db_error("update organization", &e))?;

        tx.commit()
            .await
            .map_err(|e| map_db_error("commit update", &e))?;
        Ok(updated)
    }

    async fn delete_organization(&self, id: &str) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error("delete organization", &e))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(id));
        }

        // Weak reference: datasets keep their owner_org value.
        let dangling: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM datasets WHERE owner_org = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_db_error("count dangling references", &e))?;
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

        let rows = sqlx::query(
            r#"
            SELECT * FROM organizations
            ORDER BY id COLLATE "C" ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(page.limit as i64)
        .bind(page.offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_error("list organizations", &e))?;

        rows.iter().map(row_to_organization).collect()
    }
}

// =============================================================================
// Tests (require running Postgres)
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Get test database URL from environment.
    fn test_db_url() -> Option<String> {
        env::var("TEST_POSTGRES_URL").ok()
    }

    /// Skip test if no database available.
    macro_rules! require_db {
        () => {
            match test_db_url() {
                Some(url) => url,
                None => {
                    eprintln!("Skipping test: TEST_POSTGRES_URL not set");
                    return;
                }
            }
        };
    }

    fn sample(id: &str) -> Dataset {
        Dataset::builder(id, "Sample")
            .with_description("A sample dataset")
            .with_license_id("cc-by")
            .with_tag("sample")
            .with_resource(
                Resource::new("data.csv", "https://example.org/data.csv", "csv")
                    .with_filesize(2_048),
            )
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_postgres_connection() {
        let url = require_db!();

        let backend = PostgresBackend::new(&url).await;
        assert!(backend.is_ok(), "should connect to database");

        backend.unwrap().close().await;
    }

    #[tokio::test]
    async fn test_postgres_dataset_crud() {
        let url = require_db!();
        let backend = PostgresBackend::new(&url).await.unwrap();
        backend.clear().await.unwrap();

        let dataset = sample("pg-crud");
        let stored = backend.create_dataset(&dataset).await.unwrap();
        assert_eq!(stored, dataset);

        let fetched = backend.get_dataset("pg-crud").await.unwrap();
        assert_eq!(fetched, dataset);
        assert_eq!(fetched.resources.len(), 1);

        let err = backend.create_dataset(&dataset).await.unwrap_err();
        assert_eq!(err.kind(), "duplicate_identifier");

        backend.delete_dataset("pg-crud").await.unwrap();
        let err = backend.get_dataset("pg-crud").await.unwrap_err();
        assert_eq!(err.kind(), "not_found");

        backend.close().await;
    }

    #[tokio::test]
    async fn test_postgres_update_replaces_resources() {
        let url = require_db!();
        let backend = PostgresBackend::new(&url).await.unwrap();
        backend.clear().await.unwrap();

        backend.create_dataset(&sample("pg-update")).await.unwrap();

        let patch = DatasetPatch {
            resources: Some(vec![
                Resource::new("v2.csv", "https://example.org/v2.csv", "csv"),
                Resource::new("v2.jsonl", "https://example.org/v2.jsonl", "jsonl"),
            ]),
            ..DatasetPatch::default()
        };
        let updated = backend.update_dataset("pg-update", &patch).await.unwrap();
        assert_eq!(updated.resources.len(), 2);

        let fetched = backend.get_dataset("pg-update").await.unwrap();
        assert_eq!(fetched.resources[0].name, "v2.csv");
        assert_eq!(fetched.resources[1].name, "v2.jsonl");

        backend.close().await;
    }

    #[tokio::test]
    async fn test_postgres_list_filters_and_orders() {
        let url = require_db!();
        let backend = PostgresBackend::new(&url).await.unwrap();
        backend.clear().await.unwrap();

        for id in ["pg-c", "pg-a", "pg-b"] {
            backend.create_dataset(&sample(id)).await.unwrap();
        }

        let listed = backend
            .list_datasets(&DatasetFilter::default(), Page::default())
            .await
            .unwrap();
        let ids: Vec<&str> = listed.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["pg-a", "pg-b", "pg-c"]);

        let filtered = backend
            .list_datasets(
                &DatasetFilter {
                    tag: Some("nonexistent".into()),
                    ..DatasetFilter::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert!(filtered.is_empty());

        backend.close().await;
    }
}
