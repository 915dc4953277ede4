//! Version Registry — metadata CRUD for cache versions.
//!
//! A version is created as a draft, populated task-by-task by the
//! orchestrator, and finalized exactly once; `item_count` is written at
//! finalize time and never again. Deleting the target of an active pointer
//! is rejected here, before the store is asked to cascade.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::cache::store;
use crate::errors::AppError;
use crate::models::cache::VersionRow;
use crate::models::family::CacheFamily;

/// Opaque but orderable: family + UTC timestamp + provider kind + entropy.
pub fn new_version_id(family: CacheFamily, provider_kind: &str) -> String {
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}-{}", family.as_str(), stamp, provider_kind, &suffix[..8])
}

pub async fn create_draft(
    pool: &SqlitePool,
    family: CacheFamily,
    description: &str,
    source_version_id: Option<&str>,
    provider_kind: &str,
) -> Result<VersionRow, AppError> {
    let version_id = new_version_id(family, provider_kind);
    let created_at = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO cache_versions
            (version_id, family, created_at, item_count, finalized, description, source_version_id)
        VALUES ($1, $2, $3, 0, 0, $4, $5)
        "#,
    )
    .bind(&version_id)
    .bind(family)
    .bind(created_at)
    .bind(description)
    .bind(source_version_id)
    .execute(pool)
    .await?;

    info!("Created draft version {version_id} for family {family}");

    Ok(VersionRow {
        version_id,
        family,
        created_at,
        item_count: 0,
        finalized: false,
        description: description.to_string(),
        source_version_id: source_version_id.map(String::from),
    })
}

pub async fn get(pool: &SqlitePool, version_id: &str) -> Result<VersionRow, AppError> {
    sqlx::query_as::<_, VersionRow>("SELECT * FROM cache_versions WHERE version_id = $1")
        .bind(version_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Version {version_id} not found")))
}

/// Versions newest-first, optionally scoped to one family.
pub async fn list(
    pool: &SqlitePool,
    family: Option<CacheFamily>,
) -> Result<Vec<VersionRow>, AppError> {
    let rows = match family {
        Some(f) => {
            sqlx::query_as::<_, VersionRow>(
                r#"
                SELECT * FROM cache_versions
                WHERE family = $1
                ORDER BY created_at DESC, version_id DESC
                "#,
            )
            .bind(f)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, VersionRow>(
                "SELECT * FROM cache_versions ORDER BY created_at DESC, version_id DESC",
            )
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}

/// Seals a version. `item_count` is the count of distinct items that got at
/// least one artifact; a second finalize is rejected.
pub async fn finalize(
    pool: &SqlitePool,
    version_id: &str,
    item_count: i64,
) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE cache_versions SET item_count = $1, finalized = 1 WHERE version_id = $2 AND finalized = 0",
    )
    .bind(item_count)
    .bind(version_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        // Distinguish a missing version from a double finalize
        let existing = get(pool, version_id).await?;
        return Err(AppError::Validation(format!(
            "Version {} is already finalized (itemCount={})",
            existing.version_id, existing.item_count
        )));
    }

    info!("Finalized version {version_id} with {item_count} items");
    Ok(())
}

/// Deletes a version wholesale, cascading its artifacts — unless any active
/// pointer still references it.
pub async fn delete(pool: &SqlitePool, version_id: &str) -> Result<(), AppError> {
    // Existence check first so a bogus id reads as 404, not 409
    get(pool, version_id).await?;

    let pointer_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM active_versions WHERE version_id = $1")
            .bind(version_id)
            .fetch_one(pool)
            .await?;

    if pointer_count > 0 {
        return Err(AppError::VersionInUse(format!(
            "Version {version_id} is referenced by {pointer_count} active pointer(s); demote it first"
        )));
    }

    store::delete_version_cascade(pool, version_id).await
}
