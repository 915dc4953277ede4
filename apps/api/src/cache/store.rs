//! Cache Store — persistence for generated artifacts, keyed by
//! (version, item, language).
//!
//! Versions are append-only: membership never changes after finalize. The
//! one mutable field is an artifact's `body` (human correction after
//! generation), which is why `put` carries upsert semantics on the key
//! triple.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::errors::AppError;
use crate::models::cache::ArtifactRow;

/// Inserts an artifact, or overwrites body/category/title when the
/// (version, item, language) triple already exists.
pub async fn put(
    pool: &SqlitePool,
    version_id: &str,
    item_id: &str,
    language: &str,
    category: &str,
    title: &str,
    body: &str,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO cache_artifacts
            (version_id, item_id, language, category, title, body, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (version_id, item_id, language)
        DO UPDATE SET category = excluded.category,
                      title    = excluded.title,
                      body     = excluded.body
        "#,
    )
    .bind(version_id)
    .bind(item_id)
    .bind(language)
    .bind(category)
    .bind(title)
    .bind(body)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Overwrites only the body of an existing artifact. Version identity and
/// membership are untouched.
pub async fn update_body(
    pool: &SqlitePool,
    version_id: &str,
    item_id: &str,
    language: &str,
    body: &str,
) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE cache_artifacts SET body = $1 WHERE version_id = $2 AND item_id = $3 AND language = $4",
    )
    .bind(body)
    .bind(version_id)
    .bind(item_id)
    .bind(language)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Artifact ({version_id}, {item_id}, {language}) not found"
        )));
    }
    Ok(())
}

pub async fn get(
    pool: &SqlitePool,
    version_id: &str,
    item_id: &str,
    language: &str,
) -> Result<ArtifactRow, AppError> {
    sqlx::query_as::<_, ArtifactRow>(
        "SELECT * FROM cache_artifacts WHERE version_id = $1 AND item_id = $2 AND language = $3",
    )
    .bind(version_id)
    .bind(item_id)
    .bind(language)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| {
        AppError::NotFound(format!(
            "Artifact ({version_id}, {item_id}, {language}) not found"
        ))
    })
}

/// All artifacts of one version in one language, in catalog order.
pub async fn list(
    pool: &SqlitePool,
    version_id: &str,
    language: &str,
) -> Result<Vec<ArtifactRow>, AppError> {
    Ok(sqlx::query_as::<_, ArtifactRow>(
        r#"
        SELECT * FROM cache_artifacts
        WHERE version_id = $1 AND language = $2
        ORDER BY category, item_id
        "#,
    )
    .bind(version_id)
    .bind(language)
    .fetch_all(pool)
    .await?)
}

/// Every artifact of a version across all languages, in (language, category,
/// item) order. Used by export.
pub async fn list_all(pool: &SqlitePool, version_id: &str) -> Result<Vec<ArtifactRow>, AppError> {
    Ok(sqlx::query_as::<_, ArtifactRow>(
        r#"
        SELECT * FROM cache_artifacts
        WHERE version_id = $1
        ORDER BY language, category, item_id
        "#,
    )
    .bind(version_id)
    .fetch_all(pool)
    .await?)
}

/// Count of distinct items holding at least one artifact in the version,
/// across all languages. This is the number finalize records.
pub async fn distinct_item_count(pool: &SqlitePool, version_id: &str) -> Result<i64, AppError> {
    Ok(sqlx::query_scalar(
        "SELECT COUNT(DISTINCT item_id) FROM cache_artifacts WHERE version_id = $1",
    )
    .bind(version_id)
    .fetch_one(pool)
    .await?)
}

/// Deletes a version row and cascades its artifacts, atomically. The
/// active-pointer guard lives in the version registry, not here.
pub async fn delete_version_cascade(pool: &SqlitePool, version_id: &str) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM cache_artifacts WHERE version_id = $1")
        .bind(version_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM cache_versions WHERE version_id = $1")
        .bind(version_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!("Deleted version {version_id} and its artifacts");
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total: i64,
    pub per_language_counts: BTreeMap<String, i64>,
    pub unique_item_count: i64,
}

/// Aggregated artifact counts, globally or scoped to one version.
pub async fn stats(pool: &SqlitePool, version_id: Option<&str>) -> Result<CacheStats, AppError> {
    let rows: Vec<(String, i64)> = match version_id {
        Some(v) => {
            sqlx::query_as(
                "SELECT language, COUNT(*) FROM cache_artifacts WHERE version_id = $1 GROUP BY language",
            )
            .bind(v)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as("SELECT language, COUNT(*) FROM cache_artifacts GROUP BY language")
                .fetch_all(pool)
                .await?
        }
    };

    let unique_item_count: i64 = match version_id {
        Some(v) => {
            sqlx::query_scalar(
                "SELECT COUNT(DISTINCT item_id) FROM cache_artifacts WHERE version_id = $1",
            )
            .bind(v)
            .fetch_one(pool)
            .await?
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(DISTINCT item_id) FROM cache_artifacts")
                .fetch_one(pool)
                .await?
        }
    };

    let per_language_counts: BTreeMap<String, i64> = rows.into_iter().collect();
    let total = per_language_counts.values().sum();

    Ok(CacheStats {
        total,
        per_language_counts,
        unique_item_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let pool = test_pool().await;
        put(&pool, "v1", "1.1.1", "ko", "management", "Security policy", "본문")
            .await
            .unwrap();

        let artifact = get(&pool, "v1", "1.1.1", "ko").await.unwrap();
        assert_eq!(artifact.body, "본문");
        assert_eq!(artifact.category, "management");
    }

    #[tokio::test]
    async fn put_on_existing_triple_overwrites_body_not_duplicates() {
        let pool = test_pool().await;
        put(&pool, "v1", "1.1.1", "ko", "management", "Security policy", "first")
            .await
            .unwrap();
        put(&pool, "v1", "1.1.1", "ko", "management", "Security policy", "edited")
            .await
            .unwrap();

        let artifact = get(&pool, "v1", "1.1.1", "ko").await.unwrap();
        assert_eq!(artifact.body, "edited");

        let s = stats(&pool, Some("v1")).await.unwrap();
        assert_eq!(s.total, 1, "no duplicate row for the same key triple");
    }

    #[tokio::test]
    async fn get_missing_artifact_is_not_found() {
        let pool = test_pool().await;
        let err = get(&pool, "v1", "9.9.9", "en").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_orders_by_category_then_item_id() {
        let pool = test_pool().await;
        put(&pool, "v1", "2.1.1", "ko", "protection", "Encryption", "b").await.unwrap();
        put(&pool, "v1", "1.2.1", "ko", "management", "Review", "b").await.unwrap();
        put(&pool, "v1", "1.1.1", "ko", "management", "Policy", "b").await.unwrap();
        put(&pool, "v1", "1.1.1", "en", "management", "Policy", "b").await.unwrap();

        let artifacts = list(&pool, "v1", "ko").await.unwrap();
        let ids: Vec<&str> = artifacts.iter().map(|a| a.item_id.as_str()).collect();
        assert_eq!(ids, vec!["1.1.1", "1.2.1", "2.1.1"]);
    }

    #[tokio::test]
    async fn update_body_requires_existing_artifact() {
        let pool = test_pool().await;
        let err = update_body(&pool, "v1", "1.1.1", "ko", "x").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        put(&pool, "v1", "1.1.1", "ko", "management", "Policy", "original").await.unwrap();
        update_body(&pool, "v1", "1.1.1", "ko", "corrected").await.unwrap();
        assert_eq!(get(&pool, "v1", "1.1.1", "ko").await.unwrap().body, "corrected");
    }

    #[tokio::test]
    async fn stats_counts_per_language_and_unique_items() {
        let pool = test_pool().await;
        put(&pool, "v1", "1.1.1", "ko", "management", "Policy", "b").await.unwrap();
        put(&pool, "v1", "1.1.1", "en", "management", "Policy", "b").await.unwrap();
        put(&pool, "v1", "1.2.1", "ko", "management", "Review", "b").await.unwrap();
        put(&pool, "v2", "1.1.1", "ko", "management", "Policy", "b").await.unwrap();

        let scoped = stats(&pool, Some("v1")).await.unwrap();
        assert_eq!(scoped.total, 3);
        assert_eq!(scoped.per_language_counts["ko"], 2);
        assert_eq!(scoped.per_language_counts["en"], 1);
        assert_eq!(scoped.unique_item_count, 2);

        let global = stats(&pool, None).await.unwrap();
        assert_eq!(global.total, 4);
    }
}
