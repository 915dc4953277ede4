//! Active-Version Registry — the (family, language) -> version mapping.
//!
//! Every consumer read resolves through this registry plus store lookups;
//! nothing in the application ever guesses "latest version". Switchover is
//! one row overwrite, atomic and independent across families and languages.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use crate::cache::versions;
use crate::errors::AppError;
use crate::models::cache::ActivePointerRow;
use crate::models::family::CacheFamily;

/// Promotes a version for (family, language). The version must exist, belong
/// to the same family, and — for summary families — actually contain
/// artifacts in that language.
pub async fn set_active(
    pool: &SqlitePool,
    family: CacheFamily,
    language: &str,
    version_id: &str,
) -> Result<(), AppError> {
    let version = versions::get(pool, version_id).await?;

    if version.family != family {
        return Err(AppError::Validation(format!(
            "Version {version_id} belongs to family {}, not {family}",
            version.family
        )));
    }

    if family.is_summary() {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM cache_artifacts WHERE version_id = $1 AND language = $2",
        )
        .bind(version_id)
        .bind(language)
        .fetch_one(pool)
        .await?;
        if count == 0 {
            return Err(AppError::Validation(format!(
                "Summary version {version_id} has no '{language}' artifacts"
            )));
        }
    }

    sqlx::query(
        r#"
        INSERT INTO active_versions (family, language, version_id, updated_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (family, language)
        DO UPDATE SET version_id = excluded.version_id,
                      updated_at = excluded.updated_at
        "#,
    )
    .bind(family)
    .bind(language)
    .bind(version_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    info!("Activated version {version_id} for ({family}, {language})");
    Ok(())
}

pub async fn get_active(
    pool: &SqlitePool,
    family: CacheFamily,
    language: &str,
) -> Result<Option<String>, AppError> {
    Ok(sqlx::query_scalar(
        "SELECT version_id FROM active_versions WHERE family = $1 AND language = $2",
    )
    .bind(family)
    .bind(language)
    .fetch_optional(pool)
    .await?)
}

/// Every active pointer, across all families and languages.
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<ActivePointerRow>, AppError> {
    Ok(sqlx::query_as::<_, ActivePointerRow>(
        "SELECT * FROM active_versions ORDER BY family, language",
    )
    .fetch_all(pool)
    .await?)
}
