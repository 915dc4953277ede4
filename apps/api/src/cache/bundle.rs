//! Export/import of whole cache versions as file-portable JSON bundles.
//!
//! The bundle shape is `{version, family, createdAt, description?,
//! sourceVersionId?, <language>Artifacts: [...]}` with one artifact array
//! per language present — exactly the shape import accepts back, so
//! export → import is a round-trip identity. Import is validating,
//! idempotent and all-or-nothing: a malformed bundle writes nothing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use crate::cache::{store, versions};
use crate::errors::AppError;
use crate::models::family::CacheFamily;

const LANGUAGE_KEY_SUFFIX: &str = "Artifacts";

/// One artifact inside a bundle. Language is implied by the containing
/// `<language>Artifacts` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleArtifact {
    pub item_id: String,
    pub category: String,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub version: String,
    pub family: CacheFamily,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_version_id: Option<String>,
    /// `koArtifacts`, `enArtifacts`, ... — one array per language.
    #[serde(flatten)]
    pub artifacts: BTreeMap<String, Vec<BundleArtifact>>,
}

pub fn language_key(language: &str) -> String {
    format!("{language}{LANGUAGE_KEY_SUFFIX}")
}

fn parse_language_key(key: &str) -> Option<&str> {
    key.strip_suffix(LANGUAGE_KEY_SUFFIX).filter(|l| !l.is_empty())
}

/// Builds the portable bundle for one version: metadata plus every artifact
/// across all languages present.
pub async fn export(pool: &SqlitePool, version_id: &str) -> Result<ExportBundle, AppError> {
    let version = versions::get(pool, version_id).await?;
    let rows = store::list_all(pool, version_id).await?;

    let mut artifacts: BTreeMap<String, Vec<BundleArtifact>> = BTreeMap::new();
    for row in rows {
        artifacts
            .entry(language_key(&row.language))
            .or_default()
            .push(BundleArtifact {
                item_id: row.item_id,
                category: row.category,
                title: row.title,
                body: row.body,
                created_at: row.created_at,
            });
    }

    Ok(ExportBundle {
        version: version.version_id,
        family: version.family,
        created_at: version.created_at,
        description: version.description,
        source_version_id: version.source_version_id,
        artifacts,
    })
}

/// Applies a bundle: creates the version row if absent (or merges into the
/// existing one, overwriting artifact bodies on conflict), then bulk-upserts
/// artifacts and recomputes the item count. Validation happens before the
/// transaction opens.
pub async fn import(pool: &SqlitePool, bundle: &ExportBundle) -> Result<String, AppError> {
    if bundle.version.trim().is_empty() {
        return Err(AppError::Validation(
            "Bundle is missing a version identifier".to_string(),
        ));
    }
    if bundle.artifacts.values().flatten().next().is_none() {
        return Err(AppError::Validation(
            "Bundle contains no language artifact maps".to_string(),
        ));
    }
    for key in bundle.artifacts.keys() {
        if parse_language_key(key).is_none() {
            return Err(AppError::Validation(format!(
                "Bundle key '{key}' is not a <language>{LANGUAGE_KEY_SUFFIX} map"
            )));
        }
    }

    // A bundle can only merge into a version of the same family
    if let Ok(existing) = versions::get(pool, &bundle.version).await {
        if existing.family != bundle.family {
            return Err(AppError::Validation(format!(
                "Version {} already exists with family {}, bundle says {}",
                bundle.version, existing.family, bundle.family
            )));
        }
    }

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO cache_versions
            (version_id, family, created_at, item_count, finalized, description, source_version_id)
        VALUES ($1, $2, $3, 0, 1, $4, $5)
        ON CONFLICT (version_id) DO NOTHING
        "#,
    )
    .bind(&bundle.version)
    .bind(bundle.family)
    .bind(bundle.created_at)
    .bind(&bundle.description)
    .bind(&bundle.source_version_id)
    .execute(&mut *tx)
    .await?;

    let mut imported = 0usize;
    for (key, artifacts) in &bundle.artifacts {
        let language = parse_language_key(key).expect("validated above");
        for artifact in artifacts {
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
            .bind(&bundle.version)
            .bind(&artifact.item_id)
            .bind(language)
            .bind(&artifact.category)
            .bind(&artifact.title)
            .bind(&artifact.body)
            .bind(artifact.created_at)
            .execute(&mut *tx)
            .await?;
            imported += 1;
        }
    }

    // Membership may have grown on a merge; keep the count honest
    let item_count: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT item_id) FROM cache_artifacts WHERE version_id = $1")
            .bind(&bundle.version)
            .fetch_one(&mut *tx)
            .await?;
    sqlx::query("UPDATE cache_versions SET item_count = $1 WHERE version_id = $2")
        .bind(item_count)
        .bind(&bundle.version)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(
        "Imported {imported} artifacts into version {} ({} distinct items)",
        bundle.version, item_count
    );
    Ok(bundle.version.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn seed_version(pool: &SqlitePool) -> String {
        let draft = versions::create_draft(pool, CacheFamily::Advice, "seeded", None, "openai")
            .await
            .unwrap();
        store::put(pool, &draft.version_id, "1.1.1", "ko", "management", "Policy", "정책 안내")
            .await
            .unwrap();
        store::put(pool, &draft.version_id, "1.2.1", "ko", "management", "Review", "검토 안내")
            .await
            .unwrap();
        store::put(pool, &draft.version_id, "1.1.1", "en", "management", "Policy", "Policy guidance")
            .await
            .unwrap();
        versions::finalize(pool, &draft.version_id, 2).await.unwrap();
        draft.version_id
    }

    #[tokio::test]
    async fn bundle_serializes_with_language_keyed_arrays() {
        let pool = test_pool().await;
        let version_id = seed_version(&pool).await;
        let bundle = export(&pool, &version_id).await.unwrap();

        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["version"], version_id);
        assert_eq!(json["family"], "advice");
        assert_eq!(json["koArtifacts"].as_array().unwrap().len(), 2);
        assert_eq!(json["enArtifacts"].as_array().unwrap().len(), 1);

        // And the same shape parses back
        let parsed: ExportBundle = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.artifacts.len(), 2);
    }

    #[tokio::test]
    async fn export_import_round_trips_content() {
        let source_pool = test_pool().await;
        let version_id = seed_version(&source_pool).await;
        let bundle = export(&source_pool, &version_id).await.unwrap();

        let target_pool = test_pool().await;
        let imported_id = import(&target_pool, &bundle).await.unwrap();
        assert_eq!(imported_id, version_id);

        let round_tripped = export(&target_pool, &imported_id).await.unwrap();
        assert_eq!(round_tripped.artifacts, bundle.artifacts);
        assert_eq!(round_tripped.family, bundle.family);

        let version = versions::get(&target_pool, &imported_id).await.unwrap();
        assert_eq!(version.item_count, 2);
        assert!(version.finalized);
    }

    #[tokio::test]
    async fn import_is_idempotent() {
        let pool = test_pool().await;
        let version_id = seed_version(&pool).await;
        let bundle = export(&pool, &version_id).await.unwrap();

        let target = test_pool().await;
        import(&target, &bundle).await.unwrap();
        import(&target, &bundle).await.unwrap();

        let stats = store::stats(&target, Some(&version_id)).await.unwrap();
        assert_eq!(stats.total, 3, "second import must not double counts");
        assert_eq!(stats.unique_item_count, 2);
    }

    #[tokio::test]
    async fn import_rejects_missing_version_id() {
        let pool = test_pool().await;
        let bundle: ExportBundle = serde_json::from_value(serde_json::json!({
            "version": "",
            "family": "advice",
            "createdAt": "2026-01-01T00:00:00Z",
            "koArtifacts": []
        }))
        .unwrap();

        let err = import(&pool, &bundle).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(versions::list(&pool, None).await.unwrap().is_empty(), "nothing written");
    }

    #[tokio::test]
    async fn import_rejects_bundle_without_language_maps() {
        let pool = test_pool().await;
        let bundle: ExportBundle = serde_json::from_value(serde_json::json!({
            "version": "advice-20260101000000-openai-abcd1234",
            "family": "advice",
            "createdAt": "2026-01-01T00:00:00Z"
        }))
        .unwrap();

        let err = import(&pool, &bundle).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn import_rejects_family_conflict_with_existing_version() {
        let pool = test_pool().await;
        let version_id = seed_version(&pool).await;
        let mut bundle = export(&pool, &version_id).await.unwrap();
        bundle.family = CacheFamily::VirtualEvidence;

        let err = import(&pool, &bundle).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn import_merge_overwrites_bodies() {
        let pool = test_pool().await;
        let version_id = seed_version(&pool).await;
        let mut bundle = export(&pool, &version_id).await.unwrap();
        bundle
            .artifacts
            .get_mut("koArtifacts")
            .unwrap()
            .iter_mut()
            .for_each(|a| a.body = "overwritten".to_string());

        import(&pool, &bundle).await.unwrap();

        let artifact = store::get(&pool, &version_id, "1.1.1", "ko").await.unwrap();
        assert_eq!(artifact.body, "overwritten");
    }
}
