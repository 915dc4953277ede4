//! Axum route handlers for the version/cache API.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::cache::bundle::{self, ExportBundle};
use crate::cache::store::{self, CacheStats};
use crate::cache::{active, versions};
use crate::errors::AppError;
use crate::models::cache::{ArtifactRow, VersionRow};
use crate::models::family::CacheFamily;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct FamilyQuery {
    pub family: Option<CacheFamily>,
}

#[derive(Debug, Deserialize)]
pub struct LanguageQuery {
    pub language: String,
}

#[derive(Debug, Deserialize)]
pub struct PointerQuery {
    pub family: CacheFamily,
    pub language: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub version_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VersionDetailResponse {
    pub version: VersionRow,
    pub stats: CacheStats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub version_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactEdit {
    pub language: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveResponse {
    pub version_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetActiveRequest {
    pub family: CacheFamily,
    pub language: String,
    pub version_id: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Version handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/cache/versions?family=
pub async fn handle_list_versions(
    State(state): State<AppState>,
    Query(params): Query<FamilyQuery>,
) -> Result<Json<Vec<VersionRow>>, AppError> {
    Ok(Json(versions::list(&state.db, params.family).await?))
}

/// GET /api/v1/cache/versions/:id
pub async fn handle_get_version(
    State(state): State<AppState>,
    Path(version_id): Path<String>,
) -> Result<Json<VersionDetailResponse>, AppError> {
    let version = versions::get(&state.db, &version_id).await?;
    let stats = store::stats(&state.db, Some(&version_id)).await?;
    Ok(Json(VersionDetailResponse { version, stats }))
}

/// DELETE /api/v1/cache/versions/:id
///
/// Rejected with 409 VERSION_IN_USE while any active pointer references the
/// version; demote it first.
pub async fn handle_delete_version(
    State(state): State<AppState>,
    Path(version_id): Path<String>,
) -> Result<StatusCode, AppError> {
    versions::delete(&state.db, &version_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ────────────────────────────────────────────────────────────────────────────
// Export / import
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/cache/versions/:id/export
pub async fn handle_export(
    State(state): State<AppState>,
    Path(version_id): Path<String>,
) -> Result<Json<ExportBundle>, AppError> {
    Ok(Json(bundle::export(&state.db, &version_id).await?))
}

/// POST /api/v1/cache/import
pub async fn handle_import(
    State(state): State<AppState>,
    Json(payload): Json<ExportBundle>,
) -> Result<Json<ImportResponse>, AppError> {
    let version_id = bundle::import(&state.db, &payload).await?;
    Ok(Json(ImportResponse { version_id }))
}

// ────────────────────────────────────────────────────────────────────────────
// Artifact handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/cache/versions/:id/artifacts?language=
pub async fn handle_list_artifacts(
    State(state): State<AppState>,
    Path(version_id): Path<String>,
    Query(params): Query<LanguageQuery>,
) -> Result<Json<Vec<ArtifactRow>>, AppError> {
    versions::get(&state.db, &version_id).await?;
    Ok(Json(store::list(&state.db, &version_id, &params.language).await?))
}

/// GET /api/v1/cache/versions/:id/artifacts/:item_id?language=
pub async fn handle_get_artifact(
    State(state): State<AppState>,
    Path((version_id, item_id)): Path<(String, String)>,
    Query(params): Query<LanguageQuery>,
) -> Result<Json<ArtifactRow>, AppError> {
    Ok(Json(
        store::get(&state.db, &version_id, &item_id, &params.language).await?,
    ))
}

/// PATCH /api/v1/cache/versions/:id/artifacts/:item_id
///
/// Human correction: overwrites the body in place without touching version
/// identity or membership.
pub async fn handle_update_artifact(
    State(state): State<AppState>,
    Path((version_id, item_id)): Path<(String, String)>,
    Json(edit): Json<ArtifactEdit>,
) -> Result<StatusCode, AppError> {
    if edit.body.trim().is_empty() {
        return Err(AppError::Validation("body cannot be empty".to_string()));
    }
    store::update_body(&state.db, &version_id, &item_id, &edit.language, &edit.body).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ────────────────────────────────────────────────────────────────────────────
// Active-pointer handlers and the consumer read path
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/cache/active/list
pub async fn handle_list_active(
    State(state): State<AppState>,
) -> Result<Json<Vec<crate::models::cache::ActivePointerRow>>, AppError> {
    Ok(Json(active::list_all(&state.db).await?))
}

/// GET /api/v1/cache/active?family=&language=
pub async fn handle_get_active(
    State(state): State<AppState>,
    Query(params): Query<PointerQuery>,
) -> Result<Json<ActiveResponse>, AppError> {
    let version_id = active::get_active(&state.db, params.family, &params.language).await?;
    Ok(Json(ActiveResponse { version_id }))
}

/// POST /api/v1/cache/active
pub async fn handle_set_active(
    State(state): State<AppState>,
    Json(request): Json<SetActiveRequest>,
) -> Result<StatusCode, AppError> {
    active::set_active(
        &state.db,
        request.family,
        &request.language,
        &request.version_id,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/cache/current?family=&language=
///
/// The consumer read path: resolves the active pointer and returns that
/// version's artifacts for the language, in catalog order.
pub async fn handle_get_current(
    State(state): State<AppState>,
    Query(params): Query<PointerQuery>,
) -> Result<Json<Vec<ArtifactRow>>, AppError> {
    let version_id = active::get_active(&state.db, params.family, &params.language)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No active version for ({}, {})",
                params.family, params.language
            ))
        })?;
    Ok(Json(store::list(&state.db, &version_id, &params.language).await?))
}

/// GET /api/v1/cache/stats?versionId=
pub async fn handle_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsQuery>,
) -> Result<Json<CacheStats>, AppError> {
    if let Some(version_id) = &params.version_id {
        versions::get(&state.db, version_id).await?;
    }
    Ok(Json(store::stats(&state.db, params.version_id.as_deref()).await?))
}
