use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::family::CacheFamily;

/// One generated cache version. Immutable once finalized: identity and
/// membership never change, only artifact bodies may be corrected in place.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VersionRow {
    pub version_id: String,
    pub family: CacheFamily,
    pub created_at: DateTime<Utc>,
    pub item_count: i64,
    pub finalized: bool,
    pub description: String,
    /// Set only for summary versions: the advice/evidence version summarized.
    pub source_version_id: Option<String>,
}

/// One generated text body for one item, in one language, in one version.
/// `(version_id, item_id, language)` is the primary key.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRow {
    pub version_id: String,
    pub item_id: String,
    pub language: String,
    pub category: String,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// The currently-served version for a (family, language) pair.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ActivePointerRow {
    pub family: CacheFamily,
    pub language: String,
    pub version_id: String,
    pub updated_at: DateTime<Utc>,
}
