//! Cache families — the independent namespaces the cache subsystem manages.
//!
//! Each family has its own version lineage and its own active pointer per
//! language. Summary families are derived from a base family: their versions
//! carry a `source_version_id` pointing at the advice/evidence version they
//! summarize.

use serde::{Deserialize, Serialize};

/// Closed set of cache namespaces. Matched exhaustively everywhere; adding a
/// family is a deliberate schema-level decision, not a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "camelCase")]
#[sqlx(rename_all = "camelCase")]
pub enum CacheFamily {
    Advice,
    VirtualEvidence,
    AdviceSummary,
    VirtualEvidenceSummary,
}

impl CacheFamily {
    /// Wire and database encoding. Stable; stored in `cache_versions.family`
    /// and `active_versions.family`.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheFamily::Advice => "advice",
            CacheFamily::VirtualEvidence => "virtualEvidence",
            CacheFamily::AdviceSummary => "adviceSummary",
            CacheFamily::VirtualEvidenceSummary => "virtualEvidenceSummary",
        }
    }

    pub fn is_summary(&self) -> bool {
        matches!(
            self,
            CacheFamily::AdviceSummary | CacheFamily::VirtualEvidenceSummary
        )
    }

    /// The base family a summary family derives from.
    pub fn source_family(&self) -> Option<CacheFamily> {
        match self {
            CacheFamily::AdviceSummary => Some(CacheFamily::Advice),
            CacheFamily::VirtualEvidenceSummary => Some(CacheFamily::VirtualEvidence),
            _ => None,
        }
    }
}

impl std::fmt::Display for CacheFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
