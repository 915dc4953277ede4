use std::sync::Arc;

use sqlx::SqlitePool;

use crate::catalog::ChecklistCatalog;
use crate::config::Config;
use crate::generation::run::RunRegistry;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// The external checklist catalog, loaded once at startup.
    pub catalog: Arc<ChecklistCatalog>,
    pub config: Config,
    /// Guards against concurrent runs over the same (family, language-set).
    pub runs: RunRegistry,
}
