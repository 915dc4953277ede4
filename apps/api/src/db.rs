use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

/// Creates and returns a SQLite connection pool.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    info!("Connecting to SQLite...");

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("SQLite connection pool established");
    Ok(pool)
}

/// Bootstraps the schema. Idempotent; runs at startup before the router binds.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_versions (
            version_id        TEXT PRIMARY KEY,
            family            TEXT NOT NULL,
            created_at        TEXT NOT NULL,
            item_count        INTEGER NOT NULL DEFAULT 0,
            finalized         INTEGER NOT NULL DEFAULT 0,
            description       TEXT NOT NULL DEFAULT '',
            source_version_id TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_artifacts (
            version_id TEXT NOT NULL,
            item_id    TEXT NOT NULL,
            language   TEXT NOT NULL,
            category   TEXT NOT NULL,
            title      TEXT NOT NULL,
            body       TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (version_id, item_id, language)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS active_versions (
            family     TEXT NOT NULL,
            language   TEXT NOT NULL,
            version_id TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (family, language)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    // Single connection so the in-memory database is shared across queries.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory SQLite pool");
    init_schema(&pool).await.expect("schema bootstrap");
    pool
}
