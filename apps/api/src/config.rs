use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Panics at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Path to the checklist catalog JSON (external input, read-only).
    pub checklist_path: String,
    /// Fixed delay inserted between generation tasks to respect provider
    /// throughput limits. Milliseconds.
    pub generation_delay_ms: u64,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            checklist_path: require_env("CHECKLIST_PATH")?,
            generation_delay_ms: std::env::var("GENERATION_DELAY_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse::<u64>()
                .context("GENERATION_DELAY_MS must be an integer number of milliseconds")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
