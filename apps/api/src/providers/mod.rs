//! Provider Adapter — the single point of entry for all model calls.
//!
//! ARCHITECTURAL RULE: no other module may call an LLM backend directly.
//! Every generation task goes through [`TextGenerator::invoke`].
//!
//! The backend set is closed: OpenAI, Gemini and Claude speak api-key HTTPS,
//! Bedrock speaks signed requests through the AWS SDK. Dispatch is an
//! exhaustive match over [`LlmProvider`] — no registry, no downcasting.
//! The adapter never retries; retry policy belongs to the orchestrator.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub mod bedrock;
pub mod claude;
pub mod gemini;
pub mod openai;
pub mod profile;

/// Default call timeout. Model calls are slow; 10-60s is common, so the
/// ceiling is generous.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("provider returned empty content")]
    EmptyContent,

    #[error("inference profile resolution failed: {0}")]
    ProfileResolution(String),

    #[error("model invocation failed: {0}")]
    Invocation(String),
}

/// Credentials and tuning shared by the api-key providers.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyConfig {
    pub api_key: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Signed-request provider config. `session_token` distinguishes long-lived
/// from session credentials. `inference_profile_arn` short-circuits profile
/// discovery; `auto_resolve_profile` allows a lookup when a profile-only
/// model is requested without one.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
    pub region: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub inference_profile_arn: Option<String>,
    #[serde(default = "default_true")]
    pub auto_resolve_profile: bool,
}

/// Discriminated provider selection, as it arrives in a generation request.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind")]
pub enum ProviderConfig {
    #[serde(rename = "openai")]
    OpenAi(ApiKeyConfig),
    #[serde(rename = "gemini")]
    Gemini(ApiKeyConfig),
    #[serde(rename = "claude")]
    Claude(ApiKeyConfig),
    #[serde(rename = "bedrock")]
    Bedrock(BedrockConfig),
}

impl ProviderConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderConfig::OpenAi(_) => "openai",
            ProviderConfig::Gemini(_) => "gemini",
            ProviderConfig::Claude(_) => "claude",
            ProviderConfig::Bedrock(_) => "bedrock",
        }
    }
}

/// The single capability the orchestrator needs from a backend.
/// `LlmProvider` implements it for real calls; tests substitute fakes.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn invoke(&self, prompt: &str, system: &str) -> Result<String, ProviderError>;
}

/// A ready-to-invoke provider client. Construction is where structural
/// failures surface (notably Bedrock inference-profile resolution) so a run
/// fails fast before any side effects.
pub enum LlmProvider {
    OpenAi(openai::OpenAiClient),
    Gemini(gemini::GeminiClient),
    Claude(claude::ClaudeClient),
    Bedrock(bedrock::BedrockClient),
}

impl LlmProvider {
    pub async fn from_config(config: ProviderConfig) -> Result<Self, ProviderError> {
        match config {
            ProviderConfig::OpenAi(c) => Ok(LlmProvider::OpenAi(openai::OpenAiClient::new(c))),
            ProviderConfig::Gemini(c) => Ok(LlmProvider::Gemini(gemini::GeminiClient::new(c))),
            ProviderConfig::Claude(c) => Ok(LlmProvider::Claude(claude::ClaudeClient::new(c))),
            ProviderConfig::Bedrock(c) => {
                Ok(LlmProvider::Bedrock(bedrock::BedrockClient::connect(c).await?))
            }
        }
    }
}

#[async_trait]
impl TextGenerator for LlmProvider {
    async fn invoke(&self, prompt: &str, system: &str) -> Result<String, ProviderError> {
        match self {
            LlmProvider::OpenAi(c) => c.invoke(prompt, system).await,
            LlmProvider::Gemini(c) => c.invoke(prompt, system).await,
            LlmProvider::Claude(c) => c.invoke(prompt, system).await,
            LlmProvider::Bedrock(c) => c.invoke(prompt, system).await,
        }
    }
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}
