//! Cross-region inference profile resolution.
//!
//! A fixed subset of Bedrock model ids cannot be invoked by raw model id;
//! they must be addressed through a system-defined inference profile.
//! Resolution is an explicit two-step — a caller-supplied ARN always wins,
//! discovery only runs when the caller opted in — so a fake resolver can be
//! substituted in tests and the invoke path stays lookup-free.

use async_trait::async_trait;
use aws_sdk_bedrock::types::InferenceProfileType;
use tracing::info;

use crate::providers::{BedrockConfig, ProviderError};

/// Model-id prefixes Bedrock only serves through an inference profile.
const PROFILE_ONLY_MODEL_PREFIXES: &[&str] = &[
    "anthropic.claude-3-5",
    "anthropic.claude-3-7",
    "anthropic.claude-sonnet-4",
    "anthropic.claude-opus-4",
    "anthropic.claude-haiku-4",
    "amazon.nova",
    "meta.llama3-2",
    "meta.llama3-3",
];

pub fn requires_inference_profile(model_id: &str) -> bool {
    PROFILE_ONLY_MODEL_PREFIXES
        .iter()
        .any(|prefix| model_id.starts_with(prefix))
}

/// Looks up the inference profile ARN wrapping a model id.
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    async fn resolve(&self, model_id: &str) -> Result<String, ProviderError>;
}

/// Resolves the identifier Bedrock should be invoked with:
/// 1. an explicitly supplied profile ARN,
/// 2. the raw model id when the model does not need a profile,
/// 3. discovery through `resolver` when the caller allowed it,
/// 4. otherwise a `ProfileResolution` error, so the caller can fall back to
///    asking for a manual ARN.
pub async fn resolve_model_target(
    config: &BedrockConfig,
    resolver: &dyn ProfileResolver,
) -> Result<String, ProviderError> {
    if let Some(arn) = &config.inference_profile_arn {
        return Ok(arn.clone());
    }
    if !requires_inference_profile(&config.model) {
        return Ok(config.model.clone());
    }
    if !config.auto_resolve_profile {
        return Err(ProviderError::ProfileResolution(format!(
            "model '{}' requires a cross-region inference profile; \
             supply inferenceProfileArn or enable autoResolveProfile",
            config.model
        )));
    }
    resolver.resolve(&config.model).await
}

/// Discovery against the account's system-defined profiles.
pub struct SdkProfileResolver {
    client: aws_sdk_bedrock::Client,
}

impl SdkProfileResolver {
    pub fn new(client: aws_sdk_bedrock::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProfileResolver for SdkProfileResolver {
    async fn resolve(&self, model_id: &str) -> Result<String, ProviderError> {
        let output = self
            .client
            .list_inference_profiles()
            .type_equals(InferenceProfileType::SystemDefined)
            .send()
            .await
            .map_err(|e| {
                ProviderError::ProfileResolution(format!(
                    "listing inference profiles failed: {}",
                    aws_sdk_bedrock::error::DisplayErrorContext(&e)
                ))
            })?;

        for profile in output.inference_profile_summaries() {
            let wraps_model = profile
                .models()
                .iter()
                .any(|m| m.model_arn().is_some_and(|arn| arn.ends_with(model_id)));
            if wraps_model || profile.inference_profile_id().ends_with(model_id) {
                info!(
                    "Resolved inference profile {} for model {model_id}",
                    profile.inference_profile_id()
                );
                return Ok(profile.inference_profile_arn().to_string());
            }
        }

        Err(ProviderError::ProfileResolution(format!(
            "no system-defined inference profile wraps model '{model_id}'"
        )))
    }
}
