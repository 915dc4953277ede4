//! AWS Bedrock client (signed-request kind), via the Converse API.

use aws_config::timeout::TimeoutConfig;
use aws_config::Region;
use aws_sdk_bedrockruntime::config::Credentials;
use aws_sdk_bedrockruntime::error::DisplayErrorContext;
use aws_sdk_bedrockruntime::types::{
    ContentBlock, ConversationRole, InferenceConfiguration, Message, SystemContentBlock,
};
use tracing::debug;

use crate::providers::profile::{self, ProfileResolver, SdkProfileResolver};
use crate::providers::{BedrockConfig, ProviderError};

pub struct BedrockClient {
    client: aws_sdk_bedrockruntime::Client,
    /// Raw model id, or the inference profile ARN it resolved to.
    model_target: String,
    temperature: f32,
    max_tokens: u32,
}

impl BedrockClient {
    /// Builds a signed client and resolves the model target up front, so
    /// profile problems fail the run before any artifact is written.
    pub async fn connect(config: BedrockConfig) -> Result<Self, ProviderError> {
        let sdk_config = load_sdk_config(&config).await;
        let resolver = SdkProfileResolver::new(aws_sdk_bedrock::Client::new(&sdk_config));
        Self::with_resolver(config, &sdk_config, &resolver).await
    }

    pub async fn with_resolver(
        config: BedrockConfig,
        sdk_config: &aws_config::SdkConfig,
        resolver: &dyn ProfileResolver,
    ) -> Result<Self, ProviderError> {
        let model_target = profile::resolve_model_target(&config, resolver).await?;
        Ok(Self {
            client: aws_sdk_bedrockruntime::Client::new(sdk_config),
            model_target,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub async fn invoke(&self, prompt: &str, system: &str) -> Result<String, ProviderError> {
        let message = Message::builder()
            .role(ConversationRole::User)
            .content(ContentBlock::Text(prompt.to_string()))
            .build()
            .map_err(|e| ProviderError::Invocation(e.to_string()))?;

        let output = self
            .client
            .converse()
            .model_id(&self.model_target)
            .messages(message)
            .system(SystemContentBlock::Text(system.to_string()))
            .inference_config(
                InferenceConfiguration::builder()
                    .temperature(self.temperature)
                    .max_tokens(self.max_tokens as i32)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| ProviderError::Invocation(format!("{}", DisplayErrorContext(&e))))?;

        debug!("Bedrock converse call succeeded for {}", self.model_target);

        let text = output
            .output()
            .and_then(|o| o.as_message().ok())
            .map(|m| {
                m.content()
                    .iter()
                    .filter_map(|block| block.as_text().ok().cloned())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::EmptyContent);
        }
        Ok(text)
    }
}

/// Static-credential SDK config, the same construction the rest of the AWS
/// ecosystem uses for non-instance deployments.
async fn load_sdk_config(config: &BedrockConfig) -> aws_config::SdkConfig {
    let credentials = Credentials::new(
        &config.access_key_id,
        &config.secret_access_key,
        config.session_token.clone(),
        None,
        "cache-generation-static",
    );

    aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .credentials_provider(credentials)
        .timeout_config(
            TimeoutConfig::builder()
                .operation_timeout(std::time::Duration::from_secs(config.timeout_secs))
                .build(),
        )
        .load()
        .await
}
