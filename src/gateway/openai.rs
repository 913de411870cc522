//! OpenAI chat completions adapter.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::error::ProviderError;
use super::http::{self, Credential, EndpointEnv};
use super::negotiation::{negotiate, AdvanceOn, Attempt};
use super::types::{extract_chat_text, Message, SamplingParams};
use super::Generator;

pub const PROVIDER: &str = "openai";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const MODEL: &str = "gpt-4.1";

/// OpenAI adapter. Retries once without sampler parameters when the model
/// rejects them.
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_completion_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

impl OpenAiGenerator {
    /// Create from `OPENAI_API_KEY` (plus optional base URL and timeout).
    pub fn from_env() -> Result<Self, ProviderError> {
        let env = EndpointEnv::load("OPENAI", DEFAULT_BASE_URL)?;
        Self::with_config(env.api_key, env.base_url, env.timeout)
    }

    /// Create with custom configuration.
    pub fn with_config(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        let client = http::build_client(Credential::Bearer(&api_key), &[], timeout)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn plan() -> Vec<Attempt> {
        vec![
            Attempt::full(MODEL, AdvanceOn::UnsupportedParameter),
            Attempt::full(MODEL, AdvanceOn::Never).without_sampler(),
        ]
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn generate(
        &self,
        system: &str,
        user: &str,
        params: &SamplingParams,
    ) -> Result<String, ProviderError> {
        let messages = [Message::system(system), Message::user(user)];
        let messages = &messages[..];
        let url = http::endpoint(&self.base_url, "chat/completions");
        let url = url.as_str();
        let client = &self.client;

        let body = negotiate(PROVIDER, &Self::plan(), |attempt| {
            let model = attempt.model.clone();
            let include_sampler = attempt.include_sampler;
            async move {
                let req = ChatApiRequest {
                    model: &model,
                    messages,
                    max_completion_tokens: params.max_tokens,
                    temperature: include_sampler.then_some(params.temperature),
                    top_p: include_sampler.then_some(params.top_p),
                };
                http::post_json(client, PROVIDER, url, &req).await
            }
        })
        .await?;

        Ok(extract_chat_text(&body).unwrap_or_default())
    }
}
