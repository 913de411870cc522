//! Anthropic messages adapter with model-id fallback.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::error::ProviderError;
use super::http::{self, Credential, EndpointEnv};
use super::negotiation::{negotiate, AdvanceOn, Attempt};
use super::types::{extract_message_blocks_text, Message, SamplingParams};
use super::Generator;

pub const PROVIDER: &str = "anthropic";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const API_VERSION: &str = "2023-06-01";

pub const PRIMARY_MODEL: &str = "claude-sonnet-4-20250514";
pub const FALLBACK_MODELS: [&str; 3] = [
    "claude-3-7-sonnet-latest",
    "claude-3-5-sonnet-latest",
    "claude-3-5-sonnet-20241022",
];

#[derive(Debug, Clone)]
pub struct AnthropicGenerator {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct MessagesApiRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: &'a [Message],
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

impl AnthropicGenerator {
    /// Create from `ANTHROPIC_API_KEY` (plus optional base URL and timeout).
    pub fn from_env() -> Result<Self, ProviderError> {
        let env = EndpointEnv::load("ANTHROPIC", DEFAULT_BASE_URL)?;
        Self::with_config(env.api_key, env.base_url, env.timeout)
    }

    /// Create with custom configuration.
    pub fn with_config(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        let client = http::build_client(
            Credential::Header("x-api-key", &api_key),
            &[("anthropic-version", API_VERSION)],
            timeout,
        )?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Primary model first; only a 404 moves on to the fallbacks, which then
    /// advance on any failure.
    fn plan() -> Vec<Attempt> {
        std::iter::once(Attempt::full(PRIMARY_MODEL, AdvanceOn::ModelUnavailable))
            .chain(
                FALLBACK_MODELS
                    .iter()
                    .map(|m| Attempt::full(*m, AdvanceOn::AnyError)),
            )
            .collect()
    }
}

#[async_trait]
impl Generator for AnthropicGenerator {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn generate(
        &self,
        system: &str,
        user: &str,
        params: &SamplingParams,
    ) -> Result<String, ProviderError> {
        let messages = [Message::user(user)];
        let messages = &messages[..];
        let url = http::endpoint(&self.base_url, "messages");
        let url = url.as_str();
        let client = &self.client;

        let body = negotiate(PROVIDER, &Self::plan(), |attempt| {
            let model = attempt.model.clone();
            async move {
                let req = MessagesApiRequest {
                    model: &model,
                    system,
                    messages,
                    temperature: params.temperature,
                    top_p: params.top_p,
                    max_tokens: params.max_tokens,
                };
                http::post_json(client, PROVIDER, url, &req).await
            }
        })
        .await?;

        Ok(extract_message_blocks_text(&body).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_only_leaves_primary_on_404() {
        let plan = AnthropicGenerator::plan();
        assert_eq!(plan.len(), 4);
        assert_eq!(plan[0].model, PRIMARY_MODEL);
        assert_eq!(plan[0].advance_on, AdvanceOn::ModelUnavailable);
        assert!(plan[1..].iter().all(|a| a.advance_on == AdvanceOn::AnyError));
        assert_eq!(plan[3].model, "claude-3-5-sonnet-20241022");
    }
}
