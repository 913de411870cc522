//! Mistral chat completions adapter.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::error::ProviderError;
use super::http::{self, Credential, EndpointEnv};
use super::negotiation::{negotiate, AdvanceOn, Attempt};
use super::types::{extract_chat_text, Message, SamplingParams};
use super::Generator;

pub const PROVIDER: &str = "mistral";
pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai/v1";
pub const MODEL: &str = "ministral-3b-2410";

#[derive(Debug, Clone)]
pub struct MistralGenerator {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

impl MistralGenerator {
    /// Create from `MISTRAL_API_KEY` (plus optional base URL and timeout).
    pub fn from_env() -> Result<Self, ProviderError> {
        let env = EndpointEnv::load("MISTRAL", DEFAULT_BASE_URL)?;
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
}

#[async_trait]
impl Generator for MistralGenerator {
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
        // Greedy decoding is rejected unless top_p is exactly 1.
        let top_p = params.top_p_for_greedy_backend();

        let plan = [Attempt::full(MODEL, AdvanceOn::Never)];
        let body = negotiate(PROVIDER, &plan, |attempt| {
            let model = attempt.model.clone();
            async move {
                let req = ChatApiRequest {
                    model: &model,
                    messages,
                    temperature: params.temperature,
                    top_p,
                    max_tokens: params.max_tokens,
                };
                http::post_json(client, PROVIDER, url, &req).await
            }
        })
        .await?;

        Ok(extract_chat_text(&body).unwrap_or_default())
    }
}
