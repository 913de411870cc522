//! xAI Grok adapter.
//!
//! Grok models differ in which sampler fields they accept, so the chat
//! request is negotiated over model id × sampler × token cap. A structurally
//! successful but empty chat answer is retried once against the
//! messages-style endpoint before settling on a placeholder.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use super::error::ProviderError;
use super::http::{self, Credential, EndpointEnv};
use super::negotiation::{negotiate, parameter_grid, AdvanceOn, Attempt};
use super::types::{extract_chat_text, extract_message_blocks_text, Message, SamplingParams};
use super::Generator;

pub const PROVIDER: &str = "xai";
pub const DEFAULT_BASE_URL: &str = "https://api.x.ai/v1";
pub const PRIMARY_MODEL: &str = "grok-4-0709";
pub const FALLBACK_MODEL: &str = "grok-4";

/// Returned when neither endpoint produced any text.
pub const EMPTY_PLACEHOLDER: &str = "[xAI lieferte keinen Text]";

#[derive(Debug, Clone)]
pub struct XaiGenerator {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
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

impl XaiGenerator {
    /// Create from `XAI_API_KEY` (plus optional base URL and timeout).
    pub fn from_env() -> Result<Self, ProviderError> {
        let env = EndpointEnv::load("XAI", DEFAULT_BASE_URL)?;
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
        parameter_grid(&[PRIMARY_MODEL, FALLBACK_MODEL], AdvanceOn::ClientRejection)
    }

    /// Secondary endpoint. Any failure here degrades to `None`.
    async fn messages_fallback(
        &self,
        system: &str,
        user: &str,
        params: &SamplingParams,
    ) -> Option<String> {
        let messages = [Message::user(user)];
        let req = MessagesApiRequest {
            model: FALLBACK_MODEL,
            system,
            messages: &messages,
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_tokens,
        };
        let url = http::endpoint(&self.base_url, "messages");

        match http::post_json(&self.client, PROVIDER, &url, &req).await {
            Ok(body) => extract_message_blocks_text(&body),
            Err(err) => {
                warn!(provider = PROVIDER, error = %err, "messages endpoint failed");
                None
            }
        }
    }
}

#[async_trait]
impl Generator for XaiGenerator {
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
            let include_max_tokens = attempt.include_max_tokens;
            async move {
                let req = ChatApiRequest {
                    model: &model,
                    messages,
                    stream: false,
                    temperature: include_sampler.then_some(params.temperature),
                    top_p: include_sampler.then_some(params.top_p),
                    max_tokens: include_max_tokens.then_some(params.max_tokens),
                };
                http::post_json(client, PROVIDER, url, &req).await
            }
        })
        .await?;

        if let Some(text) = extract_chat_text(&body) {
            return Ok(text);
        }

        warn!(
            provider = PROVIDER,
            "chat completions returned no text, trying messages endpoint"
        );
        if let Some(text) = self.messages_fallback(system, user, params).await {
            return Ok(text);
        }

        let snippet: String = body.to_string().chars().take(200).collect();
        warn!(provider = PROVIDER, %snippet, "no text from either endpoint");
        Ok(EMPTY_PLACEHOLDER.to_string())
    }
}
