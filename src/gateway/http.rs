//! Shared HTTP plumbing for the JSON backends.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;

use super::error::{ErrorContext, ProviderError};

/// Maximum allowed response body length (1MB).
const MAX_RESPONSE_LEN: usize = 1_024 * 1_024;

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// How a backend expects its credential.
pub(crate) enum Credential<'a> {
    Bearer(&'a str),
    Header(&'static str, &'a str),
}

/// Credential, base URL and timeout read from the environment.
#[derive(Debug, Clone)]
pub(crate) struct EndpointEnv {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl EndpointEnv {
    pub fn load(prefix: &str, default_base_url: &str) -> Result<Self, ProviderError> {
        Self::load_vars(
            &format!("{prefix}_API_KEY"),
            &format!("{prefix}_BASE_URL"),
            &format!("{prefix}_TIMEOUT_SECONDS"),
            default_base_url,
        )
    }

    pub fn load_vars(
        key_var: &str,
        base_url_var: &str,
        timeout_var: &str,
        default_base_url: &str,
    ) -> Result<Self, ProviderError> {
        let api_key = std::env::var(key_var)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::config(format!("{key_var} not set")))?;

        let base_url =
            std::env::var(base_url_var).unwrap_or_else(|_| default_base_url.to_string());

        let timeout = std::env::var(timeout_var)
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        Ok(Self {
            api_key,
            base_url,
            timeout,
        })
    }
}

/// Build a JSON client with the credential baked into its default headers.
pub(crate) fn build_client(
    credential: Credential<'_>,
    extra: &[(&'static str, &'static str)],
    timeout: Duration,
) -> Result<reqwest::Client, ProviderError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    match credential {
        Credential::Bearer(key) => {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|_| ProviderError::config("Invalid API key format"))?;
            headers.insert(AUTHORIZATION, value);
        }
        Credential::Header(name, key) => {
            let value = HeaderValue::from_str(key)
                .map_err(|_| ProviderError::config("Invalid API key format"))?;
            headers.insert(HeaderName::from_static(name), value);
        }
    }

    for (name, value) in extra {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }

    reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .gzip(true)
        .build()
        .map_err(|e| ProviderError::config(format!("Failed to create HTTP client: {e}")))
}

/// Join a base URL and a path without doubling the slash.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Extract request ID from response headers.
fn extract_request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .or_else(|| headers.get("request-id"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Pull a human-readable message and code out of an error body.
///
/// Handles `{"error": {"message", "code"|"type"}}`, `{"error": "..."}`,
/// `{"message": "..."}` and falls back to the raw body.
fn error_details(body: &str) -> (String, Option<String>) {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return (body.trim().to_string(), None);
    };

    let error = parsed.get("error");
    let message = error
        .and_then(|e| e.get("message"))
        .or(error.filter(|e| e.is_string()))
        .or_else(|| parsed.get("message"))
        .or_else(|| parsed.get("detail"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string());

    let code = error
        .and_then(|e| e.get("code").or_else(|| e.get("type")))
        .and_then(|c| match c {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    (message, code)
}

/// POST a JSON body and return the parsed JSON response.
///
/// Non-success statuses become [`ProviderError::Status`] carrying the status,
/// request ID and backend error code.
pub(crate) async fn post_json<B: Serialize + ?Sized>(
    client: &reqwest::Client,
    provider: &'static str,
    url: &str,
    body: &B,
) -> Result<Value, ProviderError> {
    let mut response = client.post(url).json(body).send().await?;

    let status = response.status();
    let request_id = extract_request_id(response.headers());

    // Stream response to enforce size limit
    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let new_len = bytes.len() + chunk.len();
        if new_len > MAX_RESPONSE_LEN {
            return Err(ProviderError::invalid_response(
                provider,
                format!("Response too large: {new_len} bytes"),
            ));
        }
        bytes.extend_from_slice(&chunk);
    }

    let text = String::from_utf8_lossy(&bytes);

    if !status.is_success() {
        let mut ctx = ErrorContext::new().with_status(status.as_u16());
        if let Some(id) = request_id {
            ctx = ctx.with_request_id(id);
        }
        let (detail, code) = error_details(&text);
        if let Some(code) = code {
            ctx = ctx.with_code(code);
        }
        let message = if detail.is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            format!("HTTP {}: {detail}", status.as_u16())
        };
        return Err(ProviderError::status(provider, message, ctx));
    }

    serde_json::from_str(&text)
        .map_err(|e| ProviderError::invalid_response(provider, format!("Invalid JSON: {e}")))
}
