//! Error types for the generation backends.

use std::fmt;

use thiserror::Error;

/// Additional context from backend errors for debugging.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// HTTP status code from the backend.
    pub http_status: Option<u16>,
    /// Backend-specific error code (e.g. "model_not_found").
    pub provider_code: Option<String>,
    /// Request ID from the backend (x-request-id header).
    pub request_id: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// One failed attempt inside a negotiation plan.
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    pub model: String,
    pub include_sampler: bool,
    pub include_max_tokens: bool,
    pub http_status: Option<u16>,
    pub message: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (sampler={}, max_tokens={}): {}",
            self.model, self.include_sampler, self.include_max_tokens, self.message
        )
    }
}

fn join_failures(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur when asking a backend for text.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Missing credential or dependency. Raised before any network traffic.
    #[error("configuration error: {0}")]
    Config(String),

    /// Every attempt of the negotiation plan failed.
    #[error("{provider}: all {} attempts failed: {}", .attempts.len(), join_failures(.attempts))]
    Exhausted {
        provider: &'static str,
        attempts: Vec<AttemptFailure>,
    },

    /// Non-success HTTP response that the negotiation plan does not recover from.
    #[error("{provider} error: {message}")]
    Status {
        provider: &'static str,
        message: String,
        context: ErrorContext,
    },

    /// Success status, but the body is not something we can read.
    #[error("{provider} returned an unexpected response: {message}")]
    InvalidResponse {
        provider: &'static str,
        message: String,
    },

    /// In-process model failed to load or generate.
    #[error("{provider} runtime error: {message}")]
    Runtime {
        provider: &'static str,
        message: String,
    },

    /// HTTP/network error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProviderError {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a status error with context.
    pub fn status(provider: &'static str, message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Status {
            provider,
            message: message.into(),
            context,
        }
    }

    /// Create an invalid response error.
    pub fn invalid_response(provider: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider,
            message: message.into(),
        }
    }

    /// Create a runtime error.
    pub fn runtime(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Runtime {
            provider,
            message: message.into(),
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Status { context, .. } => context.http_status,
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// The backend reported the requested model as unavailable.
    pub fn is_model_unavailable(&self) -> bool {
        self.http_status() == Some(404)
    }

    /// The backend rejected the request shape or the model (400/404).
    pub fn is_client_rejection(&self) -> bool {
        matches!(self.http_status(), Some(400) | Some(404))
    }

    /// A 400 whose message names a sampler parameter the model does not accept.
    pub fn is_unsupported_parameter(&self) -> bool {
        match self {
            Self::Status {
                message, context, ..
            } if context.http_status == Some(400) => {
                let m = message.to_lowercase();
                m.contains("temperature") || m.contains("top_p") || m.contains("unsupported")
            }
            _ => false,
        }
    }

    /// Short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Exhausted { .. } => "exhausted",
            Self::Status { .. } => "status_error",
            Self::InvalidResponse { .. } => "invalid_response",
            Self::Runtime { .. } => "runtime_error",
            Self::Http(_) => "http_error",
        }
    }

    /// Get the error context if available.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Status { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Get the request ID if available.
    pub fn request_id(&self) -> Option<&str> {
        self.context().and_then(|c| c.request_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_err(status: u16, message: &str) -> ProviderError {
        ProviderError::status("test", message, ErrorContext::new().with_status(status))
    }

    #[test]
    fn classifies_client_rejections() {
        assert!(status_err(400, "bad").is_client_rejection());
        assert!(status_err(404, "missing").is_client_rejection());
        assert!(!status_err(500, "boom").is_client_rejection());
        assert!(!ProviderError::config("no key").is_client_rejection());
    }

    #[test]
    fn only_404_means_unavailable() {
        assert!(status_err(404, "model not found").is_model_unavailable());
        assert!(!status_err(400, "model not found").is_model_unavailable());
    }

    #[test]
    fn unsupported_parameter_needs_400_and_a_parameter_hint() {
        assert!(status_err(400, "Unsupported value: 'temperature'").is_unsupported_parameter());
        assert!(status_err(400, "top_p is not allowed").is_unsupported_parameter());
        assert!(!status_err(400, "messages must not be empty").is_unsupported_parameter());
        assert!(!status_err(500, "temperature").is_unsupported_parameter());
    }

    #[test]
    fn exhausted_lists_every_attempt() {
        let err = ProviderError::Exhausted {
            provider: "anthropic",
            attempts: vec![
                AttemptFailure {
                    model: "a".into(),
                    include_sampler: true,
                    include_max_tokens: true,
                    http_status: Some(404),
                    message: "not found".into(),
                },
                AttemptFailure {
                    model: "b".into(),
                    include_sampler: true,
                    include_max_tokens: true,
                    http_status: Some(500),
                    message: "boom".into(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("all 2 attempts failed"));
        assert!(text.contains("a (sampler=true"));
        assert!(text.contains("boom"));
    }
}
