//! Declarative retry/fallback plans.
//!
//! A backend describes its negotiation as an ordered list of [`Attempt`]s. One
//! loop ([`negotiate`]) runs the plan: the first success wins, errors the
//! attempt is allowed to advance on are recorded, anything else is returned
//! unchanged.

use std::future::Future;

use tracing::{debug, warn};

use super::error::{AttemptFailure, ProviderError};

/// Which failures let the plan move on to the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOn {
    /// Every failure is terminal.
    Never,
    /// 404: the model id is not served.
    ModelUnavailable,
    /// 400 or 404.
    ClientRejection,
    /// 400 naming a sampler parameter.
    UnsupportedParameter,
    /// Any failure except a missing credential.
    AnyError,
}

impl AdvanceOn {
    pub fn accepts(self, err: &ProviderError) -> bool {
        if matches!(err, ProviderError::Config(_)) {
            return false;
        }
        match self {
            Self::Never => false,
            Self::ModelUnavailable => err.is_model_unavailable(),
            Self::ClientRejection => err.is_client_rejection(),
            Self::UnsupportedParameter => err.is_unsupported_parameter(),
            Self::AnyError => true,
        }
    }
}

/// One request shape within a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub model: String,
    pub include_sampler: bool,
    pub include_max_tokens: bool,
    pub advance_on: AdvanceOn,
}

impl Attempt {
    /// Full request (sampler and token cap) for `model`.
    pub fn full(model: impl Into<String>, advance_on: AdvanceOn) -> Self {
        Self {
            model: model.into(),
            include_sampler: true,
            include_max_tokens: true,
            advance_on,
        }
    }

    pub fn without_sampler(mut self) -> Self {
        self.include_sampler = false;
        self
    }

    pub fn without_max_tokens(mut self) -> Self {
        self.include_max_tokens = false;
        self
    }

    fn failure(&self, err: &ProviderError) -> AttemptFailure {
        AttemptFailure {
            model: self.model.clone(),
            include_sampler: self.include_sampler,
            include_max_tokens: self.include_max_tokens,
            http_status: err.http_status(),
            message: err.to_string(),
        }
    }
}

/// Cross product of `models` × {sampler, no sampler} × {token cap, no cap}.
///
/// Model varies slowest and sampler fastest.
pub fn parameter_grid(models: &[&str], advance_on: AdvanceOn) -> Vec<Attempt> {
    let mut plan = Vec::with_capacity(models.len() * 4);
    for model in models {
        for include_max_tokens in [true, false] {
            for include_sampler in [true, false] {
                plan.push(Attempt {
                    model: (*model).to_string(),
                    include_sampler,
                    include_max_tokens,
                    advance_on,
                });
            }
        }
    }
    plan
}

/// Run `plan`, calling `call` once per attempt until one succeeds.
pub async fn negotiate<T, F, Fut>(
    provider: &'static str,
    plan: &[Attempt],
    mut call: F,
) -> Result<T, ProviderError>
where
    F: FnMut(&Attempt) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut failures = Vec::new();

    for (idx, attempt) in plan.iter().enumerate() {
        debug!(
            provider,
            attempt = idx + 1,
            model = %attempt.model,
            include_sampler = attempt.include_sampler,
            include_max_tokens = attempt.include_max_tokens,
            "sending request"
        );

        match call(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt.advance_on.accepts(&err) => {
                warn!(
                    provider,
                    model = %attempt.model,
                    status = ?err.http_status(),
                    code = err.code(),
                    error = %err,
                    "attempt failed, advancing"
                );
                failures.push(attempt.failure(&err));
            }
            Err(err) => return Err(err),
        }
    }

    Err(ProviderError::Exhausted {
        provider,
        attempts: failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::error::ErrorContext;
    use std::cell::Cell;

    fn status(code: u16, message: &str) -> ProviderError {
        ProviderError::status("test", message, ErrorContext::new().with_status(code))
    }

    #[test]
    fn grid_toggles_sampler_fastest() {
        let plan = parameter_grid(&["p", "f"], AdvanceOn::ClientRejection);
        let shape: Vec<_> = plan
            .iter()
            .map(|a| (a.model.as_str(), a.include_sampler, a.include_max_tokens))
            .collect();
        assert_eq!(
            shape,
            vec![
                ("p", true, true),
                ("p", false, true),
                ("p", true, false),
                ("p", false, false),
                ("f", true, true),
                ("f", false, true),
                ("f", true, false),
                ("f", false, false),
            ]
        );
    }

    #[tokio::test]
    async fn first_success_stops_the_plan() {
        let plan = vec![
            Attempt::full("primary", AdvanceOn::ModelUnavailable),
            Attempt::full("fallback", AdvanceOn::AnyError),
            Attempt::full("never-reached", AdvanceOn::AnyError),
        ];
        let calls = Cell::new(0);
        let out = negotiate("test", &plan, |a| {
            calls.set(calls.get() + 1);
            let model = a.model.clone();
            async move {
                if model == "primary" {
                    Err(status(404, "model not found"))
                } else {
                    Ok(format!("from {model}"))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(out, "from fallback");
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn non_advancing_error_is_returned_as_is() {
        let plan = vec![
            Attempt::full("primary", AdvanceOn::ModelUnavailable),
            Attempt::full("fallback", AdvanceOn::AnyError),
        ];
        let err = negotiate::<String, _, _>("test", &plan, |_| async { Err(status(500, "boom")) })
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), Some(500));
        assert!(matches!(err, ProviderError::Status { .. }));
    }

    #[tokio::test]
    async fn exhausting_the_plan_aggregates_failures() {
        let plan = parameter_grid(&["m"], AdvanceOn::ClientRejection);
        let err = negotiate::<String, _, _>("test", &plan, |_| async { Err(status(400, "bad")) })
            .await
            .unwrap_err();
        match err {
            ProviderError::Exhausted { provider, attempts } => {
                assert_eq!(provider, "test");
                assert_eq!(attempts.len(), 4);
                assert!(attempts.iter().all(|a| a.http_status == Some(400)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn config_errors_never_advance() {
        let plan = vec![
            Attempt::full("a", AdvanceOn::AnyError),
            Attempt::full("b", AdvanceOn::AnyError),
        ];
        let calls = Cell::new(0);
        let err = negotiate::<String, _, _>("test", &plan, |_| {
            calls.set(calls.get() + 1);
            async { Err(ProviderError::config("missing key")) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ProviderError::Config(_)));
        assert_eq!(calls.get(), 1);
    }
}
