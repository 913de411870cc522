//! Text-generation backends.
//!
//! Every backend implements [`Generator`]. HTTP backends negotiate model ids
//! and request shapes through [`negotiation::negotiate`]; the in-process
//! backend sits behind the [`local::ModelRuntime`] seam. The orchestrator
//! picks backends by adapter key through [`GeneratorRegistry`].

pub mod anthropic;
pub mod error;
pub(crate) mod http;
pub mod local;
pub mod mistral;
pub mod negotiation;
pub mod openai;
pub mod registry;
pub mod types;
pub mod xai;

use async_trait::async_trait;

pub use anthropic::AnthropicGenerator;
pub use error::{AttemptFailure, ErrorContext, ProviderError};
pub use local::{CausalLm, DType, DecodeOptions, Device, LocalGenerator, ModelRuntime};
pub use mistral::MistralGenerator;
pub use negotiation::{negotiate, AdvanceOn, Attempt};
pub use openai::OpenAiGenerator;
pub use registry::{GeneratorCtor, GeneratorRegistry};
pub use types::*;
pub use xai::XaiGenerator;

/// Turns a system and a user instruction into response text.
///
/// A missing credential is reported as [`ProviderError::Config`] before any
/// request is sent. An empty string is a valid answer.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Short backend label used in logs.
    fn provider(&self) -> &'static str;

    async fn generate(
        &self,
        system: &str,
        user: &str,
        params: &SamplingParams,
    ) -> Result<String, ProviderError>;
}
