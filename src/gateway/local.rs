//! In-process causal language model backend.
//!
//! The model weights are not bundled. A [`ModelRuntime`] implementation
//! provides the device probe and the loader; [`LocalGenerator`] owns the
//! loaded model and makes sure it is loaded exactly once, even when several
//! runs hit it concurrently.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::error::ProviderError;
use super::types::{Message, SamplingParams};
use super::Generator;

pub const PROVIDER: &str = "local";
pub const DEFAULT_MODEL: &str = "openGPT-X/Teuken-7B-instruct-v0.6";

/// Error type surfaced by runtime implementations.
pub type RuntimeError = Box<dyn std::error::Error + Send + Sync>;

/// Compute device, in descending priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Device {
    Metal,
    Cuda,
    Cpu,
}

impl Device {
    /// Weight precision used on this device.
    pub fn dtype(self) -> DType {
        match self {
            Self::Metal => DType::F16,
            Self::Cuda => DType::BF16,
            Self::Cpu => DType::F32,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Metal => "metal",
            Self::Cuda => "cuda",
            Self::Cpu => "cpu",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    F16,
    BF16,
    F32,
}

/// Pick the highest-priority device; CPU is always available.
pub fn select_device(available: &[Device]) -> Device {
    available.iter().copied().min().unwrap_or(Device::Cpu)
}

/// Sampling settings for one generate call. `None` means greedy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub top_p: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeOptions {
    pub max_new_tokens: u32,
    pub sampling: Option<Sampling>,
}

impl From<&SamplingParams> for DecodeOptions {
    fn from(params: &SamplingParams) -> Self {
        let sampling = (params.temperature > 0.0).then_some(Sampling {
            temperature: params.temperature,
            top_p: params.top_p,
        });
        Self {
            max_new_tokens: params.max_tokens,
            sampling,
        }
    }
}

/// A loaded tokenizer + model pair.
pub trait CausalLm: Send + Sync {
    /// Tokenize chat turns with the model's chat template, generation prompt appended.
    fn encode_chat(&self, turns: &[Message]) -> Result<Vec<u32>, RuntimeError>;

    /// Run generation. The returned sequence starts with `prompt`.
    fn generate(&self, prompt: &[u32], options: &DecodeOptions) -> Result<Vec<u32>, RuntimeError>;

    /// Detokenize, skipping special tokens.
    fn decode(&self, ids: &[u32]) -> Result<String, RuntimeError>;
}

/// Loader seam for in-process inference engines.
pub trait ModelRuntime: Send + Sync {
    /// Accelerators this runtime can use on the current machine.
    fn available_devices(&self) -> Vec<Device>;

    /// Load tokenizer and weights. Called at most once per [`LocalGenerator`].
    fn load(
        &self,
        model_id: &str,
        device: Device,
        dtype: DType,
    ) -> Result<Arc<dyn CausalLm>, RuntimeError>;
}

/// Fold the system text into the single user turn.
pub fn combine_prompt(system: &str, user: &str) -> String {
    let system = system.trim();
    if system.is_empty() {
        user.trim().to_string()
    } else {
        format!("{system}\n\n{}", user.trim())
    }
}

/// Decode only the generated suffix; fall back to the whole sequence.
fn decode_completion(lm: &dyn CausalLm, output: &[u32], prompt_len: usize) -> Result<String, RuntimeError> {
    let suffix = output.get(prompt_len..).unwrap_or(&[]);
    match lm.decode(suffix) {
        Ok(text) => Ok(text),
        Err(err) => {
            warn!(provider = PROVIDER, error = %err, "suffix decode failed, decoding full sequence");
            lm.decode(output)
        }
    }
}

pub struct LocalGenerator {
    runtime: Arc<dyn ModelRuntime>,
    model_id: String,
    model: OnceCell<Arc<dyn CausalLm>>,
}

impl fmt::Debug for LocalGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalGenerator")
            .field("model_id", &self.model_id)
            .field("loaded", &self.model.initialized())
            .finish()
    }
}

impl LocalGenerator {
    pub fn new(runtime: Arc<dyn ModelRuntime>) -> Self {
        Self::with_model(runtime, DEFAULT_MODEL)
    }

    pub fn with_model(runtime: Arc<dyn ModelRuntime>, model_id: impl Into<String>) -> Self {
        Self {
            runtime,
            model_id: model_id.into(),
            model: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    async fn model(&self) -> Result<Arc<dyn CausalLm>, ProviderError> {
        let lm = self
            .model
            .get_or_try_init(|| async {
                let runtime = Arc::clone(&self.runtime);
                let model_id = self.model_id.clone();
                tokio::task::spawn_blocking(move || {
                    let device = select_device(&runtime.available_devices());
                    let dtype = device.dtype();
                    info!(provider = PROVIDER, model = %model_id, %device, ?dtype, "loading model");
                    runtime.load(&model_id, device, dtype).map_err(|e| {
                        ProviderError::runtime(PROVIDER, format!("failed to load '{model_id}': {e}"))
                    })
                })
                .await
                .map_err(|e| ProviderError::runtime(PROVIDER, format!("load task failed: {e}")))?
            })
            .await?;
        Ok(Arc::clone(lm))
    }
}

#[async_trait]
impl Generator for LocalGenerator {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn generate(
        &self,
        system: &str,
        user: &str,
        params: &SamplingParams,
    ) -> Result<String, ProviderError> {
        let lm = self.model().await?;
        let turns = vec![Message::user(combine_prompt(system, user))];
        let options = DecodeOptions::from(params);

        let text = tokio::task::spawn_blocking(move || -> Result<String, RuntimeError> {
            let prompt = lm.encode_chat(&turns)?;
            let output = lm.generate(&prompt, &options)?;
            decode_completion(lm.as_ref(), &output, prompt.len())
        })
        .await
        .map_err(|e| ProviderError::runtime(PROVIDER, format!("generation task failed: {e}")))?
        .map_err(|e| ProviderError::runtime(PROVIDER, format!("generation failed: {e}")))?;

        Ok(text.trim().to_string())
    }
}
