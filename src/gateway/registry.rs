//! Explicit adapter-key → generator constructor map.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::anthropic::AnthropicGenerator;
use super::error::ProviderError;
use super::local::{LocalGenerator, ModelRuntime};
use super::mistral::MistralGenerator;
use super::openai::OpenAiGenerator;
use super::xai::XaiGenerator;
use super::Generator;

/// Builds a generator for one configured model.
pub type GeneratorCtor = Arc<dyn Fn() -> Result<Arc<dyn Generator>, ProviderError> + Send + Sync>;

/// Legacy adapter keys still found in older `models.yaml` files. Resolved at
/// build time, so they follow whatever is registered under the target key.
const ALIASES: [(&str, &str); 5] = [
    ("openai_gpt", "openai"),
    ("anthropic_claude", "anthropic"),
    ("xai_grok", "xai"),
    ("local_mistral", "mistral"),
    ("local_teuken", "local"),
];

#[derive(Clone, Default)]
pub struct GeneratorRegistry {
    ctors: BTreeMap<String, GeneratorCtor>,
}

impl fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorRegistry")
            .field("keys", &self.ctors.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn boxed<G, F>(f: F) -> GeneratorCtor
where
    G: Generator + 'static,
    F: Fn() -> Result<G, ProviderError> + Send + Sync + 'static,
{
    Arc::new(move || f().map(|g| Arc::new(g) as Arc<dyn Generator>))
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in backend. `local` reports a missing runtime until
    /// [`with_local_runtime`](Self::with_local_runtime) installs one.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("openai", boxed(OpenAiGenerator::from_env));
        registry.register("anthropic", boxed(AnthropicGenerator::from_env));
        registry.register("xai", boxed(XaiGenerator::from_env));
        registry.register("mistral", boxed(MistralGenerator::from_env));
        registry.register(
            "local",
            Arc::new(|| -> Result<Arc<dyn Generator>, ProviderError> {
                Err(ProviderError::config(
                    "local backend unavailable: dependency missing (no in-process model runtime installed)",
                ))
            }),
        );
        registry
    }

    /// Route `local` to one shared in-process generator.
    pub fn with_local_runtime(mut self, runtime: Arc<dyn ModelRuntime>) -> Self {
        let shared: Arc<dyn Generator> = Arc::new(LocalGenerator::new(runtime));
        self.register(
            "local",
            Arc::new(move || -> Result<Arc<dyn Generator>, ProviderError> {
                Ok(Arc::clone(&shared))
            }),
        );
        self
    }

    /// Add or replace a constructor. Legacy aliases of `key` follow it.
    pub fn register(&mut self, key: impl Into<String>, ctor: GeneratorCtor) -> &mut Self {
        self.ctors.insert(key.into(), ctor);
        self
    }

    /// Directly registered keys win over aliases.
    fn resolve(&self, key: &str) -> Option<&GeneratorCtor> {
        self.ctors.get(key).or_else(|| {
            ALIASES
                .iter()
                .find(|(alias, _)| *alias == key)
                .and_then(|(_, target)| self.ctors.get(*target))
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.resolve(key).is_some()
    }

    /// Registered keys, sorted. Aliases are not listed.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.ctors.keys().map(String::as_str)
    }

    /// Instantiate the generator for `key`.
    pub fn build(&self, key: &str) -> Result<Arc<dyn Generator>, ProviderError> {
        let ctor = self.resolve(key).ok_or_else(|| {
            let known: Vec<&str> = self.keys().collect();
            ProviderError::config(format!(
                "unknown adapter '{key}' (known: {})",
                known.join(", ")
            ))
        })?;
        ctor()
    }
}
