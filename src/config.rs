//! Run and model configuration.
//!
//! Layout under the project root:
//!
//! ```text
//! configs/models.yaml          ordered model list
//! configs/run_<name>.yaml      sampling defaults + prompt style + case file
//! cases/<case>                 case vignette (UTF-8)
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::SamplingParams;
use crate::judge::AxisMode;

pub const DEFAULT_CASE: &str = "herr_herrmann.txt";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration in {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

/// Run-wide sampling defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    /// Prompt style tag, e.g. `neutral` or `autonomy`.
    pub system_style: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub params: RunParams,
    #[serde(default = "default_case")]
    pub case: String,
}

fn default_case() -> String {
    DEFAULT_CASE.to_string()
}

/// Optional per-model overrides; each present field wins over the run default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamOverrides {
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Display name.
    pub name: String,
    /// Provider label written to the results.
    pub provider: String,
    /// Registry key selecting the generator.
    pub adapter: String,
    #[serde(default)]
    pub params: ParamOverrides,
}

#[derive(Debug, Deserialize)]
struct ModelsFile {
    models: Vec<ModelSpec>,
}

impl RunParams {
    pub fn defaults(&self) -> SamplingParams {
        SamplingParams::new(self.temperature, self.top_p, self.max_tokens)
    }
}

impl ModelSpec {
    /// Field-by-field merge of this model's overrides onto `defaults`.
    pub fn effective_params(&self, defaults: &SamplingParams) -> SamplingParams {
        SamplingParams {
            temperature: self.params.temperature.unwrap_or(defaults.temperature),
            top_p: self.params.top_p.unwrap_or(defaults.top_p),
            max_tokens: self.params.max_tokens.unwrap_or(defaults.max_tokens),
        }
    }
}

fn read_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn run_config_path(root: &Path, run: &str) -> PathBuf {
    root.join("configs").join(format!("run_{run}.yaml"))
}

pub fn models_path(root: &Path) -> PathBuf {
    root.join("configs").join("models.yaml")
}

pub fn load_run_config(root: &Path, run: &str) -> Result<RunConfig, ConfigError> {
    let path = run_config_path(root, run);
    let cfg: RunConfig = read_yaml(&path)?;

    let p = &cfg.params;
    let invalid = |message: String| ConfigError::Invalid {
        path: path.clone(),
        message,
    };
    if !p.temperature.is_finite() || p.temperature < 0.0 {
        return Err(invalid(format!("temperature must be >= 0, got {}", p.temperature)));
    }
    if !(p.top_p > 0.0 && p.top_p <= 1.0) {
        return Err(invalid(format!("top_p must be in (0, 1], got {}", p.top_p)));
    }
    if p.max_tokens == 0 {
        return Err(invalid("max_tokens must be >= 1".to_string()));
    }
    if cfg.case.trim().is_empty() {
        return Err(invalid("case must not be empty".to_string()));
    }
    Ok(cfg)
}

/// Models in file order.
pub fn load_models(root: &Path) -> Result<Vec<ModelSpec>, ConfigError> {
    let path = models_path(root);
    let file: ModelsFile = read_yaml(&path)?;
    if file.models.is_empty() {
        return Err(ConfigError::Invalid {
            path,
            message: "no models configured".to_string(),
        });
    }
    Ok(file.models)
}

// =============================================================================
// JUDGE SELECTION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JudgeBackend {
    /// Keyword heuristics, no network.
    #[default]
    Rules,
    Gemini,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JudgeSettings {
    pub backend: JudgeBackend,
    pub axis_mode: AxisMode,
}

impl JudgeSettings {
    /// From `JUDGE_BACKEND` (`local` | `gemini`) and `JUDGE_AXIS_MODE`
    /// (`continuous` | `discrete`). Unknown values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_values(
            std::env::var("JUDGE_BACKEND").ok().as_deref(),
            std::env::var("JUDGE_AXIS_MODE").ok().as_deref(),
        )
    }

    pub fn from_values(backend: Option<&str>, axis_mode: Option<&str>) -> Self {
        let backend = match backend.map(|b| b.trim().to_lowercase()).as_deref() {
            Some("gemini") => JudgeBackend::Gemini,
            _ => JudgeBackend::Rules,
        };
        let axis_mode = axis_mode.map(AxisMode::parse_lenient).unwrap_or_default();
        Self { backend, axis_mode }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn loads_run_with_default_case() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "configs/run_baseline.yaml",
            "params:\n  temperature: 0.7\n  top_p: 0.9\n  max_tokens: 600\n  system_style: neutral\n",
        );
        let cfg = load_run_config(dir.path(), "baseline").unwrap();
        assert_eq!(cfg.case, DEFAULT_CASE);
        assert_eq!(cfg.params.defaults(), SamplingParams::new(0.7, 0.9, 600));
    }

    #[test]
    fn rejects_bad_top_p() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "configs/run_x.yaml",
            "params: {temperature: 0, top_p: 0, max_tokens: 10, system_style: neutral}\n",
        );
        let err = load_run_config(dir.path(), "x").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn missing_run_is_a_read_error() {
        let dir = tempdir().unwrap();
        let err = load_run_config(dir.path(), "nope").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn models_keep_order_and_overrides_merge_per_field() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "configs/models.yaml",
            "models:\n  - {name: b, provider: xai, adapter: xai}\n  - name: a\n    provider: openai\n    adapter: openai\n    params: {top_p: 1.0}\n",
        );
        let models = load_models(dir.path()).unwrap();
        assert_eq!(models.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(), ["b", "a"]);

        let defaults = SamplingParams::new(0.5, 0.8, 100);
        assert_eq!(models[0].effective_params(&defaults), defaults);
        assert_eq!(
            models[1].effective_params(&defaults),
            SamplingParams::new(0.5, 1.0, 100)
        );
    }

    #[test]
    fn judge_settings_fallbacks() {
        assert_eq!(JudgeSettings::from_values(None, None), JudgeSettings::default());
        let s = JudgeSettings::from_values(Some("Gemini"), Some("discrete"));
        assert_eq!(s.backend, JudgeBackend::Gemini);
        assert_eq!(s.axis_mode, AxisMode::Discrete);
        let s = JudgeSettings::from_values(Some("local"), Some("fuzzy"));
        assert_eq!(s.backend, JudgeBackend::Rules);
        assert_eq!(s.axis_mode, AxisMode::Continuous);
    }
}
