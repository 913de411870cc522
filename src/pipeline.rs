//! Run orchestration: generate → judge → persist.
//!
//! For a named run:
//! 1. **Resolve**: load the run config, the ordered model list and the case,
//!    render the prompt pair once.
//! 2. **Generate + judge**: per model, build its generator from the registry,
//!    merge parameter overrides, time the call, classify the text, dump the raw
//!    opinion.
//! 3. **Persist**: write `results.csv` in configured model order, then hand it
//!    to the plot renderer.
//!
//! Any generator error aborts the run before `results.csv` is written.
//!
//! Usage:
//! ```bash
//! careaxis --run baseline --root .
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{self, ConfigError, JudgeBackend, JudgeSettings, ModelSpec, RunParams};
use crate::gateway::{GenerationOutcome, GeneratorRegistry, ProviderError, SamplingParams};
use crate::judge::{AxisClass, Decision, Judge, LlmJudge, RuleJudge, Verdict};
use crate::prompts::{self, PromptPair};

pub const RESULTS_FILE: &str = "results.csv";
pub const RAW_DIR: &str = "raw_opinions";
pub const FIGURES_DIR: &str = "figures";
pub const AXIS_FIGURE: &str = "axis.png";

/// Column order of `results.csv`.
pub const CSV_COLUMNS: [&str; 14] = [
    "run",
    "model",
    "provider",
    "judge_backend",
    "temperature",
    "top_p",
    "max_tokens",
    "system_style",
    "opinion",
    "decision",
    "class",
    "axis",
    "why",
    "latency_ms",
];

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to read case file {path}: {source}")]
    Case {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("generation failed for model {model}: {source}")]
    Generation {
        model: String,
        #[source]
        source: ProviderError,
    },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Raw-opinion dump failure. Logged, never propagated.
#[derive(Debug, thiserror::Error)]
#[error("failed to write raw opinion {path}: {source}")]
pub struct ArtifactError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

// =============================================================================
// Types
// =============================================================================

/// Everything a run needs, resolved up front.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub run: String,
    pub params: RunParams,
    pub prompts: PromptPair,
    pub models: Vec<ModelSpec>,
}

impl RunPlan {
    /// Load `configs/run_<run>.yaml`, `configs/models.yaml` and the case file.
    pub fn load(root: &Path, run: &str) -> Result<Self, PipelineError> {
        let cfg = config::load_run_config(root, run)?;
        let models = config::load_models(root)?;

        let case_path = root.join("cases").join(&cfg.case);
        let case_text = prompts::load_case_text(&case_path).map_err(|source| {
            PipelineError::Case {
                path: case_path.clone(),
                source,
            }
        })?;

        Ok(Self {
            run: run.to_string(),
            prompts: PromptPair::render(&cfg.params.system_style, &case_text),
            params: cfg.params,
            models,
        })
    }
}

/// One model's outcome in a run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub run: String,
    pub model: String,
    pub provider: String,
    pub judge_backend: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub system_style: String,
    /// Unescaped generated text.
    pub opinion: String,
    pub decision: Decision,
    pub class: AxisClass,
    pub axis: f64,
    pub why: String,
    pub latency_ms: u64,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run: String,
    /// In configured model order.
    pub rows: Vec<ResultRow>,
    pub results_csv: PathBuf,
    pub figure: PathBuf,
}

// =============================================================================
// Plotting hand-off
// =============================================================================

/// Renders the axis figure from a finished `results.csv`.
pub trait PlotRenderer: Send + Sync {
    fn render(
        &self,
        results_csv: &Path,
        out_png: &Path,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Default renderer: records the hand-off only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPlotRenderer;

impl PlotRenderer for LogPlotRenderer {
    fn render(
        &self,
        results_csv: &Path,
        out_png: &Path,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            results = %results_csv.display(),
            figure = %out_png.display(),
            "results ready for plotting"
        );
        Ok(())
    }
}

// =============================================================================
// Judge resolution
// =============================================================================

/// Build the configured judge. A Gemini judge that cannot be constructed
/// falls back to the rule judge with a warning.
pub fn resolve_judge(settings: JudgeSettings) -> Arc<dyn Judge> {
    match settings.backend {
        JudgeBackend::Rules => Arc::new(RuleJudge::new()),
        JudgeBackend::Gemini => match LlmJudge::from_env(settings.axis_mode) {
            Ok(judge) => {
                info!(axis_mode = settings.axis_mode.as_str(), "using gemini judge");
                Arc::new(judge)
            }
            Err(err) => {
                warn!(error = %err, "gemini judge unavailable, falling back to rule judge");
                Arc::new(RuleJudge::new())
            }
        },
    }
}

// =============================================================================
// CSV
// =============================================================================

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Header plus one line per row. Newlines in `opinion` become a literal `\n`.
pub fn write_csv<W: std::io::Write>(mut out: W, rows: &[ResultRow]) -> std::io::Result<()> {
    writeln!(out, "{}", CSV_COLUMNS.join(","))?;
    for row in rows {
        let fields = [
            csv_field(&row.run),
            csv_field(&row.model),
            csv_field(&row.provider),
            csv_field(&row.judge_backend),
            format!("{:?}", row.temperature),
            format!("{:?}", row.top_p),
            row.max_tokens.to_string(),
            csv_field(&row.system_style),
            csv_field(&row.opinion.replace('\n', "\\n")),
            csv_field(row.decision.label()),
            csv_field(row.class.label()),
            format!("{:?}", row.axis),
            csv_field(&row.why),
            row.latency_ms.to_string(),
        ];
        writeln!(out, "{}", fields.join(","))?;
    }
    out.flush()
}

/// `<provider>__<model>.txt` with path separators replaced.
pub fn raw_file_name(provider: &str, model: &str) -> String {
    format!("{provider}__{model}.txt").replace(['/', '\\'], "_")
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct Orchestrator {
    root: PathBuf,
    registry: GeneratorRegistry,
    judge: Arc<dyn Judge>,
    plotter: Arc<dyn PlotRenderer>,
    parallelism: usize,
}

impl Orchestrator {
    pub fn new(root: impl Into<PathBuf>, registry: GeneratorRegistry, judge: Arc<dyn Judge>) -> Self {
        Self {
            root: root.into(),
            registry,
            judge,
            plotter: Arc::new(LogPlotRenderer),
            parallelism: 1,
        }
    }

    pub fn with_plotter(mut self, plotter: Arc<dyn PlotRenderer>) -> Self {
        self.plotter = plotter;
        self
    }

    /// Models processed concurrently. Row order is unaffected.
    pub fn with_parallelism(mut self, n: usize) -> Self {
        self.parallelism = n.max(1);
        self
    }

    pub fn judge_backend(&self) -> &'static str {
        self.judge.backend()
    }

    pub fn output_dir(&self, run: &str) -> PathBuf {
        self.root.join("outputs").join(run)
    }

    /// Resolve `run` from the project root and execute it into `outputs/<run>`.
    pub async fn run(&self, run: &str) -> Result<RunReport, PipelineError> {
        let plan = RunPlan::load(&self.root, run)?;
        let out_dir = self.output_dir(run);
        self.execute(&plan, &out_dir).await
    }

    pub async fn execute(&self, plan: &RunPlan, out_dir: &Path) -> Result<RunReport, PipelineError> {
        std::fs::create_dir_all(out_dir).map_err(|source| PipelineError::Io {
            path: out_dir.to_path_buf(),
            source,
        })?;
        let raw_dir = out_dir.join(RAW_DIR);
        if let Err(err) = std::fs::create_dir_all(&raw_dir) {
            warn!(path = %raw_dir.display(), error = %err, "cannot create raw opinion directory");
        }

        info!(
            run = %plan.run,
            models = plan.models.len(),
            judge = self.judge.backend(),
            parallelism = self.parallelism,
            "starting run"
        );

        let defaults = plan.params.defaults();
        let rows: Vec<ResultRow> = stream::iter(
            plan.models
                .iter()
                .map(|spec| self.process_model(plan, spec, &defaults, &raw_dir)),
        )
        .buffered(self.parallelism)
        .try_collect()
        .await?;

        let results_csv = out_dir.join(RESULTS_FILE);
        let file = std::fs::File::create(&results_csv).map_err(|source| PipelineError::Io {
            path: results_csv.clone(),
            source,
        })?;
        write_csv(std::io::BufWriter::new(file), &rows).map_err(|source| PipelineError::Io {
            path: results_csv.clone(),
            source,
        })?;

        let figure = out_dir.join(FIGURES_DIR).join(AXIS_FIGURE);
        self.hand_off_plot(&results_csv, &figure);

        info!(run = %plan.run, results = %results_csv.display(), "run complete");

        Ok(RunReport {
            run: plan.run.clone(),
            rows,
            results_csv,
            figure,
        })
    }

    async fn process_model(
        &self,
        plan: &RunPlan,
        spec: &ModelSpec,
        defaults: &SamplingParams,
        raw_dir: &Path,
    ) -> Result<ResultRow, PipelineError> {
        let generation_error = |source| PipelineError::Generation {
            model: spec.name.clone(),
            source,
        };

        let generator = self.registry.build(&spec.adapter).map_err(generation_error)?;
        let params = spec.effective_params(defaults);

        info!(model = %spec.name, provider = %spec.provider, adapter = %spec.adapter, "generating");
        let start = Instant::now();
        let text = generator
            .generate(&plan.prompts.system, &plan.prompts.user, &params)
            .await
            .map_err(generation_error)?;
        let outcome = GenerationOutcome {
            text,
            latency: start.elapsed(),
        };
        let latency_ms = outcome.latency_ms();

        let verdict = self.judge.classify(&outcome.text).await;

        let raw_path = raw_dir.join(raw_file_name(&spec.provider, &spec.name));
        if let Err(err) = write_raw(&raw_path, &outcome.text).await {
            warn!(error = %err, "raw opinion not saved");
        }
        if outcome.is_blank() {
            warn!(model = %spec.name, provider = %spec.provider, "empty opinion");
        }

        info!(
            model = %spec.name,
            latency_ms,
            decision = %verdict.decision,
            class = %verdict.class,
            axis = verdict.axis,
            "model done"
        );

        Ok(self.build_row(plan, spec, &params, outcome.text, latency_ms, verdict))
    }

    fn build_row(
        &self,
        plan: &RunPlan,
        spec: &ModelSpec,
        params: &SamplingParams,
        opinion: String,
        latency_ms: u64,
        verdict: Verdict,
    ) -> ResultRow {
        ResultRow {
            run: plan.run.clone(),
            model: spec.name.clone(),
            provider: spec.provider.clone(),
            judge_backend: self.judge.backend().to_string(),
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_tokens,
            system_style: plan.params.system_style.clone(),
            opinion,
            decision: verdict.decision,
            class: verdict.class,
            axis: verdict.axis,
            why: verdict.justification,
            latency_ms,
        }
    }

    fn hand_off_plot(&self, results_csv: &Path, figure: &Path) {
        if let Some(dir) = figure.parent() {
            if let Err(err) = std::fs::create_dir_all(dir) {
                warn!(path = %dir.display(), error = %err, "cannot create figures directory");
                return;
            }
        }
        if let Err(err) = self.plotter.render(results_csv, figure) {
            warn!(error = %err, "plot rendering failed");
        }
    }
}

async fn write_raw(path: &Path, text: &str) -> Result<(), ArtifactError> {
    tokio::fs::write(path, text)
        .await
        .map_err(|source| ArtifactError {
            path: path.to_path_buf(),
            source,
        })
}
