#![forbid(unsafe_code)]

//! # careaxis-harness
//!
//! Ask several LLM backends for a clinical-ethics opinion on one case and
//! place every answer on an autonomy ↔ care axis.
//!
//! Each configured model gets the same system/user prompt pair. Its answer
//! is scored by a [`judge::Judge`] (keyword rules, or a Gemini-backed judge)
//! into an axis value in [-1, 1], a class (Autonomie / Ausgewogen / Fürsorge)
//! and the PEG decision from the final line. Results land in
//! `outputs/<run>/results.csv` in configured model order.
//!
//! Backends negotiate model availability and parameter support through
//! declarative attempt plans (see [`gateway::negotiation`]).

pub mod config;
pub mod gateway;
pub mod judge;
pub mod pipeline;
pub mod prompts;
pub mod telemetry;

pub use config::{JudgeBackend, JudgeSettings, ModelSpec, ParamOverrides, RunConfig, RunParams};
pub use gateway::{Generator, GeneratorRegistry, ProviderError, SamplingParams};
pub use judge::{AxisClass, AxisMode, Decision, Judge, LlmJudge, RuleJudge, Verdict};
pub use pipeline::{
    resolve_judge, ArtifactError, LogPlotRenderer, Orchestrator, PipelineError, PlotRenderer,
    ResultRow, RunPlan, RunReport,
};
