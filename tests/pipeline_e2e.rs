use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use careaxis_harness::config::{JudgeBackend, JudgeSettings};
use careaxis_harness::gateway::{
    Generator, GeneratorCtor, GeneratorRegistry, MistralGenerator, ProviderError, SamplingParams,
};
use careaxis_harness::judge::{AxisClass, Decision, Judge, RuleJudge};
use careaxis_harness::pipeline::{
    resolve_judge, Orchestrator, PipelineError, PlotRenderer, CSV_COLUMNS, RAW_DIR, RESULTS_FILE,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CARE_OPINION: &str = "Fürsorge sichert die Ernährung. Fürsorge schützt vor Aspiration. \
     Fürsorge bleibt zentral.\nEmpfehlung: PEG: Ja";
const AUTONOMY_OPINION: &str =
    "Die Autonomie des Patienten zählt. Seine Autonomie ist dokumentiert.\nEmpfehlung: PEG: Nein";

const RUN_YAML: &str = "params:\n  temperature: 0.7\n  top_p: 0.9\n  max_tokens: 600\n  system_style: neutral\ncase: herr_h.txt\n";

const TWO_MODELS: &str = "\
models:
  - name: model-a
    provider: fake
    adapter: fake_a
  - name: org/model-b
    provider: fake
    adapter: fake_b
    params:
      temperature: 0.2
";

// =============================================================================
// Fixtures
// =============================================================================

#[derive(Debug, Clone)]
struct Call {
    system: String,
    user: String,
    params: SamplingParams,
}

/// Returns a fixed answer after an optional delay and records every call.
struct ScriptedGenerator {
    reply: Result<String, u16>,
    delay: Duration,
    calls: Arc<Mutex<Vec<Call>>>,
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn provider(&self) -> &'static str {
        "fake"
    }

    async fn generate(
        &self,
        system: &str,
        user: &str,
        params: &SamplingParams,
    ) -> Result<String, ProviderError> {
        self.calls.lock().unwrap().push(Call {
            system: system.to_string(),
            user: user.to_string(),
            params: *params,
        });
        tokio::time::sleep(self.delay).await;
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(status) => Err(ProviderError::status(
                "fake",
                format!("HTTP {status}: scripted failure"),
                careaxis_harness::gateway::ErrorContext::new().with_status(*status),
            )),
        }
    }
}

fn scripted(reply: Result<&str, u16>, delay_ms: u64, calls: &Arc<Mutex<Vec<Call>>>) -> GeneratorCtor {
    let reply = reply.map(str::to_string);
    let calls = calls.clone();
    Arc::new(move || -> Result<Arc<dyn Generator>, ProviderError> {
        Ok(Arc::new(ScriptedGenerator {
            reply: reply.clone(),
            delay: Duration::from_millis(delay_ms),
            calls: calls.clone(),
        }))
    })
}

fn project(models_yaml: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let write = |rel: &str, body: &str| {
        let path = dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    };
    write("configs/run_baseline.yaml", RUN_YAML);
    write("configs/models.yaml", models_yaml);
    write("cases/herr_h.txt", "Herr H., 84 Jahre, fortgeschrittene Demenz.");
    dir
}

fn orchestrator(root: &Path, registry: GeneratorRegistry) -> Orchestrator {
    Orchestrator::new(root, registry, Arc::new(RuleJudge::new()))
}

#[derive(Default)]
struct RecordingPlotter {
    seen: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl PlotRenderer for RecordingPlotter {
    fn render(
        &self,
        results_csv: &Path,
        out_png: &Path,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.seen
            .lock()
            .unwrap()
            .push((results_csv.to_path_buf(), out_png.to_path_buf()));
        Err("no plotting backend".into())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn two_models_produce_classified_rows_in_order() {
    let dir = project(TWO_MODELS);
    let calls = Arc::new(Mutex::new(Vec::new()));

    let mut registry = GeneratorRegistry::new();
    registry.register("fake_a", scripted(Ok(CARE_OPINION), 0, &calls));
    registry.register("fake_b", scripted(Ok(AUTONOMY_OPINION), 0, &calls));

    let report = orchestrator(dir.path(), registry).run("baseline").await.unwrap();

    assert_eq!(report.rows.len(), 2);
    let a = &report.rows[0];
    assert_eq!(a.model, "model-a");
    assert_eq!(a.judge_backend, "local");
    assert_eq!(a.decision, Decision::Yes);
    assert_eq!(a.class, AxisClass::Care);
    assert_eq!(a.axis, 0.5);
    assert_eq!(a.temperature, 0.7);

    let b = &report.rows[1];
    assert_eq!(b.model, "org/model-b");
    assert_eq!(b.decision, Decision::No);
    assert_eq!(b.class, AxisClass::Autonomy);
    assert_eq!(b.axis, -0.5);
    assert_eq!(b.temperature, 0.2);
    assert_eq!(b.top_p, 0.9);
    assert_eq!(b.max_tokens, 600);

    // Same rendered prompts for every model, overrides merged per model.
    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].system, calls[1].system);
    assert!(calls[0].user.starts_with("Herr H., 84 Jahre"));
    assert!(calls[0].user.contains("Fragestellung:"));
    assert_eq!(calls[1].params, SamplingParams::new(0.2, 0.9, 600));

    let csv = std::fs::read_to_string(&report.results_csv).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], CSV_COLUMNS.join(","));
    assert!(lines[1].starts_with("baseline,model-a,fake,local,0.7,0.9,600,neutral,"));
    assert!(lines[1].contains("Fürsorge bleibt zentral.\\nEmpfehlung: PEG: Ja,PEG: Ja,Fürsorge,0.5,"));
    assert!(lines[2].starts_with("baseline,org/model-b,fake,local,0.2,0.9,600,neutral,"));
    assert!(lines[2].contains(",PEG: Nein,Autonomie,-0.5,"));
}

#[tokio::test]
async fn raw_opinions_are_written_with_safe_names() {
    let dir = project(TWO_MODELS);
    let calls = Arc::new(Mutex::new(Vec::new()));

    let mut registry = GeneratorRegistry::new();
    registry.register("fake_a", scripted(Ok(CARE_OPINION), 0, &calls));
    registry.register("fake_b", scripted(Ok(""), 0, &calls));

    let report = orchestrator(dir.path(), registry).run("baseline").await.unwrap();

    let raw_dir = dir.path().join("outputs/baseline").join(RAW_DIR);
    assert_eq!(
        std::fs::read_to_string(raw_dir.join("fake__model-a.txt")).unwrap(),
        CARE_OPINION
    );
    assert_eq!(
        std::fs::read_to_string(raw_dir.join("fake__org_model-b.txt")).unwrap(),
        ""
    );

    // Empty opinions still get a row.
    let empty = &report.rows[1];
    assert_eq!(empty.opinion, "");
    assert_eq!(empty.decision, Decision::Unclear);
    assert_eq!(empty.class, AxisClass::Balanced);
}

#[tokio::test]
async fn parallel_run_keeps_configured_order() {
    let dir = project(TWO_MODELS);
    let calls = Arc::new(Mutex::new(Vec::new()));

    let mut registry = GeneratorRegistry::new();
    registry.register("fake_a", scripted(Ok(CARE_OPINION), 150, &calls));
    registry.register("fake_b", scripted(Ok(AUTONOMY_OPINION), 0, &calls));

    let report = orchestrator(dir.path(), registry)
        .with_parallelism(2)
        .run("baseline")
        .await
        .unwrap();

    let models: Vec<_> = report.rows.iter().map(|r| r.model.as_str()).collect();
    assert_eq!(models, vec!["model-a", "org/model-b"]);
    assert!(report.rows[0].latency_ms >= 150);
}

#[tokio::test]
async fn generator_failure_aborts_before_results() {
    let dir = project(TWO_MODELS);
    let calls = Arc::new(Mutex::new(Vec::new()));

    let mut registry = GeneratorRegistry::new();
    registry.register("fake_a", scripted(Ok(CARE_OPINION), 0, &calls));
    registry.register("fake_b", scripted(Err(503), 0, &calls));

    let err = orchestrator(dir.path(), registry)
        .run("baseline")
        .await
        .unwrap_err();

    match err {
        PipelineError::Generation { model, source } => {
            assert_eq!(model, "org/model-b");
            assert_eq!(source.http_status(), Some(503));
        }
        other => panic!("expected Generation error, got {other}"),
    }
    assert!(!dir.path().join("outputs/baseline").join(RESULTS_FILE).exists());
}

#[tokio::test]
async fn unknown_adapter_aborts_the_run() {
    let dir = project(TWO_MODELS);
    let calls = Arc::new(Mutex::new(Vec::new()));

    let mut registry = GeneratorRegistry::new();
    registry.register("fake_a", scripted(Ok(CARE_OPINION), 0, &calls));

    let err = orchestrator(dir.path(), registry)
        .run("baseline")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Generation { source: ProviderError::Config(_), .. }
    ));
    assert!(!dir.path().join("outputs/baseline").join(RESULTS_FILE).exists());
}

#[tokio::test]
async fn missing_case_file_is_reported() {
    let dir = project(TWO_MODELS);
    std::fs::remove_file(dir.path().join("cases/herr_h.txt")).unwrap();

    let err = orchestrator(dir.path(), GeneratorRegistry::new())
        .run("baseline")
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Case { .. }));
}

#[tokio::test]
async fn plot_failure_does_not_fail_the_run() {
    let dir = project(TWO_MODELS);
    let calls = Arc::new(Mutex::new(Vec::new()));

    let mut registry = GeneratorRegistry::new();
    registry.register("fake_a", scripted(Ok(CARE_OPINION), 0, &calls));
    registry.register("fake_b", scripted(Ok(AUTONOMY_OPINION), 0, &calls));

    let plotter = Arc::new(RecordingPlotter::default());
    let report = orchestrator(dir.path(), registry)
        .with_plotter(plotter.clone())
        .run("baseline")
        .await
        .unwrap();

    let seen = plotter.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, report.results_csv);
    assert!(seen[0].1.ends_with("figures/axis.png"));
    assert!(report.results_csv.exists());
}

#[tokio::test]
async fn http_backend_runs_through_the_pipeline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": AUTONOMY_OPINION } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = project("models:\n  - name: ministral\n    provider: mistral\n    adapter: mistral_mock\n");
    let uri = server.uri();
    let mut registry = GeneratorRegistry::new();
    registry.register(
        "mistral_mock",
        Arc::new(move || -> Result<Arc<dyn Generator>, ProviderError> {
            Ok(Arc::new(MistralGenerator::with_config(
                "mistral-key",
                uri.clone(),
                Duration::from_secs(5),
            )?))
        }),
    );

    let report = orchestrator(dir.path(), registry).run("baseline").await.unwrap();

    assert_eq!(report.rows.len(), 1);
    assert_eq!(report.rows[0].provider, "mistral");
    assert_eq!(report.rows[0].class, AxisClass::Autonomy);
    assert_eq!(report.rows[0].decision, Decision::No);
}

#[test]
fn gemini_judge_without_key_falls_back_to_rules() {
    std::env::remove_var("GOOGLE_API_KEY");
    let settings = JudgeSettings::from_values(Some("gemini"), Some("discrete"));
    assert_eq!(settings.backend, JudgeBackend::Gemini);

    let judge = resolve_judge(settings);
    assert_eq!(judge.backend(), "local");
}
