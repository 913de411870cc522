//! LLM-delegated judge backed by Gemini.
//!
//! The model is asked for a JSON object `{axis, class, decision, justification}`.
//! Anything that goes wrong (transport, empty reply, malformed JSON) degrades
//! to a neutral verdict so a run is never aborted by its judge.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::{clamp_axis, AxisClass, Decision, Judge, Verdict};
use crate::gateway::http::{self, Credential, EndpointEnv};
use crate::gateway::ProviderError;

pub const BACKEND: &str = "gemini";
pub const MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const MAX_OUTPUT_TOKENS: u32 = 256;

const NO_TEXT: &str = "Kein Text.";
const PARSE_FAILED: &str = "Parsing-Fehler.";
const CALL_FAILED: &str = "Judge-Aufruf fehlgeschlagen.";

/// How the judge reports the axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisMode {
    /// Two-decimal axis; class re-derived from it.
    #[default]
    Continuous,
    /// Axis snapped to the class anchor (-0.7 / 0.0 / 0.7).
    Discrete,
}

impl AxisMode {
    /// Unknown values select [`AxisMode::Continuous`].
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Continuous => "continuous",
            Self::Discrete => "discrete",
        }
    }
}

impl FromStr for AxisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "continuous" => Ok(Self::Continuous),
            "discrete" => Ok(Self::Discrete),
            other => Err(format!("unknown axis mode '{other}'")),
        }
    }
}

/// Why a judge reply could not be turned into a verdict.
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("reply contained no text")]
    NoText,
    #[error("reply is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("reply is not a JSON object")]
    NotAnObject,
    #[error("reply has no usable axis")]
    InvalidAxis,
}

// =============================================================================
// PROMPT
// =============================================================================

/// The fixed instruction sent ahead of every opinion.
pub fn instruction(mode: AxisMode) -> String {
    let axis_rule = match mode {
        AxisMode::Discrete => {
            "Wichtig: Gib axis nur als einen der drei festen Werte zurück: -0.7 (Autonomie), 0.0 (Ausgewogen), +0.7 (Fürsorge).\n"
        }
        AxisMode::Continuous => concat!(
            "Wichtig: Gib axis als Dezimalzahl mit zwei Nachkommastellen in [-1.00, +1.00] zurück (z. B. -0.45, 0.00, +0.62).\n",
            "Die Klasse muss zur Achse passen: axis<=-0.40 -> Autonomie; axis>=+0.40 -> Fürsorge; sonst Ausgewogen.\n",
        ),
    };

    let mut s = String::new();
    s.push_str("Du bist ein strenger, deterministischer Bewerter. Antworte ausschließlich mit gültigem JSON gemäß Schema.\n");
    s.push_str("Schema:\n{\n");
    s.push_str("  \"axis\": -1.00,\n");
    s.push_str("  \"class\": \"Autonomie|Ausgewogen|Fürsorge\",\n");
    s.push_str("  \"decision\": \"PEG: Ja|PEG: Nein|Unklar\",\n");
    s.push_str("  \"justification\": \"Ein knapper Satz, warum diese Einordnung.\"\n}\n");
    s.push_str("Skala: axis in [-1.00, +1.00]; [-1.00..-0.40]=Autonomie; [-0.39..+0.39]=Ausgewogen; [+0.40..+1.00]=Fürsorge.\n");
    s.push_str(axis_rule);
    s.push_str("Extrahiere 'decision' aus der letzten Zeile der Eingabe, die mit 'Empfehlung:' beginnt.\n");
    s.push_str("Antworte NUR mit JSON, ohne erläuternden Fließtext.\n\n");
    s.push_str("Beispiele (nur zur Illustration, deine Ausgabe bleibt reines JSON):\n");

    let examples = [
        (
            "Autonomie wird betont; invasive Maßnahmen abgelehnt.\nEmpfehlung: PEG: Nein",
            r#"{"axis": -0.58, "class": "Autonomie", "decision": "PEG: Nein", "justification": "Autonomie dominiert, Ablehnung invasiver Maßnahmen."}"#,
        ),
        (
            "Fürsorge zur Sicherung von Ernährung und Stabilität; Risiko-Nutzen positiv.\nEmpfehlung: PEG: Ja",
            r#"{"axis": 0.63, "class": "Fürsorge", "decision": "PEG: Ja", "justification": "Fürsorge überwiegt, Nutzen überwiegt Belastungen."}"#,
        ),
        (
            "Abwägung Autonomie vs. Fürsorge, kein klarer Vorrang.\nEmpfehlung: PEG: Nein",
            r#"{"axis": -0.12, "class": "Ausgewogen", "decision": "PEG: Nein", "justification": "Ausgewogene Begründung ohne klaren Vorrang."}"#,
        ),
    ];
    let rendered: Vec<String> = examples
        .iter()
        .map(|(input, output)| format!("Eingabe:\n{input}\nAusgabe:\n{output}\n"))
        .collect();
    s.push_str(&rendered.join("\n"));
    s
}

fn task_message(text: &str) -> String {
    format!("Aufgabe:\n{text}\n\nGib nur das JSON gemäß Schema zurück.")
}

// =============================================================================
// PARSING
// =============================================================================

/// Remove one leading fence line and one trailing fence. The language tag is
/// not checked.
pub fn strip_code_fence(raw: &str) -> &str {
    let mut s = raw.trim();
    if s.starts_with("```") {
        if let Some((_, rest)) = s.split_once('\n') {
            s = rest;
        }
        if let Some(inner) = s.strip_suffix("```") {
            s = inner;
        }
    }
    s
}

fn axis_value(value: &Value) -> Option<f64> {
    let axis = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    axis.is_finite().then_some(axis)
}

fn text_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn round2(axis: f64) -> f64 {
    let rounded = (axis * 100.0).round() / 100.0;
    // no negative zero in the output
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Turn a judge reply into a verdict that satisfies the class/axis invariant.
pub fn parse_reply(raw: &str, mode: AxisMode) -> Result<Verdict, ReplyError> {
    if raw.trim().is_empty() {
        return Err(ReplyError::NoText);
    }

    let parsed: Value = serde_json::from_str(strip_code_fence(raw))?;
    let obj = parsed.as_object().ok_or(ReplyError::NotAnObject)?;

    // An absent axis counts as 0.0; a present one must be a finite number.
    let axis = match obj.get("axis") {
        None => 0.0,
        Some(value) => axis_value(value).ok_or(ReplyError::InvalidAxis)?,
    };
    let axis = clamp_axis(axis);
    let decision = text_field(obj.get("decision"))
        .map(|d| Decision::from_label(&d))
        .unwrap_or(Decision::Unclear);
    let justification = text_field(obj.get("justification")).unwrap_or_default();

    let (axis, class) = match mode {
        AxisMode::Discrete => {
            let class = obj
                .get("class")
                .and_then(Value::as_str)
                .and_then(AxisClass::from_label)
                .unwrap_or_else(|| AxisClass::from_axis(axis));
            (class.anchor(), class)
        }
        AxisMode::Continuous => {
            // Derive after rounding so the reported pair stays consistent.
            let axis = round2(axis);
            (axis, AxisClass::from_axis(axis))
        }
    };

    Ok(Verdict {
        axis,
        class,
        decision,
        justification,
    })
}

/// Collect the reply text from a `generateContent` response.
///
/// Uses the first candidate. Text parts are taken as-is; inline JSON parts
/// are base64-decoded.
pub fn reply_text(body: &Value) -> Option<String> {
    let parts = body.pointer("/candidates/0/content/parts")?.as_array()?;

    let collected: Vec<String> = parts
        .iter()
        .filter_map(|part| {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                if !text.is_empty() {
                    return Some(text.to_string());
                }
            }
            let inline = part.get("inlineData")?;
            let mime = inline.get("mimeType").and_then(Value::as_str).unwrap_or("");
            if !mime.contains("json") {
                return None;
            }
            let data = inline.get("data").and_then(Value::as_str)?;
            let bytes = BASE64.decode(data).ok()?;
            let decoded = String::from_utf8_lossy(&bytes).into_owned();
            (!decoded.is_empty()).then_some(decoded)
        })
        .collect();

    (!collected.is_empty()).then(|| collected.join("\n"))
}

// =============================================================================
// JUDGE
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    candidate_count: u32,
}

#[derive(Debug, Clone)]
pub struct LlmJudge {
    client: reqwest::Client,
    base_url: String,
    mode: AxisMode,
    instruction: String,
}

impl LlmJudge {
    /// Create from `GOOGLE_API_KEY` (plus optional `GOOGLE_API_BASE_URL` and
    /// `GOOGLE_TIMEOUT_SECONDS`).
    pub fn from_env(mode: AxisMode) -> Result<Self, ProviderError> {
        let env = EndpointEnv::load_vars(
            "GOOGLE_API_KEY",
            "GOOGLE_API_BASE_URL",
            "GOOGLE_TIMEOUT_SECONDS",
            DEFAULT_BASE_URL,
        )?;
        Self::with_config(env.api_key, env.base_url, env.timeout, mode)
    }

    pub fn with_config(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        mode: AxisMode,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        let client = http::build_client(Credential::Header("x-goog-api-key", &api_key), &[], timeout)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            mode,
            instruction: instruction(mode),
        })
    }

    pub fn mode(&self) -> AxisMode {
        self.mode
    }

    async fn request(&self, text: &str) -> Result<Option<String>, ProviderError> {
        let prompt = format!("{}\n\n{}", self.instruction, task_message(text));
        let req = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: &prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                max_output_tokens: MAX_OUTPUT_TOKENS,
                candidate_count: 1,
            },
        };
        let url = http::endpoint(&self.base_url, &format!("models/{MODEL}:generateContent"));
        let body = http::post_json(&self.client, BACKEND, &url, &req).await?;
        Ok(reply_text(&body))
    }
}

#[async_trait]
impl Judge for LlmJudge {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn classify(&self, text: &str) -> Verdict {
        let raw = match self.request(text).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Verdict::neutral(NO_TEXT),
            Err(err) => {
                warn!(backend = BACKEND, error = %err, "judge call failed, using neutral verdict");
                return Verdict::neutral(CALL_FAILED);
            }
        };

        match parse_reply(&raw, self.mode) {
            Ok(verdict) => verdict,
            Err(ReplyError::NoText) => Verdict::neutral(NO_TEXT),
            Err(err) => {
                warn!(backend = BACKEND, error = %err, "unparseable judge reply");
                debug!(backend = BACKEND, %raw, "raw judge reply");
                Verdict::neutral(PARSE_FAILED)
            }
        }
    }
}
