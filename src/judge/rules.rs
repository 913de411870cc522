//! Keyword-heuristic judge. Pure and deterministic.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{clamp_axis, AxisClass, Decision, Judge, Verdict};

pub const BACKEND: &str = "local";

static RECOMMENDATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Empfehlung:\s*PEG:\s*(Ja|Nein)").expect("Invalid recommendation regex")
});

/// Line boundaries, including a lone `\r` and the Unicode separators.
static LINE_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\r\n|[\n\r\x0B\x0C\x1C-\x1E\x{85}\x{2028}\x{2029}]")
        .expect("Invalid line break regex")
});

const AUTONOMY_TERM: &str = "autonomie";
const CARE_TERM: &str = "fürsorge";
/// Occurrences needed before a term moves the axis.
const TERM_MIN_COUNT: usize = 2;
const TERM_WEIGHT: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleJudge;

impl RuleJudge {
    pub fn new() -> Self {
        Self
    }

    /// Decision from the last non-empty line only.
    pub fn extract_decision(text: &str) -> Decision {
        let last = LINE_BREAK
            .split(text)
            .map(str::trim)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .find(|l| !l.is_empty())
            .unwrap_or("");

        match RECOMMENDATION
            .captures(last)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_lowercase())
            .as_deref()
        {
            Some("ja") => Decision::Yes,
            Some("nein") => Decision::No,
            _ => Decision::Unclear,
        }
    }

    /// Each term that appears at least twice pushes the axis by 0.5 toward its
    /// side. Both triggering cancels out.
    pub fn infer_axis(text: &str) -> f64 {
        let lower = text.to_lowercase();
        let mut score = 0.0;
        if lower.matches(AUTONOMY_TERM).count() >= TERM_MIN_COUNT {
            score -= TERM_WEIGHT;
        }
        if lower.matches(CARE_TERM).count() >= TERM_MIN_COUNT {
            score += TERM_WEIGHT;
        }
        clamp_axis(score)
    }

    pub fn justification(class: AxisClass) -> &'static str {
        match class {
            AxisClass::Autonomy => {
                "Sprache betont Autonomie und Zurückhaltung gegenüber invasiven Maßnahmen."
            }
            AxisClass::Care => "Sprache betont Fürsorge und Stabilisierung durch Maßnahmen.",
            AxisClass::Balanced => "Ausgewogene Bezüge zu Autonomie und Fürsorge erkennbar.",
        }
    }

    pub fn judge(&self, text: &str) -> Verdict {
        let axis = Self::infer_axis(text);
        let class = AxisClass::from_axis(axis);
        Verdict {
            axis,
            class,
            decision: Self::extract_decision(text),
            justification: Self::justification(class).to_string(),
        }
    }
}

#[async_trait]
impl Judge for RuleJudge {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn classify(&self, text: &str) -> Verdict {
        self.judge(text)
    }
}
