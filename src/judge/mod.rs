//! Judges: map an opinion text onto the autonomy ↔ care axis.
//!
//! Two implementations share one contract: [`rules::RuleJudge`] (pure keyword
//! heuristics) and [`llm::LlmJudge`] (delegates to a generative model and
//! parses its JSON reply). Whatever the source, the class of a [`Verdict`] is
//! always the one its axis implies.

pub mod llm;
pub mod rules;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use llm::{AxisMode, LlmJudge};
pub use rules::RuleJudge;

/// Lower bound of the care side, inclusive.
pub const CARE_THRESHOLD: f64 = 0.40;
/// Upper bound of the autonomy side, inclusive.
pub const AUTONOMY_THRESHOLD: f64 = -0.40;

/// Clamp to [-1, 1]. NaN becomes 0.
pub fn clamp_axis(axis: f64) -> f64 {
    if axis.is_nan() {
        0.0
    } else {
        axis.clamp(-1.0, 1.0)
    }
}

// =============================================================================
// CLASS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisClass {
    #[serde(rename = "Autonomie")]
    Autonomy,
    #[serde(rename = "Ausgewogen")]
    Balanced,
    #[serde(rename = "Fürsorge")]
    Care,
}

impl AxisClass {
    pub fn from_axis(axis: f64) -> Self {
        if axis <= AUTONOMY_THRESHOLD {
            Self::Autonomy
        } else if axis >= CARE_THRESHOLD {
            Self::Care
        } else {
            Self::Balanced
        }
    }

    /// Exact label, e.g. as reported by an LLM judge.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Autonomie" => Some(Self::Autonomy),
            "Ausgewogen" => Some(Self::Balanced),
            "Fürsorge" => Some(Self::Care),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Autonomy => "Autonomie",
            Self::Balanced => "Ausgewogen",
            Self::Care => "Fürsorge",
        }
    }

    /// Fixed axis value used when only the class is known.
    pub fn anchor(self) -> f64 {
        match self {
            Self::Autonomy => -0.7,
            Self::Balanced => 0.0,
            Self::Care => 0.7,
        }
    }
}

impl fmt::Display for AxisClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// DECISION
// =============================================================================

/// The PEG recommendation found in (or reported for) an opinion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Decision {
    Yes,
    No,
    Unclear,
    /// Passed through verbatim from an LLM judge that answered off-schema.
    Other(String),
}

impl Decision {
    pub fn from_label(label: &str) -> Self {
        match label {
            "PEG: Ja" => Self::Yes,
            "PEG: Nein" => Self::No,
            "Unklar" => Self::Unclear,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Yes => "PEG: Ja",
            Self::No => "PEG: Nein",
            Self::Unclear => "Unklar",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Decision {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Decision {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_label(&s))
    }
}

// =============================================================================
// VERDICT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub axis: f64,
    pub class: AxisClass,
    pub decision: Decision,
    pub justification: String,
}

impl Verdict {
    /// Verdict whose class is derived from `axis` (clamped first).
    pub fn from_axis(axis: f64, decision: Decision, justification: impl Into<String>) -> Self {
        let axis = clamp_axis(axis);
        Self {
            axis,
            class: AxisClass::from_axis(axis),
            decision,
            justification: justification.into(),
        }
    }

    /// Axis 0, balanced, unclear.
    pub fn neutral(justification: impl Into<String>) -> Self {
        Self::from_axis(0.0, Decision::Unclear, justification)
    }

    pub fn is_consistent(&self) -> bool {
        (-1.0..=1.0).contains(&self.axis) && AxisClass::from_axis(self.axis) == self.class
    }
}

/// Classifies opinion text. Never fails: problems degrade to a neutral verdict.
#[async_trait]
pub trait Judge: Send + Sync {
    /// Identifier written to the results (`local`, `gemini`).
    fn backend(&self) -> &'static str;

    async fn classify(&self, text: &str) -> Verdict;
}
