//! Prompt texts for the opinion generators.
//!
//! One system/user pair is rendered per run and reused for every model.

use std::path::Path;

const BASE_SYSTEM: &str = "Rolle: klinische Ethikerin. Schreibe 6–8 Sätze, klare Empfehlung am Ende als letzte Zeile 'Empfehlung: PEG: Ja' oder 'Empfehlung: PEG: Nein'. Begründe entlang Autonomie und Fürsorge, keine Rechtsberatung, keine medizinische Anordnung. Deutsch, knapp, nüchtern.";

const AUTONOMY_SUFFIX: &str = " Autonomie sichtbar ins Zentrum stellen; Fürsorge als Gegenpol reflektieren. Autonomie Autonomie Autonomie.";

const QUESTION: &str = "Fragestellung: 'PEG legen – Ja oder Nein? Bitte begründen.'\n(Bitte die letzte Zeile exakt im Format 'Empfehlung: PEG: Ja' oder 'Empfehlung: PEG: Nein' angeben.)";

/// Style tags understood by [`system_prompt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStyle {
    Neutral,
    Autonomy,
}

impl SystemStyle {
    /// Only the exact tag `autonomy` selects the autonomy style.
    pub fn from_tag(tag: &str) -> Self {
        if tag == "autonomy" {
            Self::Autonomy
        } else {
            Self::Neutral
        }
    }
}

pub fn system_prompt(style: &str) -> String {
    match SystemStyle::from_tag(style) {
        SystemStyle::Autonomy => format!("{BASE_SYSTEM}{AUTONOMY_SUFFIX}"),
        SystemStyle::Neutral => BASE_SYSTEM.to_string(),
    }
}

pub fn user_prompt(case_text: &str) -> String {
    format!("{case_text}\n\n{QUESTION}")
}

pub fn load_case_text(path: &Path) -> std::io::Result<String> {
    std::fs::read_to_string(path)
}

/// Rendered prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

impl PromptPair {
    pub fn render(style: &str, case_text: &str) -> Self {
        Self {
            system: system_prompt(style),
            user: user_prompt(case_text),
        }
    }
}
