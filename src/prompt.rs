//! System payload assembly.
//!
//! The payload sent to the completion provider is a list of sections joined
//! by a blank line, always in this order:
//!
//! 1. current-time statement
//! 2. persona instructions
//! 3. `BRAINLIFT (full)` corpus, when one is loaded
//! 4. `CONTEXT` with the retrieved, citation-tagged chunks
//!
//! Persona and BrainLift are read once into an [`AssistantContext`] and never
//! reloaded.

use std::path::Path;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::config::Config;
use crate::dates::{resolve_timezone, DateNormalizer};

/// Used when the persona file is missing or unreadable.
pub const FALLBACK_PERSONA: &str = "\
You are not a generic AI. You ARE Joe. Your personality, tone, and worldview \
are defined by the documents provided below.

Your voice is direct, unfiltered, and confident. Use strong, concise language \
and reach for analogies to make a point. Apply the frameworks in the documents \
to any question you are asked and never refuse to answer: find the relevant \
principle and apply it with conviction.

Always speak in the first person. Never describe yourself as Joe in the third \
person and never label the sections of your answer.";

/// Everything loaded once at startup and shared by every answer.
#[derive(Debug, Clone)]
pub struct AssistantContext {
    pub persona: String,
    /// Full reference corpus, trimmed and date-normalised; `None` when absent.
    pub brainlift: Option<String>,
    pub persona_name: String,
    pub tz: Tz,
}

impl AssistantContext {
    /// Load persona and BrainLift from the configured paths.
    ///
    /// Nothing here fails: an unreadable persona falls back to
    /// [`FALLBACK_PERSONA`], an unreadable BrainLift is treated as absent.
    /// Relative dates in the BrainLift are resolved against `now`.
    pub fn load(config: &Config, now: DateTime<Utc>) -> Self {
        let tz = resolve_timezone(&config.dates.timezone);
        let normalizer = DateNormalizer::new(now.with_timezone(&tz).date_naive());

        let persona = load_persona(&config.persona.system_prompt_path);
        let brainlift = load_brainlift(&config.persona.brainlift_path)
            .map(|text| normalizer.normalize(&text));

        info!(
            persona_chars = persona.len(),
            brainlift_chars = brainlift.as_ref().map(|b| b.len()).unwrap_or(0),
            timezone = %tz,
            "assistant context loaded"
        );

        Self {
            persona,
            brainlift,
            persona_name: config.persona.name.clone(),
            tz,
        }
    }
}

fn load_persona(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            warn!(path = %path.display(), "persona file is empty, using built-in persona");
            FALLBACK_PERSONA.to_string()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "persona file unreadable, using built-in persona");
            FALLBACK_PERSONA.to_string()
        }
    }
}

fn load_brainlift(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let text = text.trim();
            if text.is_empty() {
                None
            } else {
                Some(text.to_string())
            }
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "no brainlift loaded");
            None
        }
    }
}

/// "Current date and time: Monday, June 10, 2024 09:30 (America/New_York). ..."
pub fn time_statement(now: DateTime<Utc>, tz: Tz) -> String {
    let local = now.with_timezone(&tz);
    format!(
        "Current date and time: {} ({}). Treat any date before today as past, \
         and talk about past plans in the past tense.",
        local.format("%A, %B %-d, %Y %H:%M"),
        tz.name()
    )
}

/// Assemble the full system payload. `context` is the already formatted and
/// date-normalised retrieval block.
pub fn build_system_prompt(ctx: &AssistantContext, now: DateTime<Utc>, context: &str) -> String {
    let mut sections = vec![time_statement(now, ctx.tz), ctx.persona.clone()];

    if let Some(brainlift) = &ctx.brainlift {
        sections.push(format!("---\nBRAINLIFT (full):\n{}", brainlift));
    }

    sections.push(format!(
        "---\nCONTEXT (top matches from transcripts/brainlift):\n{}\n---\n\
         Use only what is relevant. Cite [source#chunk] when you pull facts.",
        context
    ));

    sections.join("\n\n")
}
