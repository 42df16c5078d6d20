//! Post-processing for model output.
//!
//! Three passes run in order over the raw completion:
//!
//! 1. [`strip_meta_labels`] drops scaffolding lines the model sometimes
//!    echoes from its instructions (voice disclaimers, bold section labels,
//!    markdown headings) and a leading `Here's why:`.
//! 2. [`enforce_first_person`] cuts third-person narration about the persona
//!    (`Joe thinks ...`) through the end of the line.
//! 3. [`correct_tense`] rewrites forward-looking verbs on lines that carry a
//!    ` (past)` date marker.
//!
//! Every pass is wrapped in [`guarded`]; a panic inside one leaves the text
//! as it was before that pass.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

/// Marker appended by the date normalizer to phrases that resolve to the past.
pub const PAST_MARKER: &str = " (past)";

static META_LINE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^I['’]m speaking in my own voice\.?$",
        r"^I am speaking in my own voice\.?$",
        r"^\*\*?SPOV anchor(?:\*\*?:?|:\*\*?).*$",
        r"^\*\*?Application(?:\*\*?:?|:\*\*?).*$",
        r"^\*\*?Action(?:\*\*?:?|:\*\*?).*$",
        r"^\*\*?Risks/?Countermoves(?:\*\*?:?|:\*\*?).*$",
        r"^\*{0,2}Output Shape\b.*$",
        r"^##+\s.*$",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){}", p)).expect("valid regex"))
    .collect()
});

static HERES_WHY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^Here['’]?s why:\s*").expect("valid regex"));

static WILL_SHIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bwill ship\b").expect("valid regex"));
static SHIPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bships\b").expect("valid regex"));
static IS_GOING_TO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bis going to\b").expect("valid regex"));
static BARE_WILL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bwill\b").expect("valid regex"));

/// Run `pass` over `text`; if it panics, log and return `text` unchanged.
pub(crate) fn guarded<F>(pass: &str, text: &str, f: F) -> String
where
    F: FnOnce(&str) -> String,
{
    match catch_unwind(AssertUnwindSafe(|| f(text))) {
        Ok(out) => out,
        Err(_) => {
            warn!(pass, "post-processing pass panicked, keeping input");
            text.to_string()
        }
    }
}

/// All three passes, in order. Never fails.
pub fn sanitize(text: &str, persona_name: &str) -> String {
    let text = guarded("meta labels", text, strip_meta_labels);
    let text = guarded("first person", &text, |t| enforce_first_person(t, persona_name));
    guarded("tense", &text, correct_tense)
}

/// Drop scaffolding lines, trim, and strip a leading `Here's why:`.
pub fn strip_meta_labels(text: &str) -> String {
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !META_LINE_PATTERNS.iter().any(|re| re.is_match(trimmed))
        })
        .collect();

    let joined = kept.join("\n");
    HERES_WHY.replace(joined.trim(), "").into_owned()
}

/// Remove `<Name> would|does|thinks|believes ...` through the end of the line.
///
/// Only the first letter of the name is matched case-insensitively, so
/// `joe thinks` is caught but `JOE` shouting is not.
pub fn enforce_first_person(text: &str, persona_name: &str) -> String {
    let mut chars = persona_name.chars();
    let Some(first) = chars.next() else {
        return text.to_string();
    };
    let rest: String = chars.collect();

    let pattern = format!(
        r"\b(?i:{}){}\s+(?:would|does|thinks|believes)\b[^\n]*",
        regex::escape(&first.to_string()),
        regex::escape(&rest)
    );
    match Regex::new(&pattern) {
        Ok(re) => re.replace_all(text, "").into_owned(),
        Err(e) => {
            warn!(error = %e, "could not build first-person pattern");
            text.to_string()
        }
    }
}

/// On lines carrying the past marker, turn forward-looking phrasing into a
/// past plan. Other lines pass through untouched.
pub fn correct_tense(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    for line in text.split('\n') {
        if line.contains(PAST_MARKER) {
            let line = replace_keeping_case(&WILL_SHIP, line, "was planned to ship");
            let line = replace_keeping_case(&SHIPS, &line, "was planned to ship");
            let line = replace_keeping_case(&IS_GOING_TO, &line, "was going to");
            let line = replace_keeping_case(&BARE_WILL, &line, "was going to");
            out.push(line);
        } else {
            out.push(line.to_string());
        }
    }
    out.join("\n")
}

fn replace_keeping_case(re: &Regex, line: &str, replacement: &str) -> String {
    re.replace_all(line, |caps: &Captures| {
        let starts_upper = caps[0].chars().next().is_some_and(|c| c.is_uppercase());
        if starts_upper {
            let mut chars = replacement.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        } else {
            replacement.to_string()
        }
    })
    .into_owned()
}
