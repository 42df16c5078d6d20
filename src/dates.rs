//! Relative date phrases → absolute, past-aware phrasing.
//!
//! Text handed to the model ("by May", "end of June", "next month") is
//! rewritten against a fixed "today" so the model cannot mistake a past
//! deadline for an upcoming one. Phrases that resolve to a date strictly
//! before today get a ` (past)` marker, which the sanitizer later uses for
//! tense correction.
//!
//! Rules run in this order, case-insensitively:
//!
//! | # | Pattern | Output |
//! |---|---------|--------|
//! | 1 | `this\|in <Month>` | `<Month> <year>` |
//! | 2 | `by\|before\|until <Month>` | `<Month> <year>` |
//! | 3 | `by\|on\|before <Month> <Day>` | `<Month> <Day>, <year>` |
//! | 4 | `early\|mid\|late\|end [of] <Month>` | `<qualifier> <Month> <year>` |
//! | 5 | `this month` / `next month` | `<Month> <year>` |
//!
//! Rules 1, 2 and 4 leave a phrase alone when a day number or a year already
//! follows the month; rule 3 leaves it alone when a year follows or the day
//! does not exist. The year is always today's year.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::warn;

use crate::sanitize::guarded;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Full names first so the leftmost-first alternation prefers them.
const MONTH_PATTERN: &str = r"(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)";

/// A day number or a year already attached to the month.
const DATE_TAIL: &str = r"(\s+\d{1,2}(?:st|nd|rd|th)?\b|\s*,?\s*\d{4}\b)?";

static THIS_OR_IN_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b(?:this|in)\s+{}\b{}", MONTH_PATTERN, DATE_TAIL))
        .expect("valid regex")
});

static BY_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:by|before|until)\s+{}\b{}",
        MONTH_PATTERN, DATE_TAIL
    ))
    .expect("valid regex")
});

static BY_MONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:by|on|before)\s+{}\s+(\d{{1,2}})(?:st|nd|rd|th)?\b(\s*,?\s*\d{{4}}\b)?",
        MONTH_PATTERN
    ))
    .expect("valid regex")
});

static QUALIFIED_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(early|mid|late|end)(?:\s+of\s+|\s*-\s*|\s+){}\b{}",
        MONTH_PATTERN, DATE_TAIL
    ))
    .expect("valid regex")
});

static THIS_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bthis\s+month\b").expect("valid regex"));

static NEXT_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bnext\s+month\b").expect("valid regex"));

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at one instant.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Parse an IANA zone name, falling back to UTC when it is unknown.
pub fn resolve_timezone(name: &str) -> Tz {
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!(timezone = name, "unknown timezone, falling back to UTC");
            Tz::UTC
        }
    }
}

/// Today's calendar date in `tz`.
pub fn today_in(clock: &dyn Clock, tz: Tz) -> NaiveDate {
    clock.now().with_timezone(&tz).date_naive()
}

/// Map a month token (full name or abbreviation) to 1..=12.
fn month_number(token: &str) -> Option<u32> {
    let prefix: String = token.chars().take(3).collect::<String>().to_lowercase();
    let number = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(number)
}

fn month_name(month: u32) -> &'static str {
    MONTH_NAMES[(month.clamp(1, 12) - 1) as usize]
}

/// Rewrites relative date phrases relative to a fixed `today`.
#[derive(Debug, Clone, Copy)]
pub struct DateNormalizer {
    today: NaiveDate,
}

impl DateNormalizer {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Apply every rule in order. Never fails: if a rule panics, the text
    /// from before that rule is kept.
    pub fn normalize(&self, text: &str) -> String {
        guarded("date normalization", text, |t| {
            let t = self.month_phrases(&THIS_OR_IN_MONTH, t);
            let t = self.month_phrases(&BY_MONTH, &t);
            let t = self.month_day_phrases(&t);
            let t = self.qualified_month_phrases(&t);
            self.relative_months(&t)
        })
    }

    fn is_past(&self, date: NaiveDate) -> bool {
        date < self.today
    }

    fn with_marker(&self, phrase: String, date: NaiveDate) -> String {
        if self.is_past(date) {
            format!("{} (past)", phrase)
        } else {
            phrase
        }
    }

    /// Rules 1 and 2: `<lead> <Month>` → `<Month> <year>`.
    fn month_phrases(&self, re: &Regex, text: &str) -> String {
        let year = self.today.year();
        re.replace_all(text, |caps: &Captures| {
            if caps.get(2).is_some() {
                return caps[0].to_string();
            }
            let Some(month) = month_number(&caps[1]) else {
                return caps[0].to_string();
            };
            match NaiveDate::from_ymd_opt(year, month, 1) {
                Some(first) => {
                    self.with_marker(format!("{} {}", month_name(month), year), first)
                }
                None => caps[0].to_string(),
            }
        })
        .into_owned()
    }

    /// Rule 3: `by|on|before <Month> <Day>` → `<Month> <Day>, <year>`.
    fn month_day_phrases(&self, text: &str) -> String {
        let year = self.today.year();
        BY_MONTH_DAY
            .replace_all(text, |caps: &Captures| {
                if caps.get(3).is_some() {
                    return caps[0].to_string();
                }
                let month = month_number(&caps[1]);
                let day = caps[2].parse::<u32>().ok();
                let date = month
                    .zip(day)
                    .and_then(|(m, d)| NaiveDate::from_ymd_opt(year, m, d));
                match date {
                    Some(date) => self.with_marker(
                        format!("{} {}, {}", month_name(date.month()), date.day(), year),
                        date,
                    ),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// Rule 4: `<qualifier> [of] <Month>` with an approximate day per qualifier.
    fn qualified_month_phrases(&self, text: &str) -> String {
        let year = self.today.year();
        QUALIFIED_MONTH
            .replace_all(text, |caps: &Captures| {
                if caps.get(3).is_some() {
                    return caps[0].to_string();
                }
                let qualifier = caps[1].to_lowercase();
                let day = match qualifier.as_str() {
                    "early" => 5,
                    "mid" => 15,
                    "late" => 25,
                    _ => 28,
                };
                let date = month_number(&caps[2])
                    .and_then(|m| NaiveDate::from_ymd_opt(year, m, day));
                match date {
                    Some(date) => self.with_marker(
                        format!("{} {} {}", qualifier, month_name(date.month()), year),
                        date,
                    ),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// Rule 5: `this month` / `next month`. Never marked past.
    fn relative_months(&self, text: &str) -> String {
        let this_month = format!("{} {}", month_name(self.today.month()), self.today.year());
        let text = THIS_MONTH.replace_all(text, this_month.as_str());

        let first = self.today.with_day(1).unwrap_or(self.today);
        let next = (first + Duration::days(32)).with_day(1).unwrap_or(first);
        let next_month = format!("{} {}", month_name(next.month()), next.year());
        NEXT_MONTH
            .replace_all(&text, next_month.as_str())
            .into_owned()
    }
}
