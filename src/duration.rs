//! Natural-language timer request parsing.
//!
//! Understands Russian and English: spelled-out numbers, fractional-hour
//! idioms, `<number> <unit>` phrases that add up, and an optional label either
//! quoted or written before the preposition ("чай на 5 минут", "pasta for 10 minutes").

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::normalize::normalize_text;

const SECONDS_PER_HOUR: f64 = 3600.0;
const SECONDS_PER_MINUTE: f64 = 60.0;

/// Longest timer a request may ask for (one week)
pub const MAX_TIMER_SECS: u64 = 7 * 24 * 3600;

static QUOTED_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)"|«([^»]+)»"#).expect("quoted label regex"));

static PREPOSITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:на|for)\b").expect("preposition regex"));

static TIMER_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:таймер|поставь|поставить|засеки|напомни|напомнить|timer|set|start|remind)\b")
        .expect("timer keyword regex")
});

static UNIT_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(\d+(?:[.,]\d+)?)\s*(час(?:а|ов)?|минут[а-я]*|мин|секунд[а-я]*|сек|hours?|hrs?|minutes?|mins?|seconds?|secs?)\b",
    )
    .expect("unit phrase regex")
});

static UNIT_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:час(?:а|ов)?|минут[а-я]*|секунд[а-я]*|hours?|minutes?|seconds?)\b")
        .expect("unit word regex")
});

static BARE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)?").expect("number regex"));

static STOPWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:на|через|и|мне|таймер|поставь|поставить|засеки|напомни|напомнить|for|in|and|to|a|an|the|me|about|please|timer|set|start|remind)\b",
    )
    .expect("stopword regex")
});

/// Idiomatic fractional-hour phrases and their expansion
static FRACTIONS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\bполтор[аы]\s*часа?\b", "90 минут"),
        (r"\bпол\s*часа?\b", "30 минут"),
        (r"\b(?:an?|one)\s+hour\s+and\s+a\s+half\b", "90 minutes"),
        (r"\bhalf\s+(?:an?\s+)?hour\b", "30 minutes"),
        (r"\b(?:a\s+)?quarter\s+(?:of\s+)?(?:an?\s+)?hour\b", "15 minutes"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("fraction regex"), replacement))
    .collect()
});

static ONES: LazyLock<HashMap<&'static str, u32>> = LazyLock::new(|| {
    HashMap::from([
        ("ноль", 0),
        ("один", 1),
        ("одна", 1),
        ("одно", 1),
        ("одну", 1),
        ("два", 2),
        ("две", 2),
        ("три", 3),
        ("четыре", 4),
        ("пять", 5),
        ("шесть", 6),
        ("семь", 7),
        ("восемь", 8),
        ("девять", 9),
        ("десять", 10),
        ("одиннадцать", 11),
        ("двенадцать", 12),
        ("тринадцать", 13),
        ("четырнадцать", 14),
        ("пятнадцать", 15),
        ("шестнадцать", 16),
        ("семнадцать", 17),
        ("восемнадцать", 18),
        ("девятнадцать", 19),
        ("zero", 0),
        ("one", 1),
        ("two", 2),
        ("three", 3),
        ("four", 4),
        ("five", 5),
        ("six", 6),
        ("seven", 7),
        ("eight", 8),
        ("nine", 9),
        ("ten", 10),
        ("eleven", 11),
        ("twelve", 12),
        ("thirteen", 13),
        ("fourteen", 14),
        ("fifteen", 15),
        ("sixteen", 16),
        ("seventeen", 17),
        ("eighteen", 18),
        ("nineteen", 19),
    ])
});

static TENS: LazyLock<HashMap<&'static str, u32>> = LazyLock::new(|| {
    HashMap::from([
        ("двадцать", 20),
        ("тридцать", 30),
        ("сорок", 40),
        ("пятьдесят", 50),
        ("шестьдесят", 60),
        ("семьдесят", 70),
        ("восемьдесят", 80),
        ("девяносто", 90),
        ("twenty", 20),
        ("thirty", 30),
        ("forty", 40),
        ("fifty", 50),
        ("sixty", 60),
        ("seventy", 70),
        ("eighty", 80),
        ("ninety", 90),
    ])
});

/// Result of parsing a timer request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDuration {
    /// Total seconds, `None` when no positive duration was found
    pub seconds: Option<u64>,
    pub label: Option<String>,
}

impl ParsedDuration {
    pub fn is_valid(&self) -> bool {
        self.seconds.is_some()
    }
}

/// Extract a duration and optional label from free text
pub fn parse_timer_request(text: &str) -> ParsedDuration {
    let raw = text.trim();
    if raw.is_empty() {
        return ParsedDuration::default();
    }

    let (mut label, working) = split_label(raw);

    let cleaned = expand_number_words(&expand_fractions(&normalize_text(&working)));
    if cleaned.is_empty() {
        return ParsedDuration {
            seconds: None,
            label,
        };
    }

    let mut total: f64 = 0.0;
    for caps in UNIT_PHRASE.captures_iter(&cleaned) {
        let Some(number) = parse_number(&caps[1]) else {
            continue;
        };
        let unit = &caps[2];
        let seconds = if unit.starts_with("час") || unit.starts_with('h') {
            number * SECONDS_PER_HOUR
        } else if unit.starts_with("мин") || unit.starts_with('m') {
            number * SECONDS_PER_MINUTE
        } else {
            number
        };
        total += seconds;
    }

    if total == 0.0 {
        if let Some(number) = BARE_NUMBER.find(&cleaned).and_then(|m| parse_number(m.as_str())) {
            total = number * SECONDS_PER_MINUTE;
        }
    }

    // anything past the cap is treated as no duration at all
    let seconds = (total.is_finite() && total >= 1.0 && total <= MAX_TIMER_SECS as f64)
        .then_some(total as u64);

    if seconds.is_some() && label.is_none() {
        label = guess_label(&cleaned);
    }

    ParsedDuration { seconds, label }
}

/// Split off an explicit label: quoted text, or words before the preposition
fn split_label(raw: &str) -> (Option<String>, String) {
    if let Some(caps) = QUOTED_LABEL.captures(raw) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or_default();
        let label = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().trim().to_string())
            .filter(|l| !l.is_empty());
        let mut working = raw.to_string();
        working.replace_range(whole, " ");
        return (label, working);
    }

    if let Some(m) = PREPOSITION.find(raw) {
        let candidate = raw[..m.start()].trim();
        if !candidate.is_empty() && !looks_like_duration(candidate) {
            let normalized = normalize_text(candidate);
            if !TIMER_KEYWORD.is_match(&normalized) {
                return (Some(candidate.to_string()), raw[m.start()..].to_string());
            }
        }
    }

    (None, raw.to_string())
}

fn looks_like_duration(text: &str) -> bool {
    let expanded = expand_number_words(&expand_fractions(&normalize_text(text)));
    expanded.chars().any(|c| c.is_ascii_digit()) || UNIT_WORD.is_match(&expanded)
}

fn guess_label(cleaned: &str) -> Option<String> {
    let rest = UNIT_PHRASE.replace_all(cleaned, " ");
    let rest = BARE_NUMBER.replace_all(&rest, " ");
    let rest = STOPWORDS.replace_all(&rest, " ");
    let label = normalize_text(&rest);
    (!label.is_empty()).then_some(label)
}

fn parse_number(text: &str) -> Option<f64> {
    text.replace(',', ".").parse().ok()
}

fn expand_fractions(text: &str) -> String {
    FRACTIONS
        .iter()
        .fold(text.to_string(), |acc, (re, replacement)| {
            re.replace_all(&acc, *replacement).into_owned()
        })
}

/// Replace spelled-out numbers (0-19, tens, tens + ones) with digits.
/// Unknown words pass through untouched.
pub fn expand_number_words(text: &str) -> String {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let word = strip_trailing_punct(tokens[i]);

        if let Some(value) = hyphenated_number(word) {
            out.push(value.to_string());
            i += 1;
            continue;
        }
        if let Some(&tens) = TENS.get(word) {
            let ones = tokens
                .get(i + 1)
                .and_then(|next| ONES.get(strip_trailing_punct(next)))
                .filter(|&&v| (1..=9).contains(&v));
            match ones {
                Some(&ones) => {
                    out.push((tens + ones).to_string());
                    i += 2;
                }
                None => {
                    out.push(tens.to_string());
                    i += 1;
                }
            }
            continue;
        }
        if let Some(&value) = ONES.get(word) {
            out.push(value.to_string());
        } else {
            out.push(tokens[i].to_string());
        }
        i += 1;
    }
    out.join(" ")
}

fn hyphenated_number(word: &str) -> Option<u32> {
    let (tens, ones) = word.split_once('-')?;
    let tens = TENS.get(tens)?;
    let ones = ONES.get(ones).filter(|&&v| (1..=9).contains(&v))?;
    Some(tens + ones)
}

fn strip_trailing_punct(token: &str) -> &str {
    token.trim_end_matches([',', '.', ':'])
}

/// `MM:SS`, or `HH:MM:SS` once an hour is reached
pub fn format_clock(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

/// Spoken form, e.g. "1 hour 30 minutes"
pub fn format_spoken(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(plural(hours, "hour"));
    }
    if minutes > 0 {
        parts.push(plural(minutes, "minute"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(plural(secs, "second"));
    }
    parts.join(" ")
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("{n} {unit}")
    } else {
        format!("{n} {unit}s")
    }
}
