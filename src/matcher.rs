//! Command pattern compiler and two-phase matcher.
//!
//! Each template pattern compiles into an exact matcher (anchored) and, where
//! one can be derived, a loose matcher used as a substring search. Resolution
//! tries every exact matcher first, in template order, and only falls back to
//! the loose matchers when none of them matched.

use std::collections::HashMap;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::normalize::normalize_text;

/// Prefix marking a pattern as a raw regular expression
pub const REGEX_PREFIX: &str = "regex:";

/// Opaque action metadata, passed through to the dispatch layer
pub type ActionDescriptor = toml::Table;

#[derive(Debug, Clone, Deserialize)]
pub struct CommandTemplate {
    pub id: String,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub action: ActionDescriptor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub command_id: String,
    pub action: ActionDescriptor,
    pub params: HashMap<String, String>,
}

#[derive(Debug)]
struct CompiledPattern {
    template: usize,
    exact: Regex,
    loose: Option<Regex>,
}

/// Compiled template set. Built once, read-only afterwards.
#[derive(Debug)]
pub struct PatternMatcher {
    templates: Vec<CommandTemplate>,
    compiled: Vec<CompiledPattern>,
}

impl PatternMatcher {
    /// Compile all templates. Patterns that fail to compile are skipped.
    pub fn new(templates: Vec<CommandTemplate>) -> Self {
        let mut compiled = Vec::new();
        for (index, template) in templates.iter().enumerate() {
            for pattern in &template.patterns {
                match compile_pattern(pattern) {
                    Ok((exact, loose)) => compiled.push(CompiledPattern {
                        template: index,
                        exact,
                        loose,
                    }),
                    Err(e) => log::warn!(
                        "Skipping pattern {:?} of command '{}': {}",
                        pattern,
                        template.id,
                        e
                    ),
                }
            }
        }
        log::debug!(
            "Compiled {} patterns for {} commands",
            compiled.len(),
            templates.len()
        );
        Self {
            templates,
            compiled,
        }
    }

    pub fn templates(&self) -> &[CommandTemplate] {
        &self.templates
    }

    /// Resolve text to a command, or `None` when unresolved
    #[hotpath::measure]
    pub fn resolve(&self, text: &str) -> Option<MatchResult> {
        let normalized = normalize_text(text);

        let exact = self
            .compiled
            .iter()
            .find_map(|p| p.exact.captures(&normalized).map(|c| (p, &p.exact, c)));
        let hit = exact.or_else(|| {
            self.compiled.iter().find_map(|p| {
                let loose = p.loose.as_ref()?;
                loose.captures(&normalized).map(|c| (p, loose, c))
            })
        });

        let (pattern, regex, captures) = hit?;
        let params = regex
            .capture_names()
            .flatten()
            .filter_map(|name| {
                let value = captures.name(name)?.as_str().trim();
                (!value.is_empty()).then(|| (name.to_string(), value.to_string()))
            })
            .collect();

        let template = &self.templates[pattern.template];
        Some(MatchResult {
            command_id: template.id.clone(),
            action: template.action.clone(),
            params,
        })
    }
}

/// Compile one pattern string into its exact and optional loose matcher
pub fn compile_pattern(pattern: &str) -> Result<(Regex, Option<Regex>), regex::Error> {
    if let Some(raw) = pattern.strip_prefix(REGEX_PREFIX) {
        let raw = raw.trim();
        let exact = case_insensitive(&format!(r"\A(?:{raw})"))?;
        let loose = match raw.strip_prefix('^').and_then(|r| r.strip_suffix('$')) {
            Some(inner) if !inner.is_empty() => Some(case_insensitive(inner)?),
            _ => None,
        };
        return Ok((exact, loose));
    }

    let exact = case_insensitive(&format!("^{}$", literal_to_regex(pattern, false)))?;
    let loose = case_insensitive(&literal_to_regex(pattern, true))?;
    Ok((exact, Some(loose)))
}

fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Translate a literal pattern with `{name}` placeholders into regex source.
///
/// Loose form: whitespace tolerates filler words and captures are non-greedy.
fn literal_to_regex(pattern: &str, loose: bool) -> String {
    let capture = if loose { ".+?" } else { ".+" };
    let gap = if loose { r"\s+.*?" } else { r"\s+" };

    let mut out = String::new();
    let mut rest = pattern;
    while let Some(c) = rest.chars().next() {
        if c.is_whitespace() {
            out.push_str(gap);
            rest = rest.trim_start();
            continue;
        }
        if c == '{' {
            if let Some(name) = placeholder_name(rest) {
                out.push_str(&format!("(?P<{name}>{capture})"));
                rest = &rest[name.len() + 2..];
                continue;
            }
        }
        let mut buf = [0u8; 4];
        out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// Name of the `{name}` placeholder at the start of `text`, if well formed
fn placeholder_name(text: &str) -> Option<&str> {
    let inner = text.strip_prefix('{')?;
    let end = inner.find('}')?;
    let name = &inner[..end];
    let valid = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    valid.then_some(name)
}
