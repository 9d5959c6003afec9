use crate::config::StyleRules;
use crate::error::Result;
use crate::events::IndexEvent;
use crate::lexicon::{extract_numerals, find_forbidden_terms};
use crate::schema::NormalizedPayload;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

static BLANK_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t\r]*\n").expect("blank-line pattern is valid"));
static BRACKET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\[\]\n]+\]").expect("bracket pattern is valid"));

/// Checks in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Heading,
    WordCount,
    ParagraphCount,
    ForbiddenTerms,
    NumericFidelity,
    BracketPlaceholders,
    EventCitations,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Heading => "heading",
            Self::WordCount => "word count",
            Self::ParagraphCount => "paragraph count",
            Self::ForbiddenTerms => "forbidden terms",
            Self::NumericFidelity => "numeric fidelity",
            Self::BracketPlaceholders => "bracketed placeholders",
            Self::EventCitations => "event citations",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: CheckKind,
    pub passed: bool,
    pub expected: String,
    pub observed: String,
}

impl CheckResult {
    fn new(check: CheckKind, passed: bool, expected: String, observed: String) -> Self {
        Self {
            check,
            passed,
            expected,
            observed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub results: Vec<CheckResult>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    pub fn failed_checks(&self) -> Vec<CheckKind> {
        self.failures().map(|r| r.check).collect()
    }

    pub fn has_failed(&self, check: CheckKind) -> bool {
        self.failures().any(|r| r.check == check)
    }

    pub fn summary(&self) -> String {
        let failed: Vec<String> = self
            .failures()
            .map(|r| format!("{} (expected {}, observed {})", r.check, r.expected, r.observed))
            .collect();
        if failed.is_empty() {
            "all checks passed".to_string()
        } else {
            failed.join("; ")
        }
    }
}

/// Post-generation checks against one source payload.
///
/// A draft is accepted only when every check passes. Failed checks carry the
/// expected and observed values so the repair prompt can say exactly what to fix.
pub struct DraftValidator {
    rules: StyleRules,
    source_numerals: BTreeSet<String>,
    events: Vec<IndexEvent>,
}

impl DraftValidator {
    pub fn for_payload(rules: StyleRules, payload: &NormalizedPayload) -> Result<Self> {
        Ok(Self {
            rules,
            source_numerals: payload.numerals()?,
            events: payload.index_level_events().to_vec(),
        })
    }

    pub fn validate(&self, draft: &str) -> ValidationReport {
        let r = &self.rules;
        let mut results = Vec::with_capacity(7);

        // 1. heading
        let first_line = draft.trim_start().lines().next().unwrap_or("").trim();
        results.push(CheckResult::new(
            CheckKind::Heading,
            first_line == r.heading.trim(),
            format!("first line is '{}'", r.heading),
            format!("first line '{}'", truncate(first_line, 60)),
        ));

        // 2. words
        let words = word_count(draft);
        results.push(CheckResult::new(
            CheckKind::WordCount,
            (r.min_words..=r.max_words).contains(&words),
            format!("{} to {} words", r.min_words, r.max_words),
            format!("{} words", words),
        ));

        // 3. paragraphs
        let paragraphs = paragraph_count(draft, &r.heading);
        results.push(CheckResult::new(
            CheckKind::ParagraphCount,
            (r.min_paragraphs..=r.max_paragraphs).contains(&paragraphs),
            format!("{} to {} paragraphs", r.min_paragraphs, r.max_paragraphs),
            format!("{} paragraphs", paragraphs),
        ));

        // 4. forbidden terms
        let terms = find_forbidden_terms(draft);
        results.push(CheckResult::new(
            CheckKind::ForbiddenTerms,
            terms.is_empty(),
            "no fund-attribution or first-person terms".to_string(),
            if terms.is_empty() {
                "none".to_string()
            } else {
                terms.join(", ")
            },
        ));

        // 5. every numeral traces back to the payload
        let untraced = self.untraced_numerals(draft);
        results.push(CheckResult::new(
            CheckKind::NumericFidelity,
            untraced.is_empty(),
            "every number copied verbatim from the input".to_string(),
            if untraced.is_empty() {
                "all numbers traced".to_string()
            } else {
                format!("numbers not in input: {}", untraced.join(", "))
            },
        ));

        if r.reject_bracket_placeholders {
            let brackets: Vec<&str> = BRACKET_RE.find_iter(draft).map(|m| m.as_str()).collect();
            results.push(CheckResult::new(
                CheckKind::BracketPlaceholders,
                brackets.is_empty(),
                "no bracketed placeholders".to_string(),
                if brackets.is_empty() {
                    "none".to_string()
                } else {
                    brackets.join(", ")
                },
            ));
        }

        if r.require_event_citations && !self.events.is_empty() {
            let missing = self.uncited_events(draft);
            results.push(CheckResult::new(
                CheckKind::EventCitations,
                missing.is_empty(),
                "each flagged event's one-day move cited exactly".to_string(),
                if missing.is_empty() {
                    "all events cited".to_string()
                } else {
                    format!("missing: {}", missing.join(", "))
                },
            ));
        }

        ValidationReport { results }
    }

    fn untraced_numerals(&self, draft: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        extract_numerals(draft)
            .into_iter()
            .filter(|n| !self.source_numerals.contains(n))
            .filter(|n| seen.insert(n.clone()))
            .collect()
    }

    fn uncited_events(&self, draft: &str) -> Vec<String> {
        let cited: BTreeSet<String> = extract_numerals(draft).into_iter().collect();
        self.events
            .iter()
            .filter(|e| {
                let plain = extract_numerals(&e.one_day_move_pct.abs().to_string());
                !plain.iter().all(|n| cited.contains(n))
            })
            .map(|e| format!("{} ({}%)", e.date, e.one_day_move_pct))
            .collect()
    }
}

/// Builds the correction directive for a failed report.
pub fn critique(report: &ValidationReport, rules: &StyleRules) -> String {
    let mut out = String::from("Fix these issues without changing facts:\n");
    for failure in report.failures() {
        out.push_str(&format!(
            "- {}: expected {}; observed {}.\n",
            failure.check, failure.expected, failure.observed
        ));
    }
    out.push_str(&format!(
        "Start with '{}' and keep {} to {} words in {} to {} paragraphs.",
        rules.heading, rules.min_words, rules.max_words, rules.min_paragraphs, rules.max_paragraphs
    ));
    out
}

/// Whitespace-separated tokens containing at least one letter or digit.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .count()
}

/// Body paragraphs separated by blank lines, not counting a leading heading line.
pub fn paragraph_count(text: &str, heading: &str) -> usize {
    let body = text.trim_start();
    let body = match body.split_once('\n') {
        Some((first, rest)) if first.trim() == heading.trim() => rest,
        None if body.trim() == heading.trim() => "",
        _ => body,
    };
    BLANK_LINE_RE
        .split(body.trim())
        .filter(|p| !p.trim().is_empty())
        .count()
}

/// Events whose date appears in the text, as ISO date or in prose
/// ("April 8", "Apr 8", "8 April").
pub fn referenced_events(text: &str, events: &[IndexEvent]) -> Vec<IndexEvent> {
    let haystack = text.to_lowercase();
    events
        .iter()
        .filter(|event| {
            ["%Y-%m-%d", "%B %-d", "%b %-d", "%b. %-d", "%-d %B", "%-d %b"]
                .iter()
                .any(|fmt| {
                    let needle = event.date.format(fmt).to_string().to_lowercase();
                    contains_standalone(&haystack, &needle)
                })
        })
        .cloned()
        .collect()
}

// Match not glued to other digits, so "April 1" does not match "April 15".
fn contains_standalone(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(idx, _)| {
        let before = haystack[..idx].chars().next_back();
        let after = haystack[idx + needle.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_digit()) && !after.is_some_and(|c| c.is_ascii_digit())
    })
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    }
}
