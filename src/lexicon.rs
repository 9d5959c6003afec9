use once_cell::sync::Lazy;
use regex::Regex;

/// Literal marker for a genuinely missing data value.
pub const PLACEHOLDER: &str = "not provided";

/// Terms that imply first-person plural voice or fund attribution.
///
/// The same pattern filters payload construction and draft validation.
pub const FORBIDDEN_TERMS: &[&str] = &[
    "we",
    "our",
    "the fund",
    "portfolio",
    "overweight",
    "underweight",
    "selection",
    "allocation",
];

static FORBIDDEN_RE: Lazy<Regex> = Lazy::new(|| {
    let alternatives = FORBIDDEN_TERMS
        .iter()
        .map(|term| term.split(' ').map(regex::escape).collect::<Vec<_>>().join(r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives)).expect("forbidden-term pattern is valid")
});

// Digit groups with optional thousands separators and an optional fraction.
static NUMERAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:,\d{3})*(?:\.\d+)?").expect("numeral pattern is valid"));

/// Returns every forbidden term found in `text` as a whole-word,
/// case-insensitive match, lowercased and deduplicated in order of appearance.
pub fn find_forbidden_terms(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for m in FORBIDDEN_RE.find_iter(text) {
        let term = m
            .as_str()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        if !found.contains(&term) {
            found.push(term);
        }
    }
    found
}

pub fn contains_forbidden_term(text: &str) -> bool {
    FORBIDDEN_RE.is_match(text)
}

pub fn is_placeholder(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case(PLACEHOLDER)
}

/// Maps an absent or blank value to the placeholder; otherwise trims it.
pub fn or_placeholder(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => PLACEHOLDER.to_string(),
    }
}

/// Extracts numerals in canonical form.
///
/// Thousands separators are dropped and leading zeros of the integer part are
/// stripped (`"04"` and `"4"` compare equal, so ISO dates line up with prose
/// dates). Fractional digits are kept exactly: `"9.50"` is not `"9.5"`.
pub fn extract_numerals(text: &str) -> Vec<String> {
    NUMERAL_RE
        .find_iter(text)
        .map(|m| canonical_numeral(m.as_str()))
        .collect()
}

fn canonical_numeral(raw: &str) -> String {
    let compact: String = raw.chars().filter(|c| *c != ',').collect();
    let (int_part, frac_part) = match compact.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (compact.as_str(), None),
    };
    let trimmed = int_part.trim_start_matches('0');
    let int_part = if trimmed.is_empty() { "0" } else { trimmed };
    match frac_part {
        Some(frac) => format!("{}.{}", int_part, frac),
        None => int_part.to_string(),
    }
}
