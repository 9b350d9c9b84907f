// 🔤 Field Parsers - spreadsheet text → typed financial values
//
// Every function here is total: malformed input yields None / an empty value,
// never an error. Import rows are routinely messy and the pipeline has to keep
// going row by row.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// PATTERNS
// ============================================================================

const NUM: &str = r"(\d+(?:[.,]\d+)?)";

static RATE_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"{NUM}\s*%?\s*[-–—]\s*{NUM}\s*%")).expect("valid regex"));

static RATE_FROM: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)desde\s+{NUM}\s*%")).expect("valid regex"));

static RATE_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"{NUM}\s*%")).expect("valid regex"));

static TERM_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*[-–—]\s*(\d+)").expect("valid regex"));

static TERM_SINGLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:desde\s+)?(\d+)").expect("valid regex"));

static CURRENCY_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(mxn|usd|mxp|mn)\b").expect("valid regex"));

static NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

// ============================================================================
// RANGE TYPES
// ============================================================================

/// Interest rate range in percent. `{None, None}` means "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RateRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RateRange {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        RateRange { min, max }
    }

    pub fn is_unknown(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// `Some(self)` unless unknown; for optional canonical fields
    pub fn known(self) -> Option<Self> {
        if self.is_unknown() {
            None
        } else {
            Some(self)
        }
    }
}

/// Loan term range. Unit-agnostic; callers treat it as months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TermRange {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

impl TermRange {
    pub fn new(min: Option<u32>, max: Option<u32>) -> Self {
        TermRange { min, max }
    }

    pub fn is_unknown(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn known(self) -> Option<Self> {
        if self.is_unknown() {
            None
        } else {
            Some(self)
        }
    }
}

// ============================================================================
// PARSERS
// ============================================================================

/// Parse a money/percent cell into a float.
///
/// Strips currency symbols and codes, percent signs, thousands separators and
/// whitespace. `"$1,500,000 MXN"` → `1500000.0`, `"45.5%"` → `45.5`.
pub fn parse_numeric_value(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let without_codes = CURRENCY_WORDS.replace_all(trimmed, "");
    let cleaned: String = without_codes
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '%' | ',') && !c.is_whitespace())
        .collect();

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse an interest-rate cell.
///
/// First match wins: `"N% - M%"` → `{N, M}`, `"desde N%"` → `{N, None}`,
/// bare `"N%"` → `{N, None}`, anything else → unknown.
pub fn parse_interest_rate(text: &str) -> RateRange {
    if let Some(caps) = RATE_RANGE.captures(text) {
        return RateRange::new(decimal(&caps[1]), decimal(&caps[2]));
    }

    if let Some(caps) = RATE_FROM.captures(text) {
        return RateRange::new(decimal(&caps[1]), None);
    }

    if let Some(caps) = RATE_BARE.captures(text) {
        return RateRange::new(decimal(&caps[1]), None);
    }

    RateRange::default()
}

/// Parse a loan-term cell: `"12-60 meses"` → `{12, 60}`, `"desde 6"` → `{6, None}`.
pub fn parse_loan_term(text: &str) -> TermRange {
    if let Some(caps) = TERM_RANGE.captures(text) {
        return TermRange::new(caps[1].parse().ok(), caps[2].parse().ok());
    }

    if let Some(caps) = TERM_SINGLE.captures(text) {
        return TermRange::new(caps[1].parse().ok(), None);
    }

    TermRange::default()
}

/// Split a list cell on `,` `|` or `;`, trimming items and dropping empties.
pub fn parse_array_field(text: Option<&str>) -> Vec<String> {
    match text {
        Some(t) => t
            .split([',', '|', ';'])
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    }
}

/// Split a cell on `|` only, trimming items and dropping empties. Commas stay
/// inside items, so "Anualidad $1,200 | Sin CAT" is two entries.
pub fn parse_pipe_list(text: &str) -> Vec<String> {
    text.split('|')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// URL-safe slug: lower-case, diacritics stripped, non-alphanumeric runs → `-`.
///
/// Idempotent. Does not guarantee uniqueness; see `import` for collisions.
pub fn generate_slug(name: &str) -> String {
    let folded: String = name
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    NON_SLUG
        .replace_all(&folded, "-")
        .trim_matches('-')
        .to_string()
}

/// Parse a JSON-typed cell (tips, contact blocks). Malformed JSON → None.
pub fn parse_json_field(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str(trimmed) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "could not parse JSON cell");
            None
        }
    }
}

/// Value for an unrecognized column: JSON when it looks like JSON, else text.
pub fn metadata_value(text: &str) -> serde_json::Value {
    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Some(value) = parse_json_field(trimmed) {
            return value;
        }
    }
    serde_json::Value::String(trimmed.to_string())
}

fn decimal(raw: &str) -> Option<f64> {
    raw.replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite())
}

// ============================================================================
// TESTS
// ============================================================================
