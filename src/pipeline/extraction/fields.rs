//! Field extraction around a medicine candidate.
//!
//! Each field is an independent regex pass over a short window of the
//! transcript. Text after the candidate is searched first. On a
//! multi-medicine prescription each candidate is confined to its own span
//! (see [`candidate_spans`]) so neither the previous nor the next medicine's
//! fields are picked up. No defaults are applied here.

use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;

use super::types::MedicineCandidate;

/// Characters of context kept before the candidate.
pub const WINDOW_BEFORE: usize = 30;
/// Total window length in characters.
pub const WINDOW_LEN: usize = 230;

pub const NOTE_DOSAGE: &str = "Dosage unclear - please confirm";
pub const NOTE_FREQUENCY: &str = "Frequency unclear - please confirm";
pub const NOTE_DURATION: &str = "Duration not found - defaulting to 30 days";
pub const NOTE_ROUTE: &str = "Route not specified - please confirm";

/// Fields resolved for one medicine. `None` means not found.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedFields {
    pub dosage: Option<String>,
    pub dosage_unit: Option<String>,
    pub frequency: Option<String>,
    pub duration_days: Option<u32>,
    pub route: Option<String>,
}

impl ExtractedFields {
    /// One note per unresolved field, in field order.
    pub fn gap_notes(&self) -> Vec<String> {
        let mut notes = Vec::new();
        if self.dosage.is_none() {
            notes.push(NOTE_DOSAGE.to_string());
        }
        if self.frequency.is_none() {
            notes.push(NOTE_FREQUENCY.to_string());
        }
        if self.duration_days.is_none() {
            notes.push(NOTE_DURATION.to_string());
        }
        if self.route.is_none() {
            notes.push(NOTE_ROUTE.to_string());
        }
        notes
    }
}

/// Extract fields for `candidate` from the transcript it was found in.
pub fn extract_fields(text: &str, candidate: &MedicineCandidate) -> ExtractedFields {
    extract_fields_in(text, candidate, 0..text.len())
}

/// Extract fields for `candidate`, looking only inside `span` (byte offsets
/// into `text`) in addition to the window limits.
pub fn extract_fields_in(
    text: &str,
    candidate: &MedicineCandidate,
    span: Range<usize>,
) -> ExtractedFields {
    let pos = floor_char_boundary(text, candidate.position);
    let end = floor_char_boundary(text, span.end).max(pos);
    let floor = floor_char_boundary(text, span.start).min(pos);

    let scoped = &text[..end];
    let (start, window_end) = window_bounds(scoped, pos);
    let window = &scoped[start.max(floor)..window_end];
    let after = &scoped[pos..window_end];

    let (dosage, dosage_unit) = parse_dosage(after)
        .or_else(|| parse_dosage(window))
        .map_or((None, None), |(value, unit)| (Some(value), Some(unit)));

    ExtractedFields {
        dosage,
        dosage_unit,
        frequency: parse_frequency(after).or_else(|| parse_frequency(window)),
        duration_days: parse_duration_days(after).or_else(|| parse_duration_days(window)),
        route: parse_route(after).or_else(|| parse_route(window)),
    }
}

/// The span of `text` each candidate may draw fields from.
///
/// A span ends where the next candidate starts. It begins at the start of
/// the candidate's line, or at the candidate itself when another candidate
/// sits earlier on that line.
pub fn candidate_spans(text: &str, candidates: &[MedicineCandidate]) -> Vec<Range<usize>> {
    candidates
        .iter()
        .map(|candidate| {
            let pos = floor_char_boundary(text, candidate.position);
            let line_start = text[..pos].rfind('\n').map_or(0, |i| i + 1);
            let shares_line = candidates
                .iter()
                .any(|other| other.position >= line_start && other.position < pos);
            let start = if shares_line { pos } else { line_start };
            let end = candidates
                .iter()
                .map(|other| other.position)
                .filter(|&p| p > pos)
                .min()
                .unwrap_or(text.len());
            start..end
        })
        .collect()
}

/// The window around byte offset `position`: up to [`WINDOW_BEFORE`] chars
/// before it, [`WINDOW_LEN`] chars in total. Returns the window and the
/// candidate's byte offset inside it.
pub fn field_window(text: &str, position: usize) -> (&str, usize) {
    let pos = floor_char_boundary(text, position);
    let (start, end) = window_bounds(text, pos);
    (&text[start..end], pos - start)
}

/// Byte range of the window around `pos`, which must be a char boundary.
fn window_bounds(text: &str, pos: usize) -> (usize, usize) {
    let start = text[..pos]
        .char_indices()
        .rev()
        .nth(WINDOW_BEFORE - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let end = text[start..]
        .char_indices()
        .nth(WINDOW_LEN)
        .map(|(i, _)| start + i)
        .unwrap_or(text.len());
    // A candidate deep in a long line can sit past the window end
    (start, end.max(pos))
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

// ═══════════════════════════════════════════════════════════
// Dosage
// ═══════════════════════════════════════════════════════════

static DOSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(micrograms?|milligrams?|grams?|mcg|µg|ug|mg|ml|iu|units?|g|l|%)(?:[^a-z]|$)")
        .unwrap()
});

/// First "number + unit" pair, e.g. `"500mg"` -> `("500", "mg")`.
/// Units are lower-cased; micrograms normalize to `mcg`.
pub fn parse_dosage(text: &str) -> Option<(String, String)> {
    let caps = DOSAGE.captures(text)?;
    let value = caps.get(1)?.as_str().to_string();
    let unit = match caps.get(2)?.as_str().to_lowercase().as_str() {
        "microgram" | "micrograms" | "µg" | "ug" => "mcg".to_string(),
        "milligram" | "milligrams" => "mg".to_string(),
        "gram" | "grams" => "g".to_string(),
        "unit" | "units" => "units".to_string(),
        other => other.to_string(),
    };
    Some((value, unit))
}

// ═══════════════════════════════════════════════════════════
// Frequency
// ═══════════════════════════════════════════════════════════

/// A frequency pattern with its canonical label. `{n}` in the label is
/// replaced by the first capture group.
struct FrequencyPattern {
    regex: Regex,
    label: &'static str,
}

fn pattern(re: &str, label: &'static str) -> FrequencyPattern {
    FrequencyPattern {
        regex: Regex::new(re).unwrap(),
        label,
    }
}

/// Ordered: natural language, then numeric shorthand, then intervals, then
/// Latin abbreviations. Abbreviations must come last; "od" and "bd" are
/// short enough to collide with fuller phrases.
static FREQUENCY_PATTERNS: LazyLock<Vec<FrequencyPattern>> = LazyLock::new(|| {
    vec![
        pattern(r"(?i)\bonce\s+(?:a\s+|per\s+|every\s+)?(?:day|daily)\b", "Once daily"),
        pattern(r"(?i)\btwice\s+(?:a\s+|per\s+)?(?:day|daily)\b", "Twice daily"),
        pattern(r"(?i)\b(?:three|3)\s+times\s+(?:a\s+|per\s+)?(?:day|daily)\b", "Three times daily"),
        pattern(r"(?i)\b(?:four|4)\s+times\s+(?:a\s+|per\s+)?(?:day|daily)\b", "Four times daily"),
        pattern(r"(?i)\bmorning\s+and\s+(?:evening|night)\b", "Twice daily"),
        pattern(r"(?i)\b(?:at\s+bedtime|before\s+(?:bed|sleep))\b", "At bedtime"),
        pattern(r"(?i)\bas\s+(?:needed|required)\b", "As needed"),
        pattern(r"(?i)\b(?:1|one)\s*x\s*(?:a\s+|per\s+)?(?:day|daily)\b", "Once daily"),
        pattern(r"(?i)\b(?:2|two)\s*x\s*(?:a\s+|per\s+)?(?:day|daily)\b", "Twice daily"),
        pattern(r"(?i)\b(?:3|three)\s*x\s*(?:a\s+|per\s+)?(?:day|daily)\b", "Three times daily"),
        pattern(r"(?i)\b(\d+)\s+times\s+(?:a\s+|per\s+)?(?:day|daily)\b", "{n} times daily"),
        pattern(r"(?i)\bevery\s+(\d+)\s*(?:hours?|hrs?|h)\b", "Every {n} hours"),
        pattern(r"(?i)\b(?:daily|every\s+day)\b", "Once daily"),
        pattern(r"(?i)\b(?:b\.?i\.?d|b\.?d)\b", "Twice daily"),
        pattern(r"(?i)\b(?:t\.?i\.?d|t\.?d\.?s)\b", "Three times daily"),
        pattern(r"(?i)\bq\.?i\.?d\b", "Every 6 hours"),
        pattern(r"(?i)\b(?:q\.?h\.?s|h\.s)\b", "At bedtime"),
        pattern(r"(?i)\bo\.?d\b", "Once daily"),
        pattern(r"(?i)\bp\.?r\.?n\b", "As needed"),
    ]
});

/// Canonical frequency label for the first matching pattern in table order.
pub fn parse_frequency(text: &str) -> Option<String> {
    FREQUENCY_PATTERNS.iter().find_map(|p| {
        p.regex
            .captures(text)
            .map(|caps| render_label(p.label, &caps))
    })
}

fn render_label(label: &str, caps: &Captures<'_>) -> String {
    match caps.get(1) {
        Some(n) if label.contains("{n}") => label.replace("{n}", n.as_str()),
        _ => label.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════
// Duration
// ═══════════════════════════════════════════════════════════

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,3})\s*(days?|weeks?|wks?|months?|mths?)\b").unwrap()
});

/// Duration in days; weeks count 7 and months 30.
pub fn parse_duration_days(text: &str) -> Option<u32> {
    let caps = DURATION.captures(text)?;
    let n: u32 = caps.get(1)?.as_str().parse().ok()?;
    if n == 0 {
        return None;
    }
    let unit = caps.get(2)?.as_str().to_lowercase();
    let days = if unit.starts_with('w') {
        n * 7
    } else if unit.starts_with('m') {
        n * 30
    } else {
        n
    };
    Some(days)
}

// ═══════════════════════════════════════════════════════════
// Route
// ═══════════════════════════════════════════════════════════

static ROUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(orally|oral|by\s+mouth|tablets?|tabs?|capsules?|caps?|injections?|inj|intravenous|iv|intramuscular|subcutaneous|topical|cream|ointment|drops|syrup|inhaler|patch|sublingual)\b",
    )
    .unwrap()
});

/// Canonical route for the first route word in `text`.
pub fn parse_route(text: &str) -> Option<String> {
    let word = ROUTE.captures(text)?.get(1)?.as_str().to_lowercase();
    Some(canonical_route(&word))
}

fn canonical_route(word: &str) -> String {
    let canonical = match word {
        "orally" => "oral",
        "tab" | "tabs" | "tablets" => "tablet",
        "cap" | "caps" | "capsules" => "capsule",
        "inj" | "injections" => "injection",
        "iv" => "intravenous",
        w if w.starts_with("by") => "oral",
        w => w,
    };
    canonical.to_string()
}
