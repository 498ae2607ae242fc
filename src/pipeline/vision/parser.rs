//! Vision model response parsing.
//!
//! Models are asked for a bare JSON array but answer in many shapes: fenced
//! blocks, a single object, an object wrapping an array, numbers as strings,
//! or prose. Everything is coerced into drafts here; defaults and notes are
//! applied by [`PrescriptionDraft::into_record`].

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::VisionOutcome;
use crate::pipeline::extraction::confidence::thresholds;
use crate::pipeline::extraction::{
    emit_records, parse_dosage, parse_duration_days, parse_frequency, parse_route,
    ExtractedFields, ExtractionEngine, PrescriptionDraft,
};

pub const NOTE_RECOVERED: &str =
    "AI response was not valid JSON - medicine name recovered from text, please confirm";

const NAME_KEYS: &[&str] = &["medicine_name", "medicine", "medication", "drug_name", "drug", "name"];
const DOSAGE_KEYS: &[&str] = &["dosage", "dose", "strength"];
const UNIT_KEYS: &[&str] = &["dosage_unit", "unit", "dose_unit"];
const FREQUENCY_KEYS: &[&str] = &["frequency", "freq", "schedule"];
const DURATION_KEYS: &[&str] = &["duration_days", "duration", "days"];
const ROUTE_KEYS: &[&str] = &["route", "route_of_administration"];
const WRAPPER_KEYS: &[&str] = &["medicines", "medications", "prescriptions", "items"];

/// Parse a raw model response. Never fails: unusable text becomes
/// [`VisionOutcome::Malformed`].
pub fn parse_vision_response(raw: &str) -> VisionOutcome {
    if let Some(items) = extract_json_items(raw) {
        let records = items
            .iter()
            .filter_map(Value::as_object)
            .map(draft_from_object)
            .map(|draft| {
                let confidence = if draft.medicine_name.is_some() {
                    thresholds::VISION_NAMED
                } else {
                    thresholds::VISION_UNNAMED
                };
                (draft, confidence)
            })
            .collect::<Vec<_>>();
        return VisionOutcome::Parsed(emit_records(records, ExtractionEngine::VisionModel, raw.trim()));
    }

    match recover_medicine_names(raw) {
        names if !names.is_empty() => {
            tracing::warn!(count = names.len(), "Vision response not JSON, recovered names by pattern");
            let drafts = names
                .into_iter()
                .map(|name| {
                    let draft = PrescriptionDraft::new(Some(name), ExtractedFields::default())
                        .with_note(NOTE_RECOVERED);
                    (draft, thresholds::VISION_RECOVERED)
                })
                .collect();
            VisionOutcome::Parsed(emit_records(drafts, ExtractionEngine::VisionModel, raw.trim()))
        }
        _ => VisionOutcome::Malformed(raw.to_string()),
    }
}

// ═══════════════════════════════════════════════════════════
// JSON location
// ═══════════════════════════════════════════════════════════

/// The JSON array in `raw`, with a bare object coerced to one element and
/// a wrapper object unwrapped.
fn extract_json_items(raw: &str) -> Option<Vec<Value>> {
    let body = strip_code_fences(raw);
    let json = slice_json(body)?;
    match serde_json::from_str::<Value>(json).ok()? {
        Value::Array(items) => Some(items),
        Value::Object(map) => {
            let wrapped = WRAPPER_KEYS
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_array).cloned());
            Some(wrapped.unwrap_or_else(|| vec![Value::Object(map)]))
        }
        _ => None,
    }
}

/// Content of the first fenced block, or `raw` if there is none.
fn strip_code_fences(raw: &str) -> &str {
    let Some(open) = raw.find("```") else {
        return raw.trim();
    };
    // Skip the info string ("json", "JSON", ...)
    let content = raw[open + 3..].trim_start_matches(|c: char| c.is_ascii_alphabetic());
    match content.find("```") {
        Some(close) => content[..close].trim(),
        None => content.trim(),
    }
}

/// From the first `[` or `{` to its last matching closer.
fn slice_json(text: &str) -> Option<&str> {
    let start = text.find(&['[', '{'][..])?;
    let closer = if text[start..].starts_with('[') { ']' } else { '}' };
    let end = text.rfind(closer)?;
    (end > start).then(|| &text[start..=end])
}

// ═══════════════════════════════════════════════════════════
// Field coercion
// ═══════════════════════════════════════════════════════════

fn draft_from_object(obj: &Map<String, Value>) -> PrescriptionDraft {
    let name = lookup(obj, NAME_KEYS).and_then(value_text);

    let raw_dosage = lookup(obj, DOSAGE_KEYS).and_then(value_text);
    let raw_unit = lookup(obj, UNIT_KEYS).and_then(value_text);
    let (dosage, dosage_unit) = coerce_dosage(raw_dosage, raw_unit);

    let frequency = lookup(obj, FREQUENCY_KEYS)
        .and_then(value_text)
        .map(|f| parse_frequency(&f).unwrap_or(f));
    let duration_days = lookup(obj, DURATION_KEYS).and_then(coerce_duration);
    let route = lookup(obj, ROUTE_KEYS)
        .and_then(value_text)
        .map(|r| parse_route(&r).unwrap_or_else(|| r.to_lowercase()));

    PrescriptionDraft::new(
        name,
        ExtractedFields {
            dosage,
            dosage_unit,
            frequency,
            duration_days,
            route,
        },
    )
}

fn lookup<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
}

/// Strings and numbers as trimmed text; null, blank and "null" as absent.
fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let lowered = text.to_lowercase();
    if text.is_empty() || matches!(lowered.as_str(), "null" | "none" | "n/a" | "unknown") {
        None
    } else {
        Some(text)
    }
}

/// "500mg" with no unit splits into ("500", "mg"); an explicit unit wins.
fn coerce_dosage(dosage: Option<String>, unit: Option<String>) -> (Option<String>, Option<String>) {
    let unit = unit.map(|u| u.to_lowercase());
    match dosage {
        Some(d) => match parse_dosage(&d) {
            Some((value, parsed_unit)) => (Some(value), unit.or(Some(parsed_unit))),
            None => (Some(d), unit),
        },
        None => (None, unit),
    }
}

/// 7, 7.0, "7" and "7 days" are all a week; "2 weeks" is 14.
fn coerce_duration(value: &Value) -> Option<u32> {
    let days = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .and_then(|d| u32::try_from(d).ok()),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u32>().ok().or_else(|| parse_duration_days(s))
        }
        _ => None,
    };
    days.filter(|d| *d > 0)
}

// ═══════════════════════════════════════════════════════════
// Pattern recovery
// ═══════════════════════════════════════════════════════════

static QUOTED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""medicine_name"\s*:\s*"([^"]+)""#).unwrap()
});

static LABELLED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\W*(?:medicine|medication|drug)(?:\s+name)?\s*[:\-]\s*([A-Za-z][A-Za-z0-9 \-]{1,40}?)\s*(?:[,;(]|\d|$)")
        .unwrap()
});

/// Medicine names from a response that is not JSON, in order of appearance,
/// without duplicates.
fn recover_medicine_names(raw: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let found = QUOTED_NAME
        .captures_iter(raw)
        .chain(LABELLED_NAME.captures_iter(raw))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string());
    for name in found {
        if !name.is_empty()
            && name.to_lowercase() != "null"
            && !names.iter().any(|n| n.eq_ignore_ascii_case(&name))
        {
            names.push(name);
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::PrescriptionRecord;

    fn parsed(raw: &str) -> Vec<PrescriptionRecord> {
        match parse_vision_response(raw) {
            VisionOutcome::Parsed(records) => records,
            other => panic!("expected Parsed, got {other:?}"),
        }
    }

    #[test]
    fn bare_object_coerced_to_list() {
        let records = parsed(r#"{"medicine_name":"Aspirin","dosage":"100","dosage_unit":"mg"}"#);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.medicine_name.as_deref(), Some("Aspirin"));
        assert_eq!(r.dosage.as_deref(), Some("100"));
        assert_eq!(r.dosage_unit.as_deref(), Some("mg"));
        assert_eq!(r.engine, ExtractionEngine::VisionModel);
        assert!((r.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn fenced_array_parsed() {
        let raw = "Here you go:\n```json\n[\n{\"medicine_name\":\"Metformin\",\"dosage\":500,\"dosage_unit\":\"mg\",\"frequency\":\"twice daily\",\"duration_days\":\"30 days\",\"route\":\"oral\"},\n{\"medicine_name\":\"Aspirin\",\"dosage\":\"75mg\",\"frequency\":\"once daily\",\"duration_days\":30,\"route\":\"Oral\"}\n]\n```";
        let records = parsed(raw);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].dosage.as_deref(), Some("500"));
        assert_eq!(records[0].frequency, "Twice daily");
        assert_eq!(records[0].duration_days, 30);
        assert!(!records[0].requires_manual_confirmation);
        assert_eq!(records[1].dosage.as_deref(), Some("75"));
        assert_eq!(records[1].dosage_unit.as_deref(), Some("mg"));
        assert_eq!(records[1].route.as_deref(), Some("oral"));
        assert!(records[1].raw_text.is_empty());
    }

    #[test]
    fn wrapper_object_unwrapped() {
        let records = parsed(r#"{"medications":[{"name":"Ibuprofen"},{"name":"Omeprazole"}]}"#);
        let names: Vec<_> = records.iter().filter_map(|r| r.medicine_name.as_deref()).collect();
        assert_eq!(names, vec!["Ibuprofen", "Omeprazole"]);
    }

    #[test]
    fn unnamed_record_low_confidence() {
        let records = parsed(r#"[{"medicine_name":null,"dosage":"5","dosage_unit":"ml"}]"#);
        assert!(records[0].medicine_name.is_none());
        assert!((records[0].confidence - 0.3).abs() < 1e-6);
        assert!(records[0].requires_manual_confirmation);
    }

    #[test]
    fn null_fields_force_confirmation() {
        let records = parsed(r#"[{"medicine_name":"Aspirin","dosage":null,"frequency":null}]"#);
        assert!(records[0].requires_manual_confirmation);
        assert_eq!(records[0].frequency, "Once daily");
        assert_eq!(records[0].duration_days, 30);
    }

    #[test]
    fn duration_coercion() {
        assert_eq!(coerce_duration(&serde_json::json!(7)), Some(7));
        assert_eq!(coerce_duration(&serde_json::json!(7.0)), Some(7));
        assert_eq!(coerce_duration(&serde_json::json!("10")), Some(10));
        assert_eq!(coerce_duration(&serde_json::json!("2 weeks")), Some(14));
        assert_eq!(coerce_duration(&serde_json::json!("as directed")), None);
        assert_eq!(coerce_duration(&serde_json::json!(0)), None);
    }

    #[test]
    fn empty_array_is_parsed_empty() {
        assert_eq!(parse_vision_response("[]"), VisionOutcome::Parsed(vec![]));
    }

    #[test]
    fn prose_with_quoted_name_recovered() {
        let raw = r#"I think the answer is "medicine_name": "Amlodipine", dose 5 mg but I'm unsure"#;
        let records = parsed(raw);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].medicine_name.as_deref(), Some("Amlodipine"));
        assert!((records[0].confidence - 0.5).abs() < 1e-6);
        assert!(records[0].extraction_notes.contains(&NOTE_RECOVERED.to_string()));
    }

    #[test]
    fn labelled_lines_recovered() {
        let raw = "Medicine: Cetirizine 10mg\nMedicine: Loratadine, once daily";
        let names: Vec<_> = parsed(raw).into_iter().filter_map(|r| r.medicine_name).collect();
        assert_eq!(names, vec!["Cetirizine", "Loratadine"]);
    }

    #[test]
    fn unreadable_prose_is_malformed() {
        let raw = "Sorry, I cannot read this image.";
        assert_eq!(parse_vision_response(raw), VisionOutcome::Malformed(raw.to_string()));
    }

    #[test]
    fn truncated_json_is_malformed() {
        assert!(matches!(
            parse_vision_response(r#"[{"dosage": "5""#),
            VisionOutcome::Malformed(_)
        ));
    }
}
