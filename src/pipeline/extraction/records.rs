//! Record emission.
//!
//! Every extraction path builds its [`PrescriptionRecord`]s through
//! [`PrescriptionDraft`], so defaults and the manual-confirmation flag are
//! applied in one place.

use super::fields::ExtractedFields;
use super::types::{ExtractionEngine, MedicineCandidate, PrescriptionRecord};

pub const DEFAULT_FREQUENCY: &str = "Once daily";
pub const DEFAULT_DURATION_DAYS: u32 = 30;

pub const NOTE_NAME_UNCLEAR: &str = "Medicine name unclear - please confirm";
pub const NOTE_NAME_UNVERIFIED: &str = "Medicine name not in vocabulary - please confirm";

/// Everything known about one medicine before defaults are applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrescriptionDraft {
    pub medicine_name: Option<String>,
    pub fields: ExtractedFields,
    /// Path-specific notes, emitted before the field gap notes.
    pub notes: Vec<String>,
}

impl PrescriptionDraft {
    pub fn new(medicine_name: Option<String>, fields: ExtractedFields) -> Self {
        let medicine_name = medicine_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        Self {
            medicine_name,
            fields,
            notes: Vec::new(),
        }
    }

    /// Draft for a candidate found by the local path.
    pub fn from_candidate(candidate: &MedicineCandidate, fields: ExtractedFields) -> Self {
        let draft = Self::new(Some(candidate.name.clone()), fields);
        if candidate.verified {
            draft
        } else {
            draft.with_note(NOTE_NAME_UNVERIFIED)
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Apply defaults and derive the confirmation flag.
    ///
    /// Field gap notes only describe an identified medicine; a draft without
    /// a name carries its own notes, or the name note when it has none.
    pub fn into_record(
        self,
        engine: ExtractionEngine,
        confidence: f32,
        raw_text: String,
    ) -> PrescriptionRecord {
        let gap_notes = match self.medicine_name {
            Some(_) => self.fields.gap_notes(),
            None => Vec::new(),
        };
        let mut notes: Vec<String> = Vec::new();
        for note in self.notes.into_iter().chain(gap_notes) {
            if !notes.contains(&note) {
                notes.push(note);
            }
        }
        if self.medicine_name.is_none() && notes.is_empty() {
            notes.push(NOTE_NAME_UNCLEAR.to_string());
        }

        let requires_manual_confirmation = !notes.is_empty() || self.medicine_name.is_none();
        let fields = self.fields;

        PrescriptionRecord {
            medicine_name: self.medicine_name,
            dosage: fields.dosage,
            dosage_unit: fields.dosage_unit,
            frequency: fields
                .frequency
                .unwrap_or_else(|| DEFAULT_FREQUENCY.to_string()),
            duration_days: fields.duration_days.unwrap_or(DEFAULT_DURATION_DAYS),
            route: fields.route,
            confidence: confidence.clamp(0.0, 1.0),
            engine,
            extraction_notes: notes,
            requires_manual_confirmation,
            raw_text,
        }
    }
}

/// Turn scored drafts into records, attaching `raw_text` to the first only.
pub fn emit_records(
    drafts: Vec<(PrescriptionDraft, f32)>,
    engine: ExtractionEngine,
    raw_text: &str,
) -> Vec<PrescriptionRecord> {
    drafts
        .into_iter()
        .enumerate()
        .map(|(i, (draft, confidence))| {
            let text = if i == 0 { raw_text.to_string() } else { String::new() };
            draft.into_record(engine, confidence, text)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::fields::{NOTE_DOSAGE, NOTE_DURATION, NOTE_ROUTE};
    use crate::pipeline::extraction::types::MatchStrategy;

    fn complete_fields() -> ExtractedFields {
        ExtractedFields {
            dosage: Some("500".into()),
            dosage_unit: Some("mg".into()),
            frequency: Some("Twice daily".into()),
            duration_days: Some(7),
            route: Some("oral".into()),
        }
    }

    #[test]
    fn complete_record_needs_no_confirmation() {
        let record = PrescriptionDraft::new(Some("Amoxicillin".into()), complete_fields())
            .into_record(ExtractionEngine::LocalOcr, 0.7, "raw".into());
        assert!(record.extraction_notes.is_empty());
        assert!(!record.requires_manual_confirmation);
        assert_eq!(record.frequency, "Twice daily");
        assert_eq!(record.duration_days, 7);
    }

    #[test]
    fn defaults_applied_with_notes() {
        let record = PrescriptionDraft::new(Some("Aspirin".into()), ExtractedFields::default())
            .into_record(ExtractionEngine::LocalOcr, 0.5, String::new());
        assert_eq!(record.frequency, DEFAULT_FREQUENCY);
        assert_eq!(record.duration_days, DEFAULT_DURATION_DAYS);
        assert!(record.extraction_notes.contains(&NOTE_DOSAGE.to_string()));
        assert!(record.extraction_notes.contains(&NOTE_DURATION.to_string()));
        assert!(record.requires_manual_confirmation);
    }

    #[test]
    fn defaults_are_idempotent() {
        let make = || {
            PrescriptionDraft::new(Some("Aspirin".into()), ExtractedFields::default())
                .into_record(ExtractionEngine::LocalOcr, 0.5, String::new())
        };
        assert_eq!(make(), make());
    }

    #[test]
    fn missing_name_always_requires_confirmation() {
        let record = PrescriptionDraft::new(None, complete_fields())
            .into_record(ExtractionEngine::VisionModel, 0.3, String::new());
        assert!(record.medicine_name.is_none());
        assert_eq!(record.extraction_notes, vec![NOTE_NAME_UNCLEAR]);
        assert!(record.requires_manual_confirmation);
    }

    #[test]
    fn unnamed_draft_keeps_own_notes_only() {
        let record = PrescriptionDraft::new(None, ExtractedFields::default())
            .with_note("No text could be extracted from image")
            .into_record(ExtractionEngine::Fallback, 0.3, String::new());
        assert_eq!(record.extraction_notes, vec!["No text could be extracted from image"]);
        assert!(record.requires_manual_confirmation);
        assert_eq!(record.frequency, DEFAULT_FREQUENCY);
    }

    #[test]
    fn blank_name_treated_as_missing() {
        let draft = PrescriptionDraft::new(Some("   ".into()), complete_fields());
        assert!(draft.medicine_name.is_none());
    }

    #[test]
    fn unverified_candidate_carries_note() {
        let candidate = MedicineCandidate {
            name: "Ketorolac".into(),
            position: 0,
            strategy: MatchStrategy::CapitalizedWord,
            verified: false,
        };
        let record = PrescriptionDraft::from_candidate(&candidate, complete_fields())
            .into_record(ExtractionEngine::LocalOcr, 0.4, String::new());
        assert_eq!(record.extraction_notes, vec![NOTE_NAME_UNVERIFIED]);
        assert!(record.requires_manual_confirmation);
    }

    #[test]
    fn duplicate_notes_collapse() {
        let fields = ExtractedFields {
            route: None,
            ..complete_fields()
        };
        let record = PrescriptionDraft::new(Some("Aspirin".into()), fields)
            .with_note(NOTE_ROUTE)
            .into_record(ExtractionEngine::LocalOcr, 0.5, String::new());
        assert_eq!(record.extraction_notes, vec![NOTE_ROUTE]);
    }

    #[test]
    fn confidence_clamped() {
        let record = PrescriptionDraft::new(Some("Aspirin".into()), complete_fields())
            .into_record(ExtractionEngine::LocalOcr, 1.7, String::new());
        assert_eq!(record.confidence, 1.0);
    }

    #[test]
    fn raw_text_only_on_first_record() {
        let drafts = vec![
            (PrescriptionDraft::new(Some("Aspirin".into()), complete_fields()), 0.6),
            (PrescriptionDraft::new(Some("Metformin".into()), complete_fields()), 0.6),
        ];
        let records = emit_records(drafts, ExtractionEngine::LocalOcr, "full text");
        assert_eq!(records[0].raw_text, "full text");
        assert!(records[1].raw_text.is_empty());
        assert_eq!(records[1].engine, ExtractionEngine::LocalOcr);
    }

    #[test]
    fn record_serializes_engine_tag() {
        let record = PrescriptionDraft::new(Some("Aspirin".into()), complete_fields())
            .into_record(ExtractionEngine::VisionModel, 0.9, String::new());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["engine"], "vision-model");
        assert_eq!(json["duration_days"], 7);
    }
}
