//! Extraction orchestration.
//!
//! One call walks a fixed sequence:
//!
//! 1. Normalize the upload. A decode failure is the only error returned.
//! 2. Vision model, when an adapter is configured. Records with at least one
//!    named medicine end the call; anything else becomes a [`VisionSkip`].
//! 3. Local OCR: variants, psm sweep, candidates, per-candidate fields.
//! 4. Placeholder: a single `fallback` record whose notes name why both
//!    paths came up empty.

use std::fmt;
use std::time::Instant;

use super::candidates::find_candidates;
use super::confidence::{candidate_confidence, fallback_confidence};
use super::fields::{candidate_spans, extract_fields_in};
use super::local_ocr::run_local_ocr;
use super::ocr::default_ocr_engine;
use super::preprocess::ImageNormalizer;
use super::records::{emit_records, PrescriptionDraft};
use super::types::{ExtractionEngine, OcrEngine, PrescriptionRecord, Transcript, WorkingImage};
use super::variants::generate_variants;
use super::vocabulary::Vocabulary;
use super::ExtractionError;
use crate::config::{EngineConfig, VisionConfig};
use crate::pipeline::vision::{VisionAdapter, VisionOutcome};

pub const NOTE_NO_TEXT: &str = "No text could be extracted from image";
pub const NOTE_NO_MEDICINE: &str = "No recognizable medicine name found in text";
pub const NOTE_NO_OCR: &str =
    "No OCR engine available - please enter prescription details manually";
pub const NOTE_VISION_NO_CREDENTIAL: &str = "AI extraction unavailable (no API key configured)";
pub const NOTE_VISION_RATE_LIMITED: &str =
    "AI service is rate-limited - please try again in a minute";
pub const NOTE_VISION_EMPTY: &str = "AI extraction returned no medicines";
pub const NOTE_VISION_MALFORMED: &str = "AI extraction returned an unreadable response";

/// Why the vision path produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisionSkip {
    NoCredential,
    RateLimited,
    NoMedicines,
    Malformed,
    Failed(String),
}

impl VisionSkip {
    /// Note attached to the placeholder record when the local path also fails.
    pub fn note(&self) -> String {
        match self {
            Self::NoCredential => NOTE_VISION_NO_CREDENTIAL.to_string(),
            Self::RateLimited => NOTE_VISION_RATE_LIMITED.to_string(),
            Self::NoMedicines => NOTE_VISION_EMPTY.to_string(),
            Self::Malformed => NOTE_VISION_MALFORMED.to_string(),
            Self::Failed(msg) => format!("AI extraction failed: {msg}"),
        }
    }
}

impl fmt::Display for VisionSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredential => write!(f, "no credential"),
            Self::RateLimited => write!(f, "rate-limited"),
            Self::NoMedicines => write!(f, "no medicines"),
            Self::Malformed => write!(f, "malformed response"),
            Self::Failed(msg) => write!(f, "failed: {msg}"),
        }
    }
}

/// Why the local path produced no medicine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalMiss {
    NoEngine,
    NoText,
    NoMedicine,
}

impl LocalMiss {
    fn note(self) -> &'static str {
        match self {
            Self::NoEngine => NOTE_NO_OCR,
            Self::NoText => NOTE_NO_TEXT,
            Self::NoMedicine => NOTE_NO_MEDICINE,
        }
    }
}

/// Prescription image to records: vision model first when configured, local
/// OCR otherwise. Shareable across threads; holds no per-call state.
pub struct PrescriptionExtractor {
    config: EngineConfig,
    vocabulary: Vocabulary,
    ocr_engine: Box<dyn OcrEngine>,
    vision: Option<VisionAdapter>,
    /// Set when a credential was present but the client could not be built.
    vision_setup_error: Option<String>,
}

impl PrescriptionExtractor {
    /// Local-only extractor.
    pub fn new(config: EngineConfig, vocabulary: Vocabulary, ocr_engine: Box<dyn OcrEngine>) -> Self {
        Self {
            config,
            vocabulary,
            ocr_engine,
            vision: None,
            vision_setup_error: None,
        }
    }

    /// Try `adapter` before the local path.
    pub fn with_vision(mut self, adapter: VisionAdapter) -> Self {
        self.vision = Some(adapter);
        self.vision_setup_error = None;
        self
    }

    /// Default OCR engine for this build, plus a Gemini adapter when
    /// `vision` carries a credential.
    pub fn from_config(config: EngineConfig, vocabulary: Vocabulary, vision: &VisionConfig) -> Self {
        let ocr_engine = default_ocr_engine(&config.local_ocr.language);
        let mut extractor = Self::new(config, vocabulary, ocr_engine);

        if vision.is_configured() {
            match VisionAdapter::from_config(vision) {
                Ok(adapter) => extractor = extractor.with_vision(adapter),
                Err(e) => {
                    tracing::warn!(error = %e, "Vision client setup failed, using local OCR only");
                    extractor.vision_setup_error = Some(e.to_string());
                }
            }
        }
        extractor
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Extract every prescribed medicine from an image.
    ///
    /// Never returns an empty list. Only input that cannot be decoded is an
    /// error; every later failure becomes a record that needs confirmation.
    pub fn extract(&self, image_bytes: &[u8]) -> Result<Vec<PrescriptionRecord>, ExtractionError> {
        let _span = tracing::info_span!(
            "prescription_extract",
            bytes = image_bytes.len(),
            ocr_engine = self.ocr_engine.name(),
        )
        .entered();
        let start = Instant::now();

        let working = ImageNormalizer::new(self.config.normalizer.clone()).normalize(image_bytes)?;

        let skip = match self.try_vision(&working) {
            Ok(records) => {
                tracing::info!(
                    engine = %ExtractionEngine::VisionModel,
                    records = records.len(),
                    elapsed_ms = %start.elapsed().as_millis(),
                    "Prescription extraction complete"
                );
                return Ok(records);
            }
            Err(skip) => skip,
        };
        tracing::info!(reason = %skip, "Vision path skipped, running local OCR");

        let records = self.run_local(working, &skip);

        tracing::info!(
            engine = %records.first().map(|r| r.engine).unwrap_or(ExtractionEngine::Fallback),
            records = records.len(),
            elapsed_ms = %start.elapsed().as_millis(),
            "Prescription extraction complete"
        );
        Ok(records)
    }

    /// Records from the vision model, or why there are none.
    fn try_vision(&self, working: &WorkingImage) -> Result<Vec<PrescriptionRecord>, VisionSkip> {
        let Some(adapter) = &self.vision else {
            return Err(match &self.vision_setup_error {
                Some(msg) => VisionSkip::Failed(msg.clone()),
                None => VisionSkip::NoCredential,
            });
        };

        match adapter.extract(working) {
            VisionOutcome::Parsed(records) if records.iter().any(|r| r.medicine_name.is_some()) => {
                Ok(records)
            }
            VisionOutcome::Parsed(_) => Err(VisionSkip::NoMedicines),
            VisionOutcome::Malformed(_) => Err(VisionSkip::Malformed),
            VisionOutcome::TransientFailure(_) => Err(VisionSkip::RateLimited),
            VisionOutcome::HardFailure(msg) => Err(VisionSkip::Failed(msg)),
        }
    }

    /// Variants, OCR sweep, candidates, fields. Takes the working image so it
    /// is dropped as soon as the variants exist.
    fn run_local(&self, working: WorkingImage, skip: &VisionSkip) -> Vec<PrescriptionRecord> {
        let variants = generate_variants(&working, &self.config.variants);
        drop(working);

        let transcript = run_local_ocr(
            self.ocr_engine.as_ref(),
            &variants,
            &self.config.local_ocr,
            &self.vocabulary,
        );
        drop(variants);

        self.records_from_transcript(&transcript, skip)
    }

    /// Records for an OCR transcript. Falls back to a single placeholder
    /// record when no medicine can be identified.
    pub fn records_from_transcript(
        &self,
        transcript: &Transcript,
        skip: &VisionSkip,
    ) -> Vec<PrescriptionRecord> {
        if !transcript.engine_available {
            return vec![placeholder_record(LocalMiss::NoEngine, skip, "")];
        }
        if transcript.is_blank() {
            return vec![placeholder_record(LocalMiss::NoText, skip, &transcript.text)];
        }

        let text = transcript.text.as_str();
        let candidates = find_candidates(text, &self.vocabulary, &self.config.thresholds);
        if candidates.is_empty() {
            tracing::warn!(chars = text.len(), "No medicine found in transcript");
            return vec![placeholder_record(LocalMiss::NoMedicine, skip, text)];
        }

        let spans = candidate_spans(text, &candidates);
        let drafts = candidates
            .iter()
            .zip(spans)
            .map(|(candidate, span)| {
                tracing::debug!(
                    name = %candidate.name,
                    strategy = %candidate.strategy,
                    position = candidate.position,
                    "Medicine candidate"
                );
                let fields = extract_fields_in(text, candidate, span);
                (
                    PrescriptionDraft::from_candidate(candidate, fields),
                    candidate_confidence(text, candidate),
                )
            })
            .collect();

        emit_records(drafts, ExtractionEngine::LocalOcr, text)
    }
}

/// The single record emitted when neither path identified a medicine.
fn placeholder_record(miss: LocalMiss, skip: &VisionSkip, text: &str) -> PrescriptionRecord {
    tracing::warn!(reason = miss.note(), vision = %skip, "Emitting placeholder record");
    PrescriptionDraft::default()
        .with_note(miss.note())
        .with_note(skip.note())
        .into_record(ExtractionEngine::Fallback, fallback_confidence(text), text.to_string())
}
