use std::fmt;

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use super::OcrError;

/// Decoded, upright, alpha-free RGB image bounded by the resolution ceiling.
/// Every downstream stage reads this one representation.
#[derive(Debug, Clone)]
pub struct WorkingImage {
    image: RgbImage,
    /// Dimensions of the decoded input, before orientation and downscaling.
    pub original_width: u32,
    pub original_height: u32,
}

impl WorkingImage {
    pub fn new(image: RgbImage, original_width: u32, original_height: u32) -> Self {
        Self {
            image,
            original_width,
            original_height,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_rgb(self) -> RgbImage {
        self.image
    }
}

/// A grayscale enhancement of the working image, labelled for diagnostics.
#[derive(Debug, Clone)]
pub struct ImageVariant {
    pub label: &'static str,
    pub image: GrayImage,
}

/// Best OCR output across the variant x page-segmentation sweep.
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub text: String,
    /// Label of the variant that produced `text`.
    pub variant: Option<String>,
    /// Page segmentation mode that produced `text`.
    pub psm: Option<u32>,
    pub score: u32,
    /// False when no OCR engine could be run at all.
    pub engine_available: bool,
}

impl Transcript {
    /// The engine ran but nothing usable came back.
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            variant: None,
            psm: None,
            score: 0,
            engine_available: true,
        }
    }

    /// No OCR engine could be run.
    pub fn unavailable() -> Self {
        Self {
            engine_available: false,
            ..Self::empty()
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().chars().count() < 2
    }
}

/// How a medicine name was located in a transcript. Declaration order is
/// priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Vocabulary entry occurs verbatim (case-insensitive).
    Exact,
    /// Vocabulary entry occurs once whitespace is removed ("Met formin").
    SpaceCollapsed,
    /// A word or adjacent word pair is close to a vocabulary entry.
    FuzzyToken,
    /// A word carries a drug-class ending (-statin, -cillin, ...).
    SuffixHeuristic,
    /// Last resort: the word following a label such as "Rx:" or "Tab".
    LabelAnchored,
    /// Last resort: a long capitalized word that is not boilerplate.
    CapitalizedWord,
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Exact => "exact",
            Self::SpaceCollapsed => "space_collapsed",
            Self::FuzzyToken => "fuzzy_token",
            Self::SuffixHeuristic => "suffix_heuristic",
            Self::LabelAnchored => "label_anchored",
            Self::CapitalizedWord => "capitalized_word",
        };
        f.write_str(s)
    }
}

/// A medicine name located in a transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MedicineCandidate {
    /// Display spelling (vocabulary form when matched against the vocabulary).
    pub name: String,
    /// Byte offset of the match in the transcript.
    pub position: usize,
    pub strategy: MatchStrategy,
    /// True when `name` is a vocabulary entry.
    pub verified: bool,
}

/// Which path produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionEngine {
    #[serde(rename = "vision-model")]
    VisionModel,
    #[serde(rename = "local-ocr")]
    LocalOcr,
    #[serde(rename = "fallback")]
    Fallback,
}

impl fmt::Display for ExtractionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::VisionModel => "vision-model",
            Self::LocalOcr => "local-ocr",
            Self::Fallback => "fallback",
        };
        f.write_str(s)
    }
}

/// One medicine's extraction result, ready for human review.
///
/// Built only through [`PrescriptionDraft::into_record`](super::PrescriptionDraft::into_record),
/// which applies defaults and derives `requires_manual_confirmation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionRecord {
    pub medicine_name: Option<String>,
    pub dosage: Option<String>,
    pub dosage_unit: Option<String>,
    /// Always present; defaults to "Once daily".
    pub frequency: String,
    /// Always present; defaults to 30.
    pub duration_days: u32,
    pub route: Option<String>,
    pub confidence: f32,
    pub engine: ExtractionEngine,
    pub extraction_notes: Vec<String>,
    pub requires_manual_confirmation: bool,
    /// Full source text, only on the first record of a batch.
    pub raw_text: String,
}

/// OCR engine abstraction (allows mocking for tests).
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the engine can run at all on this host.
    fn is_available(&self) -> bool {
        true
    }

    /// Recognize text in a PNG-encoded image using the given page
    /// segmentation mode.
    fn ocr_image(&self, png_bytes: &[u8], psm: u32) -> Result<String, OcrError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_serializes_with_hyphenated_tags() {
        assert_eq!(
            serde_json::to_string(&ExtractionEngine::VisionModel).unwrap(),
            "\"vision-model\""
        );
        assert_eq!(
            serde_json::to_string(&ExtractionEngine::LocalOcr).unwrap(),
            "\"local-ocr\""
        );
        assert_eq!(ExtractionEngine::Fallback.to_string(), "fallback");
    }

    #[test]
    fn strategy_order_is_priority_order() {
        assert!(MatchStrategy::Exact < MatchStrategy::SpaceCollapsed);
        assert!(MatchStrategy::SpaceCollapsed < MatchStrategy::FuzzyToken);
        assert!(MatchStrategy::FuzzyToken < MatchStrategy::SuffixHeuristic);
        assert!(MatchStrategy::SuffixHeuristic < MatchStrategy::LabelAnchored);
        assert!(MatchStrategy::LabelAnchored < MatchStrategy::CapitalizedWord);
    }

    #[test]
    fn unavailable_transcript_is_blank() {
        let t = Transcript::unavailable();
        assert!(!t.engine_available);
        assert!(t.is_blank());
        assert!(Transcript::empty().engine_available);
    }

    #[test]
    fn working_image_reports_dimensions() {
        let img = WorkingImage::new(RgbImage::new(40, 30), 80, 60);
        assert_eq!((img.width(), img.height()), (40, 30));
        assert_eq!(img.original_width, 80);
    }
}
