use super::types::{MatchStrategy, MedicineCandidate};

/// Confidence levels assigned to records.
pub mod thresholds {
    /// Vision model returned a medicine name.
    pub const VISION_NAMED: f32 = 0.90;

    /// Vision model returned a record without a name.
    pub const VISION_UNNAMED: f32 = 0.30;

    /// Name recovered by pattern from a non-JSON model response.
    pub const VISION_RECOVERED: f32 = 0.50;

    /// Transcript too short to judge.
    pub const VERY_LOW: f32 = 0.30;

    /// Starting point for transcripts of reasonable length.
    pub const BASE: f32 = 0.50;

    /// Ceiling for local OCR results.
    pub const LOCAL_MAX: f32 = 0.90;
}

/// Prescription vocabulary whose presence suggests a readable transcript.
const PRESCRIPTION_KEYWORDS: &[&str] = &[
    "medicine", "tablet", "take", "daily", "mg", "ml", "frequency", "dose",
    "morning", "evening", "twice",
];

/// Transcript-level confidence: 0.3 for fewer than 10 characters, otherwise
/// 0.5 plus 0.05 per prescription keyword present, capped at 0.9.
pub fn transcript_confidence(text: &str) -> f32 {
    let trimmed = text.trim();
    if trimmed.chars().count() < 10 {
        return thresholds::VERY_LOW;
    }

    let lower = trimmed.to_lowercase();
    let keyword_count = PRESCRIPTION_KEYWORDS
        .iter()
        .filter(|kw| lower.contains(*kw))
        .count();

    round2((thresholds::BASE + keyword_count as f32 * 0.05).min(thresholds::LOCAL_MAX))
}

/// How much a match strategy is trusted relative to an exact hit.
pub fn strategy_factor(strategy: MatchStrategy) -> f32 {
    match strategy {
        MatchStrategy::Exact | MatchStrategy::SpaceCollapsed => 1.0,
        MatchStrategy::FuzzyToken => 0.9,
        MatchStrategy::SuffixHeuristic => 0.8,
        MatchStrategy::LabelAnchored => 0.7,
        MatchStrategy::CapitalizedWord => 0.6,
    }
}

/// Confidence of a local OCR record for `candidate`.
pub fn candidate_confidence(text: &str, candidate: &MedicineCandidate) -> f32 {
    round2(transcript_confidence(text) * strategy_factor(candidate.strategy)).clamp(0.0, 1.0)
}

/// Confidence of the single record emitted when no medicine was found.
pub fn fallback_confidence(text: &str) -> f32 {
    transcript_confidence(text).min(thresholds::VERY_LOW)
}

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}
