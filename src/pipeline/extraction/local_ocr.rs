//! Local OCR sweep.
//!
//! Every variant is recognised under every page segmentation mode and each
//! result is scored. The best-scoring transcript wins; earlier results win
//! ties. Nothing short-circuits, so the choice depends only on the scores.

use super::preprocess::encode_gray_png;
use super::sanitize::sanitize_ocr_text;
use super::types::{ImageVariant, OcrEngine, Transcript};
use super::vocabulary::Vocabulary;
use super::OcrError;
use crate::config::LocalOcrConfig;

/// Units, frequency words and route words. Each one present adds to the score.
const DOMAIN_KEYWORDS: &[&str] = &[
    "mg", "mcg", "ml", "tablet", "capsule", "daily", "twice", "thrice", "times",
    "morning", "night", "hours", "bid", "tid", "qid", "oral", "mouth", "take",
];

const KEYWORD_WEIGHT: u32 = 50;
const MEDICINE_WEIGHT: u32 = 200;

pub fn run_local_ocr(
    engine: &dyn OcrEngine,
    variants: &[ImageVariant],
    config: &LocalOcrConfig,
    vocabulary: &Vocabulary,
) -> Transcript {
    if !engine.is_available() {
        tracing::warn!(engine = engine.name(), "OCR engine unavailable, skipping local OCR");
        return Transcript::unavailable();
    }

    let mut scored: Vec<Transcript> = Vec::with_capacity(variants.len() * config.page_seg_modes.len());

    for variant in variants {
        let png = match encode_gray_png(&variant.image) {
            Ok(png) => png,
            Err(e) => {
                tracing::warn!(variant = variant.label, error = %e, "Variant encoding failed");
                continue;
            }
        };

        for &psm in &config.page_seg_modes {
            match engine.ocr_image(&png, psm) {
                Ok(raw) => {
                    let text = sanitize_ocr_text(&raw);
                    let score = score_transcript(&text, vocabulary);
                    tracing::debug!(
                        variant = variant.label,
                        psm,
                        score,
                        chars = text.len(),
                        "OCR transcript scored"
                    );
                    scored.push(Transcript {
                        text,
                        variant: Some(variant.label.to_string()),
                        psm: Some(psm),
                        score,
                        engine_available: true,
                    });
                }
                Err(OcrError::Unavailable(reason)) => {
                    tracing::warn!(engine = engine.name(), %reason, "OCR engine became unavailable");
                    return Transcript::unavailable();
                }
                Err(e) => {
                    tracing::warn!(variant = variant.label, psm, error = %e, "OCR pass failed, skipping");
                }
            }
        }
    }

    let best = scored
        .into_iter()
        .reduce(|best, next| if next.score > best.score { next } else { best })
        .unwrap_or_else(Transcript::empty);

    tracing::info!(
        engine = engine.name(),
        variant = best.variant.as_deref().unwrap_or("none"),
        psm = best.psm.unwrap_or(0),
        score = best.score,
        "Local OCR complete"
    );

    best
}

/// Trimmed length, plus a bonus per domain keyword present and a larger
/// bonus per occurrence of a vocabulary medicine name.
pub fn score_transcript(text: &str, vocabulary: &Vocabulary) -> u32 {
    let trimmed = text.trim();
    let lower = trimmed.to_lowercase();

    let length = trimmed.chars().count() as u32;
    let keywords = DOMAIN_KEYWORDS
        .iter()
        .filter(|kw| contains_word(&lower, kw))
        .count() as u32;
    let medicines: u32 = vocabulary
        .medicines()
        .iter()
        .map(|name| lower.matches(name.as_str()).count() as u32)
        .sum();

    length + KEYWORD_WEIGHT * keywords + MEDICINE_WEIGHT * medicines
}

/// Keyword match at a word start, so "mg" matches "500mg" but "take"
/// does not match "intake".
fn contains_word(haystack: &str, keyword: &str) -> bool {
    haystack.match_indices(keyword).any(|(idx, _)| {
        idx == 0
            || haystack[..idx]
                .chars()
                .next_back()
                .is_some_and(|c| !c.is_alphabetic())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::ocr::{MockOcrEngine, ScriptedOcrEngine, UnavailableOcrEngine};
    use image::{GrayImage, Luma};

    fn variants(labels: &[&'static str]) -> Vec<ImageVariant> {
        labels
            .iter()
            .map(|&label| ImageVariant {
                label,
                image: GrayImage::from_pixel(8, 8, Luma([255])),
            })
            .collect()
    }

    #[test]
    fn medicine_names_dominate_score() {
        let vocab = Vocabulary::default();
        let long_noise = "Patient registration form clinic address line telephone";
        let short_drug = "Aspirin 100mg";
        assert!(score_transcript(short_drug, &vocab) > score_transcript(long_noise, &vocab));
    }

    #[test]
    fn keywords_add_to_score() {
        let vocab = Vocabulary::new(Vec::<String>::new());
        assert_eq!(score_transcript("abcdefgh", &vocab), 8);
        // "500mg" counts mg, "daily" counts once
        assert_eq!(score_transcript("500mg daily", &vocab), 11 + 2 * KEYWORD_WEIGHT);
    }

    #[test]
    fn keyword_requires_word_start() {
        assert!(contains_word("take one", "take"));
        assert!(!contains_word("fluid intake", "take"));
        assert!(contains_word("500mg", "mg"));
    }

    #[test]
    fn every_pair_is_tried() {
        let engine = ScriptedOcrEngine::new(vec![]);
        let config = LocalOcrConfig::default();
        let transcript = run_local_ocr(
            &engine,
            &variants(&["gentle", "sharp"]),
            &config,
            &Vocabulary::default(),
        );
        assert_eq!(engine.call_count(), 2 * config.page_seg_modes.len());
        assert!(transcript.is_blank());
        assert!(transcript.engine_available);
    }

    #[test]
    fn best_score_selected() {
        let engine = ScriptedOcrEngine::new(vec![
            Ok("some noise".into()),
            Ok("Take Metformin 500mg twice daily".into()),
            Ok("Metf".into()),
        ]);
        let config = LocalOcrConfig { page_seg_modes: vec![6, 4, 3], ..Default::default() };
        let transcript = run_local_ocr(&engine, &variants(&["gentle"]), &config, &Vocabulary::default());
        assert_eq!(transcript.text, "Take Metformin 500mg twice daily");
        assert_eq!(transcript.psm, Some(4));
        assert_eq!(transcript.variant.as_deref(), Some("gentle"));
    }

    #[test]
    fn ties_keep_first() {
        let engine = MockOcrEngine::new("Aspirin");
        let transcript = run_local_ocr(
            &engine,
            &variants(&["gentle", "sharp"]),
            &LocalOcrConfig::default(),
            &Vocabulary::default(),
        );
        assert_eq!(transcript.variant.as_deref(), Some("gentle"));
        assert_eq!(transcript.psm, Some(6));
    }

    #[test]
    fn failed_pass_is_skipped() {
        let engine = ScriptedOcrEngine::new(vec![
            Err(OcrError::Processing("crash".into())),
            Ok("Aspirin 100mg".into()),
        ]);
        let config = LocalOcrConfig { page_seg_modes: vec![6, 4], ..Default::default() };
        let transcript = run_local_ocr(&engine, &variants(&["gentle"]), &config, &Vocabulary::default());
        assert_eq!(transcript.text, "Aspirin 100mg");
    }

    #[test]
    fn unavailable_engine_degrades_to_empty() {
        let transcript = run_local_ocr(
            &UnavailableOcrEngine,
            &variants(&["gentle"]),
            &LocalOcrConfig::default(),
            &Vocabulary::default(),
        );
        assert!(transcript.text.is_empty());
        assert!(!transcript.engine_available);
    }

    #[test]
    fn mid_sweep_unavailable_degrades_to_empty() {
        let engine = ScriptedOcrEngine::new(vec![
            Ok("Aspirin".into()),
            Err(OcrError::Unavailable("gone".into())),
        ]);
        let transcript = run_local_ocr(
            &engine,
            &variants(&["gentle"]),
            &LocalOcrConfig::default(),
            &Vocabulary::default(),
        );
        assert!(!transcript.engine_available);
    }

    #[test]
    fn no_variants_gives_empty_transcript() {
        let transcript = run_local_ocr(
            &MockOcrEngine::new("Aspirin"),
            &[],
            &LocalOcrConfig::default(),
            &Vocabulary::default(),
        );
        assert!(transcript.is_blank());
        assert!(transcript.engine_available);
    }
}
