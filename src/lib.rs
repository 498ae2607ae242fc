//! Prescription image understanding engine.
//!
//! Turns an uploaded prescription photograph into an ordered, never-empty list
//! of [`PrescriptionRecord`]s. A generative vision model is tried first when a
//! credential is configured; the local OCR pipeline (enhanced variants,
//! transcript scoring, vocabulary matching, field extraction) is the fallback.

pub mod config;
pub mod pipeline;

use tracing_subscriber::EnvFilter;

pub use config::{EngineConfig, MatchThresholds, VisionConfig};
pub use pipeline::extraction::{
    validate_prescription_input, ExtractionEngine, ExtractionError, ManualPrescriptionInput,
    PrescriptionExtractor, PrescriptionRecord, Vocabulary,
};
pub use pipeline::vision::{VisionAdapter, VisionClient, VisionError, VisionOutcome};

/// Install a `tracing` fmt subscriber for host applications that have none.
///
/// `RUST_LOG` wins over the crate default. Calling this twice is harmless:
/// the second installation attempt is ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}

/// One-shot extraction: bytes + vocabulary + optional vision credential.
///
/// Builds a [`PrescriptionExtractor`] with the default engine configuration
/// and the `tesseract` binary as the local OCR engine. Only undecodable
/// input is reported as an error.
pub fn extract_prescription(
    image_bytes: &[u8],
    vocabulary: Vocabulary,
    vision: &VisionConfig,
) -> Result<Vec<PrescriptionRecord>, ExtractionError> {
    PrescriptionExtractor::from_config(EngineConfig::default(), vocabulary, vision)
        .extract(image_bytes)
}
