//! Engine configuration.
//!
//! Every knob the extraction pipeline reads lives here and is passed in
//! explicitly; nothing is read from process state except through
//! [`VisionConfig::from_env`].

use serde::{Deserialize, Serialize};

pub const ENGINE_NAME: &str = "prescription-engine";
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding the vision model credential.
pub const VISION_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Default `tracing` filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "prescription_engine=info"
}

// ═══════════════════════════════════════════════════════════
// Image normalization
// ═══════════════════════════════════════════════════════════

/// Resize filter quality levels.
///
/// CatmullRom is preferred over Lanczos3 for document text: Lanczos3 rings
/// around high-contrast edges, which is exactly what glyph strokes are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeQuality {
    /// CatmullRom (cubic spline).
    High,
    /// Triangle (bilinear).
    Fast,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Ceiling for the long edge of the working image.
    pub max_dimension: u32,
    pub resize_filter: ResizeQuality,
    /// Apply EXIF orientation before anything else.
    pub apply_exif_orientation: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_dimension: 2048,
            resize_filter: ResizeQuality::High,
            apply_exif_orientation: true,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Variant generation
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantConfig {
    /// Long-edge size below which the grayscale base is upscaled.
    pub legibility_threshold: u32,
    /// Upper bound on the upscale factor.
    pub max_upscale: f32,
    /// Mean brightness (0-255) below which an inverted variant is produced.
    pub dark_background_threshold: f32,
    pub high_contrast: bool,
    pub binarized: bool,
    pub inverted: bool,
    pub sharp: bool,
}

impl VariantConfig {
    /// All strategies enabled.
    pub fn full() -> Self {
        Self {
            legibility_threshold: 1500,
            max_upscale: 4.0,
            dark_background_threshold: 100.0,
            high_contrast: true,
            binarized: true,
            inverted: true,
            sharp: true,
        }
    }

    /// Only the always-on `gentle` variant, no upscaling beyond 2x.
    /// For hosts where memory matters more than recall.
    pub fn minimal() -> Self {
        Self {
            max_upscale: 2.0,
            high_contrast: false,
            binarized: false,
            inverted: false,
            sharp: false,
            ..Self::full()
        }
    }
}

impl Default for VariantConfig {
    fn default() -> Self {
        Self::full()
    }
}

// ═══════════════════════════════════════════════════════════
// Local OCR
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalOcrConfig {
    /// Tesseract page segmentation modes swept for every variant.
    /// 6 = uniform block, 4 = single column, 3 = fully automatic.
    pub page_seg_modes: Vec<u32>,
    /// Tesseract language code(s), e.g. "eng" or "eng+fra".
    pub language: String,
}

impl Default for LocalOcrConfig {
    fn default() -> Self {
        Self {
            page_seg_modes: vec![6, 4, 3],
            language: "eng".to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Vocabulary matching
// ═══════════════════════════════════════════════════════════

/// Fuzzy matching thresholds (normalized similarity, 0.0-1.0).
///
/// Empirical values. Validate against a labelled corpus before tightening.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchThresholds {
    /// Word / word-pair similarity needed to accept a vocabulary entry.
    pub token: f32,
    /// Looser threshold for words that already carry a drug suffix.
    pub suffix: f32,
    /// Minimum length for last-resort capitalized words.
    pub min_capitalized_len: usize,
    /// Minimum token length considered by fuzzy matching.
    pub min_token_len: usize,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            token: 0.80,
            suffix: 0.60,
            min_capitalized_len: 5,
            min_token_len: 4,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Engine
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub normalizer: NormalizerConfig,
    pub variants: VariantConfig,
    pub local_ocr: LocalOcrConfig,
    pub thresholds: MatchThresholds,
}

impl EngineConfig {
    /// Smaller working image and a single variant.
    pub fn constrained() -> Self {
        Self {
            normalizer: NormalizerConfig {
                max_dimension: 1600,
                resize_filter: ResizeQuality::Fast,
                ..NormalizerConfig::default()
            },
            variants: VariantConfig::minimal(),
            local_ocr: LocalOcrConfig {
                page_seg_modes: vec![6, 3],
                ..LocalOcrConfig::default()
            },
            thresholds: MatchThresholds::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Vision model
// ═══════════════════════════════════════════════════════════

/// External vision model settings. No credential means the vision path is
/// skipped, not that extraction fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Fixed delay before the single rate-limit retry.
    pub retry_delay_ms: u64,
    /// JPEG quality used when uploading the working image.
    pub jpeg_quality: u8,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-1.5-flash".to_string(),
            timeout_secs: 30,
            retry_delay_ms: 2000,
            jpeg_quality: 85,
        }
    }
}

impl VisionConfig {
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Read the credential from `GEMINI_API_KEY`. Blank values count as absent.
    pub fn from_env() -> Self {
        let api_key = std::env::var(VISION_API_KEY_ENV)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        Self {
            api_key,
            ..Self::default()
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}
