use std::time::{Duration, Instant};

use base64::Engine as _;

use super::client::{GeminiVisionClient, VisionClient};
use super::parser::parse_vision_response;
use super::prompt::PRESCRIPTION_VISION_PROMPT;
use super::{VisionError, VisionOutcome};
use crate::config::VisionConfig;
use crate::pipeline::extraction::preprocess::encode_jpeg;
use crate::pipeline::extraction::WorkingImage;

/// Sends the working image to a vision model and classifies the result.
pub struct VisionAdapter {
    client: Box<dyn VisionClient>,
    retry_delay: Duration,
    jpeg_quality: u8,
}

impl VisionAdapter {
    pub fn new(client: Box<dyn VisionClient>) -> Self {
        let defaults = VisionConfig::default();
        Self {
            client,
            retry_delay: Duration::from_millis(defaults.retry_delay_ms),
            jpeg_quality: defaults.jpeg_quality,
        }
    }

    /// Gemini-backed adapter. Fails when no credential is configured.
    pub fn from_config(config: &VisionConfig) -> Result<Self, VisionError> {
        let client = GeminiVisionClient::new(config)?;
        Ok(Self {
            client: Box::new(client),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            jpeg_quality: config.jpeg_quality,
        })
    }

    /// Delay before the single rate-limit retry.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    pub fn extract(&self, image: &WorkingImage) -> VisionOutcome {
        let _span = tracing::info_span!(
            "vision_extract",
            model = %self.client.model_name(),
            width = image.width(),
            height = image.height(),
        )
        .entered();
        let start = Instant::now();

        let jpeg = match encode_jpeg(image.as_rgb(), self.jpeg_quality) {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = VisionError::Encoding(e.to_string());
                tracing::warn!(error = %err, "Could not encode image for vision model");
                return VisionOutcome::HardFailure(err.to_string());
            }
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(&jpeg);

        let outcome = match self.call_with_retry(&encoded) {
            Ok(raw) => parse_vision_response(&raw),
            Err(e) if e.is_rate_limited() => VisionOutcome::TransientFailure(e.to_string()),
            Err(e) => VisionOutcome::HardFailure(e.to_string()),
        };

        match &outcome {
            VisionOutcome::Parsed(records) => tracing::info!(
                elapsed_ms = %start.elapsed().as_millis(),
                records = records.len(),
                "Vision extraction complete"
            ),
            VisionOutcome::Malformed(raw) => tracing::warn!(
                response_len = raw.len(),
                "Vision response could not be parsed"
            ),
            VisionOutcome::TransientFailure(msg) | VisionOutcome::HardFailure(msg) => {
                tracing::warn!(error = %msg, "Vision extraction failed")
            }
        }

        outcome
    }

    /// One call, plus exactly one retry if the first was rate-limited.
    fn call_with_retry(&self, encoded: &str) -> Result<String, VisionError> {
        match self.send(encoded) {
            Err(e) if e.is_rate_limited() => {
                tracing::warn!(
                    delay_ms = %self.retry_delay.as_millis(),
                    "Vision model rate-limited, retrying once"
                );
                std::thread::sleep(self.retry_delay);
                self.send(encoded)
            }
            other => other,
        }
    }

    fn send(&self, encoded: &str) -> Result<String, VisionError> {
        self.client
            .generate_with_image(PRESCRIPTION_VISION_PROMPT, encoded, "image/jpeg")
    }
}
