use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::VisionError;
use crate::config::VisionConfig;

/// Generative vision model abstraction (allows mocking for tests).
pub trait VisionClient: Send + Sync {
    fn model_name(&self) -> &str;

    /// Send one image with an instruction and return the model's text.
    fn generate_with_image(
        &self,
        prompt: &str,
        image_base64: &str,
        mime_type: &str,
    ) -> Result<String, VisionError>;
}

/// Gemini `generateContent` client over blocking HTTP.
pub struct GeminiVisionClient {
    endpoint: String,
    model: String,
    api_key: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl GeminiVisionClient {
    /// Build a client from config. Fails without a credential.
    pub fn new(config: &VisionConfig) -> Result<Self, VisionError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(VisionError::Auth(0))?
            .to_string();

        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VisionError::Network(e.to_string()))?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            client,
            timeout_secs: config.timeout_secs,
        })
    }

    fn url(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.endpoint, self.model)
    }
}

/// Request body for `generateContent`
#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Image { inline_data: InlineData<'a> },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

/// Response body from `generateContent`
#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Error body, e.g. `{"error": {"code": 429, "status": "RESOURCE_EXHAUSTED"}}`
#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl VisionClient for GeminiVisionClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn generate_with_image(
        &self,
        prompt: &str,
        image_base64: &str,
        mime_type: &str,
    ) -> Result<String, VisionError> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: prompt },
                    Part::Image {
                        inline_data: InlineData {
                            mime_type,
                            data: image_base64,
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                response_mime_type: "application/json",
            },
        };

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    VisionError::Timeout(self.timeout_secs)
                } else {
                    VisionError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(classify_http_error(status.as_u16(), &body));
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| VisionError::Response(e.to_string()))?;

        first_candidate_text(parsed)
            .ok_or_else(|| VisionError::Response("No text in response candidates".into()))
    }
}

/// Map a non-success status and body to the matching error.
fn classify_http_error(status: u16, body: &str) -> VisionError {
    let detail = serde_json::from_str::<ErrorResponse>(body).ok().map(|r| r.error);
    let message = detail
        .as_ref()
        .map(|d| d.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.chars().take(200).collect());

    let exhausted = detail
        .as_ref()
        .is_some_and(|d| d.status == "RESOURCE_EXHAUSTED")
        || body.contains("RESOURCE_EXHAUSTED");

    match status {
        429 => VisionError::RateLimited(message),
        _ if exhausted => VisionError::RateLimited(message),
        401 | 403 => VisionError::Auth(status),
        _ => VisionError::Api { status, message },
    }
}

fn first_candidate_text(response: GenerateResponse) -> Option<String> {
    response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .find_map(|p| p.text)
}

/// Mock vision client for testing — returns a configurable response.
pub struct MockVisionClient {
    response: String,
    calls: AtomicUsize,
}

impl MockVisionClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VisionClient for MockVisionClient {
    fn model_name(&self) -> &str {
        "mock-vision"
    }

    fn generate_with_image(
        &self,
        _prompt: &str,
        _image_base64: &str,
        _mime_type: &str,
    ) -> Result<String, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

/// Returns scripted results in order. Once exhausted, every call fails.
pub struct SequenceVisionClient {
    responses: Mutex<VecDeque<Result<String, VisionError>>>,
    calls: AtomicUsize,
}

impl SequenceVisionClient {
    pub fn new(responses: Vec<Result<String, VisionError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VisionClient for SequenceVisionClient {
    fn model_name(&self) -> &str {
        "sequence-vision"
    }

    fn generate_with_image(
        &self,
        _prompt: &str,
        _image_base64: &str,
        _mime_type: &str,
    ) -> Result<String, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .map_err(|_| VisionError::Response("sequence client poisoned".into()))?
            .pop_front()
            .unwrap_or_else(|| Err(VisionError::Response("no scripted response left".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_requires_credential() {
        assert!(matches!(
            GeminiVisionClient::new(&VisionConfig::default()),
            Err(VisionError::Auth(_))
        ));
        assert!(GeminiVisionClient::new(&VisionConfig::with_api_key("   ")).is_err());
    }

    #[test]
    fn url_targets_model() {
        let config = VisionConfig {
            endpoint: "https://example.test/".into(),
            ..VisionConfig::with_api_key("k")
        };
        let client = GeminiVisionClient::new(&config).unwrap();
        assert_eq!(
            client.url(),
            "https://example.test/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert_eq!(client.model_name(), "gemini-1.5-flash");
    }

    #[test]
    fn request_body_shape() {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: "read this" },
                    Part::Image {
                        inline_data: InlineData {
                            mime_type: "image/jpeg",
                            data: "QUJD",
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                response_mime_type: "application/json",
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "read this");
        assert_eq!(json["contents"][0]["parts"][1]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn response_text_extracted() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"[]"}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(first_candidate_text(parsed).as_deref(), Some("[]"));

        let empty: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(first_candidate_text(empty).is_none());
    }

    #[test]
    fn http_errors_classified() {
        assert!(classify_http_error(429, "").is_rate_limited());
        let exhausted = r#"{"error":{"code":503,"message":"quota","status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(classify_http_error(503, exhausted).is_rate_limited());
        assert!(matches!(classify_http_error(403, "{}"), VisionError::Auth(403)));
        match classify_http_error(500, r#"{"error":{"message":"boom","status":"INTERNAL"}}"#) {
            VisionError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn sequence_client_replays_then_fails() {
        let client = SequenceVisionClient::new(vec![
            Err(VisionError::RateLimited("slow down".into())),
            Ok("[]".into()),
        ]);
        assert!(client.generate_with_image("p", "d", "image/jpeg").unwrap_err().is_rate_limited());
        assert_eq!(client.generate_with_image("p", "d", "image/jpeg").unwrap(), "[]");
        assert!(client.generate_with_image("p", "d", "image/jpeg").is_err());
        assert_eq!(client.call_count(), 3);
    }
}
