use serde::{Deserialize, Serialize};

use super::ai_service::{AttemptFailure, ImagePayload, VisionProvider, RECOGNITION_PROMPT};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Debug, Deserialize)]
struct PartResponse {
    text: Option<String>,
}

/// Google Gemini `generateContent` client; the image is sent as `inline_data`.
pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    models: Vec<String>,
    confidence: f64,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: String, models: Vec<String>, confidence: f64) -> Self {
        Self {
            base_url: GEMINI_BASE_URL.to_string(),
            api_key,
            models,
            confidence,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn build_request(image: &ImagePayload) -> GeminiRequest {
        GeminiRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: RECOGNITION_PROMPT.to_string(),
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: image.mime_type().to_string(),
                            data: image.base64(),
                        },
                    },
                ],
            }],
        }
    }
}

#[async_trait::async_trait]
impl VisionProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn models(&self) -> &[String] {
        &self.models
    }

    fn confidence(&self) -> f64 {
        self.confidence
    }

    async fn attempt(&self, model: &str, image: &ImagePayload) -> Result<String, AttemptFailure> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        log::info!("🤖 Sending request to gemini with model: {}", model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::build_request(image))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptFailure::Status { status, body });
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| AttemptFailure::Unparseable(format!("unexpected response envelope: {}", e)))?;

        let text: String = gemini_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AttemptFailure::EmptyResponse);
        }
        Ok(text)
    }
}
