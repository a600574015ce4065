use serde::{Deserialize, Serialize};

use super::ai_service::{AttemptFailure, ImagePayload, VisionProvider, RECOGNITION_PROMPT};

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        #[serde(rename = "type")]
        content_type: String,
        text: String,
    },
    ImageUrl {
        #[serde(rename = "type")]
        content_type: String,
        image_url: ImageData,
    },
}

#[derive(Debug, Serialize)]
struct ImageData {
    url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    content: Option<String>,
}

/// Vision client for any `/chat/completions` endpoint speaking the OpenAI
/// wire format (Groq, OpenRouter). The image travels inline as a base64
/// data URL.
pub struct OpenAiCompatibleProvider {
    name: String,
    base_url: String,
    api_key: String,
    models: Vec<String>,
    confidence: f64,
    extra_headers: Vec<(&'static str, &'static str)>,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(name: &str, base_url: &str, api_key: String, models: Vec<String>, confidence: f64) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            models,
            confidence,
            extra_headers: Vec::new(),
            client: reqwest::Client::new(),
        }
    }

    pub fn groq(api_key: String, models: Vec<String>, confidence: f64) -> Self {
        Self::new("groq", GROQ_BASE_URL, api_key, models, confidence)
    }

    pub fn openrouter(api_key: String, models: Vec<String>, confidence: f64) -> Self {
        let mut provider = Self::new("openrouter", OPENROUTER_BASE_URL, api_key, models, confidence);
        // OpenRouter uses these for app attribution
        provider.extra_headers = vec![
            ("HTTP-Referer", "https://github.com/nutrition-tracker"),
            ("X-Title", "Nutrition Tracker"),
        ];
        provider
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn build_request(&self, model: &str, image: &ImagePayload) -> ChatRequest {
        let data_url = image.data_url();
        log::debug!("🖼️ Image data URL created: {}... (first 100 chars)", &data_url[..100.min(data_url.len())]);

        ChatRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        content_type: "text".to_string(),
                        text: RECOGNITION_PROMPT.to_string(),
                    },
                    ContentPart::ImageUrl {
                        content_type: "image_url".to_string(),
                        image_url: ImageData { url: data_url },
                    },
                ],
            }],
            max_tokens: 500,
        }
    }
}

#[async_trait::async_trait]
impl VisionProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn models(&self) -> &[String] {
        &self.models
    }

    fn confidence(&self) -> f64 {
        self.confidence
    }

    async fn attempt(&self, model: &str, image: &ImagePayload) -> Result<String, AttemptFailure> {
        let request = self.build_request(model, image);

        log::info!("🤖 Sending request to {} with model: {}", self.name, model);

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        for (name, value) in &self.extra_headers {
            builder = builder.header(*name, *value);
        }

        let response = builder.json(&request).send().await?;
        log::debug!("📥 {} response status: {}", self.name, response.status());

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptFailure::Status { status, body });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AttemptFailure::Unparseable(format!("unexpected response envelope: {}", e)))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(AttemptFailure::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn image() -> ImagePayload {
        ImagePayload::from_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0]).unwrap()
    }

    fn provider(base_url: &str) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::groq("test_key".to_string(), vec!["vision-model".to_string()], 0.92)
            .with_base_url(base_url)
    }

    #[test]
    fn test_request_carries_prompt_and_image() {
        let request = provider(GROQ_BASE_URL).build_request("vision-model", &image());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "vision-model");
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
        assert_eq!(json["messages"][0]["content"][1]["type"], "image_url");
        assert!(json["messages"][0]["content"][1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
    }

    #[tokio::test]
    async fn test_attempt_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test_key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "{\"name\":\"Apple\",\"calories\":95}" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = provider(&server.uri()).attempt("vision-model", &image()).await.unwrap();
        assert_eq!(text, "{\"name\":\"Apple\",\"calories\":95}");
    }

    #[tokio::test]
    async fn test_rate_limit_is_an_attempt_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = provider(&server.uri()).attempt("vision-model", &image()).await.unwrap_err();
        assert!(matches!(err, AttemptFailure::Status { status: 429, .. }));
    }

    #[tokio::test]
    async fn test_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
            .mount(&server)
            .await;

        let err = provider(&server.uri()).attempt("vision-model", &image()).await.unwrap_err();
        assert!(matches!(err, AttemptFailure::EmptyResponse));
    }
}
