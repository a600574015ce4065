//! Image-to-nutrition recognition.
//!
//! `RecognitionService::analyze` walks the configured providers in priority
//! order and each provider's models in order, stopping at the first answer the
//! normalizer accepts. Transport errors, timeouts and unparseable answers only
//! move the cascade forward. When nothing succeeds a simulated estimate is
//! returned, so the only error a caller can see is a rejected image.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{ProviderKind, ProviderSettings, RecognitionConfig};
use crate::models::{NutritionEstimate, Provenance};

use super::ai_service::{AttemptFailure, ImagePayload, VisionProvider};
use super::gemini::GeminiProvider;
use super::normalizer::normalize;
use super::openai_compatible::OpenAiCompatibleProvider;
use super::simulation::simulate_estimate;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("Please upload an image")]
    EmptyImage,

    #[error("Unsupported or corrupt image: expected JPEG, PNG, GIF or WebP")]
    UnsupportedImage,

    #[error("Image too large: {size} bytes (max {limit})")]
    ImageTooLarge { size: usize, limit: usize },
}

pub struct RecognitionService {
    providers: Vec<Arc<dyn VisionProvider>>,
    attempt_timeout: Duration,
    simulated_latency: Duration,
    max_image_bytes: usize,
}

impl RecognitionService {
    /// Builds HTTP clients for every enabled provider in `config`.
    pub fn from_config(config: &RecognitionConfig) -> Self {
        let providers = config.enabled_providers().filter_map(build_provider).collect();
        Self::with_providers(providers, config)
    }

    pub fn with_providers(providers: Vec<Arc<dyn VisionProvider>>, config: &RecognitionConfig) -> Self {
        Self {
            providers,
            attempt_timeout: config.attempt_timeout,
            simulated_latency: config.simulated_latency,
            max_image_bytes: config.max_image_bytes,
        }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub async fn analyze(&self, image_bytes: Vec<u8>) -> Result<NutritionEstimate, AnalysisError> {
        let image = self.validate(image_bytes)?;
        log::debug!("📊 Analyzing {} image, {} bytes", image.mime_type(), image.len());

        if let Some(estimate) = self.run_cascade(&image).await {
            return Ok(estimate);
        }

        log::warn!("⚠️ AI providers failed. Using simulation mode.");
        Ok(self.simulate().await)
    }

    fn validate(&self, bytes: Vec<u8>) -> Result<ImagePayload, AnalysisError> {
        if bytes.is_empty() {
            return Err(AnalysisError::EmptyImage);
        }
        if bytes.len() > self.max_image_bytes {
            return Err(AnalysisError::ImageTooLarge {
                size: bytes.len(),
                limit: self.max_image_bytes,
            });
        }
        ImagePayload::from_bytes(bytes).ok_or(AnalysisError::UnsupportedImage)
    }

    async fn run_cascade(&self, image: &ImagePayload) -> Option<NutritionEstimate> {
        for provider in &self.providers {
            for model in provider.models() {
                match self.try_model(provider.as_ref(), model, image).await {
                    Ok(estimate) => {
                        log::info!("✅ Analyzed with {} ({}): {}", provider.name(), model, estimate.name);
                        return Some(estimate);
                    }
                    Err(e) => log::warn!("⚠️ {} {} failed: {}", provider.name(), model, e),
                }
            }
            log::warn!("⚠️ All {} vision models failed", provider.name());
        }
        None
    }

    async fn try_model(
        &self,
        provider: &dyn VisionProvider,
        model: &str,
        image: &ImagePayload,
    ) -> Result<NutritionEstimate, AttemptFailure> {
        let raw = tokio::time::timeout(self.attempt_timeout, provider.attempt(model, image))
            .await
            .map_err(|_| AttemptFailure::Timeout(self.attempt_timeout))??;
        log::debug!("💬 {} ({}) response: {}", provider.name(), model, raw);

        let parsed = normalize(&raw).map_err(|e| AttemptFailure::Unparseable(e.to_string()))?;

        Ok(NutritionEstimate {
            name: parsed.name,
            calories: parsed.calories,
            protein: parsed.protein,
            carbs: parsed.carbs,
            fat: parsed.fat,
            confidence: provider.confidence().clamp(0.0, 1.0),
            provenance: Provenance::Provider {
                provider: provider.name().to_string(),
                model: model.to_string(),
            },
        })
    }

    async fn simulate(&self) -> NutritionEstimate {
        let estimate = simulate_estimate(&mut rand::thread_rng());
        if !self.simulated_latency.is_zero() {
            tokio::time::sleep(self.simulated_latency).await;
        }
        estimate
    }
}

fn build_provider(settings: &ProviderSettings) -> Option<Arc<dyn VisionProvider>> {
    let api_key = settings.api_key.clone()?;
    let models = settings.models.clone();
    let base_url = settings.base_url.as_deref();

    let provider: Arc<dyn VisionProvider> = match settings.kind {
        ProviderKind::Groq | ProviderKind::OpenRouter => {
            let provider = if settings.kind == ProviderKind::Groq {
                OpenAiCompatibleProvider::groq(api_key, models, settings.confidence)
            } else {
                OpenAiCompatibleProvider::openrouter(api_key, models, settings.confidence)
            };
            match base_url {
                Some(url) => Arc::new(provider.with_base_url(url)),
                None => Arc::new(provider),
            }
        }
        ProviderKind::Gemini => {
            let provider = GeminiProvider::new(api_key, models, settings.confidence);
            match base_url {
                Some(url) => Arc::new(provider.with_base_url(url)),
                None => Arc::new(provider),
            }
        }
    };
    Some(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::simulation::SIMULATED_CONFIDENCE;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    #[derive(Clone)]
    enum Reply {
        Text(&'static str),
        Fail,
        Hang,
    }

    struct MockProvider {
        name: &'static str,
        models: Vec<String>,
        confidence: f64,
        replies: HashMap<String, Reply>,
        calls: AtomicUsize,
        attempted: Mutex<Vec<String>>,
    }

    impl MockProvider {
        fn new(name: &'static str, confidence: f64, replies: &[(&str, Reply)]) -> Arc<Self> {
            Arc::new(Self {
                name,
                models: replies.iter().map(|(m, _)| m.to_string()).collect(),
                confidence,
                replies: replies.iter().map(|(m, r)| (m.to_string(), r.clone())).collect(),
                calls: AtomicUsize::new(0),
                attempted: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn attempted(&self) -> Vec<String> {
            self.attempted.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl VisionProvider for MockProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn models(&self) -> &[String] {
            &self.models
        }

        fn confidence(&self) -> f64 {
            self.confidence
        }

        async fn attempt(&self, model: &str, _image: &ImagePayload) -> Result<String, AttemptFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.attempted.lock().unwrap().push(model.to_string());

            match self.replies.get(model) {
                Some(Reply::Text(text)) => Ok(text.to_string()),
                Some(Reply::Hang) => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Err(AttemptFailure::EmptyResponse)
                }
                Some(Reply::Fail) | None => Err(AttemptFailure::Transport("connection refused".to_string())),
            }
        }
    }

    const APPLE: &str = r#"{"name":"Apple","calories":95,"protein":0,"carbs":25,"fat":0}"#;
    const SALMON: &str = r#"Here you go: {"name":"Salmon","calories":480,"protein":38} enjoy"#;

    fn config() -> RecognitionConfig {
        RecognitionConfig {
            attempt_timeout: Duration::from_millis(100),
            ..RecognitionConfig::simulated_only()
        }
    }

    fn service(providers: Vec<Arc<MockProvider>>) -> RecognitionService {
        let providers = providers
            .into_iter()
            .map(|p| p as Arc<dyn VisionProvider>)
            .collect();
        RecognitionService::with_providers(providers, &config())
    }

    fn assert_simulated(estimate: &NutritionEstimate) {
        assert_eq!(estimate.provenance, Provenance::Simulated);
        assert!(SIMULATED_CONFIDENCE.contains(&estimate.confidence));
        assert!(!estimate.name.is_empty());
        assert!(estimate.calories > 0.0);
    }

    #[tokio::test]
    async fn test_no_providers_always_simulates() {
        let service = RecognitionService::from_config(&RecognitionConfig::simulated_only());
        assert!(service.provider_names().is_empty());

        for _ in 0..10 {
            let estimate = service.analyze(JPEG.to_vec()).await.unwrap();
            assert_simulated(&estimate);
        }
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let primary = MockProvider::new("groq", 0.92, &[("scout", Reply::Text(APPLE)), ("maverick", Reply::Text(SALMON))]);
        let secondary = MockProvider::new("gemini", 0.95, &[("flash", Reply::Text(SALMON))]);

        let estimate = service(vec![primary.clone(), secondary.clone()])
            .analyze(JPEG.to_vec())
            .await
            .unwrap();

        assert_eq!(estimate.name, "Apple");
        assert_eq!(estimate.calories, 95.0);
        assert_eq!(estimate.carbs, 25.0);
        assert_eq!(estimate.confidence, 0.92);
        assert_eq!(
            estimate.provenance,
            Provenance::Provider {
                provider: "groq".to_string(),
                model: "scout".to_string()
            }
        );
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_garbage_advances_to_next_model() {
        let primary = MockProvider::new(
            "groq",
            0.92,
            &[("scout", Reply::Text("I'm not sure what this is.")), ("maverick", Reply::Text(SALMON))],
        );
        let secondary = MockProvider::new("gemini", 0.95, &[("flash", Reply::Text(APPLE))]);

        let estimate = service(vec![primary.clone(), secondary.clone()])
            .analyze(JPEG.to_vec())
            .await
            .unwrap();

        assert_eq!(estimate.name, "Salmon");
        assert_eq!(estimate.fat, 0.0);
        assert_eq!(estimate.provenance.to_string(), "groq/maverick");
        assert_eq!(primary.attempted(), vec!["scout", "maverick"]);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_falls_back_to_next_provider() {
        let primary = MockProvider::new("groq", 0.92, &[("scout", Reply::Fail), ("maverick", Reply::Fail)]);
        let secondary = MockProvider::new(
            "gemini",
            0.95,
            &[("gemini-2.0-flash", Reply::Text("{\"name\": \"Soup\"}")), ("gemini-1.5-flash", Reply::Text(APPLE))],
        );

        let estimate = service(vec![primary.clone(), secondary.clone()])
            .analyze(JPEG.to_vec())
            .await
            .unwrap();

        assert_eq!(estimate.name, "Apple");
        assert_eq!(estimate.confidence, 0.95);
        assert_eq!(estimate.provenance.to_string(), "gemini/gemini-1.5-flash");
        assert_eq!(primary.calls(), 2);
        assert_eq!(secondary.calls(), 2);
    }

    #[tokio::test]
    async fn test_total_exhaustion_simulates() {
        let primary = MockProvider::new("groq", 0.92, &[("scout", Reply::Text("<html>502</html>")), ("maverick", Reply::Fail)]);
        let secondary = MockProvider::new("gemini", 0.95, &[("flash", Reply::Text("{\"calories\": 10}"))]);

        let estimate = service(vec![primary.clone(), secondary.clone()])
            .analyze(JPEG.to_vec())
            .await
            .unwrap();

        assert_simulated(&estimate);
        assert_eq!(primary.calls(), 2);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_an_attempt_failure() {
        let primary = MockProvider::new("groq", 0.92, &[("slow", Reply::Hang), ("fast", Reply::Text(APPLE))]);

        let started = std::time::Instant::now();
        let estimate = service(vec![primary.clone()]).analyze(JPEG.to_vec()).await.unwrap();

        assert_eq!(estimate.provenance.to_string(), "groq/fast");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(primary.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalid_images_are_rejected() {
        let primary = MockProvider::new("groq", 0.92, &[("scout", Reply::Text(APPLE))]);
        let service = service(vec![primary.clone()]);

        assert_eq!(service.analyze(Vec::new()).await, Err(AnalysisError::EmptyImage));
        assert_eq!(
            service.analyze(b"definitely not an image".to_vec()).await,
            Err(AnalysisError::UnsupportedImage)
        );

        let mut huge = JPEG.to_vec();
        huge.resize(config().max_image_bytes + 1, 0);
        assert!(matches!(
            service.analyze(huge).await,
            Err(AnalysisError::ImageTooLarge { .. })
        ));

        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_independent() {
        let primary = MockProvider::new("groq", 0.92, &[("scout", Reply::Text(APPLE))]);
        let service = service(vec![primary.clone()]);

        let (a, b) = tokio::join!(service.analyze(JPEG.to_vec()), service.analyze(JPEG.to_vec()));

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(primary.calls(), 2);
    }

    #[test]
    fn test_disabled_providers_are_not_built() {
        let mut config = RecognitionConfig::simulated_only();
        config.providers = vec![
            ProviderSettings {
                kind: ProviderKind::Groq,
                api_key: None,
                models: vec!["scout".to_string()],
                confidence: 0.92,
                base_url: None,
            },
            ProviderSettings {
                kind: ProviderKind::Gemini,
                api_key: Some("key".to_string()),
                models: vec!["gemini-2.0-flash".to_string()],
                confidence: 0.95,
                base_url: Some("http://localhost:9000".to_string()),
            },
        ];

        let service = RecognitionService::from_config(&config);
        assert_eq!(service.provider_names(), vec!["gemini"]);
    }
}
