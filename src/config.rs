use anyhow::{Context, Result};
use std::{env, fmt::Display, str::FromStr, time::Duration};

/// Provider priority used when `RECOGNITION_PROVIDERS` is not set.
pub const DEFAULT_PROVIDER_ORDER: &str = "groq,gemini,openrouter";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
const MAX_IMAGE_BYTES_CEILING: usize = 64 * 1024 * 1024;

// Left over in many .env templates; never a real key.
const KEY_PLACEHOLDER: &str = "your_openai_api_key_here";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Groq,
    Gemini,
    OpenRouter,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Groq => "groq",
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenRouter => "openrouter",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Some(ProviderKind::Groq),
            "gemini" => Some(ProviderKind::Gemini),
            "openrouter" => Some(ProviderKind::OpenRouter),
            _ => None,
        }
    }

    /// Credential variables, first non-empty one wins.
    fn key_vars(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::Groq => &["GROQ_API_KEY"],
            ProviderKind::Gemini => &["GEMINI_API_KEY", "AI_API_KEY"],
            ProviderKind::OpenRouter => &["OPENROUTER_API_KEY"],
        }
    }

    fn models_var(&self) -> &'static str {
        match self {
            ProviderKind::Groq => "GROQ_VISION_MODELS",
            ProviderKind::Gemini => "GEMINI_VISION_MODELS",
            ProviderKind::OpenRouter => "OPENROUTER_VISION_MODELS",
        }
    }

    fn base_url_var(&self) -> &'static str {
        match self {
            ProviderKind::Groq => "GROQ_BASE_URL",
            ProviderKind::Gemini => "GEMINI_BASE_URL",
            ProviderKind::OpenRouter => "OPENROUTER_BASE_URL",
        }
    }

    fn confidence_var(&self) -> &'static str {
        match self {
            ProviderKind::Groq => "GROQ_CONFIDENCE",
            ProviderKind::Gemini => "GEMINI_CONFIDENCE",
            ProviderKind::OpenRouter => "OPENROUTER_CONFIDENCE",
        }
    }

    pub fn default_models(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::Groq => &[
                "meta-llama/llama-4-scout-17b-16e-instruct",
                "meta-llama/llama-4-maverick-17b-128e-instruct",
            ],
            ProviderKind::Gemini => &["gemini-2.0-flash", "gemini-1.5-flash", "gemini-1.5-pro"],
            ProviderKind::OpenRouter => &["meta-llama/llama-4-scout:free"],
        }
    }

    /// Fixed trust score stamped on every estimate from this provider.
    /// Placeholder values, not calibrated against model output.
    pub fn default_confidence(&self) -> f64 {
        match self {
            ProviderKind::Groq => 0.92,
            ProviderKind::Gemini => 0.95,
            ProviderKind::OpenRouter => 0.90,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub api_key: Option<String>,
    pub models: Vec<String>,
    pub confidence: f64,
    /// Overrides the provider's public endpoint, e.g. for a proxy.
    pub base_url: Option<String>,
}

impl ProviderSettings {
    /// A provider without credentials (or without models) is skipped entirely.
    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some() && !self.models.is_empty()
    }
}

/// Recognition pipeline settings. Built once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    pub providers: Vec<ProviderSettings>,
    pub attempt_timeout: Duration,
    pub simulated_latency: Duration,
    pub max_image_bytes: usize,
}

impl RecognitionConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let order = lookup("RECOGNITION_PROVIDERS")
            .unwrap_or_else(|| DEFAULT_PROVIDER_ORDER.to_string());

        let mut providers: Vec<ProviderSettings> = Vec::new();
        for name in split_list(&order) {
            let kind = ProviderKind::from_string(&name)
                .with_context(|| format!("Unknown recognition provider '{}'", name))?;

            if providers.iter().any(|p| p.kind == kind) {
                log::warn!("⚠️ Provider {} listed twice in RECOGNITION_PROVIDERS, ignoring repeat", kind);
                continue;
            }

            let api_key = kind
                .key_vars()
                .iter()
                .filter_map(|var| lookup(var))
                .map(|key| key.trim().to_string())
                .find(|key| !key.is_empty() && key != KEY_PLACEHOLDER);

            let models = match lookup(kind.models_var()) {
                Some(list) => split_list(&list),
                None => kind.default_models().iter().map(|m| m.to_string()).collect(),
            };

            let confidence: f64 = parse_var(&lookup, kind.confidence_var(), kind.default_confidence())?;
            if !(0.0..=1.0).contains(&confidence) {
                anyhow::bail!("{} must be within [0, 1], got {}", kind.confidence_var(), confidence);
            }

            let base_url = lookup(kind.base_url_var())
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty());

            providers.push(ProviderSettings {
                kind,
                api_key,
                models,
                confidence,
                base_url,
            });
        }

        let timeout_secs: u64 =
            parse_var(&lookup, "RECOGNITION_ATTEMPT_TIMEOUT_SECS", DEFAULT_ATTEMPT_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            anyhow::bail!("RECOGNITION_ATTEMPT_TIMEOUT_SECS must be greater than zero");
        }
        let latency_ms: u64 = parse_var(&lookup, "SIMULATED_LATENCY_MS", 0)?;
        let max_image_bytes: usize = parse_var(&lookup, "MAX_IMAGE_BYTES", DEFAULT_MAX_IMAGE_BYTES)?;
        if max_image_bytes == 0 || max_image_bytes > MAX_IMAGE_BYTES_CEILING {
            anyhow::bail!(
                "MAX_IMAGE_BYTES must be between 1 and {}, got {}",
                MAX_IMAGE_BYTES_CEILING,
                max_image_bytes
            );
        }

        Ok(Self {
            providers,
            attempt_timeout: Duration::from_secs(timeout_secs),
            simulated_latency: Duration::from_millis(latency_ms),
            max_image_bytes,
        })
    }

    /// No providers at all: every analysis resolves through the simulated path.
    pub fn simulated_only() -> Self {
        Self {
            providers: Vec::new(),
            attempt_timeout: Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS),
            simulated_latency: Duration::ZERO,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderSettings> {
        self.providers.iter().filter(|p| p.is_enabled())
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub recognition: RecognitionConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| {
            log::info!("BIND_ADDR not set, using default: {}", DEFAULT_BIND_ADDR);
            DEFAULT_BIND_ADDR.to_string()
        });

        Ok(Self {
            database_url,
            bind_addr,
            recognition: RecognitionConfig::from_env()?,
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {} value '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<RecognitionConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RecognitionConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_no_credentials_disables_every_provider() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.providers.len(), 3);
        assert_eq!(config.enabled_providers().count(), 0);
        assert_eq!(config.attempt_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_default_order_and_models() {
        let config = config_from(&[
            ("GROQ_API_KEY", "gsk_test"),
            ("GEMINI_API_KEY", "g_test"),
            ("GROQ_BASE_URL", "http://localhost:9000/v1"),
        ])
        .unwrap();

        let kinds: Vec<_> = config.providers.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![ProviderKind::Groq, ProviderKind::Gemini, ProviderKind::OpenRouter]);

        let groq = &config.providers[0];
        assert!(groq.is_enabled());
        assert_eq!(groq.models.len(), 2);
        assert_eq!(groq.confidence, 0.92);
        assert_eq!(groq.base_url.as_deref(), Some("http://localhost:9000/v1"));
        assert_eq!(config.providers[1].confidence, 0.95);
        assert!(!config.providers[2].is_enabled());
    }

    #[test]
    fn test_gemini_legacy_key_and_placeholder() {
        let config = config_from(&[("AI_API_KEY", "legacy")]).unwrap();
        assert_eq!(config.providers[1].api_key.as_deref(), Some("legacy"));

        let config = config_from(&[("GEMINI_API_KEY", "your_openai_api_key_here")]).unwrap();
        assert!(config.providers[1].api_key.is_none());
    }

    #[test]
    fn test_custom_order_and_models() {
        let config = config_from(&[
            ("RECOGNITION_PROVIDERS", "gemini, groq, gemini"),
            ("GEMINI_VISION_MODELS", "gemini-2.5-flash , gemini-2.0-flash"),
        ])
        .unwrap();

        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].kind, ProviderKind::Gemini);
        assert_eq!(config.providers[0].models, vec!["gemini-2.5-flash", "gemini-2.0-flash"]);
        assert!(config.providers[0].base_url.is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(config_from(&[("RECOGNITION_PROVIDERS", "groq,claude")]).is_err());
        assert!(config_from(&[("GROQ_CONFIDENCE", "1.5")]).is_err());
        assert!(config_from(&[("RECOGNITION_ATTEMPT_TIMEOUT_SECS", "soon")]).is_err());
        assert!(config_from(&[("RECOGNITION_ATTEMPT_TIMEOUT_SECS", "0")]).is_err());
    }

    #[test]
    fn test_max_image_bytes_is_bounded() {
        assert!(config_from(&[("MAX_IMAGE_BYTES", &usize::MAX.to_string())]).is_err());
        assert!(config_from(&[("MAX_IMAGE_BYTES", "0")]).is_err());

        let config = config_from(&[("MAX_IMAGE_BYTES", "67108864")]).unwrap();
        assert_eq!(config.max_image_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn test_simulated_only_has_no_providers() {
        let config = RecognitionConfig::simulated_only();
        assert_eq!(config.enabled_providers().count(), 0);
    }
}
