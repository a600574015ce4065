use base64::{engine::general_purpose, Engine};
use std::time::Duration;

/// Instruction sent with every image, identical for all providers.
pub const RECOGNITION_PROMPT: &str = "Identify the food in this image and return its calories, protein, carbs and fat \
     as a JSON object. Format: {\"name\": \"...\", \"calories\": 0, \"protein\": 0, \"carbs\": 0, \"fat\": 0}. \
     Respond with JSON only.";

/// Image bytes plus the MIME type sniffed from their magic number.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    bytes: Vec<u8>,
    mime_type: &'static str,
}

impl ImagePayload {
    /// Returns `None` when the bytes are not a JPEG, PNG, GIF or WebP image.
    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        let mime_type = sniff_mime(&bytes)?;
        Some(Self { bytes, mime_type })
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64())
    }
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Why a single provider/model attempt produced no usable estimate.
/// Never reaches the caller of the recognition pipeline.
#[derive(Debug, thiserror::Error)]
pub enum AttemptFailure {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider response contained no text")]
    EmptyResponse,

    #[error("unparseable response: {0}")]
    Unparseable(String),
}

impl From<reqwest::Error> for AttemptFailure {
    fn from(e: reqwest::Error) -> Self {
        AttemptFailure::Transport(e.to_string())
    }
}

/// A vision-capable inference endpoint offering one or more models.
#[async_trait::async_trait]
pub trait VisionProvider: Send + Sync {
    /// Short provider name used in provenance tags, e.g. "groq".
    fn name(&self) -> &str;

    /// Models to try, in order.
    fn models(&self) -> &[String];

    /// Fixed confidence stamped on estimates from this provider.
    fn confidence(&self) -> f64;

    /// One inference request; returns the model's raw text answer.
    async fn attempt(&self, model: &str, image: &ImagePayload) -> Result<String, AttemptFailure>;
}
