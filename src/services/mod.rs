pub mod ai_service; // Vision provider abstraction
pub mod database;
pub mod gemini;
pub mod normalizer;
pub mod openai_compatible; // Groq and OpenRouter
pub mod recognition;
pub mod simulation;

pub use database::Database;
pub use recognition::{AnalysisError, RecognitionService};
