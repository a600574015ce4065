use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::handlers::log_handler::validate_quantity;
use crate::models::{DailyLog, Food, LogEntry, MealType, NutritionEstimate, RecognitionEvent};
use crate::services::{Database, RecognitionService};

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub success: bool,
    pub data: NutritionEstimate,
    pub message: String,
    pub recognition_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub date: NaiveDate,
    #[serde(default = "one_serving")]
    pub quantity: f64,
    #[serde(default)]
    pub meal_type: MealType,
}

fn one_serving() -> f64 {
    1.0
}

/// Photo analysis for an authenticated user: run recognition, record the
/// event, and later fold a confirmed result into the daily log.
pub struct AnalysisHandler {
    db: Arc<Database>,
    recognition: Arc<RecognitionService>,
}

impl AnalysisHandler {
    pub fn new(db: Arc<Database>, recognition: Arc<RecognitionService>) -> Self {
        Self { db, recognition }
    }

    pub async fn analyze_and_record(&self, user_id: &str, image: Vec<u8>) -> Result<AnalysisResponse, ApiError> {
        log::info!("📸 Analysis request from {} ({} bytes)", user_id, image.len());

        let estimate = self.recognition.analyze(image).await?;

        let event = RecognitionEvent::from_estimate(user_id, &estimate);
        let recognition_id = self.db.add_recognition_event(&event).await?;
        log::info!(
            "📝 Recognition {} recorded: {} ({:.0} kcal, {})",
            recognition_id,
            estimate.name,
            estimate.calories,
            estimate.provenance
        );

        Ok(AnalysisResponse {
            success: true,
            message: estimate.provenance.describe(),
            data: estimate,
            recognition_id,
        })
    }

    /// Adds a confirmed recognition to the user's log for `request.date`.
    pub async fn confirm(&self, user_id: &str, recognition_id: i64, request: ConfirmRequest) -> Result<DailyLog, ApiError> {
        let quantity = validate_quantity(request.quantity)?;

        let event = self
            .db
            .get_recognition_event(user_id, recognition_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Recognition not found".to_string()))?;

        let estimate = event
            .estimate()
            .ok_or_else(|| anyhow::anyhow!("Recognition {} has an unreadable estimate", recognition_id))?;

        // Always a fresh custom food so the entry's food_id carries the confirmed macros
        let food = Food::from_estimate(&estimate, user_id);
        let food_id = self.db.insert_food(&food).await?;

        let entry = LogEntry::from_food(food_id, &food, quantity, request.meal_type);
        let log = self.db.add_log_entry(user_id, request.date, &entry).await?;

        log::info!(
            "✅ Recognition {} confirmed for {} on {}: {:.0} kcal today",
            recognition_id,
            user_id,
            request.date,
            log.totals.calories
        );
        Ok(log)
    }
}
