use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::{DailyLog, LogEntry, MealType};
use crate::services::Database;

#[derive(Debug, Deserialize)]
pub struct AddEntryRequest {
    pub date: NaiveDate,
    pub food_id: i64,
    /// Number of servings of the food.
    pub quantity: f64,
    #[serde(default)]
    pub meal_type: MealType,
}

pub struct LogHandler {
    db: Arc<Database>,
}

impl LogHandler {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Missing logs come back empty rather than as an error.
    pub async fn get_daily_log(&self, user_id: &str, date: NaiveDate) -> Result<DailyLog, ApiError> {
        let log = self.db.get_daily_log(user_id, date).await?;
        Ok(log.unwrap_or_else(|| DailyLog::empty(user_id, date)))
    }

    pub async fn add_entry(&self, user_id: &str, request: AddEntryRequest) -> Result<DailyLog, ApiError> {
        let quantity = validate_quantity(request.quantity)?;

        let food = self
            .db
            .get_food(request.food_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Food not found".to_string()))?;

        let entry = LogEntry::from_food(request.food_id, &food, quantity, request.meal_type);
        let log = self.db.add_log_entry(user_id, request.date, &entry).await?;

        log::info!(
            "🍽️ {} logged {} x{} ({}) on {}",
            user_id,
            entry.food_name,
            quantity,
            entry.meal_type,
            request.date
        );
        Ok(log)
    }

    pub async fn remove_entry(&self, user_id: &str, date: NaiveDate, entry_id: i64) -> Result<DailyLog, ApiError> {
        self.db
            .remove_log_entry(user_id, date, entry_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Log not found".to_string()))
    }
}

pub fn validate_quantity(quantity: f64) -> Result<f64, ApiError> {
    if quantity.is_finite() && quantity > 0.0 {
        Ok(quantity)
    } else {
        Err(ApiError::BadRequest(format!(
            "Quantity must be a positive number of servings, got {}",
            quantity
        )))
    }
}
