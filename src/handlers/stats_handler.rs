use std::sync::Arc;

use crate::error::ApiError;
use crate::models::{DayStats, StatsSummary};
use crate::services::Database;

/// Tracked days shown on the weekly chart.
pub const WEEKLY_DAYS: i64 = 7;

/// Read-only views over the per-date totals kept by the daily log.
pub struct StatsHandler {
    db: Arc<Database>,
}

impl StatsHandler {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Last tracked days (not calendar days), oldest first.
    pub async fn weekly(&self, user_id: &str) -> Result<Vec<DayStats>, ApiError> {
        let days = self.db.get_recent_days(user_id, WEEKLY_DAYS).await?;
        log::debug!("📊 Weekly stats for {}: {} days", user_id, days.len());
        Ok(DayStats::chronological(days))
    }

    pub async fn summary(&self, user_id: &str) -> Result<StatsSummary, ApiError> {
        Ok(self.db.get_stats_summary(user_id).await?)
    }
}
