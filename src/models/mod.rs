use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Structured nutrition estimate produced by the recognition pipeline.
///
/// Every field is always populated: a provider response that cannot fill
/// `name` and `calories` never becomes an estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionEstimate {
    pub name: String,
    pub calories: f64, // kcal
    pub protein: f64,  // g
    pub carbs: f64,    // g
    pub fat: f64,      // g
    pub confidence: f64,
    pub provenance: Provenance,
}

/// Which provider/model (or the simulated path) produced an estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum Provenance {
    Provider { provider: String, model: String },
    Simulated,
}

impl Provenance {
    /// Human readable status line returned alongside the estimate.
    pub fn describe(&self) -> String {
        match self {
            Provenance::Provider { provider, model } => {
                format!("Success: Analyzed with {} ({}).", provider, model)
            }
            Provenance::Simulated => {
                "SIMULATED: No active AI provider (using realistic demo data).".to_string()
            }
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provenance::Provider { provider, model } => write!(f, "{}/{}", provider, model),
            Provenance::Simulated => write!(f, "simulated"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    #[default]
    Snack,
}

impl MealType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MealType::Breakfast => "breakfast",
            MealType::Lunch => "lunch",
            MealType::Dinner => "dinner",
            MealType::Snack => "snack",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "breakfast" => Some(MealType::Breakfast),
            "lunch" => Some(MealType::Lunch),
            "dinner" => Some(MealType::Dinner),
            "snack" => Some(MealType::Snack),
            _ => None,
        }
    }
}

impl std::fmt::Display for MealType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Catalog food. Macros are per serving (`serving_amount` `serving_unit`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Food {
    pub id: Option<i64>,
    pub name: String,
    pub brand: Option<String>,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub serving_amount: f64,
    pub serving_unit: String,
    pub is_custom: bool,
    pub created_by: Option<String>,
}

impl Food {
    /// Custom catalog entry for a food detected from a photo.
    pub fn from_estimate(estimate: &NutritionEstimate, user_id: &str) -> Self {
        Self {
            id: None,
            name: estimate.name.clone(),
            brand: None,
            calories: estimate.calories,
            protein: estimate.protein,
            carbs: estimate.carbs,
            fat: estimate.fat,
            serving_amount: 1.0,
            serving_unit: "serving".to_string(),
            is_custom: true,
            created_by: Some(user_id.to_string()),
        }
    }
}

/// One confirmed food in a daily log.
///
/// `quantity` is a number of servings of the referenced food; macros are the
/// food's per-serving values times `quantity`, rounded to whole units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Option<i64>,
    pub food_id: i64,
    pub food_name: String,
    pub meal_type: MealType,
    pub quantity: f64,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl LogEntry {
    pub fn from_food(food_id: i64, food: &Food, quantity: f64, meal_type: MealType) -> Self {
        Self {
            id: None,
            food_id,
            food_name: food.name.clone(),
            meal_type,
            quantity,
            calories: (food.calories * quantity).round(),
            protein: (food.protein * quantity).round(),
            carbs: (food.carbs * quantity).round(),
            fat: (food.fat * quantity).round(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DailyTotals {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl DailyTotals {
    pub fn from_entries(entries: &[LogEntry]) -> Self {
        entries.iter().fold(Self::default(), |acc, entry| Self {
            calories: acc.calories + entry.calories,
            protein: acc.protein + entry.protein,
            carbs: acc.carbs + entry.carbs,
            fat: acc.fat + entry.fat,
        })
    }
}

/// Per-user, per-date aggregate of confirmed entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyLog {
    pub user_id: String,
    pub date: NaiveDate,
    pub entries: Vec<LogEntry>,
    pub totals: DailyTotals,
}

impl DailyLog {
    pub fn empty(user_id: &str, date: NaiveDate) -> Self {
        Self {
            user_id: user_id.to_string(),
            date,
            entries: Vec::new(),
            totals: DailyTotals::default(),
        }
    }

    pub fn with_entries(user_id: &str, date: NaiveDate, entries: Vec<LogEntry>) -> Self {
        let totals = DailyTotals::from_entries(&entries);
        Self {
            user_id: user_id.to_string(),
            date,
            entries,
            totals,
        }
    }

    pub fn add_entry(&mut self, entry: LogEntry) {
        self.entries.push(entry);
        self.recompute_totals();
    }

    /// Returns false when no entry has that id.
    pub fn remove_entry(&mut self, entry_id: i64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != Some(entry_id));
        self.recompute_totals();
        self.entries.len() != before
    }

    fn recompute_totals(&mut self) {
        self.totals = DailyTotals::from_entries(&self.entries);
    }
}

/// One tracked day as shown on the weekly chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayStats {
    pub date: NaiveDate,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl DayStats {
    pub fn new(date: NaiveDate, totals: DailyTotals) -> Self {
        Self {
            date,
            calories: totals.calories,
            protein: totals.protein,
            carbs: totals.carbs,
            fat: totals.fat,
        }
    }

    /// Rows are fetched newest first; charts want them oldest first.
    pub fn chronological(mut days: Vec<DayStats>) -> Vec<DayStats> {
        days.sort_by_key(|day| day.date);
        days
    }
}

/// Lifetime calorie summary across every tracked day.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_calories: f64,
    pub avg_calories: f64,
    pub days_tracked: i64,
}

impl StatsSummary {
    /// SUM and AVG are NULL when the user has no logs.
    pub fn from_aggregate(total_calories: Option<f64>, avg_calories: Option<f64>, days_tracked: i64) -> Self {
        if days_tracked == 0 {
            return Self::default();
        }
        Self {
            total_calories: total_calories.unwrap_or(0.0),
            avg_calories: avg_calories.unwrap_or(0.0),
            days_tracked,
        }
    }
}

/// Stored record of one analysis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionEvent {
    pub id: Option<i64>,
    pub user_id: String,
    pub detected_name: String,
    pub detected_calories: f64,
    pub confidence: f64,
    pub provenance: String,
    pub raw_response: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl RecognitionEvent {
    pub fn from_estimate(user_id: &str, estimate: &NutritionEstimate) -> Self {
        Self {
            id: None,
            user_id: user_id.to_string(),
            detected_name: estimate.name.clone(),
            detected_calories: estimate.calories,
            confidence: estimate.confidence,
            provenance: estimate.provenance.to_string(),
            raw_response: serde_json::to_value(estimate).unwrap_or(serde_json::Value::Null),
            created_at: Utc::now(),
        }
    }

    /// Rebuilds the estimate stored in `raw_response`.
    pub fn estimate(&self) -> Option<NutritionEstimate> {
        serde_json::from_value(self.raw_response.clone()).ok()
    }
}
