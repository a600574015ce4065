use anyhow::Result;
use chrono::NaiveDate;
use sqlx::{postgres::PgPoolOptions, PgConnection, PgPool, Row};

use crate::models::{DailyLog, DailyTotals, DayStats, Food, LogEntry, MealType, RecognitionEvent, StatsSummary};

pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let db = Database { pool };
        db.init_tables().await?;
        Ok(db)
    }

    /// Pool that only connects on first use. Router tests never reach the database.
    #[cfg(test)]
    pub fn lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().connect_lazy(database_url)?;
        Ok(Database { pool })
    }

    async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS foods (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                brand TEXT,
                calories DOUBLE PRECISION NOT NULL,
                protein DOUBLE PRECISION NOT NULL,
                carbs DOUBLE PRECISION NOT NULL,
                fat DOUBLE PRECISION NOT NULL,
                serving_amount DOUBLE PRECISION NOT NULL DEFAULT 100,
                serving_unit TEXT NOT NULL DEFAULT 'g',
                is_custom BOOLEAN NOT NULL DEFAULT FALSE,
                created_by TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // One aggregate row per user per calendar date
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_logs (
                user_id TEXT NOT NULL,
                log_date DATE NOT NULL,
                total_calories DOUBLE PRECISION NOT NULL DEFAULT 0,
                total_protein DOUBLE PRECISION NOT NULL DEFAULT 0,
                total_carbs DOUBLE PRECISION NOT NULL DEFAULT 0,
                total_fat DOUBLE PRECISION NOT NULL DEFAULT 0,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (user_id, log_date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // food_name is a snapshot so entries survive catalog edits
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS log_entries (
                id BIGSERIAL PRIMARY KEY,
                user_id TEXT NOT NULL,
                log_date DATE NOT NULL,
                food_id BIGINT NOT NULL,
                food_name TEXT NOT NULL,
                meal_type TEXT NOT NULL,
                quantity DOUBLE PRECISION NOT NULL,
                calories DOUBLE PRECISION NOT NULL,
                protein DOUBLE PRECISION NOT NULL,
                carbs DOUBLE PRECISION NOT NULL,
                fat DOUBLE PRECISION NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                FOREIGN KEY (user_id, log_date) REFERENCES daily_logs (user_id, log_date) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS recognition_events (
                id BIGSERIAL PRIMARY KEY,
                user_id TEXT NOT NULL,
                detected_name TEXT NOT NULL,
                detected_calories DOUBLE PRECISION NOT NULL,
                confidence DOUBLE PRECISION NOT NULL,
                provenance TEXT NOT NULL,
                raw_response JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_log_entries_user_date ON log_entries (user_id, log_date)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn get_food(&self, food_id: i64) -> Result<Option<Food>> {
        let food = sqlx::query(
            r#"
            SELECT id, name, brand, calories, protein, carbs, fat,
                   serving_amount, serving_unit, is_custom, created_by
            FROM foods WHERE id = $1
            "#,
        )
        .bind(food_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| Food {
            id: Some(row.get(0)),
            name: row.get(1),
            brand: row.get(2),
            calories: row.get(3),
            protein: row.get(4),
            carbs: row.get(5),
            fat: row.get(6),
            serving_amount: row.get(7),
            serving_unit: row.get(8),
            is_custom: row.get(9),
            created_by: row.get(10),
        });

        Ok(food)
    }

    /// Inserts a catalog food and returns its id.
    pub async fn insert_food(&self, food: &Food) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO foods (name, brand, calories, protein, carbs, fat,
                               serving_amount, serving_unit, is_custom, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(&food.name)
        .bind(&food.brand)
        .bind(food.calories)
        .bind(food.protein)
        .bind(food.carbs)
        .bind(food.fat)
        .bind(food.serving_amount)
        .bind(&food.serving_unit)
        .bind(food.is_custom)
        .bind(&food.created_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(result.get(0))
    }

    pub async fn add_recognition_event(&self, event: &RecognitionEvent) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO recognition_events (user_id, detected_name, detected_calories,
                                            confidence, provenance, raw_response, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&event.user_id)
        .bind(&event.detected_name)
        .bind(event.detected_calories)
        .bind(event.confidence)
        .bind(&event.provenance)
        .bind(&event.raw_response)
        .bind(event.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(result.get(0))
    }

    pub async fn get_recognition_event(&self, user_id: &str, event_id: i64) -> Result<Option<RecognitionEvent>> {
        let event = sqlx::query(
            r#"
            SELECT id, user_id, detected_name, detected_calories, confidence,
                   provenance, raw_response, created_at
            FROM recognition_events
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| RecognitionEvent {
            id: Some(row.get(0)),
            user_id: row.get(1),
            detected_name: row.get(2),
            detected_calories: row.get(3),
            confidence: row.get(4),
            provenance: row.get(5),
            raw_response: row.get(6),
            created_at: row.get(7),
        });

        Ok(event)
    }

    pub async fn get_daily_log(&self, user_id: &str, date: NaiveDate) -> Result<Option<DailyLog>> {
        let mut conn = self.pool.acquire().await?;

        if !daily_log_exists(&mut conn, user_id, date).await? {
            return Ok(None);
        }
        let entries = load_entries(&mut conn, user_id, date).await?;

        Ok(Some(DailyLog::with_entries(user_id, date, entries)))
    }

    /// Most recent `days` tracked dates, newest first.
    pub async fn get_recent_days(&self, user_id: &str, days: i64) -> Result<Vec<DayStats>> {
        let rows = sqlx::query(
            r#"
            SELECT log_date, total_calories, total_protein, total_carbs, total_fat
            FROM daily_logs
            WHERE user_id = $1
            ORDER BY log_date DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(days)
        .fetch_all(&self.pool)
        .await?;

        let days = rows
            .into_iter()
            .map(|row| {
                DayStats::new(
                    row.get(0),
                    DailyTotals {
                        calories: row.get(1),
                        protein: row.get(2),
                        carbs: row.get(3),
                        fat: row.get(4),
                    },
                )
            })
            .collect();

        Ok(days)
    }

    pub async fn get_stats_summary(&self, user_id: &str) -> Result<StatsSummary> {
        let row = sqlx::query(
            r#"
            SELECT SUM(total_calories), AVG(total_calories), COUNT(*)
            FROM daily_logs
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(StatsSummary::from_aggregate(row.get(0), row.get(1), row.get(2)))
    }

    /// Appends an entry and recomputes the date's totals in one transaction.
    pub async fn add_log_entry(&self, user_id: &str, date: NaiveDate, entry: &LogEntry) -> Result<DailyLog> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO daily_logs (user_id, log_date) VALUES ($1, $2) ON CONFLICT (user_id, log_date) DO NOTHING",
        )
        .bind(user_id)
        .bind(date)
        .execute(&mut *tx)
        .await?;

        // Row lock serializes concurrent writers for the same date
        lock_daily_log(&mut tx, user_id, date).await?;
        let mut log = DailyLog::with_entries(user_id, date, load_entries(&mut tx, user_id, date).await?);

        let result = sqlx::query(
            r#"
            INSERT INTO log_entries (user_id, log_date, food_id, food_name, meal_type,
                                     quantity, calories, protein, carbs, fat)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(date)
        .bind(entry.food_id)
        .bind(&entry.food_name)
        .bind(entry.meal_type.as_str())
        .bind(entry.quantity)
        .bind(entry.calories)
        .bind(entry.protein)
        .bind(entry.carbs)
        .bind(entry.fat)
        .fetch_one(&mut *tx)
        .await?;

        log.add_entry(LogEntry {
            id: Some(result.get(0)),
            ..entry.clone()
        });
        store_totals(&mut tx, &log).await?;

        tx.commit().await?;
        Ok(log)
    }

    /// `None` when the user has no log for that date.
    pub async fn remove_log_entry(&self, user_id: &str, date: NaiveDate, entry_id: i64) -> Result<Option<DailyLog>> {
        let mut tx = self.pool.begin().await?;

        if !lock_daily_log(&mut tx, user_id, date).await? {
            return Ok(None);
        }

        let mut log = DailyLog::with_entries(user_id, date, load_entries(&mut tx, user_id, date).await?);

        if log.remove_entry(entry_id) {
            sqlx::query("DELETE FROM log_entries WHERE id = $1 AND user_id = $2 AND log_date = $3")
                .bind(entry_id)
                .bind(user_id)
                .bind(date)
                .execute(&mut *tx)
                .await?;

            store_totals(&mut tx, &log).await?;
        }

        tx.commit().await?;
        Ok(Some(log))
    }
}

const DAILY_LOG_EXISTS_SQL: &str = "SELECT 1 FROM daily_logs WHERE user_id = $1 AND log_date = $2";
const LOCK_DAILY_LOG_SQL: &str = "SELECT 1 FROM daily_logs WHERE user_id = $1 AND log_date = $2 FOR UPDATE";

async fn daily_log_exists(conn: &mut PgConnection, user_id: &str, date: NaiveDate) -> Result<bool> {
    fetch_daily_log_marker(conn, DAILY_LOG_EXISTS_SQL, user_id, date).await
}

/// Only meaningful inside a transaction: the lock is held until commit.
async fn lock_daily_log(conn: &mut PgConnection, user_id: &str, date: NaiveDate) -> Result<bool> {
    fetch_daily_log_marker(conn, LOCK_DAILY_LOG_SQL, user_id, date).await
}

async fn fetch_daily_log_marker(conn: &mut PgConnection, sql: &str, user_id: &str, date: NaiveDate) -> Result<bool> {
    let row = sqlx::query(sql)
        .bind(user_id)
        .bind(date)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.is_some())
}

async fn load_entries(conn: &mut PgConnection, user_id: &str, date: NaiveDate) -> Result<Vec<LogEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT id, food_id, food_name, meal_type, quantity, calories, protein, carbs, fat
        FROM log_entries
        WHERE user_id = $1 AND log_date = $2
        ORDER BY id
        "#,
    )
    .bind(user_id)
    .bind(date)
    .fetch_all(&mut *conn)
    .await?;

    let entries = rows
        .into_iter()
        .map(|row| {
            let meal_type_str: String = row.get(3);
            let meal_type = MealType::from_string(&meal_type_str).unwrap_or_else(|| {
                log::warn!("Unknown meal type '{}', defaulting to Snack", meal_type_str);
                MealType::Snack
            });

            LogEntry {
                id: Some(row.get(0)),
                food_id: row.get(1),
                food_name: row.get(2),
                meal_type,
                quantity: row.get(4),
                calories: row.get(5),
                protein: row.get(6),
                carbs: row.get(7),
                fat: row.get(8),
            }
        })
        .collect();

    Ok(entries)
}

async fn store_totals(conn: &mut PgConnection, log: &DailyLog) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE daily_logs
        SET total_calories = $3, total_protein = $4, total_carbs = $5, total_fat = $6, updated_at = NOW()
        WHERE user_id = $1 AND log_date = $2
        "#,
    )
    .bind(&log.user_id)
    .bind(log.date)
    .bind(log.totals.calories)
    .bind(log.totals.protein)
    .bind(log.totals.carbs)
    .bind(log.totals.fat)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
