//! `live_daily` repository: one upserted row per UTC date summarizing the day's cycles
//! (Phase 8 — Reporting).

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use pairmaker_exchange::live_engine::DailySummary;
use rust_decimal::Decimal;
use sqlx::PgPool;

#[derive(Debug, Clone, sqlx::FromRow)]
struct LiveDailyRow {
    date: NaiveDate,
    active_pairs: i32,
    open_orders: i32,
    total_merge_profit: Decimal,
    effective_capital: Decimal,
    breaker_triggered: bool,
}

#[derive(Debug, Clone)]
pub struct LiveDailyRepository {
    pool: PgPool,
}

impl LiveDailyRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    /// Returns an error if the database upsert fails.
    pub async fn upsert(&self, summary: &DailySummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO live_daily
                (date, active_pairs, open_orders, total_merge_profit, effective_capital, breaker_triggered)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (date) DO UPDATE SET
                active_pairs = EXCLUDED.active_pairs,
                open_orders = EXCLUDED.open_orders,
                total_merge_profit = EXCLUDED.total_merge_profit,
                effective_capital = EXCLUDED.effective_capital,
                breaker_triggered = EXCLUDED.breaker_triggered
            "#,
        )
        .bind(summary.date.date_naive())
        .bind(summary.active_pairs as i32)
        .bind(summary.open_orders as i32)
        .bind(summary.total_merge_profit)
        .bind(summary.effective_capital)
        .bind(summary.breaker_triggered)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get(&self, date: DateTime<Utc>) -> Result<Option<DailySummary>> {
        let row = sqlx::query_as::<_, LiveDailyRow>(
            r"
            SELECT date, active_pairs, open_orders, total_merge_profit, effective_capital, breaker_triggered
            FROM live_daily
            WHERE date = $1
            ",
        )
        .bind(date.date_naive())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| DailySummary {
            date: DateTime::from_naive_utc_and_offset(
                r.date.and_hms_opt(0, 0, 0).unwrap_or_default(),
                Utc,
            ),
            active_pairs: r.active_pairs.max(0) as usize,
            open_orders: r.open_orders.max(0) as usize,
            total_merge_profit: r.total_merge_profit,
            effective_capital: r.effective_capital,
            breaker_triggered: r.breaker_triggered,
        }))
    }
}
