//! `live_circuit_breaker` repository: the single persisted row tracking breaker state across
//! restarts (SPEC_FULL.md §4.11, §6).

use anyhow::Result;
use chrono::{DateTime, Utc};
use pairmaker_exchange::types::CircuitBreakerState;
use rust_decimal::Decimal;
use sqlx::PgPool;

#[derive(Debug, Clone, sqlx::FromRow)]
struct CircuitBreakerRow {
    consecutive_losses: i32,
    max_losses: i32,
    cooldown_until: DateTime<Utc>,
    cooldown_duration_seconds: i64,
    total_pnl: Decimal,
    max_drawdown: Decimal,
    triggered: bool,
    triggered_reason: Option<String>,
}

impl From<CircuitBreakerRow> for CircuitBreakerState {
    fn from(row: CircuitBreakerRow) -> Self {
        CircuitBreakerState {
            consecutive_losses: row.consecutive_losses.max(0) as u32,
            max_losses: row.max_losses.max(0) as u32,
            cooldown_until: row.cooldown_until,
            cooldown_duration_seconds: row.cooldown_duration_seconds,
            total_pnl: row.total_pnl,
            max_drawdown: row.max_drawdown,
            triggered: row.triggered,
            triggered_reason: row.triggered_reason,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LiveCircuitBreakerRepository {
    pool: PgPool,
}

impl LiveCircuitBreakerRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Reads the single breaker row, seeding it with defaults if this is a fresh database.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn load_or_init(&self, default: &CircuitBreakerState) -> Result<CircuitBreakerState> {
        let row = sqlx::query_as::<_, CircuitBreakerRow>(
            r"
            SELECT consecutive_losses, max_losses, cooldown_until, cooldown_duration_seconds,
                   total_pnl, max_drawdown, triggered, triggered_reason
            FROM live_circuit_breaker
            WHERE id = 1
            ",
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(r.into()),
            None => {
                self.save(default).await?;
                Ok(default.clone())
            }
        }
    }

    /// # Errors
    /// Returns an error if the database upsert fails.
    pub async fn save(&self, state: &CircuitBreakerState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO live_circuit_breaker
                (id, consecutive_losses, max_losses, cooldown_until, cooldown_duration_seconds,
                 total_pnl, max_drawdown, triggered, triggered_reason)
            VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                consecutive_losses = EXCLUDED.consecutive_losses,
                cooldown_until = EXCLUDED.cooldown_until,
                total_pnl = EXCLUDED.total_pnl,
                triggered = EXCLUDED.triggered,
                triggered_reason = EXCLUDED.triggered_reason
            "#,
        )
        .bind(state.consecutive_losses as i32)
        .bind(state.max_losses as i32)
        .bind(state.cooldown_until)
        .bind(state.cooldown_duration_seconds)
        .bind(state.total_pnl)
        .bind(state.max_drawdown)
        .bind(state.triggered)
        .bind(&state.triggered_reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
