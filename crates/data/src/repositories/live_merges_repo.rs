//! `live_merges` repository: an append-only ledger of every merge attempt, successful or not.
//! `kelly_fraction` (SPEC_FULL.md §4.7) is computed over this table's history.

use anyhow::Result;
use chrono::{DateTime, Utc};
use pairmaker_exchange::types::MergeResult;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
struct LiveMergeRow {
    condition_id: String,
    pair_id: Uuid,
    tx_hash: Option<String>,
    gas_used: Option<i64>,
    gas_cost_in_collateral: Decimal,
    collateral_received: Decimal,
    spread_profit: Decimal,
    success: bool,
    error_message: Option<String>,
    executed_at: DateTime<Utc>,
}

impl From<LiveMergeRow> for MergeResult {
    fn from(row: LiveMergeRow) -> Self {
        MergeResult {
            condition_id: row.condition_id,
            pair_id: row.pair_id,
            tx_hash: row.tx_hash,
            gas_used: row.gas_used.map(|v| v.max(0) as u64),
            gas_cost_in_collateral: row.gas_cost_in_collateral,
            collateral_received: row.collateral_received,
            spread_profit: row.spread_profit,
            success: row.success,
            error_message: row.error_message,
            executed_at: row.executed_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LiveMergeRepository {
    pool: PgPool,
}

impl LiveMergeRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    /// Returns an error if the database insert fails.
    pub async fn insert(&self, result: &MergeResult) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO live_merges
                (condition_id, pair_id, tx_hash, gas_used, gas_cost_in_collateral,
                 collateral_received, spread_profit, success, error_message, executed_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
            ",
        )
        .bind(&result.condition_id)
        .bind(result.pair_id)
        .bind(&result.tx_hash)
        .bind(result.gas_used.map(|v| v as i64))
        .bind(result.gas_cost_in_collateral)
        .bind(result.collateral_received)
        .bind(result.spread_profit)
        .bind(result.success)
        .bind(&result.error_message)
        .bind(result.executed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Loads the full merge history, used by Kelly-fraction capital allocation.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn load_all(&self) -> Result<Vec<MergeResult>> {
        let rows = sqlx::query_as::<_, LiveMergeRow>(
            r"
            SELECT condition_id, pair_id, tx_hash, gas_used, gas_cost_in_collateral,
                   collateral_received, spread_profit, success, error_message, executed_at
            FROM live_merges
            ORDER BY executed_at ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(MergeResult::from).collect())
    }
}
