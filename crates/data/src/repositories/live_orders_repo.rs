//! `live_orders` repository: the durable record of every YES/NO leg the engine has placed.
//!
//! Grounded on `polymarket_repo.rs`'s `ON CONFLICT ... DO UPDATE` upsert pattern, generalized
//! from a single odds row to the full `LiveOrder` lifecycle.

use anyhow::Result;
use chrono::{DateTime, Utc};
use pairmaker_exchange::types::{LiveOrder, LiveOrderStatus, Side};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
struct LiveOrderRow {
    id: Uuid,
    exchange_order_id: Option<String>,
    condition_id: String,
    token_id: String,
    side: String,
    bid_price: Decimal,
    size: Decimal,
    filled_size: Decimal,
    pair_id: Uuid,
    placed_at: DateTime<Utc>,
    status: String,
    filled_at: Option<DateTime<Utc>>,
    filled_price: Option<Decimal>,
    question: String,
    queue_ahead: Decimal,
    daily_reward: Decimal,
    end_date: Option<DateTime<Utc>>,
    merged_at: Option<DateTime<Utc>>,
    neg_risk: bool,
    competition_at_placement: Decimal,
}

impl From<LiveOrderRow> for LiveOrder {
    fn from(row: LiveOrderRow) -> Self {
        LiveOrder {
            id: row.id,
            exchange_order_id: row.exchange_order_id,
            condition_id: row.condition_id,
            token_id: row.token_id,
            side: parse_side(&row.side),
            bid_price: row.bid_price,
            size: row.size,
            filled_size: row.filled_size,
            pair_id: row.pair_id,
            placed_at: row.placed_at,
            status: parse_status(&row.status),
            filled_at: row.filled_at,
            filled_price: row.filled_price,
            question: row.question,
            queue_ahead: row.queue_ahead,
            daily_reward: row.daily_reward,
            end_date: row.end_date,
            merged_at: row.merged_at,
            neg_risk: row.neg_risk,
            competition_at_placement: row.competition_at_placement,
        }
    }
}

fn side_str(side: Side) -> &'static str {
    match side {
        Side::Yes => "YES",
        Side::No => "NO",
    }
}

fn parse_side(s: &str) -> Side {
    match s {
        "NO" => Side::No,
        _ => Side::Yes,
    }
}

fn status_str(status: LiveOrderStatus) -> &'static str {
    match status {
        LiveOrderStatus::Open => "OPEN",
        LiveOrderStatus::Partial => "PARTIAL",
        LiveOrderStatus::Filled => "FILLED",
        LiveOrderStatus::Cancelled => "CANCELLED",
        LiveOrderStatus::Expired => "EXPIRED",
        LiveOrderStatus::Merged => "MERGED",
    }
}

fn parse_status(s: &str) -> LiveOrderStatus {
    match s {
        "PARTIAL" => LiveOrderStatus::Partial,
        "FILLED" => LiveOrderStatus::Filled,
        "CANCELLED" => LiveOrderStatus::Cancelled,
        "EXPIRED" => LiveOrderStatus::Expired,
        "MERGED" => LiveOrderStatus::Merged,
        _ => LiveOrderStatus::Open,
    }
}

#[derive(Debug, Clone)]
pub struct LiveOrderRepository {
    pool: PgPool,
}

impl LiveOrderRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upserts every order by local id. Called once per cycle with the full in-memory set.
    ///
    /// # Errors
    /// Returns an error if the database transaction fails.
    pub async fn upsert_batch(&self, orders: &[LiveOrder]) -> Result<()> {
        if orders.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for order in orders {
            sqlx::query(
                r#"
                INSERT INTO live_orders
                    (id, exchange_order_id, condition_id, token_id, side, bid_price, size,
                     filled_size, pair_id, placed_at, status, filled_at, filled_price, question,
                     queue_ahead, daily_reward, end_date, merged_at, neg_risk, competition_at_placement)
                VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20)
                ON CONFLICT (id) DO UPDATE SET
                    exchange_order_id = EXCLUDED.exchange_order_id,
                    filled_size = EXCLUDED.filled_size,
                    status = EXCLUDED.status,
                    filled_at = EXCLUDED.filled_at,
                    filled_price = EXCLUDED.filled_price,
                    merged_at = EXCLUDED.merged_at
                "#,
            )
            .bind(order.id)
            .bind(&order.exchange_order_id)
            .bind(&order.condition_id)
            .bind(&order.token_id)
            .bind(side_str(order.side))
            .bind(order.bid_price)
            .bind(order.size)
            .bind(order.filled_size)
            .bind(order.pair_id)
            .bind(order.placed_at)
            .bind(status_str(order.status))
            .bind(order.filled_at)
            .bind(order.filled_price)
            .bind(&order.question)
            .bind(order.queue_ahead)
            .bind(order.daily_reward)
            .bind(order.end_date)
            .bind(order.merged_at)
            .bind(order.neg_risk)
            .bind(order.competition_at_placement)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Loads every order still in OPEN or PARTIAL state.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn load_open(&self) -> Result<Vec<LiveOrder>> {
        let rows = sqlx::query_as::<_, LiveOrderRow>(
            r"
            SELECT id, exchange_order_id, condition_id, token_id, side, bid_price, size,
                   filled_size, pair_id, placed_at, status, filled_at, filled_price, question,
                   queue_ahead, daily_reward, end_date, merged_at, neg_risk, competition_at_placement
            FROM live_orders
            WHERE status IN ('OPEN', 'PARTIAL')
            ORDER BY placed_at ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(LiveOrder::from).collect())
    }

    /// Loads every order belonging to a `pair_id`, regardless of status (used by Merge/Maintenance
    /// to see the full lifecycle of a pair rather than just the currently-open legs).
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn load_by_pair(&self, pair_id: Uuid) -> Result<Vec<LiveOrder>> {
        let rows = sqlx::query_as::<_, LiveOrderRow>(
            r"
            SELECT id, exchange_order_id, condition_id, token_id, side, bid_price, size,
                   filled_size, pair_id, placed_at, status, filled_at, filled_price, question,
                   queue_ahead, daily_reward, end_date, merged_at, neg_risk, competition_at_placement
            FROM live_orders
            WHERE pair_id = $1
            ",
        )
        .bind(pair_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(LiveOrder::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_round_trips() {
        assert_eq!(parse_side(side_str(Side::Yes)), Side::Yes);
        assert_eq!(parse_side(side_str(Side::No)), Side::No);
    }

    #[test]
    fn status_round_trips() {
        for status in [
            LiveOrderStatus::Open,
            LiveOrderStatus::Partial,
            LiveOrderStatus::Filled,
            LiveOrderStatus::Cancelled,
            LiveOrderStatus::Expired,
            LiveOrderStatus::Merged,
        ] {
            assert_eq!(parse_status(status_str(status)), status);
        }
    }
}
