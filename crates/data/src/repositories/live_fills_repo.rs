//! `live_fills` repository: an append-only ledger of every fill (exchange-reported or
//! synthetic, from the Reconciler's missing-order inference).

use anyhow::Result;
use chrono::{DateTime, Utc};
use pairmaker_exchange::types::LiveFill;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
struct LiveFillRow {
    order_id: Uuid,
    exchange_trade_id: Option<String>,
    price: Decimal,
    size: Decimal,
    timestamp: DateTime<Utc>,
}

impl From<LiveFillRow> for LiveFill {
    fn from(row: LiveFillRow) -> Self {
        LiveFill {
            order_id: row.order_id,
            exchange_trade_id: row.exchange_trade_id,
            price: row.price,
            size: row.size,
            timestamp: row.timestamp,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LiveFillRepository {
    pool: PgPool,
}

impl LiveFillRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends a batch of fills. Never updates or deletes — `live_fills` is append-only.
    ///
    /// # Errors
    /// Returns an error if the database transaction fails.
    pub async fn insert_batch(&self, fills: &[LiveFill]) -> Result<()> {
        if fills.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for fill in fills {
            sqlx::query(
                r"
                INSERT INTO live_fills (order_id, exchange_trade_id, price, size, timestamp)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(fill.order_id)
            .bind(&fill.exchange_trade_id)
            .bind(fill.price)
            .bind(fill.size)
            .bind(fill.timestamp)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Lists every fill recorded against one local order id.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn by_order(&self, order_id: Uuid) -> Result<Vec<LiveFill>> {
        let rows = sqlx::query_as::<_, LiveFillRow>(
            r"
            SELECT order_id, exchange_trade_id, price, size, timestamp
            FROM live_fills
            WHERE order_id = $1
            ORDER BY timestamp ASC
            ",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(LiveFill::from).collect())
    }
}
