//! Wires the `live_*` repositories into the `LiveEngineStore` seam `pairmaker-exchange`'s
//! control loop depends on, so the loop never talks to sqlx directly.

use crate::repositories::{
    LiveCircuitBreakerRepository, LiveDailyRepository, LiveFillRepository, LiveMergeRepository,
    LiveOrderRepository,
};
use async_trait::async_trait;
use pairmaker_core::error::ServiceError;
use pairmaker_exchange::live_engine::{DailySummary, LiveEngineStore};
use pairmaker_exchange::types::{LiveFill, LiveOrder, MergeResult};
use sqlx::PgPool;

#[derive(Clone)]
pub struct LiveStore {
    orders: LiveOrderRepository,
    fills: LiveFillRepository,
    merges: LiveMergeRepository,
    daily: LiveDailyRepository,
    breaker: LiveCircuitBreakerRepository,
}

impl LiveStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            orders: LiveOrderRepository::new(pool.clone()),
            fills: LiveFillRepository::new(pool.clone()),
            merges: LiveMergeRepository::new(pool.clone()),
            daily: LiveDailyRepository::new(pool.clone()),
            breaker: LiveCircuitBreakerRepository::new(pool),
        }
    }

    /// Not part of `LiveEngineStore`: the circuit breaker's state lives in an in-memory
    /// `RwLock` for the duration of a run (`CircuitBreaker`) and is only read/written at
    /// process start/shutdown, so the CLI talks to this repository directly.
    #[must_use]
    pub fn circuit_breaker_repo(&self) -> &LiveCircuitBreakerRepository {
        &self.breaker
    }
}

fn db_err(context: &'static str, e: anyhow::Error) -> ServiceError {
    ServiceError::UnexpectedResponse {
        endpoint: context.to_string(),
        detail: e.to_string(),
    }
}

#[async_trait]
impl LiveEngineStore for LiveStore {
    async fn load_open_orders(&self) -> Result<Vec<LiveOrder>, ServiceError> {
        self.orders.load_open().await.map_err(|e| db_err("live_orders.load_open", e))
    }

    async fn save_orders(&self, orders: &[LiveOrder]) -> Result<(), ServiceError> {
        self.orders
            .upsert_batch(orders)
            .await
            .map_err(|e| db_err("live_orders.upsert_batch", e))
    }

    async fn save_fills(&self, fills: &[LiveFill]) -> Result<(), ServiceError> {
        self.fills
            .insert_batch(fills)
            .await
            .map_err(|e| db_err("live_fills.insert_batch", e))
    }

    async fn load_merge_history(&self) -> Result<Vec<MergeResult>, ServiceError> {
        self.merges.load_all().await.map_err(|e| db_err("live_merges.load_all", e))
    }

    async fn save_merge_result(&self, result: &MergeResult) -> Result<(), ServiceError> {
        self.merges
            .insert(result)
            .await
            .map_err(|e| db_err("live_merges.insert", e))
    }

    async fn save_daily_summary(&self, summary: &DailySummary) -> Result<(), ServiceError> {
        self.daily
            .upsert(summary)
            .await
            .map_err(|e| db_err("live_daily.upsert", e))
    }
}
