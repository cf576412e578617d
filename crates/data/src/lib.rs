//! Persistence layer for the reward-farming / merge-arbitrage engine.
//!
//! This crate provides the `live_*` repositories (orders, fills, merges, daily summaries,
//! circuit breaker state) and wires them into `pairmaker_exchange::live_engine::LiveEngineStore`
//! via [`LiveStore`], so the control loop never talks to sqlx directly.

pub mod live_store;
pub mod repositories;

pub use live_store::LiveStore;

pub use repositories::{
    LiveCircuitBreakerRepository, LiveDailyRepository, LiveFillRepository, LiveMergeRepository,
    LiveOrderRepository,
};
