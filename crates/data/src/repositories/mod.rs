//! Typed database access for the `live_*` persistence schema (SPEC_FULL.md §10).

pub mod live_circuit_breaker_repo;
pub mod live_daily_repo;
pub mod live_fills_repo;
pub mod live_merges_repo;
pub mod live_orders_repo;

pub use live_circuit_breaker_repo::LiveCircuitBreakerRepository;
pub use live_daily_repo::LiveDailyRepository;
pub use live_fills_repo::LiveFillRepository;
pub use live_merges_repo::LiveMergeRepository;
pub use live_orders_repo::LiveOrderRepository;
