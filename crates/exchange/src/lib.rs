//! Reward-farming / merge-arbitrage engine for a binary prediction-market exchange.
//!
//! This crate provides:
//! - the domain model (`types`): markets, order books, opportunities, live orders/fills/merges
//! - the reward-farming analyzer, filter, spread-stability tracker, ranking, and Kelly sizing
//! - the scanner, reconciler, merge executor, placement pipeline, and the 8-phase live engine
//!   that sequences them
//!
//! # Example
//!
//! ```no_run
//! use pairmaker_exchange::analyzer::{analyze, AnalyzerConfig};
//! use pairmaker_exchange::types::OrderBook;
//! # fn market() -> pairmaker_exchange::types::Market { unimplemented!() }
//!
//! let market = market();
//! let yes_book = OrderBook::new("yes-token");
//! let no_book = OrderBook::new("no-token");
//! let config = AnalyzerConfig { default_fee: Default::default(), order_size: Default::default(), gold_min_reward: Default::default() };
//! let _ = analyze(&market, &yes_book, &no_book, &config, chrono::Utc::now());
//! ```

pub mod analyzer;
pub mod circuit_breaker;
pub mod filter;
pub mod kelly;
pub mod merge_executor;
pub mod placement;
pub mod ranking;
pub mod reconciler;
pub mod rpc_client;
pub mod scanner;
pub mod spread_history;
pub mod types;

pub mod live_engine;
