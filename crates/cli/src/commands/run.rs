//! The live trading loop: a thin collaborator around [`pairmaker_exchange::live_engine`]
//! (SPEC_FULL.md §6 "CLI") providing the three things the core spec asks of it — the
//! initial config, a cancellation signal, and a graceful-shutdown file-based trigger —
//! and nothing else. One cycle per `scan_interval_seconds`.

use anyhow::Context;
use clap::Args;
use chrono::Utc;
use pairmaker_core::config::AppConfig;
use pairmaker_data::LiveStore;
use pairmaker_exchange::circuit_breaker::CircuitBreaker;
use pairmaker_exchange::filter::FilterConfig;
use pairmaker_exchange::live_engine::{self, EngineConfig};
use pairmaker_exchange::merge_executor::{MergeExecutor, MergeExecutorConfig};
use pairmaker_exchange::placement::PlacementConfig;
use pairmaker_exchange::reconciler::ExchangeOrderSnapshot;
use pairmaker_exchange::rpc_client::{HttpChainClient, HttpExchangeClient};
use pairmaker_exchange::scanner::ScannerConfig;
use pairmaker_exchange::analyzer::AnalyzerConfig;
use pairmaker_exchange::types::{CircuitBreakerState, Market, OrderBook};
use futures_util::future::BoxFuture;
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Config profile suffix (loads `config/Config.<profile>.toml` on top of the base file).
    #[arg(long)]
    pub profile: Option<String>,

    /// Path to a sentinel file: if present at the top of a cycle, the loop exits cleanly
    /// after persisting its current state instead of starting the next cycle.
    #[arg(long, default_value = "pairmaker.shutdown")]
    pub shutdown_file: PathBuf,
}

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = match &args.profile {
        Some(profile) => pairmaker_core::ConfigLoader::load_with_profile(profile)?,
        None => pairmaker_core::ConfigLoader::load()?,
    };
    run_with_config(args, config).await
}

pub async fn run_with_config(args: RunArgs, config: AppConfig) -> anyhow::Result<()> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("connecting to the persistence database")?;
    let store = LiveStore::new(pool);

    let breaker_default = CircuitBreakerState {
        consecutive_losses: 0,
        max_losses: config.engine.circuit_breaker_max_losses,
        cooldown_until: Utc::now(),
        cooldown_duration_seconds: config.engine.circuit_breaker_cooldown_minutes * 60,
        total_pnl: rust_decimal::Decimal::ZERO,
        max_drawdown: config.engine.circuit_breaker_max_drawdown,
        triggered: false,
        triggered_reason: None,
    };
    let breaker_state = store
        .circuit_breaker_repo()
        .load_or_init(&breaker_default)
        .await
        .context("loading circuit breaker state")?;
    let breaker = CircuitBreaker::new(breaker_state);

    let chain = HttpChainClient::new(config.chain.chain_rpc_url.clone());
    let exchange = HttpExchangeClient::new(
        config.exchange.exchange_base_url.clone(),
        config.exchange.api_key.clone(),
    );

    let merge_config = MergeExecutorConfig {
        ctf_contract: config.chain.ctf_contract.clone(),
        collateral_contract: config.chain.collateral_contract.clone(),
        exchange_contracts: config.chain.exchange_contracts.clone(),
        chain_id: config.chain.chain_id,
        wallet_address: config.chain.wallet_address.clone(),
    };
    let merge_executor = MergeExecutor::new(
        &chain,
        SecretString::from(config.chain.wallet_private_key.clone()),
        merge_config,
        config.chain.native_price_fallback,
    );

    let scanner_config = ScannerConfig {
        analysis_workers: config.engine.analysis_workers,
        analyzer: AnalyzerConfig {
            default_fee: config.engine.fee_rate_default,
            order_size: config.engine.order_size,
            gold_min_reward: config.engine.min_your_daily_reward,
        },
    };

    let engine_config = EngineConfig {
        initial_capital: config.engine.initial_capital,
        max_exposure: config.engine.max_exposure,
        min_merge_profit: config.engine.min_merge_profit,
        merge_delay_minutes: config.engine.merge_delay_minutes,
        stale_hours: config.engine.stale_hours,
        competition_multiplier: config.engine.competition_multiplier,
        neg_risk_ctf_contract: config.chain.neg_risk_ctf_contract.clone(),
        wallet_address: config.chain.wallet_address.clone(),
        queue_conservative_multiplier: config.engine.queue_conservative_multiplier,
        placement: PlacementConfig {
            max_markets: config.engine.max_markets,
            min_volume_24h: config.engine.min_volume_24h,
            min_ask_depth: config.engine.min_ask_depth,
            max_spread_pct: config.engine.max_spread_pct,
            near_end_hours: config.engine.near_end_hours,
            bid_tick: config.engine.bid_tick,
            max_bid_tick_up: config.engine.max_bid_tick_up,
            min_shares: config.engine.min_shares,
            min_order_collateral: config.engine.min_order_collateral,
            balance_reserve: config.engine.balance_reserve,
            order_size: config.engine.order_size,
        },
        filter: FilterConfig {
            min_your_daily_reward: config.engine.min_your_daily_reward,
            max_spread_total: config.engine.max_spread_total,
            max_competition: config.engine.max_competition,
            require_qualifies: config.engine.require_qualifies,
            min_hours_to_resolution: config.engine.min_hours_to_resolution,
            only_fills_profit: config.engine.only_fills_profit,
        },
    };

    let mut spread_history = pairmaker_exchange::spread_history::SpreadHistory::new(
        config.engine.spread_stability_window,
        config.engine.spread_fill_cost_threshold,
        config.engine.spread_variance_max,
    );

    let interval = Duration::from_secs(config.engine.scan_interval_seconds);
    let mut cycle: u64 = 0;

    loop {
        if args.shutdown_file.exists() {
            tracing::info!(path = %args.shutdown_file.display(), "shutdown file present, exiting before next cycle");
            break;
        }

        cycle += 1;
        let span = tracing::info_span!("cycle", cycle);
        let _enter = span.enter();
        tracing::info!("starting cycle");

        let metadata_client = HttpExchangeClient::new(
            config.exchange.metadata_base_url.clone(),
            config.exchange.api_key.clone(),
        );
        let markets = fetch_markets(&metadata_client).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "market discovery failed, continuing with empty set this cycle");
            Vec::new()
        });

        let fetch_books_exchange = exchange_client_handle(&config);
        let fetch_exchange_orders_handle = exchange_client_handle(&config);

        let report = live_engine::run_cycle(
            &exchange,
            &chain,
            &merge_executor,
            &store,
            &breaker,
            &mut spread_history,
            &scanner_config,
            &engine_config,
            markets,
            move |token_ids: &[String]| -> BoxFuture<'static, Result<Vec<OrderBook>, pairmaker_core::error::ServiceError>> {
                let client = fetch_books_exchange.clone();
                let ids = token_ids.to_vec();
                Box::pin(async move { fetch_order_books(&client, &ids).await })
            },
            move || -> BoxFuture<'static, Result<Vec<ExchangeOrderSnapshot>, pairmaker_core::error::ServiceError>> {
                let client = fetch_exchange_orders_handle.clone();
                Box::pin(async move { fetch_open_exchange_orders(&client).await })
            },
        )
        .await;

        match report {
            Ok(report) => {
                for warning in &report.warnings {
                    tracing::warn!(%warning, "cycle warning");
                }
                tracing::info!(
                    new_orders = report.new_orders.len(),
                    merges = report.merges.len(),
                    cancelled = report.cancelled.len(),
                    "cycle complete"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "cycle failed, will retry next interval");
            }
        }

        store
            .circuit_breaker_repo()
            .save(&breaker.snapshot())
            .await
            .context("persisting circuit breaker state")?;

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            result = tokio::signal::ctrl_c() => {
                result.context("listening for ctrl-c")?;
                tracing::info!("cancellation signal received, exiting after this cycle");
                break;
            }
        }
    }

    Ok(())
}

/// The exchange client is cheap to reconstruct (no connection pooling, just a rate limiter
/// and a base URL) so each cycle's closures get their own handle instead of sharing a
/// borrow across an `.await` boundary that outlives the loop iteration.
fn exchange_client_handle(config: &AppConfig) -> HttpExchangeClient {
    HttpExchangeClient::new(
        config.exchange.exchange_base_url.clone(),
        config.exchange.api_key.clone(),
    )
}

async fn fetch_markets(exchange: &HttpExchangeClient) -> anyhow::Result<Vec<Market>> {
    use pairmaker_core::traits::ExchangeRestClient;
    let body = exchange.get_json("/markets").await?;
    let markets: Vec<Market> = serde_json::from_value(body)?;
    Ok(markets)
}

async fn fetch_order_books(
    exchange: &HttpExchangeClient,
    token_ids: &[String],
) -> Result<Vec<OrderBook>, pairmaker_core::error::ServiceError> {
    use pairmaker_core::traits::ExchangeRestClient;
    let mut books = Vec::with_capacity(token_ids.len());
    for token_id in token_ids {
        let path = format!("/book?token_id={token_id}");
        let body = exchange.get_json(&path).await?;
        let bids: Vec<(rust_decimal::Decimal, rust_decimal::Decimal)> = body
            .get("bids")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let asks: Vec<(rust_decimal::Decimal, rust_decimal::Decimal)> = body
            .get("asks")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        books.push(OrderBook::from_levels(token_id.clone(), bids, asks, Utc::now()));
    }
    Ok(books)
}

async fn fetch_open_exchange_orders(
    exchange: &HttpExchangeClient,
) -> Result<Vec<ExchangeOrderSnapshot>, pairmaker_core::error::ServiceError> {
    use pairmaker_core::traits::ExchangeRestClient;
    let body = exchange.get_json("/orders?status=open").await?;
    let snapshots: Vec<ExchangeOrderSnapshot> = serde_json::from_value(body).unwrap_or_default();
    Ok(snapshots)
}
