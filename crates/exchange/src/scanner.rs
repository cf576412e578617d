//! Discovers eligible markets and scores them into ranked Opportunities (SPEC_FULL.md §4.1).
//!
//! Fan-out pattern grounded in `pairmaker-core::traits` (REST client abstraction) and the
//! worker-pool-over-bounded-channel idiom the teacher's engine run loop uses for concurrent
//! analysis; orderbook fetches are batched the way `client::get_prices` batches token IDs.

use crate::analyzer::{analyze, AnalyzerConfig, AnalyzerError};
use crate::types::{Market, Opportunity, OrderBook};
use chrono::Utc;
use pairmaker_core::error::ServiceError;
use pairmaker_core::traits::ExchangeRestClient;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

const BOOK_BATCH_SIZE: usize = 20;

#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("failed to fetch eligible markets: {0}")]
    MarketFetch(#[source] ServiceError),

    #[error("failed to fetch order books: {0}")]
    BookFetch(#[source] ServiceError),
}

pub struct ScannerConfig {
    pub analysis_workers: usize,
    pub analyzer: AnalyzerConfig,
}

impl ScannerConfig {
    #[must_use]
    pub fn resolved_workers(&self) -> usize {
        if self.analysis_workers == 0 {
            2 * num_cpus()
        } else {
            self.analysis_workers
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4)
}

/// One (market, yes_book, no_book) unit of analysis work.
struct AnalysisJob {
    market: Market,
    yes_book: OrderBook,
    no_book: OrderBook,
}

/// Executes one scan cycle: fetch eligible markets, fetch their books, dispatch analysis to a
/// worker pool, and return the raw (unfiltered, unranked) Opportunities.
pub async fn run_once(
    client: &dyn ExchangeRestClient,
    markets: Vec<Market>,
    fetch_books: impl Fn(&[String]) -> futures_util::future::BoxFuture<'static, Result<Vec<OrderBook>, ServiceError>>
        + Send
        + Sync
        + 'static,
    config: &ScannerConfig,
) -> Result<Vec<Opportunity>, ScannerError> {
    let _ = client; // book fetches go through `fetch_books`; client kept for future direct calls
    let mut all_token_ids = Vec::with_capacity(markets.len() * 2);
    for m in &markets {
        all_token_ids.push(m.yes_token.token_id.clone());
        all_token_ids.push(m.no_token.token_id.clone());
    }

    let mut books = std::collections::HashMap::new();
    for batch in all_token_ids.chunks(BOOK_BATCH_SIZE) {
        let fetched = fetch_books(batch)
            .await
            .map_err(ScannerError::BookFetch)?;
        for book in fetched {
            books.insert(book.token_id.clone(), book);
        }
    }

    let jobs: Vec<AnalysisJob> = markets
        .into_iter()
        .filter_map(|market| {
            let yes_book = books.get(&market.yes_token.token_id)?.clone();
            let no_book = books.get(&market.no_token.token_id)?.clone();
            Some(AnalysisJob {
                market,
                yes_book,
                no_book,
            })
        })
        .collect();

    Ok(analyze_pool(jobs, config).await)
}

/// Fans `jobs` out to a fixed worker pool over a bounded channel; missing-book markets were
/// already dropped by the caller, so workers only ever see analyzable jobs.
async fn analyze_pool(jobs: Vec<AnalysisJob>, config: &ScannerConfig) -> Vec<Opportunity> {
    let worker_count = config.resolved_workers().max(1);
    let (job_tx, job_rx) = mpsc::channel::<AnalysisJob>(worker_count * 2);
    let (result_tx, mut result_rx) = mpsc::channel::<Opportunity>(worker_count * 2);

    let analyzer_cfg = Arc::new(AnalyzerConfig {
        default_fee: config.analyzer.default_fee,
        order_size: config.analyzer.order_size,
        gold_min_reward: config.analyzer.gold_min_reward,
    });

    let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));
    let mut handles = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let job_rx = Arc::clone(&job_rx);
        let result_tx = result_tx.clone();
        let analyzer_cfg = Arc::clone(&analyzer_cfg);
        handles.push(tokio::spawn(async move {
            loop {
                let job = {
                    let mut rx = job_rx.lock().await;
                    rx.recv().await
                };
                let Some(job) = job else { break };
                match analyze(&job.market, &job.yes_book, &job.no_book, &analyzer_cfg, Utc::now()) {
                    Ok(opp) => {
                        let _ = result_tx.send(opp).await;
                    }
                    Err(AnalyzerError::EmptyBook { condition_id, side }) => {
                        tracing::debug!(condition_id, side, "analyzer dropped market: empty book");
                    }
                }
            }
        }));
    }
    drop(result_tx);

    for job in jobs {
        if job_tx.send(job).await.is_err() {
            break;
        }
    }
    drop(job_tx);

    let mut opportunities = Vec::new();
    while let Some(opp) = result_rx.recv().await {
        opportunities.push(opp);
    }
    for handle in handles {
        let _ = handle.await;
    }
    opportunities
}

/// Stable sort: GOLD precedes SILVER precedes BRONZE precedes AVOID, ties broken by
/// descending `combined_score` (property 6, SPEC_FULL.md §8).
pub fn sort_by_category_then_score(opportunities: &mut [Opportunity]) {
    opportunities.sort_by(|a, b| {
        b.category
            .cmp(&a.category)
            .then(b.combined_score.cmp(&a.combined_score))
    });
}
