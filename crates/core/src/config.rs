use serde::{Deserialize, Serialize};

/// Top-level application configuration, merged from TOML + env + JSON by [`crate::config_loader::ConfigLoader`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub exchange: ExchangeConfig,
    pub chain: ChainConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Off-chain CLOB + market-metadata + trade-data service endpoints (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub exchange_base_url: String,
    pub metadata_base_url: String,
    #[serde(default)]
    pub trade_data_base_url: Option<String>,
    /// HMAC API credentials for authenticated order-placement endpoints.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default)]
    pub api_passphrase: Option<String>,
}

/// On-chain RPC + wallet + native-token oracle configuration (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_rpc_url: String,
    pub chain_id: u64,
    /// Reference to the signing key; never logged, carried as a `SecretString` at runtime.
    pub wallet_private_key: String,
    /// Checksummed address for the above key. Kept alongside the key (not derived) since
    /// the merge executor and reconciler need it for read-only `eth_call`s that don't touch
    /// the key at all.
    #[serde(default)]
    pub wallet_address: String,
    /// CTF contract (`mergePositions`, ERC-1155 `balanceOf`/`setApprovalForAll`).
    #[serde(default)]
    pub ctf_contract: String,
    /// Negative-risk variant of the CTF contract; merges there are always rejected (§4.10).
    #[serde(default)]
    pub neg_risk_ctf_contract: String,
    /// ERC-20 collateral token contract.
    #[serde(default)]
    pub collateral_contract: String,
    /// The exchange's on-chain operator contracts that need ERC-1155/ERC-20 approval (§4.10).
    #[serde(default)]
    pub exchange_contracts: Vec<String>,
    #[serde(default = "default_native_oracle_url")]
    pub native_price_oracle_url: String,
    #[serde(default = "default_native_price_fallback")]
    pub native_price_fallback: rust_decimal::Decimal,
}

fn default_native_oracle_url() -> String {
    "https://api.coingecko.com/api/v3/simple/price".to_string()
}

fn default_native_price_fallback() -> rust_decimal::Decimal {
    rust_decimal::Decimal::new(70, 2) // 0.70 — conservative stand-in native-token price
}

/// Engine-level tunables named in SPEC_FULL.md §6 "Config", plus the thresholds
/// Open Question 3 (SPEC_FULL.md §9) permits surfacing as configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub scan_interval_seconds: u64,
    pub order_size: rust_decimal::Decimal,
    pub fee_rate_default: rust_decimal::Decimal,
    pub min_your_daily_reward: rust_decimal::Decimal,
    pub max_spread_total: rust_decimal::Decimal,
    pub max_competition: rust_decimal::Decimal,
    pub require_qualifies: bool,
    pub min_hours_to_resolution: f64,
    pub only_fills_profit: bool,
    pub max_markets: usize,
    pub initial_capital: rust_decimal::Decimal,
    pub max_exposure: rust_decimal::Decimal,
    pub min_merge_profit: rust_decimal::Decimal,
    /// 0 means "2 * available CPUs" per SPEC_FULL.md §6.
    pub analysis_workers: usize,

    pub min_volume_24h: rust_decimal::Decimal,
    pub min_ask_depth: rust_decimal::Decimal,
    pub max_spread_pct: rust_decimal::Decimal,
    pub near_end_hours: f64,
    pub min_shares: rust_decimal::Decimal,
    pub min_order_collateral: rust_decimal::Decimal,
    pub balance_reserve: rust_decimal::Decimal,
    pub bid_tick: rust_decimal::Decimal,
    pub max_bid_tick_up: u32,
    pub queue_conservative_multiplier: rust_decimal::Decimal,

    pub merge_delay_minutes: i64,
    pub gas_price_update_interval_seconds: u64,
    pub stale_hours: f64,
    pub competition_multiplier: rust_decimal::Decimal,
    pub max_partial_hours: f64,

    pub spread_stability_window: usize,
    /// Both the stability and gate fill-cost thresholds (Open Question 3).
    pub spread_fill_cost_threshold: rust_decimal::Decimal,
    pub spread_variance_max: rust_decimal::Decimal,

    pub circuit_breaker_max_losses: u32,
    pub circuit_breaker_cooldown_minutes: i64,
    pub circuit_breaker_max_drawdown: rust_decimal::Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        use rust_decimal_macros::dec;
        Self {
            scan_interval_seconds: 60,
            order_size: dec!(10),
            fee_rate_default: dec!(0.02),
            min_your_daily_reward: dec!(0),
            max_spread_total: dec!(0.04),
            max_competition: dec!(100000),
            require_qualifies: true,
            min_hours_to_resolution: 1.0,
            only_fills_profit: false,
            max_markets: 20,
            initial_capital: dec!(1000),
            max_exposure: dec!(5000),
            min_merge_profit: dec!(0.05),
            analysis_workers: 0,

            min_volume_24h: dec!(5000),
            min_ask_depth: dec!(10),
            max_spread_pct: dec!(0.60),
            near_end_hours: 2.0,
            min_shares: dec!(5),
            min_order_collateral: dec!(5),
            balance_reserve: dec!(50),
            bid_tick: dec!(0.01),
            max_bid_tick_up: 5,
            queue_conservative_multiplier: dec!(1.5),

            merge_delay_minutes: 5,
            gas_price_update_interval_seconds: 30,
            stale_hours: 24.0,
            competition_multiplier: dec!(2.0),
            max_partial_hours: 6.0,

            spread_stability_window: 5,
            spread_fill_cost_threshold: dec!(0.02),
            spread_variance_max: dec!(0.30),

            circuit_breaker_max_losses: 3,
            circuit_breaker_cooldown_minutes: 30,
            circuit_breaker_max_drawdown: dec!(-100),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                log_level: default_log_level(),
                log_json: false,
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/pairmaker".to_string(),
                max_connections: 10,
            },
            exchange: ExchangeConfig {
                exchange_base_url: "https://clob.example-exchange.com".to_string(),
                metadata_base_url: "https://gamma.example-exchange.com".to_string(),
                trade_data_base_url: None,
                api_key: None,
                api_secret: None,
                api_passphrase: None,
            },
            chain: ChainConfig {
                chain_rpc_url: "https://polygon-rpc.com".to_string(),
                chain_id: 137,
                wallet_private_key: String::new(),
                wallet_address: String::new(),
                ctf_contract: String::new(),
                neg_risk_ctf_contract: String::new(),
                collateral_contract: String::new(),
                exchange_contracts: Vec::new(),
                native_price_oracle_url: default_native_oracle_url(),
                native_price_fallback: default_native_price_fallback(),
            },
            engine: EngineConfig::default(),
        }
    }
}
