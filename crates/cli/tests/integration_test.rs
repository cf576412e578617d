use pairmaker_core::config::AppConfig;

#[test]
fn default_config_round_trips_through_serde_json() {
    let config = AppConfig::default();
    let json = serde_json::to_string(&config).expect("serialize default config");
    let restored: AppConfig = serde_json::from_str(&json).expect("deserialize default config");
    assert_eq!(config.engine.scan_interval_seconds, restored.engine.scan_interval_seconds);
    assert_eq!(config.chain.chain_id, restored.chain.chain_id);
}
