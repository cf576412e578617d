pub mod config;
pub mod config_loader;
pub mod config_watcher;
pub mod error;
pub mod traits;

pub use config::{
    AppConfig, ChainConfig, DatabaseConfig, EngineConfig, ExchangeConfig, ServerConfig,
};
pub use config_loader::ConfigLoader;
pub use config_watcher::ConfigWatcher;
pub use error::{ConfigError, ErrorClass, ServiceError};
pub use traits::{ChainClient, ExchangeRestClient, Strategy};
