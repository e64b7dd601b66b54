mod crawler;
mod database;
mod proxy;
mod validation;

pub use crawler::CrawlerConfig;
pub use database::{DatabaseConfig, DatabaseConfigError, parse_database_file};
pub use proxy::{ProxyConfig, ProxyConfigFile, ProxyProtocol};
pub use validation::{ConfigReport, validate_proxy_config};
