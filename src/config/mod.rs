//! Connection-string parsing, option capability traits and the TOML client config.
mod client;
mod connection_string;
mod options;

pub use client::{ClientConfig, LoggingConfig, config_search_paths};
pub use connection_string::{
    ConnectionString, DEFAULT_DATABASE, DEFAULT_LIFETIME_SECS, DEFAULT_POOL_SIZE, DEFAULT_PORT,
    DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS, SCHEME, ServerAddress,
};
pub use options::{ConnectionOption, PoolSettings, QueryOverrides, apply_all, apply_overrides, parse_options};
