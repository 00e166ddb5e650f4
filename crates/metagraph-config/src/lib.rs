//! # Metagraph Config - Configuration Management
//!
//! Handles configuration loading from files and environment variables.

pub mod validation;

use std::path::Path;

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use metagraph_types::Durability;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// GUID of the home metadata collection. Generated at startup when
    /// absent.
    pub collection_id: Option<String>,

    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Write durability: `Synchronous` waits for commit and re-reads the
    /// written instance, `Asynchronous` returns as soon as the
    /// transaction is submitted.
    #[serde(default = "default_durability")]
    pub durability: Durability,

    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    #[serde(default = "default_max_traversal_depth")]
    pub max_traversal_depth: usize,

    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Whether free-text searches may be routed to an accelerated text
    /// index instead of the main store.
    #[serde(default)]
    pub text_index_enabled: bool,
}

fn default_collection_name() -> String {
    "metagraph-repository".to_string()
}

fn default_durability() -> Durability {
    Durability::Synchronous
}

fn default_query_timeout_ms() -> u64 {
    30_000
}

fn default_max_page_size() -> usize {
    1_000
}

fn default_max_traversal_depth() -> usize {
    100
}

fn default_worker_threads() -> usize {
    num_cpus::get()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            collection_id: None,
            collection_name: default_collection_name(),
            durability: default_durability(),
            query_timeout_ms: default_query_timeout_ms(),
            max_page_size: default_max_page_size(),
            max_traversal_depth: default_max_traversal_depth(),
            worker_threads: default_worker_threads(),
            text_index_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: String,

    pub connection_string: Option<String>,
}

fn default_backend() -> String {
    "memory".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            connection_string: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repository: RepositoryConfig::default(),
            store: StoreConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Load configuration from file and environment
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let builder = ConfigBuilder::builder()
        .add_source(File::from(path.as_ref()).required(false))
        .add_source(Environment::with_prefix("METAGRAPH").separator("__"))
        .build()?;

    builder.try_deserialize()
}

/// Load configuration with defaults
pub fn load_or_default<P: AsRef<Path>>(path: P) -> Config {
    load(path).unwrap_or_default()
}
