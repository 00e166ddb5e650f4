//! Structured logging utilities for the metadata repository
//!
//! Provides enhanced logging with contextual fields and formatting options.

use std::str::FromStr;

use tracing::Span;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors (for development)
    Pretty,
    /// Compact format without colors
    Compact,
    /// JSON format (for production)
    Json,
}

#[allow(clippy::derivable_impls)]
impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        {
            LogFormat::Pretty
        }
        #[cfg(not(debug_assertions))]
        {
            LogFormat::Json
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Configuration for logging behavior
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output format
    pub format: LogFormat,
    /// Whether to include file/line numbers
    pub include_location: bool,
    /// Whether to include target module
    pub include_target: bool,
    /// Whether to log span events (enter/exit/close)
    pub log_spans: bool,
    /// Environment filter (e.g., "info,metagraph=debug")
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            include_location: cfg!(debug_assertions),
            include_target: true,
            log_spans: cfg!(debug_assertions),
            filter: None,
        }
    }
}

/// Initialize structured logging with configuration
pub fn init_logging(config: LogConfig) -> anyhow::Result<()> {
    let env_filter = if let Some(filter) = config.filter {
        EnvFilter::try_new(filter)?
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,metagraph=debug"))
    };

    let fmt_span = if config.log_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(fmt_span);

    match config.format {
        LogFormat::Pretty => {
            subscriber
                .pretty()
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize pretty logger: {}", e))?;
        }
        LogFormat::Compact => {
            subscriber
                .compact()
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize compact logger: {}", e))?;
        }
        LogFormat::Json => {
            subscriber
                .json()
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize JSON logger: {}", e))?;
        }
    }

    tracing::info!(
        format = ?config.format,
        location = config.include_location,
        target = config.include_target,
        "Logging initialized"
    );

    Ok(())
}

/// Helper to create a span for a repository operation on one instance
pub fn instance_span(operation: &str, guid: &str) -> Span {
    tracing::debug_span!(
        "instance_op",
        operation = operation,
        guid = guid,
        version = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}

/// Helper to create a span for a search
pub fn search_span(operation: &str, type_name: Option<&str>) -> Span {
    tracing::debug_span!(
        "search",
        operation = operation,
        type_name = type_name.unwrap_or("<any>"),
        result_count = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}

/// Helper to create a span for a graph traversal
pub fn traversal_span(operation: &str, start_guid: &str, depth: usize) -> Span {
    tracing::debug_span!(
        "traversal",
        operation = operation,
        start_guid = start_guid,
        depth = depth,
        visited = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}

/// Record the outcome of an instance operation span
pub fn record_instance_result(span: &Span, version: u64, duration_ms: u128) {
    span.record("version", version);
    span.record("duration_ms", duration_ms);
}

/// Record the outcome of a search span
pub fn record_search_result(span: &Span, result_count: usize, duration_ms: u128) {
    span.record("result_count", result_count);
    span.record("duration_ms", duration_ms);
}

/// Record the outcome of a traversal span
pub fn record_traversal_result(span: &Span, visited: usize, duration_ms: u128) {
    span.record("visited", visited);
    span.record("duration_ms", duration_ms);
}

/// Log a slow query warning
pub fn log_slow_query(operation: &str, duration_ms: u128, threshold_ms: u128) {
    if duration_ms > threshold_ms {
        tracing::warn!(
            operation = operation,
            duration_ms = duration_ms,
            threshold_ms = threshold_ms,
            "Slow query detected"
        );
    }
}
