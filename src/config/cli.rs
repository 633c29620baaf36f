use std::path::PathBuf;

use clap::{Args, Parser, builder::BoolishValueParser};

/// Command-line arguments for the tagcache binary.
#[derive(Debug, Parser)]
#[command(
    name = "tagcache",
    version,
    about = "Tag-invalidated caching proxy for a single HTTP backend"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "TAGCACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Backend every cache miss is forwarded to.
    #[arg(long = "backend-url", env = "CACHE_BACKEND", value_name = "URL")]
    pub backend_url: Option<String>,

    /// Give up on a backend request after this many seconds.
    #[arg(long = "backend-timeout-seconds", value_name = "SECONDS")]
    pub backend_timeout_seconds: Option<u64>,

    /// Override the listener host.
    #[arg(long = "host", value_name = "HOST")]
    pub host: Option<String>,

    /// Override the listener port.
    #[arg(long = "port", env = "PORT", value_name = "PORT")]
    pub port: Option<u16>,

    /// Largest accepted request head (request line plus headers) in bytes.
    #[arg(long = "max-header-bytes", value_name = "BYTES")]
    pub max_header_bytes: Option<usize>,

    /// Probability in [0, 1] of skipping tag-index cleanup on eviction.
    #[arg(long = "sloppiness", value_name = "RATIO")]
    pub sloppiness: Option<f64>,

    /// Keep object key order when deriving tags instead of sorting keys.
    #[arg(
        long = "preserve-key-order",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub preserve_key_order: Option<bool>,

    /// Largest backend body buffered for caching, in bytes.
    #[arg(long = "max-body-bytes", value_name = "BYTES")]
    pub max_body_bytes: Option<usize>,

    /// Header carrying the access group.
    #[arg(long = "group-header", value_name = "NAME")]
    pub group_header: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}
