use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the tzquery binary.
#[derive(Debug, Parser)]
#[command(name = "tzquery", version, about = "Tezos indexer query API")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "TZQUERY_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the public and admin HTTP listeners.
    Serve(Box<ServeArgs>),
    /// Decode a query string against a resource and print its cache key.
    #[command(name = "check-query")]
    CheckQuery(CheckQueryArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct CheckQueryArgs {
    /// Resource name, e.g. `transactions` or `accounts`.
    #[arg(value_name = "RESOURCE")]
    pub resource: String,

    /// Raw query string without the leading `?`.
    #[arg(value_name = "QUERY", default_value = "")]
    pub query: String,

    /// Decode as a count request.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub count: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the public listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the administrative listener host.
    #[arg(long = "server-admin-host", value_name = "HOST")]
    pub server_admin_host: Option<String>,

    /// Override the public listener port.
    #[arg(long = "server-public-port", value_name = "PORT")]
    pub public_port: Option<u16>,

    /// Override the administrative listener port.
    #[arg(long = "server-admin-port", value_name = "PORT")]
    pub admin_port: Option<u16>,

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

    /// Enable the response cache.
    #[arg(
        long = "cache-enable",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enable: Option<bool>,

    /// Override the maximum number of cached responses.
    #[arg(long = "cache-response-limit", value_name = "COUNT")]
    pub cache_response_limit: Option<usize>,

    /// Override the total cached payload budget in bytes.
    #[arg(long = "cache-max-bytes", value_name = "BYTES")]
    pub cache_max_bytes: Option<usize>,

    /// Override the chain head TTL.
    #[arg(long = "cache-head-ttl-seconds", value_name = "SECONDS")]
    pub cache_head_ttl_seconds: Option<u64>,

    /// Toggle miss coalescing.
    #[arg(
        long = "cache-coalesce-misses",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_coalesce_misses: Option<bool>,

    /// Override the cache auto-consume interval in milliseconds.
    #[arg(long = "cache-auto-consume-interval-ms", value_name = "MS")]
    pub cache_auto_consume_interval_ms: Option<u64>,

    /// Override the cache consume batch limit.
    #[arg(long = "cache-consume-batch-limit", value_name = "COUNT")]
    pub cache_consume_batch_limit: Option<usize>,

    /// Override the page size used when a request gives none.
    #[arg(long = "query-default-limit", value_name = "COUNT")]
    pub query_default_limit: Option<u32>,

    /// Override the largest page size a request may ask for.
    #[arg(long = "query-max-limit", value_name = "COUNT")]
    pub query_max_limit: Option<u32>,

    /// Override the fixture file served by the in-memory dispatcher.
    #[arg(long = "data-fixtures", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub data_fixtures: Option<PathBuf>,
}
