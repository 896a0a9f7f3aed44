//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;
#[cfg(test)]
mod tests;

use std::{net::SocketAddr, path::PathBuf, str::FromStr};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::pagination::{DEFAULT_LIMIT, MAX_LIMIT, QueryLimits};
use crate::cache::CacheConfig;

pub use cli::{CheckQueryArgs, CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "tzquery";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 5000;
const DEFAULT_ADMIN_PORT: u16 = 5001;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub query: QueryLimits,
    pub data: DataSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
    pub admin_addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enable: bool,
    pub response_limit: usize,
    pub max_bytes: usize,
    pub head_ttl_seconds: u64,
    pub coalesce_misses: bool,
    pub auto_consume_interval_ms: u64,
    pub consume_batch_limit: usize,
}

#[derive(Debug, Clone)]
pub struct DataSettings {
    /// JSON fixture file for the in-memory dispatcher; `None` serves empty tables.
    pub fixtures: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("TZQUERY").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::CheckQuery(_)) => {}
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    query: RawQuerySettings,
    data: RawDataSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(host) = overrides.server_admin_host.as_ref() {
            self.server.admin_host = Some(host.clone());
        }
        if let Some(port) = overrides.public_port {
            self.server.public_port = Some(port);
        }
        if let Some(port) = overrides.admin_port {
            self.server.admin_port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(enable) = overrides.cache_enable {
            self.cache.enable = Some(enable);
        }
        if let Some(limit) = overrides.cache_response_limit {
            self.cache.response_limit = Some(limit);
        }
        if let Some(bytes) = overrides.cache_max_bytes {
            self.cache.max_bytes = Some(bytes);
        }
        if let Some(ttl) = overrides.cache_head_ttl_seconds {
            self.cache.head_ttl_seconds = Some(ttl);
        }
        if let Some(coalesce) = overrides.cache_coalesce_misses {
            self.cache.coalesce_misses = Some(coalesce);
        }
        if let Some(interval) = overrides.cache_auto_consume_interval_ms {
            self.cache.auto_consume_interval_ms = Some(interval);
        }
        if let Some(limit) = overrides.cache_consume_batch_limit {
            self.cache.consume_batch_limit = Some(limit);
        }
        if let Some(limit) = overrides.query_default_limit {
            self.query.default_limit = Some(limit);
        }
        if let Some(limit) = overrides.query_max_limit {
            self.query.max_limit = Some(limit);
        }
        if let Some(path) = overrides.data_fixtures.as_ref() {
            self.data.fixtures = Some(path.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            query,
            data,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            query: build_query_limits(query)?,
            data: build_data_settings(data),
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let admin_host = server
        .admin_host
        .unwrap_or_else(|| DEFAULT_ADMIN_HOST.to_string());

    let public_port = server.public_port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if public_port == 0 {
        return Err(LoadError::invalid(
            "server.public_port",
            "port must be greater than zero",
        ));
    }

    let admin_port = server.admin_port.unwrap_or(DEFAULT_ADMIN_PORT);
    if admin_port == 0 {
        return Err(LoadError::invalid(
            "server.admin_port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, public_port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;
    let admin_addr = parse_socket_addr(&admin_host, admin_port)
        .map_err(|reason| LoadError::invalid("server.admin_addr", reason))?;

    Ok(ServerSettings {
        public_addr,
        admin_addr,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let defaults = CacheConfig::default();

    let response_limit = cache.response_limit.unwrap_or(defaults.response_limit);
    if response_limit == 0 {
        return Err(LoadError::invalid(
            "cache.response_limit",
            "must be greater than zero",
        ));
    }

    let max_bytes = cache.max_bytes.unwrap_or(defaults.max_bytes);
    if max_bytes == 0 {
        return Err(LoadError::invalid(
            "cache.max_bytes",
            "must be greater than zero",
        ));
    }

    let auto_consume_interval_ms = cache
        .auto_consume_interval_ms
        .unwrap_or(defaults.auto_consume_interval_ms);
    if auto_consume_interval_ms == 0 {
        return Err(LoadError::invalid(
            "cache.auto_consume_interval_ms",
            "must be greater than zero",
        ));
    }

    let consume_batch_limit = cache
        .consume_batch_limit
        .unwrap_or(defaults.consume_batch_limit);
    if consume_batch_limit == 0 {
        return Err(LoadError::invalid(
            "cache.consume_batch_limit",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        enable: cache.enable.unwrap_or(defaults.enable),
        response_limit,
        max_bytes,
        head_ttl_seconds: cache.head_ttl_seconds.unwrap_or(defaults.head_ttl_seconds),
        coalesce_misses: cache.coalesce_misses.unwrap_or(defaults.coalesce_misses),
        auto_consume_interval_ms,
        consume_batch_limit,
    })
}

fn build_query_limits(query: RawQuerySettings) -> Result<QueryLimits, LoadError> {
    let max_limit = query.max_limit.unwrap_or(MAX_LIMIT);
    if max_limit == 0 {
        return Err(LoadError::invalid(
            "query.max_limit",
            "must be greater than zero",
        ));
    }

    let default_limit = query.default_limit.unwrap_or(DEFAULT_LIMIT.min(max_limit));
    if default_limit > max_limit {
        return Err(LoadError::invalid(
            "query.default_limit",
            format!("must not exceed query.max_limit ({max_limit})"),
        ));
    }

    Ok(QueryLimits {
        default_limit,
        max_limit,
    })
}

fn build_data_settings(data: RawDataSettings) -> DataSettings {
    let fixtures = data
        .fixtures
        .filter(|path| !path.as_os_str().is_empty());
    DataSettings { fixtures }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    admin_host: Option<String>,
    public_port: Option<u16>,
    admin_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enable: Option<bool>,
    response_limit: Option<usize>,
    max_bytes: Option<usize>,
    head_ttl_seconds: Option<u64>,
    coalesce_misses: Option<bool>,
    auto_consume_interval_ms: Option<u64>,
    consume_batch_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawQuerySettings {
    default_limit: Option<u32>,
    max_limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDataSettings {
    fixtures: Option<PathBuf>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}
