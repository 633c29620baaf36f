//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroUsize,
    str::FromStr,
    time::Duration,
};

use axum::http::HeaderName;
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::{DEFAULT_GROUP_HEADER, DEFAULT_MAX_BODY_BYTES, Sloppiness};

mod cli;

pub use cli::{CliArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "tagcache";
const ENV_PREFIX: &str = "TAGCACHE";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_MAX_HEADER_BYTES: usize = 1024 * 1024;
/// hyper refuses read buffers smaller than this.
const MIN_MAX_HEADER_BYTES: usize = 8 * 1024;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub backend: BackendSettings,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub max_header_bytes: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub url: Url,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub sloppiness: Sloppiness,
    pub preserve_key_order: bool,
    pub max_body_bytes: NonZeroUsize,
    pub group_header: HeaderName,
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

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("missing required setting `{key}`: {hint}")]
    Missing {
        key: &'static str,
        hint: &'static str,
    },
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

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_serve_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    backend: RawBackendSettings,
    cache: RawCacheSettings,
    logging: RawLoggingSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(url) = overrides.backend_url.as_ref() {
            self.backend.url = Some(url.clone());
        }
        if let Some(seconds) = overrides.backend_timeout_seconds {
            self.backend.timeout_seconds = Some(seconds);
        }
        if let Some(host) = overrides.host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.port {
            self.server.port = Some(port);
        }
        if let Some(bytes) = overrides.max_header_bytes {
            self.server.max_header_bytes = Some(bytes);
        }
        if let Some(ratio) = overrides.sloppiness {
            self.cache.sloppiness = Some(ratio);
        }
        if let Some(preserve) = overrides.preserve_key_order {
            self.cache.preserve_key_order = Some(preserve);
        }
        if let Some(bytes) = overrides.max_body_bytes {
            self.cache.max_body_bytes = Some(bytes);
        }
        if let Some(header) = overrides.group_header.as_ref() {
            self.cache.group_header = Some(header.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            backend,
            cache,
            logging,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            backend: build_backend_settings(backend)?,
            cache: build_cache_settings(cache)?,
            logging: build_logging_settings(logging)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let ip = IpAddr::from_str(host.trim())
        .map_err(|err| LoadError::invalid("server.host", format!("invalid address `{host}`: {err}")))?;

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let max_header_bytes = server.max_header_bytes.unwrap_or(DEFAULT_MAX_HEADER_BYTES);
    if max_header_bytes < MIN_MAX_HEADER_BYTES {
        return Err(LoadError::invalid(
            "server.max_header_bytes",
            format!("must be at least {MIN_MAX_HEADER_BYTES}"),
        ));
    }
    let max_header_bytes = NonZeroUsize::new(max_header_bytes)
        .ok_or_else(|| LoadError::invalid("server.max_header_bytes", "must be greater than zero"))?;

    Ok(ServerSettings {
        addr: SocketAddr::new(ip, port),
        max_header_bytes,
    })
}

fn build_backend_settings(backend: RawBackendSettings) -> Result<BackendSettings, LoadError> {
    let raw_url = backend
        .url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(LoadError::Missing {
            key: "backend.url",
            hint: "set CACHE_BACKEND or pass --backend-url",
        })?;

    let url = Url::parse(&raw_url)
        .map_err(|err| LoadError::invalid("backend.url", format!("`{raw_url}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "backend.url",
            format!("unsupported scheme `{}`", url.scheme()),
        ));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(LoadError::invalid(
            "backend.url",
            "must not carry a query string or fragment",
        ));
    }

    let timeout = match backend.timeout_seconds {
        Some(0) => {
            return Err(LoadError::invalid(
                "backend.timeout_seconds",
                "must be greater than zero",
            ));
        }
        Some(seconds) => Some(Duration::from_secs(seconds)),
        None => None,
    };

    Ok(BackendSettings { url, timeout })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let ratio = cache.sloppiness.unwrap_or(0.0);
    if !ratio.is_finite() || !(0.0..=1.0).contains(&ratio) {
        return Err(LoadError::invalid(
            "cache.sloppiness",
            format!("must be within [0, 1], got {ratio}"),
        ));
    }

    let max_body_bytes = NonZeroUsize::new(cache.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES))
        .ok_or_else(|| LoadError::invalid("cache.max_body_bytes", "must be greater than zero"))?;

    let header = cache
        .group_header
        .unwrap_or_else(|| DEFAULT_GROUP_HEADER.to_string());
    let group_header = HeaderName::from_str(header.trim()).map_err(|err| {
        LoadError::invalid("cache.group_header", format!("`{header}`: {err}"))
    })?;

    Ok(CacheSettings {
        sloppiness: Sloppiness::new(ratio),
        preserve_key_order: cache.preserve_key_order.unwrap_or(false),
        max_body_bytes,
        group_header,
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

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    max_header_bytes: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBackendSettings {
    url: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    sloppiness: Option<f64>,
    preserve_key_order: Option<bool>,
    max_body_bytes: Option<usize>,
    group_header: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}
