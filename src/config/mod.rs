//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "delivery-cache";
const ENV_PREFIX: &str = "DELIVERY_CACHE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DELIVERY_BASE_URL: &str = "https://deliver.kontent.ai";
const DEFAULT_PREVIEW_BASE_URL: &str = "https://preview-deliver.kontent.ai";
const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SLIDING_EXPIRATION_SECS: u64 = 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Command-line arguments for the delivery-cache binary.
#[derive(Debug, Parser)]
#[command(
    name = "delivery-cache",
    version,
    about = "Caching proxy for the content delivery API"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "DELIVERY_CACHE_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Print the webhook signature of a payload file using the configured secret.
    Sign(SignArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

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

    /// Override the delivery project id.
    #[arg(long = "delivery-project-id", value_name = "ID")]
    pub delivery_project_id: Option<String>,

    /// Override the upstream request timeout.
    #[arg(long = "delivery-timeout-seconds", value_name = "SECONDS")]
    pub delivery_timeout_seconds: Option<u64>,

    /// Enable or disable the cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the sliding expiration window.
    #[arg(long = "cache-sliding-expiration-seconds", value_name = "SECONDS")]
    pub cache_sliding_expiration_seconds: Option<u64>,

    /// Override the sweep interval.
    #[arg(long = "cache-sweep-interval-seconds", value_name = "SECONDS")]
    pub cache_sweep_interval_seconds: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct SignArgs {
    /// Payload file to sign.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub delivery: DeliverySettings,
    pub webhook: WebhookSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
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
pub struct DeliverySettings {
    /// Required to serve; checked when the delivery source is built.
    pub project_id: Option<String>,
    pub preview_api_key: Option<String>,
    pub base_url: Url,
    pub preview_base_url: Url,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct WebhookSettings {
    pub secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub sliding_expiration: Duration,
    pub sweep_interval: Duration,
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

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Sign(_)) | None => {}
    }

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
    logging: RawLoggingSettings,
    delivery: RawDeliverySettings,
    webhook: RawWebhookSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(project_id) = overrides.delivery_project_id.as_ref() {
            self.delivery.project_id = Some(project_id.clone());
        }
        if let Some(seconds) = overrides.delivery_timeout_seconds {
            self.delivery.timeout_seconds = Some(seconds);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(seconds) = overrides.cache_sliding_expiration_seconds {
            self.cache.sliding_expiration_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.cache_sweep_interval_seconds {
            self.cache.sweep_interval_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            delivery,
            webhook,
            cache,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            delivery: build_delivery_settings(delivery)?,
            webhook: build_webhook_settings(webhook),
            cache: build_cache_settings(cache)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.host", reason))?;

    let graceful_shutdown = positive_seconds(
        server.graceful_shutdown_seconds,
        DEFAULT_GRACEFUL_SHUTDOWN_SECS,
        "server.graceful_shutdown_seconds",
    )?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
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

fn build_delivery_settings(delivery: RawDeliverySettings) -> Result<DeliverySettings, LoadError> {
    let base_url = parse_base_url(
        delivery.base_url.as_deref(),
        DEFAULT_DELIVERY_BASE_URL,
        "delivery.base_url",
    )?;
    let preview_base_url = parse_base_url(
        delivery.preview_base_url.as_deref(),
        DEFAULT_PREVIEW_BASE_URL,
        "delivery.preview_base_url",
    )?;
    let timeout = positive_seconds(
        delivery.timeout_seconds,
        DEFAULT_DELIVERY_TIMEOUT_SECS,
        "delivery.timeout_seconds",
    )?;

    Ok(DeliverySettings {
        project_id: non_blank(delivery.project_id),
        preview_api_key: non_blank(delivery.preview_api_key),
        base_url,
        preview_base_url,
        timeout,
    })
}

fn build_webhook_settings(webhook: RawWebhookSettings) -> WebhookSettings {
    WebhookSettings {
        secret: non_blank(webhook.secret),
    }
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        sliding_expiration: positive_seconds(
            cache.sliding_expiration_seconds,
            DEFAULT_SLIDING_EXPIRATION_SECS,
            "cache.sliding_expiration_seconds",
        )?,
        sweep_interval: positive_seconds(
            cache.sweep_interval_seconds,
            DEFAULT_SWEEP_INTERVAL_SECS,
            "cache.sweep_interval_seconds",
        )?,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDeliverySettings {
    project_id: Option<String>,
    preview_api_key: Option<String>,
    base_url: Option<String>,
    preview_base_url: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWebhookSettings {
    secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    sliding_expiration_seconds: Option<u64>,
    sweep_interval_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_base_url(value: Option<&str>, default: &str, key: &'static str) -> Result<Url, LoadError> {
    let raw = value.map(str::trim).filter(|v| !v.is_empty()).unwrap_or(default);
    let url = Url::parse(raw).map_err(|err| LoadError::invalid(key, format!("`{raw}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(key, "scheme must be http or https"));
    }
    Ok(url)
}

fn positive_seconds(
    value: Option<u64>,
    default: u64,
    key: &'static str,
) -> Result<Duration, LoadError> {
    let seconds = value.unwrap_or(default);
    if seconds == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(seconds))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
