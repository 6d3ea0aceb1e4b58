//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "ordercache";
const ENV_PREFIX: &str = "ORDERCACHE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_INSTANCE_KEY: &str = "instance-1";
const DEFAULT_INGEST_CHANNEL: &str = "orders";
const DEFAULT_INGEST_QUEUE_DEPTH: usize = 256;
const DEFAULT_INGEST_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INGEST_RETRY_BASE_DELAY_MS: u64 = 200;
const DEFAULT_INGEST_RETRY_MAX_DELAY_MS: u64 = 5_000;

/// Command-line arguments for the ordercache binary.
#[derive(Debug, Parser)]
#[command(
    name = "ordercache",
    version,
    about = "Order ingestion service with a restart-safe lookup cache"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "ORDERCACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the ingestion listener and the HTTP lookup service.
    Serve(Box<ServeArgs>),
    /// Delete every cache ledger row recorded for this instance.
    Finish(FinishArgs),
    /// Apply pending database migrations and exit.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
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

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the cache capacity; unparsable values fall back to the default.
    #[arg(long = "cache-capacity", value_name = "COUNT")]
    pub cache_capacity: Option<String>,

    /// Override the ledger partition key of this instance.
    #[arg(long = "cache-instance-key", value_name = "KEY")]
    pub cache_instance_key: Option<String>,

    /// Admit orders into the cache when a lookup misses but the store has them.
    #[arg(
        long = "cache-repopulate-on-read",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_repopulate_on_read: Option<bool>,

    /// Clear the ledger of this instance on graceful shutdown.
    #[arg(
        long = "cache-clear-ledger-on-shutdown",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_clear_ledger_on_shutdown: Option<bool>,

    /// Override the notification channel orders are published on.
    #[arg(long = "ingest-channel", value_name = "CHANNEL")]
    pub ingest_channel: Option<String>,

    /// Override how many times a failed order write is attempted.
    #[arg(long = "ingest-max-attempts", value_name = "COUNT")]
    pub ingest_max_attempts: Option<u32>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct FinishArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Ledger partition to clear; defaults to the configured instance key.
    #[arg(long = "cache-instance-key", value_name = "KEY")]
    pub instance_key: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub ingest: IngestSettings,
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
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

/// Cache settings.
///
/// `capacity` is kept raw: the cache resolves it at bootstrap and falls back to its
/// default (with a warning) when the value is missing or unparsable.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub capacity: Option<String>,
    pub instance_key: String,
    pub repopulate_on_read: bool,
    pub clear_ledger_on_shutdown: bool,
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub channel: String,
    pub queue_depth: NonZeroUsize,
    pub max_attempts: NonZeroU32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
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
        Some(Command::Finish(args)) => raw.apply_finish_overrides(args),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    ingest: RawIngestSettings,
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
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(capacity) = overrides.cache_capacity.as_ref() {
            self.cache.capacity = Some(capacity.clone());
        }
        if let Some(key) = overrides.cache_instance_key.as_ref() {
            self.cache.instance_key = Some(key.clone());
        }
        if let Some(value) = overrides.cache_repopulate_on_read {
            self.cache.repopulate_on_read = Some(value);
        }
        if let Some(value) = overrides.cache_clear_ledger_on_shutdown {
            self.cache.clear_ledger_on_shutdown = Some(value);
        }
        if let Some(channel) = overrides.ingest_channel.as_ref() {
            self.ingest.channel = Some(channel.clone());
        }
        if let Some(value) = overrides.ingest_max_attempts {
            self.ingest.max_attempts = Some(value);
        }
    }

    fn apply_finish_overrides(&mut self, args: &FinishArgs) {
        self.apply_database_override(&args.database);
        if let Some(key) = args.instance_key.as_ref() {
            self.cache.instance_key = Some(key.clone());
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            ingest,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            ingest: build_ingest_settings(ingest)?,
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
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = NonZeroU32::new(max_connections)
        .ok_or_else(|| LoadError::invalid("database.max_connections", "must be greater than zero"))?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let instance_key = cache
        .instance_key
        .unwrap_or_else(|| DEFAULT_INSTANCE_KEY.to_string());
    let instance_key = instance_key.trim().to_string();
    if instance_key.is_empty() {
        return Err(LoadError::invalid(
            "cache.instance_key",
            "instance key must not be empty",
        ));
    }

    Ok(CacheSettings {
        capacity: cache.capacity,
        instance_key,
        repopulate_on_read: cache.repopulate_on_read.unwrap_or(false),
        clear_ledger_on_shutdown: cache.clear_ledger_on_shutdown.unwrap_or(false),
    })
}

fn build_ingest_settings(ingest: RawIngestSettings) -> Result<IngestSettings, LoadError> {
    let channel = ingest
        .channel
        .unwrap_or_else(|| DEFAULT_INGEST_CHANNEL.to_string());
    if channel.trim().is_empty() {
        return Err(LoadError::invalid(
            "ingest.channel",
            "channel name must not be empty",
        ));
    }

    let queue_depth = NonZeroUsize::new(ingest.queue_depth.unwrap_or(DEFAULT_INGEST_QUEUE_DEPTH))
        .ok_or_else(|| LoadError::invalid("ingest.queue_depth", "must be greater than zero"))?;

    let max_attempts = NonZeroU32::new(
        ingest
            .max_attempts
            .unwrap_or(DEFAULT_INGEST_MAX_ATTEMPTS),
    )
    .ok_or_else(|| LoadError::invalid("ingest.max_attempts", "must be greater than zero"))?;

    let base_ms = ingest
        .retry_base_delay_ms
        .unwrap_or(DEFAULT_INGEST_RETRY_BASE_DELAY_MS);
    let max_ms = ingest
        .retry_max_delay_ms
        .unwrap_or(DEFAULT_INGEST_RETRY_MAX_DELAY_MS);
    if max_ms < base_ms {
        return Err(LoadError::invalid(
            "ingest.retry_max_delay_ms",
            "must not be smaller than ingest.retry_base_delay_ms",
        ));
    }

    Ok(IngestSettings {
        channel: channel.trim().to_string(),
        queue_depth,
        max_attempts,
        retry_base_delay: Duration::from_millis(base_ms),
        retry_max_delay: Duration::from_millis(max_ms),
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
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    capacity: Option<String>,
    instance_key: Option<String>,
    repopulate_on_read: Option<bool>,
    clear_ledger_on_shutdown: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIngestSettings {
    channel: Option<String>,
    queue_depth: Option<usize>,
    max_attempts: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    retry_max_delay_ms: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());
        raw.cache.capacity = Some("25".to_string());

        let overrides = ServeOverrides {
            server_port: Some(4321),
            log_level: Some("debug".to_string()),
            cache_capacity: Some("3".to_string()),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
        assert_eq!(settings.cache.capacity.as_deref(), Some("3"));
    }

    #[test]
    fn defaults_are_applied() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

        assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
        assert_eq!(settings.cache.instance_key, DEFAULT_INSTANCE_KEY);
        assert!(settings.cache.capacity.is_none());
        assert!(!settings.cache.repopulate_on_read);
        assert_eq!(settings.ingest.channel, DEFAULT_INGEST_CHANNEL);
        assert_eq!(settings.ingest.max_attempts.get(), DEFAULT_INGEST_MAX_ATTEMPTS);
        assert!(settings.database.url.is_none());
    }

    #[test]
    fn invalid_cache_capacity_is_not_a_load_error() {
        let mut raw = RawSettings::default();
        raw.cache.capacity = Some("lots".to_string());
        let settings = Settings::from_raw(raw).expect("capacity is resolved later");
        assert_eq!(settings.cache.capacity.as_deref(), Some("lots"));
    }

    #[test]
    fn blank_instance_key_is_rejected() {
        let mut raw = RawSettings::default();
        raw.cache.instance_key = Some("  ".to_string());
        let err = Settings::from_raw(raw).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "cache.instance_key",
                ..
            }
        ));
    }

    #[test]
    fn retry_delays_must_be_ordered() {
        let mut raw = RawSettings::default();
        raw.ingest.retry_base_delay_ms = Some(1_000);
        raw.ingest.retry_max_delay_ms = Some(10);
        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(0);
        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["ordercache"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }

    #[test]
    fn parse_finish_arguments() {
        let args = CliArgs::parse_from([
            "ordercache",
            "finish",
            "--database-url",
            "postgres://example",
            "--cache-instance-key",
            "node-7",
        ]);

        let Some(Command::Finish(finish)) = args.command else {
            panic!("wrong command parsed");
        };
        assert_eq!(
            finish.database.database_url.as_deref(),
            Some("postgres://example")
        );

        let mut raw = RawSettings::default();
        raw.apply_finish_overrides(&finish);
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.cache.instance_key, "node-7");
        assert_eq!(settings.database.url.as_deref(), Some("postgres://example"));
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "ordercache",
            "serve",
            "--cache-capacity",
            "64",
            "--cache-repopulate-on-read",
            "true",
            "--ingest-channel",
            "intros",
        ]);

        let Some(Command::Serve(serve)) = args.command else {
            panic!("wrong command parsed");
        };
        assert_eq!(serve.overrides.cache_capacity.as_deref(), Some("64"));
        assert_eq!(serve.overrides.cache_repopulate_on_read, Some(true));
        assert_eq!(serve.overrides.ingest_channel.as_deref(), Some("intros"));
    }
}
