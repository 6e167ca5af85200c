//! Configuration management for Leasekeeper server
//!
//! Sources, lowest precedence first: `conf/application.yml`, `LEASEKEEPER_*`
//! environment variables (`__` separates key segments, so
//! `LEASEKEEPER_SERVER__PORT` sets `server.port`), command line flags.

use std::path::PathBuf;

use clap::Parser;
use config::{Config, Environment};

use leasekeeper_lease::LeaseConfig;
use leasekeeper_persistence::StorageMode;

use crate::startup::LoggingConfig;

pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_TICKS_PER_MOMENT: u64 = 100;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Command line arguments for the server
#[derive(Debug, Default, Parser)]
#[command(version, about = "Lease lifecycle and expiry server")]
pub struct Cli {
    /// Storage backend: external_db, embedded or memory
    #[arg(short = 's', long = "storage")]
    pub storage: Option<String>,
    #[arg(long = "db-url", env = "DATABASE_URL")]
    pub database_url: Option<String>,
    #[arg(long = "data-dir")]
    pub data_dir: Option<String>,
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
    /// Configuration file (default: conf/application.yml)
    #[arg(short = 'c', long = "config")]
    pub config_file: Option<String>,
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load from the process command line
    pub fn new() -> anyhow::Result<Self> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(args: Cli) -> anyhow::Result<Self> {
        let file = args
            .config_file
            .clone()
            .unwrap_or_else(|| "conf/application.yml".to_string());

        let mut builder = Config::builder()
            .add_source(config::File::with_name(&file).required(false))
            .add_source(
                Environment::with_prefix("leasekeeper")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(v) = args.storage {
            builder = builder.set_override("storage.mode", v)?;
        }
        if let Some(v) = args.database_url {
            builder = builder.set_override("db.url", v)?;
        }
        if let Some(v) = args.data_dir {
            builder = builder.set_override("embedded.data_dir", v)?;
        }
        if let Some(v) = args.port {
            builder = builder.set_override("server.port", i64::from(v))?;
        }

        Ok(Configuration {
            config: builder.build()?,
        })
    }

    pub fn from_config(config: Config) -> Self {
        Configuration { config }
    }

    // ========================================================================
    // Server Configuration
    // ========================================================================

    pub fn server_address(&self) -> String {
        self.config
            .get_string("server.address")
            .unwrap_or("0.0.0.0".to_string())
    }

    pub fn server_port(&self) -> u16 {
        self.config
            .get_int("server.port")
            .ok()
            .and_then(|v| u16::try_from(v).ok())
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn event_channel_capacity(&self) -> usize {
        self.config
            .get_int("event.channel_capacity")
            .ok()
            .and_then(|v| usize::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_EVENT_CHANNEL_CAPACITY)
    }

    // ========================================================================
    // Lease Engine Configuration
    // ========================================================================

    /// `lease` section; missing keys take their defaults
    pub fn lease_config(&self) -> anyhow::Result<LeaseConfig> {
        let lease = match self.config.get::<LeaseConfig>("lease") {
            Ok(lease) => lease,
            Err(config::ConfigError::NotFound(_)) => LeaseConfig::default(),
            Err(e) => return Err(e.into()),
        };
        lease.validate()?;
        Ok(lease)
    }

    pub fn ticks_per_moment(&self) -> u64 {
        self.config
            .get_int("lease.ticks_per_moment")
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(DEFAULT_TICKS_PER_MOMENT)
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.config
            .get_int("tick.interval_ms")
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_TICK_INTERVAL_MS)
    }

    /// Generate ticks in-process; when false ticks arrive on `POST /v1/ticks`
    pub fn tick_local(&self) -> bool {
        self.config.get_bool("tick.local").unwrap_or(true)
    }

    // ========================================================================
    // Storage Configuration
    // ========================================================================

    pub fn storage_mode(&self) -> anyhow::Result<StorageMode> {
        match self.config.get_string("storage.mode") {
            Ok(mode) => mode.parse::<StorageMode>().map_err(anyhow::Error::msg),
            Err(_) => Ok(StorageMode::Embedded),
        }
    }

    pub fn database_url(&self) -> anyhow::Result<String> {
        Ok(self.config.get_string("db.url")?)
    }

    pub fn database_max_connections(&self) -> u32 {
        self.config
            .get_int("db.pool.max_connections")
            .ok()
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(10)
    }

    pub fn embedded_data_dir(&self) -> String {
        self.config.get_string("embedded.data_dir").unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            format!("{}/leasekeeper/data", home)
        })
    }

    // ========================================================================
    // Collaborator Endpoints
    // ========================================================================

    pub fn provisioner_url(&self) -> Option<String> {
        self.config.get_string("provisioner.url").ok()
    }

    pub fn provisioner_timeout_ms(&self) -> u64 {
        self.config
            .get_int("provisioner.timeout_ms")
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(120_000)
    }

    pub fn notify_url(&self) -> Option<String> {
        self.config.get_string("notify.url").ok()
    }

    pub fn heartbeat_url(&self) -> Option<String> {
        self.config.get_string("heartbeat.url").ok()
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    /// Logging settings from `logging.*`, then `LEASEKEEPER_LOG_*` overrides
    pub fn logging_config(&self) -> LoggingConfig {
        let mut logging = LoggingConfig::from_config(
            self.config.get_string("logging.dir").ok(),
            self.config.get_bool("logging.console").unwrap_or(true),
            self.config.get_bool("logging.file").unwrap_or(true),
            self.config
                .get_string("logging.level")
                .unwrap_or("info".to_string()),
        );
        logging.apply_env();
        logging
    }

    pub fn log_dir(&self) -> PathBuf {
        self.logging_config().log_dir
    }
}
