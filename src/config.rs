//! Configuration module for graceline
//!
//! Configuration is loaded with the following priority (highest first):
//! 1. Command line arguments
//! 2. Environment variables (prefixed with GRACELINE_)
//! 3. Configuration file (config.toml, graceline.toml or graceline.yaml)
//! 4. Default values
//!
//! With nothing set, the service listens on `0.0.0.0:8080` and allows in-flight
//! requests ten seconds to drain on shutdown.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Default host to bind to
const DEFAULT_HOST: &str = "0.0.0.0";
/// Default port
const DEFAULT_PORT: u16 = 8080;
/// Default grace period for draining in-flight requests
const DEFAULT_GRACE_PERIOD_SECS: u64 = 10;

/// Command line arguments
#[derive(Parser, Debug, Default)]
#[command(name = "graceline")]
#[command(about = "HTTP health-check service with bounded graceful shutdown")]
pub struct CliArgs {
    /// Host to bind the server to
    #[arg(long, env = "GRACELINE_HOST")]
    pub host: Option<String>,

    /// Port to bind the server to
    #[arg(short, long, env = "GRACELINE_PORT")]
    pub port: Option<u16>,

    /// Seconds allowed for in-flight requests to finish during shutdown
    #[arg(long, env = "GRACELINE_GRACE_PERIOD_SECS")]
    pub grace_period_secs: Option<u64>,

    /// Path to configuration file
    #[arg(short, long, env = "GRACELINE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// File-based configuration (for TOML/YAML)
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    grace_period_secs: Option<u64>,
}

/// Configuration for the graceline server
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind the server to
    pub host: String,

    /// Port to bind the server to (0 picks a free port)
    pub port: u16,

    /// How long shutdown waits for in-flight requests before giving up
    pub grace_period: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            grace_period: Duration::from_secs(DEFAULT_GRACE_PERIOD_SECS),
        }
    }
}

impl Config {
    /// Create a new configuration with explicit values
    pub fn new(host: &str, port: u16, grace_period: Duration) -> Self {
        Self {
            host: host.to_string(),
            port,
            grace_period,
        }
    }

    /// Load configuration from all sources (CLI > env > file > defaults)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_args(CliArgs::parse())
    }

    /// Load configuration from provided CLI args (for testing)
    pub fn load_from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        let file_config = Self::load_file_config(&args.config)?;

        // File overrides defaults
        if let Some(h) = file_config.host {
            config.host = h;
        }
        if let Some(p) = file_config.port {
            config.port = p;
        }
        if let Some(secs) = file_config.grace_period_secs {
            config.grace_period = Duration::from_secs(secs);
        }

        // CLI overrides everything
        if let Some(h) = args.host {
            config.host = h;
        }
        if let Some(p) = args.port {
            config.port = p;
        }
        if let Some(secs) = args.grace_period_secs {
            config.grace_period = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Load configuration from file
    fn load_file_config(config_path: &Option<PathBuf>) -> Result<FileConfig, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path.as_path()));
        } else {
            builder = builder
                .add_source(File::with_name("config").required(false))
                .add_source(File::with_name("graceline").required(false));
        }

        builder = builder.add_source(Self::environment());

        let settings = builder.build()?;
        settings.try_deserialize()
    }

    /// `GRACELINE_*` environment variables. Nesting would need a double underscore,
    /// which keeps `grace_period_secs` a single key.
    fn environment() -> Environment {
        Environment::with_prefix("GRACELINE")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Get the socket address for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
