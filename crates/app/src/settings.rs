//! Settings for the `campusride` binary.
//!
//! Values come from a TOML file (`settings.toml` unless `--config` says
//! otherwise), then from `CAMPUSRIDE__SECTION__KEY` environment variables,
//! then from command-line overrides.

use std::time::Duration;

use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "settings";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

#[derive(Debug, Deserialize)]
pub struct App {
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub bind: Option<String>,
    pub port: u16,
    pub database: Database,
}

#[derive(Debug, Deserialize)]
pub struct Gateway {
    pub secret_key: String,
    pub base_url: String,
    pub currency: String,
    pub verify_timeout_ms: u64,
}

impl Gateway {
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }
}

#[derive(Debug, Deserialize)]
pub struct Notifications {
    pub probe_interval_secs: u64,
}

impl Notifications {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: App,
    pub server: Server,
    pub gateway: Gateway,
    pub notifications: Notifications,
}

#[derive(Debug, Parser)]
#[command(name = "campusride", version, about = "Campus rides wallet and ride service")]
struct Args {
    /// Config file path, without or with the `.toml` extension.
    #[arg(long, env = "CAMPUSRIDE_CONFIG")]
    config: Option<String>,
    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long)]
    level: Option<String>,
    /// Override the listening port.
    #[arg(long)]
    port: Option<u16>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let args = Args::parse();
        let config_path = args.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);

        let mut builder = Config::builder()
            .set_default("app.level", "info")?
            .set_default("server.port", 3000)?
            .set_default("server.database", "memory")?
            .set_default("gateway.base_url", "https://api.paystack.co")?
            .set_default("gateway.currency", "NGN")?
            .set_default("gateway.verify_timeout_ms", 10_000)?
            .set_default("notifications.probe_interval_secs", 30)?
            .add_source(File::with_name(config_path).required(args.config.is_some()))
            .add_source(Environment::with_prefix("CAMPUSRIDE").separator("__"));
        if let Some(level) = args.level {
            builder = builder.set_override("app.level", level)?;
        }
        if let Some(port) = args.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }

        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.secret_key.trim().is_empty() {
            return Err(ConfigError::Message(
                "gateway.secret_key must not be empty".to_string(),
            ));
        }
        if self.gateway.verify_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "gateway.verify_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.notifications.probe_interval_secs == 0 {
            return Err(ConfigError::Message(
                "notifications.probe_interval_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
