use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::settlement::{Money, SettlementPolicy};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub settlement: SettlementPolicy,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            settlement: load_settlement_policy()?,
        })
    }
}

fn load_settlement_policy() -> Result<SettlementPolicy, ConfigError> {
    let defaults = SettlementPolicy::default();
    let policy = SettlementPolicy {
        service_share: decimal_var("PAYOUT_SERVICE_SHARE", defaults.service_share)?,
        add_on_share: decimal_var("PAYOUT_ADD_ON_SHARE", defaults.add_on_share)?,
        consumption_share: decimal_var("PAYOUT_CONSUMPTION_SHARE", defaults.consumption_share)?,
        max_advance: Money::new(decimal_var(
            "PAYOUT_MAX_ADVANCE",
            defaults.max_advance.amount(),
        )?),
    };

    for (key, rate) in [
        ("PAYOUT_SERVICE_SHARE", policy.service_share),
        ("PAYOUT_ADD_ON_SHARE", policy.add_on_share),
        ("PAYOUT_CONSUMPTION_SHARE", policy.consumption_share),
    ] {
        if rate < Decimal::ZERO || rate > Decimal::ONE {
            return Err(ConfigError::InvalidPolicy {
                key,
                reason: "share must be between 0 and 1",
            });
        }
    }
    if !policy.max_advance.is_positive() {
        return Err(ConfigError::InvalidPolicy {
            key: "PAYOUT_MAX_ADVANCE",
            reason: "maximum advance must be greater than zero",
        });
    }

    Ok(policy)
}

fn decimal_var(key: &'static str, default: Decimal) -> Result<Decimal, ConfigError> {
    match env::var(key) {
        Ok(raw) => Decimal::from_str(raw.trim())
            .map_err(|_| ConfigError::InvalidDecimal { key, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidDecimal { key: &'static str, value: String },
    InvalidPolicy { key: &'static str, reason: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidDecimal { key, value } => {
                write!(f, "{key} must be a decimal number (got '{value}')")
            }
            ConfigError::InvalidPolicy { key, reason } => write!(f, "{key}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidDecimal { .. }
            | ConfigError::InvalidPolicy { .. } => None,
        }
    }
}
