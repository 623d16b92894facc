//! Environment-driven process settings

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::core::runtime::EngineSettings;
use crate::errors::ConfigError;
use crate::services::binance::DEFAULT_BINANCE_URL;

pub fn get_environment() -> String {
    env::var("ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string())
}

pub fn is_production(environment: &str) -> bool {
    matches!(environment, "production" | "prod")
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub config_path: PathBuf,
    pub binance_url: String,
    pub proxy_url: Option<String>,
    pub webhook_url: Option<Url>,
    /// Robot secret; when set every webhook request is signed
    pub webhook_secret: Option<String>,
    pub engine: EngineSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = EngineSettings::default();

        let webhook_url = match non_empty(&lookup, "NOTIFY_WEBHOOK_URL") {
            Some(raw) => Some(Url::parse(&raw).map_err(|_| ConfigError::InvalidVar {
                name: "NOTIFY_WEBHOOK_URL",
                value: raw,
            })?),
            None => None,
        };

        let engine = EngineSettings {
            fetch_timeout: secs_var(&lookup, "FETCH_TIMEOUT_SECS", defaults.fetch_timeout)?,
            failure_backoff: secs_var(
                &lookup,
                "FETCH_FAILURE_BACKOFF_SECS",
                defaults.failure_backoff,
            )?,
            delivery_timeout: secs_var(
                &lookup,
                "DELIVERY_TIMEOUT_SECS",
                defaults.delivery_timeout,
            )?,
            dispatch_queue_capacity: parse_var(
                &lookup,
                "DISPATCH_QUEUE_CAPACITY",
                defaults.dispatch_queue_capacity,
            )?,
            ..defaults
        };
        if engine.dispatch_queue_capacity == 0 {
            return Err(ConfigError::InvalidVar {
                name: "DISPATCH_QUEUE_CAPACITY",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            port: parse_var(&lookup, "PORT", 8080)?,
            config_path: non_empty(&lookup, "MONITOR_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("monitor.json")),
            binance_url: non_empty(&lookup, "BINANCE_API_URL")
                .unwrap_or_else(|| DEFAULT_BINANCE_URL.to_string()),
            proxy_url: non_empty(&lookup, "PROXY_URL"),
            webhook_url,
            webhook_secret: non_empty(&lookup, "NOTIFY_WEBHOOK_SECRET"),
            engine,
        })
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match non_empty(lookup, name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidVar { name, value: raw }),
        None => Ok(default),
    }
}

fn secs_var<F>(lookup: &F, name: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: u64 = parse_var(lookup, name, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::InvalidVar {
            name,
            value: secs.to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}
