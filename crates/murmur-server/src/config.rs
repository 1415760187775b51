use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use murmur_api::ServiceSettings;
use murmur_api::responder::{DEFAULT_TRIGGER, ResponderConfig};

/// Server configuration, read from `MURMUR_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub session_ttl_hours: i64,
    pub session_sweep: Duration,
    pub max_wait: Duration,
    pub responder: Option<ResponderConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let session_ttl_hours: i64 = parse(&lookup, "MURMUR_SESSION_TTL_HOURS", 24)?;
        if session_ttl_hours <= 0 {
            anyhow::bail!("MURMUR_SESSION_TTL_HOURS must be positive, got {}", session_ttl_hours);
        }
        let sweep_secs: u64 = parse(&lookup, "MURMUR_SESSION_SWEEP_SECS", 600)?;
        if sweep_secs == 0 {
            anyhow::bail!("MURMUR_SESSION_SWEEP_SECS must be positive");
        }

        let responder = match lookup("MURMUR_RESPONDER_URL").filter(|u| !u.trim().is_empty()) {
            Some(url) => Some(ResponderConfig {
                url: url.trim().to_string(),
                trigger: var("MURMUR_RESPONDER_TRIGGER", DEFAULT_TRIGGER),
                timeout: Duration::from_secs(parse(&lookup, "MURMUR_RESPONDER_TIMEOUT_SECS", 20)?),
            }),
            None => None,
        };

        Ok(Self {
            host: var("MURMUR_HOST", "0.0.0.0"),
            port: parse(&lookup, "MURMUR_PORT", 8000)?,
            db_path: var("MURMUR_DB_PATH", "murmur.db").into(),
            session_ttl_hours,
            session_sweep: Duration::from_secs(sweep_secs),
            max_wait: Duration::from_millis(parse(&lookup, "MURMUR_MAX_WAIT_MS", 30_000)?),
            responder,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            session_ttl: chrono::Duration::hours(self.session_ttl_hours),
            max_wait: self.max_wait,
            responder: self.responder.clone(),
        }
    }
}

fn parse<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}
