use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{info, warn};

const SECRETS_DIR: &str = "/run/secrets";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Secret {0} not found in /run/secrets or the environment")]
    MissingSecret(&'static str),

    #[error("Unknown store backend {0}, expected redis or memory")]
    UnknownBackend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

impl Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StoreBackend::Redis => "redis",
            StoreBackend::Memory => "memory",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub store_backend: StoreBackend,
    /// Read on every bootstrap request.
    pub initial_admin_registration: bool,
    pub token_ttl: Duration,
    pub token_secret: String,
    pub gate_lock_timeout: Option<Duration>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            port: try_load("RUST_PORT", "1111")?,
            redis_url: try_load("REDIS_URL", "redis://127.0.0.1:6379")?,
            store_backend: try_load("STORE_BACKEND", "redis")?,
            initial_admin_registration: try_load("INITIAL_ADMIN_REGISTRATION", "true")?,
            token_ttl: Duration::from_secs(try_load("TOKEN_TTL_SECS", "1209600")?),
            token_secret: read_secret("AUTH_TOKEN_SECRET")?,
            gate_lock_timeout: try_load_optional::<u64>("GATE_LOCK_TIMEOUT_MS")?
                .map(Duration::from_millis),
        })
    }

    /// In-memory store with registration enabled, for local runs and tests.
    pub fn local(token_secret: &str) -> Self {
        Self {
            port: 1111,
            redis_url: String::new(),
            store_backend: StoreBackend::Memory,
            initial_admin_registration: true,
            token_ttl: Duration::from_secs(60 * 60),
            token_secret: token_secret.to_string(),
            gate_lock_timeout: None,
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    value.trim().parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }
    })
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    parse(key, &value)
}

fn try_load_optional<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T::Err: Display,
{
    var(key).map(|value| parse(key, &value)).transpose()
}

fn read_secret(secret_name: &'static str) -> Result<String, ConfigError> {
    let path = format!("{SECRETS_DIR}/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .or_else(|e| {
            warn!("Failed to read {secret_name} from file: {e}, trying environment");
            var(secret_name).ok_or(ConfigError::MissingSecret(secret_name))
        })
        .and_then(|secret| {
            if secret.is_empty() {
                Err(ConfigError::MissingSecret(secret_name))
            } else {
                Ok(secret)
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_backend_parse() {
        assert_eq!("redis".parse::<StoreBackend>().unwrap(), StoreBackend::Redis);
        assert_eq!(" Memory ".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("postgres".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_parse_values() {
        assert!(parse::<bool>("FLAG", "false").is_ok_and(|flag| !flag));
        assert_eq!(parse::<u16>("PORT", " 8080 ").unwrap(), 8080);
        assert!(matches!(
            parse::<u16>("PORT", "99999"),
            Err(ConfigError::Invalid { key: "PORT", .. })
        ));
    }

    #[test]
    fn test_missing_optional() {
        let value = try_load_optional::<u64>("STACK_TEST_SURELY_UNSET_VARIABLE").unwrap();
        assert_eq!(value, None);
    }
}
