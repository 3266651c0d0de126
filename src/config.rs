//! Runtime configuration from the environment (and `.env`, loaded in `main`).

use std::time::Duration;
use crate::{Result, WallcraftError};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub port: u16,
    pub currency: String,
    pub checkout_throttle: Duration,
    pub rate_limit_max: usize,
    pub rate_limit_window: Duration,
    /// Sessions untouched for this long are forgotten.
    pub session_idle: Duration,
    pub telegram: Option<TelegramConfig>,
    pub nats_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = get("DATABASE_URL").ok_or_else(|| WallcraftError::Config("DATABASE_URL not set".to_string()))?;
        let telegram = match (get("TELEGRAM_BOT_TOKEN"), get("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramConfig { bot_token, chat_id }),
            (None, None) => None,
            _ => return Err(WallcraftError::Config("TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID must be set together".to_string())),
        };
        Ok(Self {
            database_url,
            max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            port: parse_or(&get, "PORT", 8083)?,
            currency: get("STORE_CURRENCY").unwrap_or_else(|| "EUR".to_string()),
            checkout_throttle: Duration::from_secs(parse_or(&get, "CHECKOUT_THROTTLE_SECS", 60)?),
            rate_limit_max: parse_or(&get, "RATE_LIMIT_MAX", 30)?,
            rate_limit_window: Duration::from_secs(parse_or(&get, "RATE_LIMIT_WINDOW_SECS", 60)?),
            session_idle: Duration::from_secs(parse_or(&get, "SESSION_IDLE_SECS", 86_400)?),
            telegram,
            nats_url: get("NATS_URL").filter(|u| !u.is_empty()),
        })
    }
}

fn parse_or<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| WallcraftError::Config(format!("{key} has an invalid value: {raw}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/wallcraft")])).unwrap();
        assert_eq!(config.port, 8083);
        assert_eq!(config.currency, "EUR");
        assert_eq!(config.checkout_throttle, Duration::from_secs(60));
        assert_eq!(config.session_idle, Duration::from_secs(86_400));
        assert!(config.telegram.is_none());
        assert!(config.nats_url.is_none());
    }

    #[test]
    fn test_missing_database_url() {
        assert!(matches!(Config::from_lookup(lookup(&[])), Err(WallcraftError::Config(_))));
    }

    #[test]
    fn test_invalid_number_and_partial_telegram() {
        let bad_port = lookup(&[("DATABASE_URL", "x"), ("PORT", "eighty")]);
        assert!(Config::from_lookup(bad_port).is_err());
        let half = lookup(&[("DATABASE_URL", "x"), ("TELEGRAM_BOT_TOKEN", "t")]);
        assert!(Config::from_lookup(half).is_err());
        let both = lookup(&[("DATABASE_URL", "x"), ("TELEGRAM_BOT_TOKEN", "t"), ("TELEGRAM_CHAT_ID", "42"), ("CHECKOUT_THROTTLE_SECS", "5")]);
        let config = Config::from_lookup(both).unwrap();
        assert_eq!(config.telegram.unwrap().chat_id, "42");
        assert_eq!(config.checkout_throttle, Duration::from_secs(5));
    }
}
