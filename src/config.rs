use std::{env, str::FromStr, time::Duration};

use thiserror::Error;

use crate::assets::{self, AssetConfig};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
    #[error("unknown asset symbol {0:?} in WATCH_ASSETS")]
    UnknownAsset(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_token: String,
    pub chat_id: String,
    pub port: u16,
    pub assets: Vec<AssetConfig>,
    pub check_interval: Duration,
    pub error_backoff: Duration,
    pub request_timeout: Duration,
    pub message_delay: Duration,
    pub summary_every: u64,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Config::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
        // empty values are treated as unset
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let required = |var: &'static str| get(var).ok_or(ConfigError::Missing(var));

        let telegram_token = required("TELEGRAM_TOKEN")?;
        let chat_id = required("TELEGRAM_CHAT_ID")?;

        let assets = match get("WATCH_ASSETS") {
            Some(list) => parse_watchlist(&list)?,
            None => parse_watchlist(&assets::DEFAULT_WATCHLIST.join(","))?,
        };

        Ok(Config {
            telegram_token,
            chat_id,
            port: parse_or("PORT", get("PORT"), 8080)?,
            assets,
            check_interval: secs_or("CHECK_INTERVAL_SECS", get("CHECK_INTERVAL_SECS"), 300)?,
            error_backoff: secs_or("ERROR_BACKOFF_SECS", get("ERROR_BACKOFF_SECS"), 60)?,
            request_timeout: secs_or("REQUEST_TIMEOUT_SECS", get("REQUEST_TIMEOUT_SECS"), 10)?,
            message_delay: Duration::from_millis(parse_or("MESSAGE_DELAY_MILLIS", get("MESSAGE_DELAY_MILLIS"), 1000)?),
            summary_every: parse_or("SUMMARY_EVERY_CYCLES", get("SUMMARY_EVERY_CYCLES"), 6)?,
        })
    }
}

fn parse_or<T: FromStr>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: format!("{:?}: {}", value, e),
        }),
    }
}

/// A whole number of seconds, at least one.
fn secs_or(var: &'static str, value: Option<String>, default: u64) -> Result<Duration, ConfigError> {
    match parse_or(var, value, default)? {
        0 => Err(ConfigError::Invalid {
            var,
            reason: "must be at least 1 second".to_owned(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn parse_watchlist(list: &str) -> Result<Vec<AssetConfig>, ConfigError> {
    let mut assets: Vec<AssetConfig> = vec![];
    for symbol in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let asset = assets::lookup(symbol).ok_or_else(|| ConfigError::UnknownAsset(symbol.to_owned()))?;
        if !assets.iter().any(|a| a.symbol == asset.symbol) {
            assets.push(asset);
        }
    }
    if assets.is_empty() {
        return Err(ConfigError::Invalid {
            var: "WATCH_ASSETS",
            reason: "no assets listed".to_owned(),
        });
    }
    Ok(assets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|var| vars.get(var).cloned())
    }

    const CREDENTIALS: [(&str, &str); 2] = [("TELEGRAM_TOKEN", "123:abc"), ("TELEGRAM_CHAT_ID", "-100")];

    #[test]
    fn defaults_apply() {
        let config = config(&CREDENTIALS).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.check_interval, Duration::from_secs(300));
        assert_eq!(config.error_backoff, Duration::from_secs(60));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.message_delay, Duration::from_secs(1));
        assert_eq!(config.summary_every, 6);
        assert_eq!(
            config.assets.iter().map(|a| a.symbol).collect::<Vec<_>>(),
            vec!["BTC", "ETH", "BNB", "SOL", "XRP"]
        );
    }

    #[test]
    fn missing_or_empty_credentials_are_fatal() {
        assert_eq!(config(&[]).unwrap_err(), ConfigError::Missing("TELEGRAM_TOKEN"));
        assert_eq!(
            config(&[("TELEGRAM_TOKEN", "123:abc"), ("TELEGRAM_CHAT_ID", "  ")]).unwrap_err(),
            ConfigError::Missing("TELEGRAM_CHAT_ID")
        );
    }

    #[test]
    fn overrides_are_parsed() {
        let mut vars = CREDENTIALS.to_vec();
        vars.extend([("PORT", "9000"), ("WATCH_ASSETS", "btc, btc"), ("CHECK_INTERVAL_SECS", "30")]);
        let config = config(&vars).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.check_interval, Duration::from_secs(30));
        assert_eq!(config.assets.len(), 1);
        assert_eq!(config.assets[0].symbol, "BTC");
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut vars = CREDENTIALS.to_vec();
        vars.push(("PORT", "eighty"));
        assert!(matches!(config(&vars), Err(ConfigError::Invalid { var: "PORT", .. })));

        let mut vars = CREDENTIALS.to_vec();
        vars.push(("WATCH_ASSETS", "BTC,DOGE"));
        assert_eq!(config(&vars).unwrap_err(), ConfigError::UnknownAsset("DOGE".to_owned()));
    }

    #[test]
    fn zero_durations_are_rejected() {
        for var in ["CHECK_INTERVAL_SECS", "ERROR_BACKOFF_SECS", "REQUEST_TIMEOUT_SECS"] {
            let mut vars = CREDENTIALS.to_vec();
            vars.push((var, "0"));
            assert!(matches!(config(&vars), Err(ConfigError::Invalid { var: v, .. }) if v == var));
        }
        let mut vars = CREDENTIALS.to_vec();
        vars.push(("SUMMARY_EVERY_CYCLES", "0"));
        assert_eq!(config(&vars).unwrap().summary_every, 0);
    }
}
