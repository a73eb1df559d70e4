use std::{collections::HashMap, str::FromStr};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::assets::AssetConfig;

/// One provider's answer for a batch of assets, keyed by asset symbol.
pub type SourceResult<T> = Result<HashMap<String, T>, FetchError>;

#[async_trait]
pub trait DataSource<T>: Sync + Send {
    fn name(&self) -> &'static str;

    /// Fetches data for as many of `assets` as the provider knows about.
    async fn fetch(&self, assets: &[AssetConfig]) -> SourceResult<T>;
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{provider} unavailable: {reason}")]
    SourceUnavailable {
        provider: &'static str,
        reason: String,
    },
    #[error("{provider} returned an unexpected response: {reason}")]
    SourceParseError {
        provider: &'static str,
        reason: String,
    },
}

impl FetchError {
    pub fn unavailable(provider: &'static str, reason: impl ToString) -> FetchError {
        FetchError::SourceUnavailable {
            provider,
            reason: reason.to_string(),
        }
    }

    pub fn parse(provider: &'static str, reason: impl ToString) -> FetchError {
        FetchError::SourceParseError {
            provider,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: Decimal,
    pub source: &'static str,
    pub fetched_at: DateTime<Utc>,
}

/// 24h statistics. Every figure is zero when no provider could supply them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketStats {
    pub symbol: String,
    pub change_24h: Decimal,
    pub change_percent_24h: Decimal,
    pub high_24h: Decimal,
    pub low_24h: Decimal,
    pub volume_24h: Decimal,
}

impl MarketStats {
    pub fn unavailable(symbol: &str) -> MarketStats {
        MarketStats {
            symbol: symbol.to_owned(),
            change_24h: Decimal::ZERO,
            change_percent_24h: Decimal::ZERO,
            high_24h: Decimal::ZERO,
            low_24h: Decimal::ZERO,
            volume_24h: Decimal::ZERO,
        }
    }
}

pub fn build_client(user_agent: &str, timeout: std::time::Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
}

/// Sends a GET request and decodes the body as JSON.
///
/// Transport failures and non-2xx statuses map to `SourceUnavailable`,
/// a body that is not JSON maps to `SourceParseError`.
pub async fn get_json(provider: &'static str, request: RequestBuilder) -> Result<JsonValue, FetchError> {
    let resp_payload = request
        .send()
        .await
        .map_err(|e| FetchError::unavailable(provider, e))?;
    let status = resp_payload.status();
    debug!("{} response code: {}", provider, status);
    if !status.is_success() {
        let body = resp_payload.text().await.unwrap_or_default();
        return Err(FetchError::unavailable(
            provider,
            format!("HTTP {}: {}", status, body.trim()),
        ));
    }
    let text = resp_payload
        .text()
        .await
        .map_err(|e| FetchError::unavailable(provider, e))?;
    serde_json::from_str(&text).map_err(|e| FetchError::parse(provider, e))
}

/// Reads a decimal that providers encode either as a JSON string or a number.
pub fn decimal_field(provider: &'static str, value: &JsonValue, field: &str) -> Result<Decimal, FetchError> {
    let parsed = match &value[field] {
        JsonValue::String(s) => Decimal::from_str(s).ok(),
        // serde_json prints the shortest round-trip form, e.g. `1.5e-7`
        JsonValue::Number(n) => {
            let repr = n.to_string();
            Decimal::from_str(&repr)
                .or_else(|_| Decimal::from_scientific(&repr))
                .ok()
        }
        _ => None,
    };
    parsed.ok_or_else(|| {
        FetchError::parse(
            provider,
            format!("field `{}` missing or not numeric: {}", field, value[field]),
        )
    })
}

/// Like [`decimal_field`], but a missing or null field degrades to zero.
pub fn decimal_field_or_zero(provider: &'static str, value: &JsonValue, field: &str) -> Result<Decimal, FetchError> {
    if value[field].is_null() {
        return Ok(Decimal::ZERO);
    }
    decimal_field(provider, value, field)
}

/// Merges per-asset answers from providers queried one asset at a time.
///
/// Failed assets are skipped; the provider only fails when no asset succeeded.
pub fn collect_per_asset<T>(
    provider: &'static str,
    results: Vec<(&AssetConfig, Result<T, FetchError>)>,
) -> SourceResult<T> {
    let mut out = HashMap::new();
    let mut last_error = None;
    for (asset, result) in results {
        match result {
            Ok(value) => {
                out.insert(asset.symbol.to_owned(), value);
            }
            Err(e) => {
                warn!("{}: {} skipped: {}", provider, asset.symbol, e);
                last_error = Some(e);
            }
        }
    }
    match last_error {
        Some(e) if out.is_empty() => Err(e),
        _ => Ok(out),
    }
}

pub fn positive_price(provider: &'static str, symbol: &str, price: Decimal) -> Result<Decimal, FetchError> {
    if price <= Decimal::ZERO {
        return Err(FetchError::parse(
            provider,
            format!("non-positive price {} for {}", price, symbol),
        ));
    }
    Ok(price)
}
