use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use super::datasource::{
    collect_per_asset, decimal_field, get_json, positive_price, DataSource, FetchError,
    MarketStats, PriceQuote, SourceResult,
};
use crate::assets::AssetConfig;

const NAME: &str = "Coinbase";
const SPOT_BASE_URL: &str = "https://api.coinbase.com";
const EXCHANGE_BASE_URL: &str = "https://api.exchange.coinbase.com";

/// Coinbase only answers one product per request, so assets are queried one by one.
pub struct CoinbaseDataSource {
    client: Arc<Client>,
    spot_base_url: String,
    exchange_base_url: String,
}

impl CoinbaseDataSource {
    pub fn new(client: Arc<Client>) -> CoinbaseDataSource {
        CoinbaseDataSource::with_base_urls(client, SPOT_BASE_URL, EXCHANGE_BASE_URL)
    }

    /// Spot prices and exchange stats live on different hosts.
    pub fn with_base_urls(client: Arc<Client>, spot_base_url: &str, exchange_base_url: &str) -> CoinbaseDataSource {
        CoinbaseDataSource {
            client,
            spot_base_url: spot_base_url.trim_end_matches('/').to_owned(),
            exchange_base_url: exchange_base_url.trim_end_matches('/').to_owned(),
        }
    }

    async fn run_query(&self, url: String) -> Result<JsonValue, FetchError> {
        let response = get_json(NAME, self.client.get(&url)).await?;
        info!("Coinbase: {} {}", url, response);
        if response["message"] != JsonValue::Null {
            return Err(FetchError::unavailable(NAME, &response["message"]));
        }
        if response["errors"] != JsonValue::Null {
            return Err(FetchError::unavailable(NAME, &response["errors"][0]["message"]));
        }
        Ok(response)
    }
}

fn parse_spot(response: &JsonValue, asset: &AssetConfig, fetched_at: DateTime<Utc>) -> Result<PriceQuote, FetchError> {
    let price = decimal_field(NAME, &response["data"], "amount")?;
    Ok(PriceQuote {
        symbol: asset.symbol.to_owned(),
        price: positive_price(NAME, asset.symbol, price)?,
        source: NAME,
        fetched_at,
    })
}

fn parse_stats(response: &JsonValue, asset: &AssetConfig) -> Result<MarketStats, FetchError> {
    let open = decimal_field(NAME, response, "open")?;
    let last = decimal_field(NAME, response, "last")?;
    let change = last
        .checked_sub(open)
        .ok_or_else(|| FetchError::parse(NAME, format!("change from {} to {} out of range", open, last)))?;
    // a degenerate open price leaves the percentage at zero
    let change_percent = if open > Decimal::ZERO {
        change
            .checked_div(open)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .map(|pct| pct.round_dp(2))
            .unwrap_or(Decimal::ZERO)
    } else {
        Decimal::ZERO
    };
    Ok(MarketStats {
        symbol: asset.symbol.to_owned(),
        change_24h: change,
        change_percent_24h: change_percent,
        high_24h: decimal_field(NAME, response, "high")?,
        low_24h: decimal_field(NAME, response, "low")?,
        volume_24h: decimal_field(NAME, response, "volume")?,
    })
}

#[async_trait]
impl DataSource<PriceQuote> for CoinbaseDataSource {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(&self, assets: &[AssetConfig]) -> SourceResult<PriceQuote> {
        let mut results = Vec::with_capacity(assets.len());
        for asset in assets {
            let url = format!("{}/v2/prices/{}/spot", self.spot_base_url, asset.coinbase_pair);
            let result = match self.run_query(url).await {
                Ok(response) => parse_spot(&response, asset, Utc::now()),
                Err(e) => Err(e),
            };
            results.push((asset, result));
        }
        collect_per_asset(NAME, results)
    }
}

#[async_trait]
impl DataSource<MarketStats> for CoinbaseDataSource {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(&self, assets: &[AssetConfig]) -> SourceResult<MarketStats> {
        let mut results = Vec::with_capacity(assets.len());
        for asset in assets {
            let url = format!("{}/products/{}/stats", self.exchange_base_url, asset.coinbase_pair);
            let result = match self.run_query(url).await {
                Ok(response) => parse_stats(&response, asset),
                Err(e) => Err(e),
            };
            results.push((asset, result));
        }
        collect_per_asset(NAME, results)
    }
}
