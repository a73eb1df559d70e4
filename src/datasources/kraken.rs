use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use super::datasource::{
    collect_per_asset, get_json, positive_price, DataSource, FetchError, PriceQuote, SourceResult,
};
use crate::assets::AssetConfig;

const NAME: &str = "Kraken";
const BASE_URL: &str = "https://api.kraken.com";

/// Last-trade price from Kraken. Assets without a Kraken pair are skipped.
pub struct KrakenDataSource {
    client: Arc<Client>,
    base_url: String,
}

impl KrakenDataSource {
    pub fn new(client: Arc<Client>) -> KrakenDataSource {
        KrakenDataSource::with_base_url(client, BASE_URL)
    }

    pub fn with_base_url(client: Arc<Client>, base_url: &str) -> KrakenDataSource {
        KrakenDataSource {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    async fn run_query(&self, pair: &str) -> Result<Decimal, FetchError> {
        let request = self
            .client
            .get(&format!("{}/0/public/Ticker", self.base_url))
            .query(&[("pair", pair)]);
        let response = get_json(NAME, request).await?;
        info!("Kraken: {} {}", pair, response);
        parse_ticker(&response)
    }
}

fn parse_ticker(response: &JsonValue) -> Result<Decimal, FetchError> {
    if response["error"][0] != JsonValue::Null {
        return Err(FetchError::unavailable(NAME, &response["error"][0]));
    }
    // the result is keyed by Kraken's internal pair name, e.g. XXBTZUSD
    let last = response["result"]
        .as_object()
        .and_then(|m| m.values().next())
        .and_then(|p| p["c"][0].as_str())
        .ok_or_else(|| FetchError::parse(NAME, "Failed to parse Kraken response"))?;
    Decimal::from_str(last).map_err(|e| FetchError::parse(NAME, e))
}

#[async_trait]
impl DataSource<PriceQuote> for KrakenDataSource {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(&self, assets: &[AssetConfig]) -> SourceResult<PriceQuote> {
        let mut results = Vec::with_capacity(assets.len());
        for asset in assets {
            let pair = match asset.kraken_pair {
                Some(pair) => pair,
                None => {
                    debug!("Kraken: no pair for {}", asset.symbol);
                    continue;
                }
            };
            let result = self
                .run_query(pair)
                .await
                .and_then(|price| positive_price(NAME, asset.symbol, price))
                .map(|price| PriceQuote {
                    symbol: asset.symbol.to_owned(),
                    price,
                    source: NAME,
                    fetched_at: Utc::now(),
                });
            results.push((asset, result));
        }
        collect_per_asset(NAME, results)
    }
}
