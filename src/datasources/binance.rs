use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use reqwest::Client;
use serde_json::Value as JsonValue;

use super::datasource::{
    decimal_field, get_json, positive_price, DataSource, FetchError, MarketStats, PriceQuote,
    SourceResult,
};
use crate::assets::AssetConfig;

const NAME: &str = "Binance";
const BASE_URL: &str = "https://api.binance.com";

/// Binance public REST API. Both endpoints accept every requested symbol in one call.
pub struct BinanceDataSource {
    client: Arc<Client>,
    base_url: String,
}

impl BinanceDataSource {
    pub fn new(client: Arc<Client>) -> BinanceDataSource {
        BinanceDataSource::with_base_url(client, BASE_URL)
    }

    pub fn with_base_url(client: Arc<Client>, base_url: &str) -> BinanceDataSource {
        BinanceDataSource {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    async fn run_query(&self, path: &str, assets: &[AssetConfig]) -> Result<JsonValue, FetchError> {
        let symbols = assets.iter().map(|a| a.binance_symbol).collect::<Vec<_>>();
        let symbols = serde_json::to_string(&symbols).map_err(|e| FetchError::parse(NAME, e))?;
        info!("Binance: querying {} for {}", path, symbols);
        let request = self
            .client
            .get(&format!("{}{}", self.base_url, path))
            .query(&[("symbols", symbols)]);
        let response = get_json(NAME, request).await?;
        if response["msg"] != JsonValue::Null {
            return Err(FetchError::unavailable(NAME, &response["msg"]));
        }
        Ok(response)
    }
}

/// Pairs each entry of a Binance array response with the asset it belongs to.
fn entries<'a>(
    response: &'a JsonValue,
    assets: &'a [AssetConfig],
) -> Result<Vec<(&'a AssetConfig, &'a JsonValue)>, FetchError> {
    let by_symbol: HashMap<_, _> = assets.iter().map(|a| (a.binance_symbol, a)).collect();
    let rows = response
        .as_array()
        .ok_or_else(|| FetchError::parse(NAME, "result is not array"))?;
    rows.iter()
        .map(|row| -> Result<Option<(&'a AssetConfig, &'a JsonValue)>, FetchError> {
            let symbol = row["symbol"]
                .as_str()
                .ok_or_else(|| FetchError::parse(NAME, "entry without symbol"))?;
            Ok(by_symbol.get(symbol).map(|asset| (*asset, row)))
        })
        .filter_map(Result::transpose)
        .collect()
}

fn parse_prices(
    response: &JsonValue,
    assets: &[AssetConfig],
    fetched_at: DateTime<Utc>,
) -> SourceResult<PriceQuote> {
    entries(response, assets)?
        .into_iter()
        .map(|(asset, row)| -> Result<(String, PriceQuote), FetchError> {
            let price = positive_price(NAME, asset.symbol, decimal_field(NAME, row, "price")?)?;
            Ok((
                asset.symbol.to_owned(),
                PriceQuote {
                    symbol: asset.symbol.to_owned(),
                    price,
                    source: NAME,
                    fetched_at,
                },
            ))
        })
        .collect()
}

fn parse_stats(response: &JsonValue, assets: &[AssetConfig]) -> SourceResult<MarketStats> {
    entries(response, assets)?
        .into_iter()
        .map(|(asset, row)| -> Result<(String, MarketStats), FetchError> {
            Ok((
                asset.symbol.to_owned(),
                MarketStats {
                    symbol: asset.symbol.to_owned(),
                    change_24h: decimal_field(NAME, row, "priceChange")?,
                    change_percent_24h: decimal_field(NAME, row, "priceChangePercent")?,
                    high_24h: decimal_field(NAME, row, "highPrice")?,
                    low_24h: decimal_field(NAME, row, "lowPrice")?,
                    volume_24h: decimal_field(NAME, row, "volume")?,
                },
            ))
        })
        .collect()
}

#[async_trait]
impl DataSource<PriceQuote> for BinanceDataSource {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(&self, assets: &[AssetConfig]) -> SourceResult<PriceQuote> {
        let response = self.run_query("/api/v3/ticker/price", assets).await?;
        parse_prices(&response, assets, Utc::now())
    }
}

#[async_trait]
impl DataSource<MarketStats> for BinanceDataSource {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(&self, assets: &[AssetConfig]) -> SourceResult<MarketStats> {
        let response = self.run_query("/api/v3/ticker/24hr", assets).await?;
        parse_stats(&response, assets)
    }
}
