use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{info, warn};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use super::datasource::{
    decimal_field, decimal_field_or_zero, get_json, positive_price, DataSource, FetchError,
    MarketStats, PriceQuote, SourceResult,
};
use crate::assets::AssetConfig;

const NAME: &str = "CoinGecko";
const BASE_URL: &str = "https://api.coingecko.com";

pub struct CoinGeckoDataSource {
    client: Arc<Client>,
    base_url: String,
}

impl CoinGeckoDataSource {
    pub fn new(client: Arc<Client>) -> CoinGeckoDataSource {
        CoinGeckoDataSource {
            client,
            base_url: BASE_URL.to_owned(),
        }
    }

    fn ids(assets: &[AssetConfig]) -> String {
        assets
            .iter()
            .map(|a| a.coingecko_id)
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn parse_prices(
    response: &JsonValue,
    assets: &[AssetConfig],
    fetched_at: DateTime<Utc>,
) -> SourceResult<PriceQuote> {
    if !response.is_object() {
        return Err(FetchError::parse(NAME, "result is not object"));
    }
    let mut prices = std::collections::HashMap::new();
    for asset in assets {
        let entry = &response[asset.coingecko_id];
        if entry.is_null() {
            continue;
        }
        let price = positive_price(NAME, asset.symbol, decimal_field(NAME, entry, "usd")?)?;
        prices.insert(
            asset.symbol.to_owned(),
            PriceQuote {
                symbol: asset.symbol.to_owned(),
                price,
                source: NAME,
                fetched_at,
            },
        );
    }
    Ok(prices)
}

fn parse_markets(response: &JsonValue, assets: &[AssetConfig]) -> SourceResult<MarketStats> {
    let rows = response
        .as_array()
        .ok_or_else(|| FetchError::parse(NAME, "result is not array"))?;
    let mut stats = std::collections::HashMap::new();
    for row in rows {
        let asset = match assets.iter().find(|a| row["id"].as_str() == Some(a.coingecko_id)) {
            Some(asset) => asset,
            None => continue,
        };
        let current_price = decimal_field(NAME, row, "current_price")?;
        // total_volume is quoted in USD; convert to base units like the exchanges report
        let volume_usd = decimal_field_or_zero(NAME, row, "total_volume")?;
        let volume = if current_price > Decimal::ZERO {
            volume_usd.checked_div(current_price).unwrap_or_else(|| {
                warn!("CoinGecko: volume for {} out of range, reporting zero", asset.symbol);
                Decimal::ZERO
            })
        } else {
            Decimal::ZERO
        };
        stats.insert(
            asset.symbol.to_owned(),
            MarketStats {
                symbol: asset.symbol.to_owned(),
                change_24h: decimal_field_or_zero(NAME, row, "price_change_24h")?,
                change_percent_24h: decimal_field_or_zero(NAME, row, "price_change_percentage_24h")?,
                high_24h: decimal_field_or_zero(NAME, row, "high_24h")?,
                low_24h: decimal_field_or_zero(NAME, row, "low_24h")?,
                volume_24h: volume,
            },
        );
    }
    Ok(stats)
}

#[async_trait]
impl DataSource<PriceQuote> for CoinGeckoDataSource {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(&self, assets: &[AssetConfig]) -> SourceResult<PriceQuote> {
        let ids = Self::ids(assets);
        info!("CoinGecko: querying simple price for {}", ids);
        let request = self
            .client
            .get(&format!("{}/api/v3/simple/price", self.base_url))
            .query(&[("ids", ids.as_str()), ("vs_currencies", "usd")]);
        let response = get_json(NAME, request).await?;
        parse_prices(&response, assets, Utc::now())
    }
}

#[async_trait]
impl DataSource<MarketStats> for CoinGeckoDataSource {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(&self, assets: &[AssetConfig]) -> SourceResult<MarketStats> {
        let ids = Self::ids(assets);
        info!("CoinGecko: querying markets for {}", ids);
        let request = self
            .client
            .get(&format!("{}/api/v3/coins/markets", self.base_url))
            .query(&[("vs_currency", "usd"), ("ids", ids.as_str())]);
        let response = get_json(NAME, request).await?;
        parse_markets(&response, assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::lookup;
    use serde_json::json;

    fn assets() -> Vec<AssetConfig> {
        vec![lookup("BTC").unwrap(), lookup("XRP").unwrap()]
    }

    #[test]
    fn parses_simple_price_with_missing_ids() {
        let response = json!({"bitcoin": {"usd": 50600.5}});
        let prices = parse_prices(&response, &assets(), Utc::now()).unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices["BTC"].price, Decimal::new(506005, 1));
        assert_eq!(prices["BTC"].source, "CoinGecko");
    }

    #[test]
    fn error_payload_is_a_parse_error() {
        let response = json!({"bitcoin": {"eur": 1}});
        assert!(matches!(
            parse_prices(&response, &assets(), Utc::now()),
            Err(FetchError::SourceParseError { .. })
        ));
        assert!(parse_prices(&json!([]), &assets(), Utc::now()).is_err());
    }

    #[test]
    fn markets_volume_is_converted_to_base_units() {
        let response = json!([{
            "id": "ripple",
            "current_price": 0.5,
            "price_change_24h": -0.01,
            "price_change_percentage_24h": -1.96,
            "high_24h": 0.52,
            "low_24h": null,
            "total_volume": 1000
        }]);
        let stats = parse_markets(&response, &assets()).unwrap();
        let xrp = &stats["XRP"];
        assert_eq!(xrp.volume_24h, Decimal::from(2000));
        assert_eq!(xrp.change_24h, Decimal::new(-1, 2));
        assert_eq!(xrp.change_percent_24h, Decimal::new(-196, 2));
        assert_eq!(xrp.low_24h, Decimal::ZERO);
        assert!(!stats.contains_key("BTC"));
    }

    #[test]
    fn unrepresentable_volume_degrades_to_zero() {
        let response = json!([{"id": "ripple", "current_price": 1e-20, "total_volume": 1e20}]);
        let stats = parse_markets(&response, &assets()).unwrap();
        assert_eq!(stats["XRP"].volume_24h, Decimal::ZERO);
    }
}
