use rust_decimal::Decimal;

/// Static description of a tracked asset and how each provider names it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetConfig {
    pub symbol: &'static str,
    pub name: &'static str,
    pub emoji: &'static str,
    pub binance_symbol: &'static str,
    pub coingecko_id: &'static str,
    pub coinbase_pair: &'static str,
    /// Kraken does not list every asset.
    pub kraken_pair: Option<&'static str>,
    pub alert_threshold_percent: Decimal,
    /// Fixed number of decimals used when rendering prices of this asset.
    pub price_decimals: u32,
}

pub const DEFAULT_WATCHLIST: &[&str] = &["BTC", "ETH", "BNB", "SOL", "XRP"];

pub fn registry() -> Vec<AssetConfig> {
    vec![
        AssetConfig {
            symbol: "BTC",
            name: "Bitcoin",
            emoji: "₿",
            binance_symbol: "BTCUSDT",
            coingecko_id: "bitcoin",
            coinbase_pair: "BTC-USD",
            kraken_pair: Some("XBTUSD"),
            alert_threshold_percent: Decimal::new(10, 1),
            price_decimals: 2,
        },
        AssetConfig {
            symbol: "ETH",
            name: "Ethereum",
            emoji: "💎",
            binance_symbol: "ETHUSDT",
            coingecko_id: "ethereum",
            coinbase_pair: "ETH-USD",
            kraken_pair: Some("ETHUSD"),
            alert_threshold_percent: Decimal::new(15, 1),
            price_decimals: 2,
        },
        AssetConfig {
            symbol: "BNB",
            name: "BNB",
            emoji: "🔶",
            binance_symbol: "BNBUSDT",
            coingecko_id: "binancecoin",
            coinbase_pair: "BNB-USD",
            kraken_pair: None,
            alert_threshold_percent: Decimal::new(20, 1),
            price_decimals: 2,
        },
        AssetConfig {
            symbol: "SOL",
            name: "Solana",
            emoji: "☀️",
            binance_symbol: "SOLUSDT",
            coingecko_id: "solana",
            coinbase_pair: "SOL-USD",
            kraken_pair: Some("SOLUSD"),
            alert_threshold_percent: Decimal::new(25, 1),
            price_decimals: 2,
        },
        AssetConfig {
            symbol: "XRP",
            name: "XRP",
            emoji: "💧",
            binance_symbol: "XRPUSDT",
            coingecko_id: "ripple",
            coinbase_pair: "XRP-USD",
            kraken_pair: Some("XRPUSD"),
            alert_threshold_percent: Decimal::new(25, 1),
            price_decimals: 4,
        },
    ]
}

/// Looks up a registry entry by symbol, ignoring case.
pub fn lookup(symbol: &str) -> Option<AssetConfig> {
    registry()
        .into_iter()
        .find(|asset| asset.symbol.eq_ignore_ascii_case(symbol.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_thresholds_are_positive() {
        for asset in registry() {
            assert!(asset.alert_threshold_percent > Decimal::ZERO, "{}", asset.symbol);
        }
    }

    #[test]
    fn default_watchlist_resolves() {
        for symbol in DEFAULT_WATCHLIST {
            assert!(lookup(symbol).is_some(), "{} missing from registry", symbol);
        }
    }

    #[test]
    fn lookup_ignores_case_and_whitespace() {
        assert_eq!(lookup(" btc ").map(|a| a.symbol), Some("BTC"));
        assert_eq!(lookup("DOGE"), None);
    }
}
