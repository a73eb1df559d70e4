mod binance;
pub(crate) mod chain;
mod coinbase;
mod coingecko;
mod datasource;
mod kraken;

pub use binance::BinanceDataSource;
pub use chain::FallbackChain;
pub use coinbase::CoinbaseDataSource;
pub use coingecko::CoinGeckoDataSource;
pub use datasource::{build_client, DataSource, FetchError, MarketStats, PriceQuote, SourceResult};
pub use kraken::KrakenDataSource;
