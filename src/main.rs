mod assets;
mod config;
mod datasources;
mod decision;
mod format;
mod liveness;
mod monitor;
mod notifier;

use std::{process::ExitCode, sync::Arc};

use anyhow::Result;
use chrono::Utc;
use log::{error, info};

use config::Config;
use datasources::{
    build_client, BinanceDataSource, CoinGeckoDataSource, CoinbaseDataSource, DataSource,
    FallbackChain, KrakenDataSource, MarketStats, PriceQuote,
};
use monitor::{Monitor, MonitorSettings};
use notifier::{Notifier, TelegramTransport};

const USER_AGENT: &str = concat!("coinwatch/", env!("CARGO_PKG_VERSION"));

#[tokio::main]
async fn main() -> ExitCode {
    // a missing .env file is fine, the variables may come from the environment
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Crypto price bot starting");
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            error!("Please set TELEGRAM_TOKEN and TELEGRAM_CHAT_ID");
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Environment variables configured, watching {}",
        config
            .assets
            .iter()
            .map(|a| a.symbol)
            .collect::<Vec<_>>()
            .join(", ")
    );

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let started_at = Utc::now();

    let listener = liveness::bind(config.port).await?;
    let web_server = liveness::spawn(listener, liveness::LivenessState::new(started_at));

    let client = Arc::new(build_client(USER_AGENT, config.request_timeout)?);
    let binance = Arc::new(BinanceDataSource::new(client.clone()));
    let coingecko = Arc::new(CoinGeckoDataSource::new(client.clone()));
    let coinbase = Arc::new(CoinbaseDataSource::new(client.clone()));
    let kraken = Arc::new(KrakenDataSource::new(client));

    let price_sources: Vec<Arc<dyn DataSource<PriceQuote>>> =
        vec![binance.clone(), coingecko.clone(), coinbase.clone(), kraken];
    let stats_sources: Vec<Arc<dyn DataSource<MarketStats>>> = vec![binance, coingecko, coinbase];

    let transport = TelegramTransport::new(&config.telegram_token, &config.chat_id, config.request_timeout)?;
    let notifier = Notifier::new(Box::new(transport), config.message_delay);

    let mut monitor = Monitor::new(
        config.assets,
        FallbackChain::new("price", price_sources),
        FallbackChain::new("stats", stats_sources),
        notifier,
        MonitorSettings {
            check_interval: config.check_interval,
            error_backoff: config.error_backoff,
            summary_every: config.summary_every,
        },
        started_at,
    );

    let stopped = tokio::select! {
        _ = monitor.run() => Ok("monitor exited"),
        signal = shutdown_signal() => signal,
    };
    web_server.abort();
    let signal = stopped?;
    info!(
        "Bot stopped by {} after {} cycles, {} messages sent",
        signal,
        monitor.state().cycle,
        monitor.messages_sent()
    );
    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM where the platform has it.
async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            interrupt = tokio::signal::ctrl_c() => interrupt.map(|_| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|_| "Ctrl-C")
    }
}
