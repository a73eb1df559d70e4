use std::{
    any::Any,
    panic::AssertUnwindSafe,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use log::{error, info, warn};

use crate::assets::AssetConfig;
use crate::datasources::{FallbackChain, MarketStats, PriceQuote};
use crate::decision::{DecisionPolicy, Mode};
use crate::format;
use crate::notifier::Notifier;

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub check_interval: Duration,
    pub error_backoff: Duration,
    pub summary_every: u64,
}

#[derive(Debug, Clone, Default)]
pub struct AssetState {
    /// Unset until the first cycle that produced a price for this asset.
    pub last_price: Option<PriceQuote>,
    pub alerts_sent: u64,
}

#[derive(Debug, Clone)]
pub struct TrackedAsset {
    pub config: AssetConfig,
    pub state: AssetState,
}

/// Everything the loop mutates, in watchlist order.
pub struct RuntimeState {
    pub started_at: DateTime<Utc>,
    started: Instant,
    pub cycle: u64,
    pub assets: Vec<TrackedAsset>,
}

impl RuntimeState {
    pub fn new(assets: Vec<AssetConfig>, started_at: DateTime<Utc>) -> RuntimeState {
        RuntimeState {
            started_at,
            started: Instant::now(),
            cycle: 0,
            assets: assets
                .into_iter()
                .map(|config| TrackedAsset {
                    config,
                    state: AssetState::default(),
                })
                .collect(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    fn configs(&self) -> Vec<AssetConfig> {
        self.assets.iter().map(|a| a.config.clone()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub prices_fetched: usize,
    pub alerts_due: usize,
    pub alerts_sent: usize,
    pub summary_sent: bool,
}

pub struct Monitor {
    prices: FallbackChain<PriceQuote>,
    stats: FallbackChain<MarketStats>,
    notifier: Notifier,
    policy: DecisionPolicy,
    settings: MonitorSettings,
    state: RuntimeState,
}

impl Monitor {
    pub fn new(
        assets: Vec<AssetConfig>,
        prices: FallbackChain<PriceQuote>,
        stats: FallbackChain<MarketStats>,
        notifier: Notifier,
        settings: MonitorSettings,
        started_at: DateTime<Utc>,
    ) -> Monitor {
        let policy = DecisionPolicy::new(assets.len(), settings.summary_every);
        Monitor {
            prices,
            stats,
            notifier,
            policy,
            settings,
            state: RuntimeState::new(assets, started_at),
        }
    }

    pub fn state(&self) -> &RuntimeState {
        &self.state
    }

    pub fn messages_sent(&self) -> u64 {
        self.notifier.messages_sent()
    }

    /// Runs until the process is stopped.
    ///
    /// A cycle that fails or panics is reported to the chat and retried after
    /// the error backoff instead of the regular interval.
    pub async fn run(&mut self) {
        info!(
            "Starting monitor: price sources {:?}, stats sources {:?}",
            self.prices.source_names(),
            self.stats.source_names()
        );
        self.announce_startup().await;
        loop {
            let outcome = match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(anyhow!("monitor cycle panicked: {}", panic_message(&*panic))),
            };
            let pause = match outcome {
                Ok(report) => {
                    info!("Cycle finished: {:?}", report);
                    self.settings.check_interval
                }
                Err(e) => {
                    error!("Critical error in monitor cycle: {:#}", e);
                    let message = format::format_error(&format!("{:#}", e), Utc::now());
                    self.notifier.send(&message).await;
                    self.settings.error_backoff
                }
            };
            info!("Waiting {:?} for next check...", pause);
            tokio::time::sleep(pause).await;
        }
    }

    pub async fn announce_startup(&mut self) -> bool {
        let label = match self.policy.mode {
            Mode::SingleAsset => "Periodic updates",
            Mode::MultiAsset => "Market summaries",
        };
        let message = format::format_startup(
            &self.state.configs(),
            &self.settings.check_interval,
            self.settings.summary_every,
            label,
            self.state.started_at,
        );
        self.notifier.send(&message).await
    }

    /// One fetch, decide, notify pass over every tracked asset.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let cycle = self.state.cycle;
        self.state.cycle += 1;
        let configs = self.state.configs();

        let prices = self.prices.fetch(&configs).await;
        let mut report = CycleReport {
            prices_fetched: prices.len(),
            ..CycleReport::default()
        };
        if prices.is_empty() {
            warn!("Failed to fetch prices, skipping cycle {}", cycle);
            return Ok(report);
        }
        let stats = self.stats.fetch_or_default(&configs).await;

        let now = Utc::now();
        let uptime = self.state.uptime();
        let mut due = vec![];
        let mut messages = vec![];
        for (idx, tracked) in self.state.assets.iter().enumerate() {
            let symbol = tracked.config.symbol;
            let quote = match prices.get(symbol) {
                Some(quote) => quote,
                None => {
                    warn!("No price for {} this cycle", symbol);
                    continue;
                }
            };
            let previous = tracked.state.last_price.as_ref().map(|q| q.price);
            let decision = self.policy.evaluate(&tracked.config, previous, quote.price, cycle);
            if decision.should_alert {
                info!("Sending {} alert: {}", symbol, decision);
                let asset_stats = stats
                    .get(symbol)
                    .cloned()
                    .unwrap_or_else(|| MarketStats::unavailable(symbol));
                messages.push(format::format_alert(
                    &tracked.config,
                    quote,
                    &asset_stats,
                    &decision,
                    now,
                    &uptime,
                ));
                due.push(idx);
            } else {
                info!("No {} alert needed: {}", symbol, decision);
            }
        }

        report.alerts_due = due.len();
        let outcomes = self.notifier.send_all(&messages).await;
        for (idx, delivered) in due.into_iter().zip(outcomes) {
            if delivered {
                self.state.assets[idx].state.alerts_sent += 1;
                report.alerts_sent += 1;
            }
        }

        if self.policy.summary_due(cycle, report.alerts_due) {
            let unavailable: Vec<MarketStats> = configs
                .iter()
                .map(|c| MarketStats::unavailable(c.symbol))
                .collect();
            let rows = self
                .state
                .assets
                .iter()
                .zip(&unavailable)
                .filter_map(|(tracked, fallback)| {
                    let quote = prices.get(tracked.config.symbol)?;
                    let asset_stats = stats.get(tracked.config.symbol).unwrap_or(fallback);
                    Some((&tracked.config, quote, asset_stats))
                })
                .collect::<Vec<_>>();
            info!("Sending market summary for cycle {}", cycle);
            report.summary_sent = self.notifier.send(&format::format_summary(&rows, now, &uptime)).await;
        }

        // assets without a price this cycle keep their previous one
        for tracked in &mut self.state.assets {
            if let Some(quote) = prices.get(tracked.config.symbol) {
                tracked.state.last_price = Some(quote.clone());
            }
        }
        Ok(report)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::lookup;
    use crate::datasources::chain::tests::{quote, ScriptedSource};
    use crate::datasources::{FetchError, SourceResult};
    use crate::notifier::tests::RecordingTransport;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Price feed whose answer can be swapped between cycles.
    #[derive(Clone, Default)]
    struct Feed(Arc<Mutex<Option<Vec<(String, PriceQuote)>>>>);

    impl Feed {
        fn set(&self, prices: &[(&str, i64)]) {
            *self.0.lock().unwrap() = Some(prices.iter().map(|(s, p)| quote(s, *p, "feed")).collect());
        }

        fn fail(&self) {
            *self.0.lock().unwrap() = None;
        }

        fn answer(&self) -> SourceResult<PriceQuote> {
            match &*self.0.lock().unwrap() {
                Some(prices) => Ok(prices.iter().cloned().collect()),
                None => Err(FetchError::unavailable("feed", "HTTP 502")),
            }
        }
    }

    fn settings() -> MonitorSettings {
        MonitorSettings {
            check_interval: Duration::from_secs(300),
            error_backoff: Duration::from_secs(60),
            summary_every: 6,
        }
    }

    fn monitor(symbols: &[&str], feed: &Feed, transport: &RecordingTransport) -> Monitor {
        let feed = feed.clone();
        let prices = FallbackChain::<PriceQuote>::new(
            "price",
            vec![ScriptedSource::<PriceQuote>::new("feed", move || feed.answer())],
        );
        monitor_with(symbols, prices, transport)
    }

    fn monitor_with(symbols: &[&str], prices: FallbackChain<PriceQuote>, transport: &RecordingTransport) -> Monitor {
        let stats = FallbackChain::<MarketStats>::new(
            "stats",
            vec![ScriptedSource::<MarketStats>::new("stats", || {
                Err(FetchError::unavailable("stats", "HTTP 500"))
            })],
        );
        Monitor::new(
            symbols.iter().map(|s| lookup(s).unwrap()).collect(),
            prices,
            stats,
            crate::notifier::Notifier::new(Box::new(transport.clone()), Duration::ZERO),
            settings(),
            Utc::now(),
        )
    }

    fn last_prices(monitor: &Monitor) -> HashMap<&'static str, Option<Decimal>> {
        monitor
            .state()
            .assets
            .iter()
            .map(|a| (a.config.symbol, a.state.last_price.as_ref().map(|q| q.price)))
            .collect()
    }

    #[tokio::test]
    async fn first_cycle_alerts_every_asset_then_threshold_only() {
        let feed = Feed::default();
        let transport = RecordingTransport::default();
        let mut monitor = monitor(&["BTC", "ETH"], &feed, &transport);

        feed.set(&[("BTC", 50000), ("ETH", 3000)]);
        let report = monitor.run_cycle().await.unwrap();
        assert_eq!(report.alerts_sent, 2);
        assert!(!report.summary_sent);

        // BTC +1.2% crosses its 1% threshold, ETH +0.5% stays under 1.5%
        feed.set(&[("BTC", 50600), ("ETH", 3015)]);
        let report = monitor.run_cycle().await.unwrap();
        assert_eq!(report.alerts_due, 1);
        let messages = transport.messages();
        assert_eq!(messages.len(), 3);
        assert!(messages[2].contains("BTC Price Alert"));
        assert!(messages[2].contains("Price changed by 1.20%"));
        // stats were unavailable, so the alert shows zeros
        assert!(messages[2].contains("• <b>Volume:</b> 0 BTC"));

        feed.set(&[("BTC", 50700), ("ETH", 3020)]);
        let report = monitor.run_cycle().await.unwrap();
        assert_eq!(report.alerts_due, 0);
        assert_eq!(transport.messages().len(), 3);
        assert_eq!(monitor.messages_sent(), 3);
        assert_eq!(monitor.state().assets[0].state.alerts_sent, 2);
    }

    #[tokio::test]
    async fn failed_fetch_skips_cycle_and_keeps_last_price() {
        let feed = Feed::default();
        let transport = RecordingTransport::default();
        let mut monitor = monitor(&["BTC", "ETH"], &feed, &transport);

        feed.set(&[("BTC", 50000), ("ETH", 3000)]);
        monitor.run_cycle().await.unwrap();

        feed.fail();
        let report = monitor.run_cycle().await.unwrap();
        assert_eq!(report, CycleReport::default());
        assert_eq!(transport.messages().len(), 2);

        // only BTC comes back; ETH keeps its previous price
        feed.set(&[("BTC", 50100)]);
        monitor.run_cycle().await.unwrap();
        let last = last_prices(&monitor);
        assert_eq!(last["BTC"], Some(Decimal::from(50100)));
        assert_eq!(last["ETH"], Some(Decimal::from(3000)));
    }

    #[tokio::test]
    async fn summary_fires_on_boundary_unless_preempted() {
        let feed = Feed::default();
        let transport = RecordingTransport::default();
        let mut monitor = monitor(&["BTC", "ETH"], &feed, &transport);

        feed.set(&[("BTC", 50000), ("ETH", 3000)]);
        for _ in 0..6 {
            monitor.run_cycle().await.unwrap();
        }
        assert_eq!(transport.messages().len(), 2);

        // cycle 6 is a boundary with no individual alert
        let report = monitor.run_cycle().await.unwrap();
        assert!(report.summary_sent);
        let summary = transport.messages().pop().unwrap();
        assert!(summary.starts_with("📊 <b>Market Summary</b>"));
        assert!(summary.contains("₿ <b>BTC</b>: $50,000.00"));
        assert!(summary.contains("💎 <b>ETH</b>: $3,000.00"));

        for _ in 7..12 {
            monitor.run_cycle().await.unwrap();
        }
        // cycle 12 has an individual alert, which suppresses the summary
        feed.set(&[("BTC", 52000), ("ETH", 3000)]);
        let report = monitor.run_cycle().await.unwrap();
        assert_eq!(report.alerts_sent, 1);
        assert!(!report.summary_sent);
        assert_eq!(transport.messages().len(), 4);
    }

    #[tokio::test]
    async fn single_asset_sends_periodic_updates() {
        let feed = Feed::default();
        let transport = RecordingTransport::default();
        let mut monitor = monitor(&["BTC"], &feed, &transport);

        feed.set(&[("BTC", 50000)]);
        for _ in 0..7 {
            monitor.run_cycle().await.unwrap();
        }
        let messages = transport.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("Initial price check"));
        assert!(messages[1].contains("Periodic update"));
    }

    #[tokio::test]
    async fn undelivered_alerts_are_not_counted() {
        let feed = Feed::default();
        let transport = RecordingTransport::default();
        let mut monitor = monitor(&["BTC"], &feed, &transport);

        transport.set_failing(true);
        feed.set(&[("BTC", 50000)]);
        let report = monitor.run_cycle().await.unwrap();
        assert_eq!(report.alerts_due, 1);
        assert_eq!(report.alerts_sent, 0);
        assert_eq!(monitor.messages_sent(), 0);
        // the price is still recorded, so the next cycle is not an initial check
        assert_eq!(last_prices(&monitor)["BTC"], Some(Decimal::from(50000)));
    }

    #[tokio::test]
    async fn startup_announcement_lists_assets() {
        let feed = Feed::default();
        let transport = RecordingTransport::default();
        let mut monitor = monitor(&["BTC", "XRP"], &feed, &transport);

        assert!(monitor.announce_startup().await);
        let message = &transport.messages()[0];
        assert!(message.contains("Crypto Price Bot Started!"));
        assert!(message.contains("<b>XRP</b> (XRP): alert at 2.5% move"));
        assert!(message.contains("Market summaries"));
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_cycle_is_reported_and_retried_after_backoff() {
        let calls = AtomicUsize::new(0);
        let prices = FallbackChain::<PriceQuote>::new(
            "price",
            vec![ScriptedSource::<PriceQuote>::new("flaky", move || {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("ticker payload out of range");
                }
                Ok(vec![quote("BTC", 50000, "flaky")].into_iter().collect())
            })],
        );
        let transport = RecordingTransport::default();
        let mut monitor = monitor_with(&["BTC"], prices, &transport);

        // the 60s backoff fits in this window, the 300s check interval does not
        let run = tokio::time::timeout(Duration::from_secs(100), monitor.run()).await;
        assert!(run.is_err());

        let messages = transport.messages();
        assert_eq!(messages.len(), 3);
        assert!(messages[0].contains("Crypto Price Bot Started!"));
        assert!(messages[1].starts_with("⚠️ <b>Bot Error</b>"));
        assert!(messages[1].contains("ticker payload out of range"));
        assert!(messages[2].contains("Initial price check"));
        assert_eq!(monitor.state().cycle, 2);
        assert_eq!(last_prices(&monitor)["BTC"], Some(Decimal::from(50000)));
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_cycles_wait_the_check_interval() {
        let feed = Feed::default();
        feed.set(&[("BTC", 50000)]);
        let transport = RecordingTransport::default();
        let mut monitor = monitor(&["BTC"], &feed, &transport);

        let run = tokio::time::timeout(Duration::from_secs(650), monitor.run()).await;
        assert!(run.is_err());
        // cycles at 0s, 300s and 600s
        assert_eq!(monitor.state().cycle, 3);
        assert!(!transport.messages().iter().any(|m| m.contains("Bot Error")));
    }
}
