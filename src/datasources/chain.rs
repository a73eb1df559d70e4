use std::{collections::HashMap, sync::Arc};

use log::{error, info, warn};

use super::datasource::{DataSource, MarketStats};
use crate::assets::AssetConfig;

/// Ordered list of interchangeable providers.
///
/// Sources are tried strictly one after another. The first source that
/// returns data for at least one requested asset wins, and its result is
/// taken as is: a partial answer is accepted and never merged with what a
/// later source might have returned.
pub struct FallbackChain<T> {
    kind: &'static str,
    sources: Vec<Arc<dyn DataSource<T>>>,
}

impl<T: Send> FallbackChain<T> {
    pub fn new(kind: &'static str, sources: Vec<Arc<dyn DataSource<T>>>) -> FallbackChain<T> {
        FallbackChain { kind, sources }
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Returns an empty map when every source failed.
    pub async fn fetch(&self, assets: &[AssetConfig]) -> HashMap<String, T> {
        for source in &self.sources {
            match source.fetch(assets).await {
                Ok(mut data) => {
                    data.retain(|symbol, _| assets.iter().any(|a| a.symbol == symbol.as_str()));
                    if data.is_empty() {
                        warn!("{} {}: no data for requested assets", source.name(), self.kind);
                        continue;
                    }
                    if data.len() < assets.len() {
                        info!(
                            "{} {}: partial result ({} of {} assets), accepting",
                            source.name(),
                            self.kind,
                            data.len(),
                            assets.len()
                        );
                    }
                    return data;
                }
                Err(e) => warn!("{} {} failed: {}", source.name(), self.kind, e),
            }
        }
        error!("All {} sources failed", self.kind);
        HashMap::new()
    }
}

impl FallbackChain<MarketStats> {
    /// Stats for every requested asset, zero-valued where no source had them.
    pub async fn fetch_or_default(&self, assets: &[AssetConfig]) -> HashMap<String, MarketStats> {
        let mut stats = self.fetch(assets).await;
        for asset in assets {
            stats
                .entry(asset.symbol.to_owned())
                .or_insert_with(|| MarketStats::unavailable(asset.symbol));
        }
        stats
    }
}
