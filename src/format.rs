//! Telegram HTML messages.
//!
//! Every function here is pure: the timestamp and uptime are passed in, so
//! the same inputs always render the same text.

use std::time::Duration;

use chrono::{DateTime, Utc};
use pretty_duration::pretty_duration;
use rust_decimal::{Decimal, RoundingStrategy};
use teloxide::utils::html;

use crate::assets::AssetConfig;
use crate::datasources::{MarketStats, PriceQuote};
use crate::decision::Decision;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Direction {
    pub fn of(change: Decimal) -> Direction {
        if change > Decimal::ZERO {
            Direction::Up
        } else if change < Decimal::ZERO {
            Direction::Down
        } else {
            Direction::Flat
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Direction::Up => "📈",
            Direction::Down => "📉",
            Direction::Flat => "➖",
        }
    }
}

/// Rounds to `decimals` places and groups the integer part by thousands.
pub fn format_amount(value: Decimal, decimals: u32) -> String {
    let rounded = value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.*}", decimals as usize, rounded.abs());
    let (int_part, frac_part) = match text.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (text.as_str(), None),
    };
    let mut grouped = String::with_capacity(text.len() + int_part.len() / 3 + 1);
    if rounded < Decimal::ZERO {
        grouped.push('-');
    }
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if let Some(frac_part) = frac_part {
        grouped.push('.');
        grouped.push_str(frac_part);
    }
    grouped
}

pub fn format_usd(value: Decimal, decimals: u32) -> String {
    let amount = format_amount(value.abs(), decimals);
    if value < Decimal::ZERO {
        format!("-${}", amount)
    } else {
        format!("${}", amount)
    }
}

/// Like [`format_usd`] but always carries a sign, `+$0.00` for zero.
pub fn format_signed_usd(value: Decimal, decimals: u32) -> String {
    let amount = format_amount(value.abs(), decimals);
    if value < Decimal::ZERO {
        format!("-${}", amount)
    } else {
        format!("+${}", amount)
    }
}

fn format_percent(value: Decimal) -> String {
    format!(
        "{:.2}%",
        value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    )
}

fn footer(now: DateTime<Utc>, uptime: &Duration) -> String {
    format!(
        "⏰ <b>Time:</b> {}\n\n🤖 <i>Bot uptime: {}</i>",
        now.format(TIME_FORMAT),
        pretty_duration(uptime, None)
    )
}

/// Alert for a single asset.
pub fn format_alert(
    asset: &AssetConfig,
    quote: &PriceQuote,
    stats: &MarketStats,
    decision: &Decision,
    now: DateTime<Utc>,
    uptime: &Duration,
) -> String {
    let dp = asset.price_decimals;
    let direction = Direction::of(stats.change_24h);
    format!(
        "{emoji} <b>{symbol} Price Alert</b>\n\
         📌 <i>{reason}</i>\n\n\
         💰 <b>Current Price:</b> {price}\n\
         {arrow} <b>24h Change:</b> {pct} ({change})\n\n\
         📊 <b>24h Stats:</b>\n\
         • <b>High:</b> {high}\n\
         • <b>Low:</b> {low}\n\
         • <b>Volume:</b> {volume} {symbol}\n\n\
         🔗 <i>Source: {source}</i>\n\
         {footer}",
        emoji = asset.emoji,
        symbol = asset.symbol,
        reason = decision,
        price = format_usd(quote.price, dp),
        arrow = direction.emoji(),
        pct = format_percent(stats.change_percent_24h),
        change = format_signed_usd(stats.change_24h, dp),
        high = format_usd(stats.high_24h, dp),
        low = format_usd(stats.low_24h, dp),
        volume = format_amount(stats.volume_24h, 0),
        source = quote.source,
        footer = footer(now, uptime),
    )
}

/// One line per asset, used by the periodic summary.
pub fn summary_line(asset: &AssetConfig, quote: &PriceQuote, stats: &MarketStats) -> String {
    format!(
        "{} <b>{}</b>: {} {} {}",
        asset.emoji,
        asset.symbol,
        format_usd(quote.price, asset.price_decimals),
        Direction::of(stats.change_24h).emoji(),
        format_percent(stats.change_percent_24h),
    )
}

pub fn format_summary(
    rows: &[(&AssetConfig, &PriceQuote, &MarketStats)],
    now: DateTime<Utc>,
    uptime: &Duration,
) -> String {
    let lines = rows
        .iter()
        .map(|(asset, quote, stats)| summary_line(asset, quote, stats))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "📊 <b>Market Summary</b>\n\n{}\n\n{}",
        lines,
        footer(now, uptime)
    )
}

pub fn format_startup(
    assets: &[AssetConfig],
    check_interval: &Duration,
    periodic_every: u64,
    periodic_label: &str,
    started_at: DateTime<Utc>,
) -> String {
    let watchlist = assets
        .iter()
        .map(|a| {
            format!(
                "• {} <b>{}</b> ({}): alert at {}% move",
                a.emoji,
                a.symbol,
                a.name,
                a.alert_threshold_percent.normalize()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let cadence = match u32::try_from(periodic_every)
        .ok()
        .filter(|n| *n > 0)
        .and_then(|n| check_interval.checked_mul(n))
    {
        Some(period) => format!("every {}", pretty_duration(&period, None)),
        None if periodic_every == 0 => "disabled".to_owned(),
        None => format!("every {} checks", periodic_every),
    };
    format!(
        "🚀 <b>Crypto Price Bot Started!</b>\n\n\
         📊 Monitoring:\n{}\n\n\
         ⏰ Check interval: {}\n\
         📱 {}: {}\n\n\
         🕒 Started at: {}",
        watchlist,
        pretty_duration(check_interval, None),
        periodic_label,
        cadence,
        started_at.format(TIME_FORMAT),
    )
}

pub fn format_error(error: &str, now: DateTime<Utc>) -> String {
    format!(
        "⚠️ <b>Bot Error</b>\n\n{}\n\n⏰ {}",
        html::escape(error),
        now.format(TIME_FORMAT)
    )
}
