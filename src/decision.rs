use std::fmt;

use rust_decimal::Decimal;

use crate::assets::AssetConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertReason {
    InitialCheck,
    ThresholdExceeded,
    PeriodicUpdate,
    NoChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub should_alert: bool,
    pub reason: AlertReason,
    /// Absolute move against the previous price, when one was recorded.
    pub change_percent: Option<Decimal>,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.reason, self.change_percent) {
            (AlertReason::InitialCheck, _) => write!(f, "Initial price check"),
            (AlertReason::ThresholdExceeded, Some(pct)) => {
                write!(f, "Price changed by {:.2}%", pct.round_dp(2))
            }
            (AlertReason::ThresholdExceeded, None) => write!(f, "Price threshold exceeded"),
            (AlertReason::PeriodicUpdate, _) => write!(f, "Periodic update"),
            (AlertReason::NoChange, _) => write!(f, "No significant change"),
        }
    }
}

/// Single-asset monitors send periodic updates; multi-asset monitors send a
/// consolidated summary instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    SingleAsset,
    MultiAsset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionPolicy {
    pub mode: Mode,
    /// Periodic updates and summaries fall on cycles divisible by this.
    pub every_cycles: u64,
}

impl DecisionPolicy {
    pub fn new(asset_count: usize, every_cycles: u64) -> DecisionPolicy {
        let mode = if asset_count == 1 {
            Mode::SingleAsset
        } else {
            Mode::MultiAsset
        };
        DecisionPolicy { mode, every_cycles }
    }

    pub fn is_periodic_boundary(&self, cycle: u64) -> bool {
        self.every_cycles > 0 && cycle % self.every_cycles == 0
    }

    /// Decides whether `current` justifies an alert for `asset`.
    ///
    /// Rules apply in order: no usable previous price, threshold move (either
    /// direction), periodic boundary (single-asset mode only), otherwise none.
    pub fn evaluate(
        &self,
        asset: &AssetConfig,
        previous: Option<Decimal>,
        current: Decimal,
        cycle: u64,
    ) -> Decision {
        let previous = match previous {
            Some(previous) if previous > Decimal::ZERO => previous,
            _ => {
                return Decision {
                    should_alert: true,
                    reason: AlertReason::InitialCheck,
                    change_percent: None,
                }
            }
        };
        let change_percent = percent_change(previous, current);
        let exceeded = match change_percent {
            Some(pct) => pct >= asset.alert_threshold_percent,
            // only a move too large to represent overflows
            None => true,
        };
        let (should_alert, reason) = if exceeded {
            (true, AlertReason::ThresholdExceeded)
        } else if self.mode == Mode::SingleAsset && self.is_periodic_boundary(cycle) {
            (true, AlertReason::PeriodicUpdate)
        } else {
            (false, AlertReason::NoChange)
        };
        Decision {
            should_alert,
            reason,
            change_percent,
        }
    }

    /// A summary goes out on periodic boundaries in multi-asset mode, unless
    /// an individual alert was already due this cycle.
    pub fn summary_due(&self, cycle: u64, individual_alerts: usize) -> bool {
        self.mode == Mode::MultiAsset && individual_alerts == 0 && self.is_periodic_boundary(cycle)
    }
}

/// `|current - previous| / previous * 100`, `None` when `previous` is zero.
pub fn percent_change(previous: Decimal, current: Decimal) -> Option<Decimal> {
    (current - previous)
        .abs()
        .checked_div(previous)?
        .checked_mul(Decimal::ONE_HUNDRED)
}
