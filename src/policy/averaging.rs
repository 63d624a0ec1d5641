use serde::Serialize;

use crate::config::{AveragingConfig, TriggerMode};
use crate::error::{finite, required, PolicyError, Result};
use crate::models::{MarketSnapshot, Position};
use crate::policy::sizer::DeclineReason;

/// Output of the averaging step for one tick
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AveragingDecision {
    NoAction { reason: HoldReason },
    Add { stake: f64, entry_index: u32 },
}

impl AveragingDecision {
    pub fn is_add(&self) -> bool {
        matches!(self, AveragingDecision::Add { .. })
    }
}

/// Why the trigger held off
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    Disabled,
    MaxEntriesReached,
    OrderPending,
    NoAdverseMove,
    BelowThreshold,
    StakeDeclined(DeclineReason),
    MissingInput { field: &'static str },
}

/// Trigger verdict before any stake is attached
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trigger {
    Fire,
    Hold(HoldReason),
}

/// Decides whether a position has moved far enough against it to average in.
///
/// Re-derived from the position and snapshot alone on every call. A filled
/// add bumps `entry_count`, which raises the next threshold, so the same
/// crossing cannot fire twice.
#[derive(Debug, Clone, PartialEq)]
pub struct AveragingTrigger {
    enabled: bool,
    max_entries: u32,
    mode: TriggerMode,
}

impl AveragingTrigger {
    pub fn new(enabled: bool, max_entries: u32, mode: TriggerMode) -> Self {
        Self {
            enabled,
            max_entries,
            mode,
        }
    }

    pub fn from_config(config: &AveragingConfig) -> Self {
        Self::new(config.enabled, config.max_entries, config.trigger)
    }

    pub fn max_entries(&self) -> u32 {
        self.max_entries
    }

    pub fn should_add(&self, position: &Position, snapshot: &MarketSnapshot) -> Result<Trigger> {
        if !self.enabled {
            return Ok(Trigger::Hold(HoldReason::Disabled));
        }
        if position.entry_count >= self.max_entries {
            return Ok(Trigger::Hold(HoldReason::MaxEntriesReached));
        }
        if position.entry_order_pending {
            return Ok(Trigger::Hold(HoldReason::OrderPending));
        }

        let price = finite(snapshot.price, "price")?;
        finite(position.entry_price, "entry_price")?;

        match self.mode {
            TriggerMode::AtrExcursion { atr_multiplier } => {
                let atr = required(snapshot.atr, "atr")?;
                if atr < 0.0 {
                    return Err(PolicyError::MissingInput { field: "atr" });
                }
                let excursion = position.adverse_excursion(price);
                if excursion <= 0.0 {
                    return Ok(Trigger::Hold(HoldReason::NoAdverseMove));
                }

                // Each prior entry pushes the next trigger further away
                let threshold = atr * atr_multiplier * position.entry_count.max(1) as f64;

                tracing::debug!(
                    "{} excursion {:.4} vs threshold {:.4} (entries: {}/{})",
                    position.instrument,
                    excursion,
                    threshold,
                    position.entry_count,
                    self.max_entries
                );

                if excursion >= threshold {
                    Ok(Trigger::Fire)
                } else {
                    Ok(Trigger::Hold(HoldReason::BelowThreshold))
                }
            }
            TriggerMode::ProfitDrawdown { threshold } => {
                let profit = finite(position.profit_ratio(price), "profit")?;
                if profit >= 0.0 {
                    return Ok(Trigger::Hold(HoldReason::NoAdverseMove));
                }

                tracing::debug!(
                    "{} profit {:.2}% vs drawdown trigger {:.2}%",
                    position.instrument,
                    profit * 100.0,
                    threshold * 100.0
                );

                if profit <= threshold {
                    Ok(Trigger::Fire)
                } else {
                    Ok(Trigger::Hold(HoldReason::BelowThreshold))
                }
            }
        }
    }
}
