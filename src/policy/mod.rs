// Risk-scaled position averaging: sizing, averaging trigger and stop policy.
pub mod averaging;
pub mod exit;
pub mod sizer;
pub mod stop;

pub use averaging::{AveragingDecision, AveragingTrigger, HoldReason, Trigger};
pub use exit::{ExitPolicy, ExitReason};
pub use sizer::{DeclineReason, RiskSizer, SizingDecision};
pub use stop::{StopLevel, StopPolicy, StopSource};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{AddStakeMode, PolicyConfig};
use crate::error::{finite, ConfigError, PolicyError, Result};
use crate::models::{MarketSnapshot, Position, StakeLimits};

/// Everything the host engine needs from one evaluation tick
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct TickDecision {
    pub averaging: AveragingDecision,
    pub stop: StopLevel,
    pub exit: Option<ExitReason>,
}

/// The three policy components behind one validated config.
///
/// Every method takes `&self` and reads only its arguments, so one instance
/// can serve any number of positions from any number of threads.
#[derive(Debug, Clone)]
pub struct AveragingPolicy {
    config: PolicyConfig,
    sizer: RiskSizer,
    trigger: AveragingTrigger,
    stop: StopPolicy,
    exit: ExitPolicy,
}

impl AveragingPolicy {
    /// Validate `config` and build the policy
    pub fn new(config: PolicyConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            sizer: RiskSizer::from_config(&config.sizing),
            trigger: AveragingTrigger::from_config(&config.averaging),
            stop: StopPolicy::from_config(&config.stop),
            exit: ExitPolicy::from_config(&config.exit, &config.signals),
            config,
        })
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn sizer(&self) -> &RiskSizer {
        &self.sizer
    }

    pub fn trigger(&self) -> &AveragingTrigger {
        &self.trigger
    }

    pub fn stop_policy(&self) -> &StopPolicy {
        &self.stop
    }

    pub fn exit_policy(&self) -> &ExitPolicy {
        &self.exit
    }

    /// Leverage for the next entry of a position holding `entry_count` fills
    /// (0 for a new position).
    ///
    /// `min(max_leverage, exchange_max)`, divided by the fill count when
    /// `scale_by_entries` is set, so each averaging entry runs at lower leverage.
    pub fn leverage(&self, entry_count: u32, exchange_max: f64) -> Result<f64> {
        let exchange_max = finite(exchange_max, "max_leverage")?;
        if exchange_max <= 0.0 {
            return Err(PolicyError::MissingInput { field: "max_leverage" });
        }

        let leverage = &self.config.leverage;
        let capped = leverage.max_leverage.min(exchange_max);
        let chosen = if leverage.scale_by_entries {
            capped / entry_count.max(1) as f64
        } else {
            capped
        };

        tracing::debug!(
            "Leverage {:.2}x for {} fill(s) (cap {:.2}x, exchange {:.2}x)",
            chosen,
            entry_count,
            leverage.max_leverage,
            exchange_max
        );
        Ok(chosen)
    }

    /// Stake for a new position, after the capital window and trading hours gates
    pub fn initial_stake(
        &self,
        balance: f64,
        leverage: f64,
        limits: StakeLimits,
        at: DateTime<Utc>,
    ) -> Result<SizingDecision> {
        let sizing = &self.config.sizing;

        if balance.is_finite() {
            let below = sizing.min_entry_capital.is_some_and(|min| balance < min);
            let above = sizing.max_entry_capital.is_some_and(|max| balance > max);
            if below || above {
                tracing::debug!("Balance {:.2} outside entry capital window", balance);
                return Ok(SizingDecision::Decline {
                    reason: DeclineReason::BalanceOutsideWindow { balance },
                });
            }
        }

        if let Some(hours) = sizing.trading_hours {
            if !hours.contains(at.time()) {
                tracing::debug!("{} outside trading hours", at.time());
                return Ok(SizingDecision::Decline {
                    reason: DeclineReason::OutsideTradingHours,
                });
            }
        }

        self.sizer.size(balance, leverage, limits, 0)
    }

    /// Averaging decision with the stake attached
    pub fn should_add(
        &self,
        position: &Position,
        snapshot: &MarketSnapshot,
        balance: f64,
        limits: StakeLimits,
    ) -> Result<AveragingDecision> {
        if let Trigger::Hold(reason) = self.trigger.should_add(position, snapshot)? {
            return Ok(AveragingDecision::NoAction { reason });
        }

        finite(limits.min_stake, "min_stake")?;
        finite(limits.max_stake, "max_stake")?;

        let entry_index = position.entry_count;
        let sizing = match self.config.averaging.add_stake {
            AddStakeMode::Geometric => {
                self.sizer.size(balance, position.leverage, limits, entry_index)?
            }
            AddStakeMode::MinStake => fixed_stake(limits.min_stake, limits),
            AddStakeMode::InitialStake => fixed_stake(position.average_fill_stake(), limits),
        };

        match sizing {
            SizingDecision::Stake { amount } => {
                tracing::info!(
                    "📉 Averaging {} entry #{} with stake {:.2} @ {:.4}",
                    position.instrument,
                    entry_index + 1,
                    amount,
                    snapshot.price
                );
                Ok(AveragingDecision::Add {
                    stake: amount,
                    entry_index,
                })
            }
            SizingDecision::Decline { reason } => Ok(AveragingDecision::NoAction {
                reason: HoldReason::StakeDeclined(reason),
            }),
        }
    }

    pub fn stop(&self, position: &Position, snapshot: &MarketSnapshot) -> StopLevel {
        self.stop.for_position(position, snapshot)
    }

    /// Averaging, stop and early exit for one tick.
    ///
    /// A missing input turns into `HoldReason::MissingInput` so the tick still
    /// produces a decision; the stop never fails.
    pub fn evaluate(
        &self,
        position: &Position,
        snapshot: &MarketSnapshot,
        balance: f64,
        limits: StakeLimits,
    ) -> TickDecision {
        let averaging = match self.should_add(position, snapshot, balance, limits) {
            Ok(decision) => decision,
            Err(PolicyError::MissingInput { field }) => {
                tracing::warn!(
                    "⚠️  {} averaging skipped, missing input: {}",
                    position.instrument,
                    field
                );
                AveragingDecision::NoAction {
                    reason: HoldReason::MissingInput { field },
                }
            }
            Err(e) => {
                tracing::warn!("⚠️  {} averaging skipped: {}", position.instrument, e);
                AveragingDecision::NoAction {
                    reason: HoldReason::MissingInput { field: "position" },
                }
            }
        };

        TickDecision {
            averaging,
            stop: self.stop(position, snapshot),
            exit: self.exit.exit_reason(position, snapshot),
        }
    }
}

/// A fixed stake checked against the exchange limits
fn fixed_stake(stake: f64, limits: StakeLimits) -> SizingDecision {
    if limits.max_stake < limits.min_stake {
        return SizingDecision::Decline {
            reason: DeclineReason::InvertedLimits {
                min_stake: limits.min_stake,
                max_stake: limits.max_stake,
            },
        };
    }
    if !stake.is_finite() {
        return SizingDecision::Decline {
            reason: DeclineReason::NonPositiveStake,
        };
    }

    let amount = stake.clamp(limits.min_stake, limits.max_stake);
    if amount > 0.0 {
        SizingDecision::Stake { amount }
    } else {
        SizingDecision::Decline {
            reason: DeclineReason::NonPositiveStake,
        }
    }
}
