use serde::{Deserialize, Serialize};

use crate::config::SizingConfig;
use crate::error::{finite, Result};
use crate::models::StakeLimits;

/// Output of the Risk Sizer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum SizingDecision {
    Stake { amount: f64 },
    Decline { reason: DeclineReason },
}

impl SizingDecision {
    pub fn stake(&self) -> Option<f64> {
        match self {
            SizingDecision::Stake { amount } => Some(*amount),
            SizingDecision::Decline { .. } => None,
        }
    }
}

/// Why no stake was produced
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DeclineReason {
    NonPositiveBalance,
    NonPositiveLeverage,
    InvertedLimits { min_stake: f64, max_stake: f64 },
    NonPositiveStake,
    BalanceOutsideWindow { balance: f64 },
    OutsideTradingHours,
}

/// Sizes entries as a fixed fraction of balance, stepping up geometrically
/// for each averaging entry.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskSizer {
    risk_fraction: f64,
    stake_multiplier: f64,
}

impl RiskSizer {
    pub fn new(risk_fraction: f64, stake_multiplier: f64) -> Self {
        Self {
            risk_fraction,
            stake_multiplier,
        }
    }

    pub fn from_config(config: &SizingConfig) -> Self {
        Self::new(config.risk_fraction, config.stake_multiplier)
    }

    pub fn risk_fraction(&self) -> f64 {
        self.risk_fraction
    }

    pub fn stake_multiplier(&self) -> f64 {
        self.stake_multiplier
    }

    /// Stake for entry `entry_index` (0 = initial entry).
    ///
    /// `balance * risk_fraction / leverage * multiplier^entry_index`, clamped
    /// to the stake limits. Non-finite inputs are an error; non-positive
    /// balance or leverage is a decline.
    pub fn size(
        &self,
        balance: f64,
        leverage: f64,
        limits: StakeLimits,
        entry_index: u32,
    ) -> Result<SizingDecision> {
        let balance = finite(balance, "balance")?;
        let leverage = finite(leverage, "leverage")?;
        let min_stake = finite(limits.min_stake, "min_stake")?;
        let max_stake = finite(limits.max_stake, "max_stake")?;

        if balance <= 0.0 {
            return Ok(decline(DeclineReason::NonPositiveBalance));
        }
        if leverage <= 0.0 {
            return Ok(decline(DeclineReason::NonPositiveLeverage));
        }
        if max_stake < min_stake {
            return Ok(decline(DeclineReason::InvertedLimits {
                min_stake,
                max_stake,
            }));
        }

        let exponent = i32::try_from(entry_index).unwrap_or(i32::MAX);
        let raw = balance * self.risk_fraction / leverage * self.stake_multiplier.powi(exponent);
        let stake = if raw.is_nan() { min_stake } else { raw.clamp(min_stake, max_stake) };

        if stake <= 0.0 {
            return Ok(decline(DeclineReason::NonPositiveStake));
        }

        tracing::debug!(
            "Sized entry #{}: raw {:.4} -> {:.4} (limits {:.2}..{:.2})",
            entry_index,
            raw,
            stake,
            min_stake,
            max_stake
        );

        Ok(SizingDecision::Stake { amount: stake })
    }
}

fn decline(reason: DeclineReason) -> SizingDecision {
    tracing::debug!("Sizing declined: {:?}", reason);
    SizingDecision::Decline { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolicyError;

    fn sizer() -> RiskSizer {
        RiskSizer::new(0.02, 1.6)
    }

    fn limits() -> StakeLimits {
        StakeLimits::new(10.0, 1000.0)
    }

    fn amount(decision: SizingDecision) -> f64 {
        decision.stake().expect("expected a stake")
    }

    #[test]
    fn test_geometric_schedule() {
        let s = sizer();
        assert!((amount(s.size(1000.0, 1.0, limits(), 0).unwrap()) - 20.0).abs() < 1e-9);
        assert!((amount(s.size(1000.0, 1.0, limits(), 1).unwrap()) - 32.0).abs() < 1e-9);
        assert!((amount(s.size(1000.0, 1.0, limits(), 2).unwrap()) - 51.2).abs() < 1e-9);
    }

    #[test]
    fn test_leverage_divides_stake() {
        let stake = amount(sizer().size(1000.0, 4.0, limits(), 0).unwrap());
        assert!((stake - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_clamps_to_limits() {
        let s = sizer();
        // 100 * 0.02 = 2 -> raised to min 10
        assert_eq!(amount(s.size(100.0, 1.0, limits(), 0).unwrap()), 10.0);
        // Huge entry index saturates at max
        assert_eq!(amount(s.size(1000.0, 1.0, limits(), 40).unwrap()), 1000.0);
        assert_eq!(amount(s.size(1000.0, 1.0, limits(), u32::MAX).unwrap()), 1000.0);
    }

    #[test]
    fn test_declines_non_positive_balance() {
        let decision = sizer().size(0.0, 1.0, limits(), 0).unwrap();
        assert_eq!(
            decision,
            SizingDecision::Decline {
                reason: DeclineReason::NonPositiveBalance
            }
        );
        assert!(sizer().size(-50.0, 1.0, limits(), 0).unwrap().stake().is_none());
    }

    #[test]
    fn test_declines_non_positive_leverage() {
        let decision = sizer().size(1000.0, 0.0, limits(), 0).unwrap();
        assert_eq!(
            decision,
            SizingDecision::Decline {
                reason: DeclineReason::NonPositiveLeverage
            }
        );
    }

    #[test]
    fn test_declines_inverted_limits() {
        let decision = sizer()
            .size(1000.0, 1.0, StakeLimits::new(50.0, 5.0), 0)
            .unwrap();
        assert!(matches!(
            decision,
            SizingDecision::Decline {
                reason: DeclineReason::InvertedLimits { .. }
            }
        ));
    }

    #[test]
    fn test_declines_zero_stake() {
        let decision = sizer()
            .size(1000.0, 1.0, StakeLimits::new(0.0, 0.0), 0)
            .unwrap();
        assert_eq!(
            decision,
            SizingDecision::Decline {
                reason: DeclineReason::NonPositiveStake
            }
        );
    }

    #[test]
    fn test_nan_balance_is_missing_input() {
        let result = sizer().size(f64::NAN, 1.0, limits(), 0);
        assert_eq!(result, Err(PolicyError::MissingInput { field: "balance" }));
    }
}
