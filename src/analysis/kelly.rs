//! Kelly criterion stake sizing.
//!
//! Fractional Kelly on decimal odds, capped at a share of the bankroll.

use tracing::debug;

use crate::config::BankrollSettings;
use crate::format::round_money;

/// Stake sizing for a bankroll.
#[derive(Debug, Clone)]
pub struct Kelly {
    /// Bankroll the stakes are a share of.
    pub total: f64,
    /// Fractional Kelly multiplier (0.25 = quarter-Kelly).
    pub fraction: f64,
    /// Maximum stake as a share of the bankroll.
    pub max_stake_pct: f64,
}

impl Kelly {
    pub fn new(bankroll: &BankrollSettings) -> Self {
        Self {
            total: bankroll.total,
            fraction: bankroll.kelly_fraction,
            max_stake_pct: bankroll.max_stake_pct,
        }
    }

    /// Raw Kelly fraction on decimal odds: f* = (p·o − 1) / (o − 1).
    /// Never negative; zero when the odds are 1.0 or lower.
    pub fn raw_fraction(p: f64, odds: f64) -> f64 {
        if odds <= 1.0 {
            return 0.0;
        }
        ((p * odds - 1.0) / (odds - 1.0)).max(0.0)
    }

    /// Suggested stake in currency units, rounded to cents.
    pub fn stake(&self, p: f64, odds: f64) -> f64 {
        if self.total <= 0.0 || odds <= 1.0 || p * odds - 1.0 <= 0.0 {
            return 0.0;
        }

        let kelly = Self::raw_fraction(p, odds);
        let stake = (self.total * kelly * self.fraction).min(self.total * self.max_stake_pct);

        debug!(p, odds, kelly, stake, "Kelly stake");
        round_money(stake.max(0.0))
    }
}
