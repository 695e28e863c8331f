//! # Market Statistics
//!
//! Monotonic counters derived from successful operations. Nothing writes
//! them directly; the engine bumps them after a mint, retirement or
//! settlement has been applied.

use serde::{Deserialize, Serialize};

/// Running totals, in credit tons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketStats {
    /// Tons minted across all credits.
    pub total_minted: u64,
    /// Tons moved from active to retired.
    pub total_retired: u64,
    /// Tons settled through the marketplace.
    pub total_traded: u64,
}

impl MarketStats {
    pub(crate) fn record_mint(&mut self, tons: u64) {
        self.total_minted = self.total_minted.saturating_add(tons);
    }

    pub(crate) fn record_retirement(&mut self, tons: u64) {
        self.total_retired = self.total_retired.saturating_add(tons);
    }

    pub(crate) fn record_trade(&mut self, tons: u64) {
        self.total_traded = self.total_traded.saturating_add(tons);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let mut stats = MarketStats::default();
        stats.record_mint(100);
        stats.record_mint(50);
        stats.record_retirement(30);
        stats.record_trade(20);
        assert_eq!(
            stats,
            MarketStats {
                total_minted: 150,
                total_retired: 30,
                total_traded: 20,
            }
        );
    }

    #[test]
    fn counters_saturate() {
        let mut stats = MarketStats {
            total_minted: u64::MAX - 1,
            ..Default::default()
        };
        stats.record_mint(10);
        assert_eq!(stats.total_minted, u64::MAX);
    }
}
