//! # Shared Market Handle
//!
//! [`SharedMarket`] lets several threads drive one engine. Every call takes
//! the single lock for its full duration, so operations are totally ordered
//! and each one still sees and leaves a consistent state.

use std::sync::Arc;

use carbon_ledger::{Clock, PaymentGateway, PaymentLedger, SystemClock};
use parking_lot::Mutex;

use crate::engine::CarbonMarket;

/// Cloneable, thread-safe handle to a [`CarbonMarket`].
pub struct SharedMarket<P = PaymentLedger, C = SystemClock> {
    inner: Arc<Mutex<CarbonMarket<P, C>>>,
}

impl<P, C> Clone for SharedMarket<P, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: PaymentGateway, C: Clock> SharedMarket<P, C> {
    /// Wraps an engine.
    pub fn new(market: CarbonMarket<P, C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(market)),
        }
    }

    /// Runs `f` with exclusive access to the engine.
    pub fn with<R>(&self, f: impl FnOnce(&mut CarbonMarket<P, C>) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// Runs `f` against the engine without mutating it.
    pub fn read<R>(&self, f: impl FnOnce(&CarbonMarket<P, C>) -> R) -> R {
        let guard = self.inner.lock();
        f(&guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CreditIssuance;
    use carbon_ledger::{ManualClock, MarketConfig, Principal};
    use std::thread;

    fn p(s: &str) -> Principal {
        Principal::from(s)
    }

    #[test]
    fn concurrent_transfers_conserve_supply() {
        let mut market =
            CarbonMarket::new(p("admin"), MarketConfig::default(), PaymentLedger::new(), ManualClock::default())
                .unwrap();
        market.add_verifier(&p("admin"), p("verifier")).unwrap();
        market.register_developer(&p("verifier"), p("dev"), "Forest").unwrap();
        let credit_id = market
            .mint(
                &p("dev"),
                CreditIssuance {
                    amount: 1_000,
                    project_type: "Reforestation".into(),
                    location: "Brazil".into(),
                    standard: "VCS".into(),
                    vintage_year: 2023,
                    serial_number: "VCS-1".into(),
                },
            )
            .unwrap();
        for i in 0..4 {
            market.transfer(&p("dev"), &p(&format!("holder-{i}")), credit_id, 100).unwrap();
        }

        let shared = SharedMarket::new(market);
        let workers: Vec<_> = (0..4)
            .map(|i| {
                let shared = shared.clone();
                thread::spawn(move || {
                    let me = p(&format!("holder-{i}"));
                    let next = p(&format!("holder-{}", (i + 1) % 4));
                    for _ in 0..50 {
                        shared.with(|m| {
                            let _ = m.transfer(&me, &next, credit_id, 3);
                            let _ = m.retire(&me, credit_id, 1, None);
                        });
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let supply = shared.read(|m| m.supply_of(credit_id)).unwrap();
        assert!(supply.is_conserved());
        assert_eq!(supply.minted, 1_000);
        let stats = shared.read(|m| m.market_stats());
        assert_eq!(stats.total_retired, supply.retired);
    }
}
