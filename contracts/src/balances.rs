//! # Balance Ledger
//!
//! Per-(owner, credit) holdings, split into an *active* amount (available to
//! transfer, list, or retire) and a *retired* amount (consumed, permanent).
//!
//! ## Conservation
//!
//! For every credit:
//!
//! ```text
//! Σ active(owner, credit) + Σ retired(owner, credit) == credit.amount
//! ```
//!
//! Every mutation here either moves tons between two owners' active amounts
//! or moves tons from one owner's active to the same owner's retired
//! amount. Nothing creates or destroys tons except [`BalanceLedger::credit`]
//! at mint time.
//!
//! Records are created on first receipt and never deleted; an all-zero
//! balance is a valid terminal state.

use std::collections::BTreeMap;

use carbon_ledger::Principal;
use serde::{Deserialize, Serialize};

use crate::error::{CreditId, MarketError, MarketResult};

/// One owner's holding of one credit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Tons available to transfer, list, or retire.
    pub active: u64,
    /// Tons permanently retired by this owner.
    pub retired: u64,
}

/// Aggregate supply of one credit across all owners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyBreakdown {
    /// Tons originally minted.
    pub minted: u64,
    /// Σ active over all owners.
    pub active: u64,
    /// Σ retired over all owners.
    pub retired: u64,
}

impl SupplyBreakdown {
    /// `active + retired == minted`.
    pub fn is_conserved(&self) -> bool {
        self.active.checked_add(self.retired) == Some(self.minted)
    }
}

/// All balances, keyed by `(owner, credit_id)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalanceLedger {
    #[serde(with = "crate::serde_support::entry_list")]
    balances: BTreeMap<(Principal, CreditId), Balance>,
}

impl BalanceLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// The balance of `owner` in `credit_id`; zero if never held.
    pub fn get(&self, owner: &Principal, credit_id: CreditId) -> Balance {
        self.balances
            .get(&(owner.clone(), credit_id))
            .copied()
            .unwrap_or_default()
    }

    /// Returns `true` if `owner` holds at least `amount` active tons.
    pub fn has_sufficient(&self, owner: &Principal, credit_id: CreditId, amount: u64) -> bool {
        self.get(owner, credit_id).active >= amount
    }

    /// Fails with `InsufficientCredits` unless `owner` holds at least
    /// `amount` active tons.
    pub fn require_active(
        &self,
        owner: &Principal,
        credit_id: CreditId,
        amount: u64,
    ) -> MarketResult<Balance> {
        let balance = self.get(owner, credit_id);
        if !self.has_sufficient(owner, credit_id, amount) {
            return Err(MarketError::InsufficientCredits {
                owner: owner.clone(),
                credit_id,
                available: balance.active,
                requested: amount,
            });
        }
        Ok(balance)
    }

    /// Checks that `amount` fresh tons can be added to `owner`'s active
    /// amount. No writes.
    pub fn check_credit(&self, owner: &Principal, credit_id: CreditId, amount: u64) -> MarketResult<()> {
        self.get(owner, credit_id)
            .active
            .checked_add(amount)
            .ok_or(MarketError::Overflow("active balance"))?;
        Ok(())
    }

    /// Adds freshly minted tons to `owner`'s active amount.
    pub fn credit(&mut self, owner: &Principal, credit_id: CreditId, amount: u64) -> MarketResult<()> {
        self.check_credit(owner, credit_id, amount)?;
        let entry = self.balances.entry((owner.clone(), credit_id)).or_default();
        entry.active += amount;
        Ok(())
    }

    /// Checks that a transfer can be applied. No writes.
    pub fn check_transfer(
        &self,
        from: &Principal,
        to: &Principal,
        credit_id: CreditId,
        amount: u64,
    ) -> MarketResult<()> {
        self.require_active(from, credit_id, amount)?;
        if from != to {
            self.get(to, credit_id)
                .active
                .checked_add(amount)
                .ok_or(MarketError::Overflow("active balance"))?;
        }
        Ok(())
    }

    /// Moves `amount` active tons from `from` to `to`.
    ///
    /// The recipient record is created if absent. A self-transfer is
    /// validated and then leaves the balance unchanged.
    pub fn transfer(
        &mut self,
        from: &Principal,
        to: &Principal,
        credit_id: CreditId,
        amount: u64,
    ) -> MarketResult<()> {
        self.check_transfer(from, to, credit_id, amount)?;
        if from == to {
            return Ok(());
        }

        if let Some(sender) = self.balances.get_mut(&(from.clone(), credit_id)) {
            sender.active -= amount;
        }
        let recipient = self.balances.entry((to.clone(), credit_id)).or_default();
        recipient.active += amount;
        Ok(())
    }

    /// Checks that a retirement can be applied. No writes.
    pub fn check_retire(&self, owner: &Principal, credit_id: CreditId, amount: u64) -> MarketResult<()> {
        let balance = self.require_active(owner, credit_id, amount)?;
        balance
            .retired
            .checked_add(amount)
            .ok_or(MarketError::Overflow("retired balance"))?;
        Ok(())
    }

    /// Moves `amount` from `owner`'s active to retired amount.
    pub fn retire(&mut self, owner: &Principal, credit_id: CreditId, amount: u64) -> MarketResult<Balance> {
        self.check_retire(owner, credit_id, amount)?;
        let entry = self.balances.entry((owner.clone(), credit_id)).or_default();
        entry.active -= amount;
        entry.retired += amount;
        Ok(*entry)
    }

    /// Every owner holding a record for `credit_id`, in owner order.
    pub fn holders(&self, credit_id: CreditId) -> impl Iterator<Item = (&Principal, &Balance)> {
        self.balances
            .iter()
            .filter(move |((_, id), _)| *id == credit_id)
            .map(|((owner, _), balance)| (owner, balance))
    }

    /// Σ active and Σ retired of `credit_id` over all owners.
    pub fn totals(&self, credit_id: CreditId) -> (u64, u64) {
        self.holders(credit_id)
            .fold((0u64, 0u64), |(active, retired), (_, b)| {
                (active.saturating_add(b.active), retired.saturating_add(b.retired))
            })
    }

    /// Every balance record in key order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&(Principal, CreditId), &Balance)> {
        self.balances.iter()
    }
}
