//! # Credit Registry
//!
//! The canonical record of every minted credit. A credit's metadata is
//! frozen at mint time; only its retirement state moves afterwards.
//!
//! ## Retirement Aggregation
//!
//! A credit can be split across many owners, each retiring independently.
//! The registry therefore keeps a running `active_supply` per credit (the
//! sum of every owner's active amount) and an append-only history of
//! [`RetirementRecord`]s. The credit-wide `retired` flag flips exactly when
//! `active_supply` reaches zero, never earlier.
//!
//! The single `retirement_beneficiary` / `retirement_date` pair on
//! [`Credit`] reflects the most recent retirement; the full per-owner story
//! lives in [`CreditRegistry::retirement_history`].

use std::collections::BTreeMap;

use carbon_ledger::config::FIRST_CREDIT_ID;
use carbon_ledger::Principal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CreditId, MarketError, MarketResult};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Metadata a developer supplies when minting a credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditIssuance {
    /// Tons of CO2-equivalent represented.
    pub amount: u64,
    /// Project category, e.g. "reforestation".
    pub project_type: String,
    /// Project location.
    pub location: String,
    /// Verification standard, e.g. "VCS" or "Gold Standard".
    pub standard: String,
    /// Year the reductions occurred.
    pub vintage_year: u16,
    /// Registry serial number of the underlying issuance.
    pub serial_number: String,
}

/// A minted credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credit {
    /// Sequential id.
    pub credit_id: CreditId,
    /// The developer who minted the credit.
    pub developer: Principal,
    /// The verifier whose approval authorized the mint.
    pub verifier: Principal,
    /// Tons originally minted.
    pub amount: u64,
    /// Project category.
    pub project_type: String,
    /// Project location.
    pub location: String,
    /// Verification standard.
    pub standard: String,
    /// Vintage year.
    pub vintage_year: u16,
    /// Serial number.
    pub serial_number: String,
    /// Issuance time.
    pub issued_at: DateTime<Utc>,
    /// Set once no active supply remains anywhere. Never unset.
    pub retired: bool,
    /// Beneficiary named by the most recent retirement.
    pub retirement_beneficiary: Option<Principal>,
    /// Time of the most recent retirement.
    pub retirement_date: Option<DateTime<Utc>>,
    /// Sum of every owner's active amount of this credit.
    pub active_supply: u64,
}

/// One owner's retirement of part of a credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetirementRecord {
    /// The owner whose balance was retired.
    pub owner: Principal,
    /// Tons retired.
    pub amount: u64,
    /// Who the offset is claimed for.
    pub beneficiary: Principal,
    /// When it happened.
    pub retired_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// All minted credits, their serial index and retirement history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditRegistry {
    credits: BTreeMap<CreditId, Credit>,
    serial_index: BTreeMap<String, CreditId>,
    retirements: BTreeMap<CreditId, Vec<RetirementRecord>>,
    next_credit_id: CreditId,
}

impl CreditRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            credits: BTreeMap::new(),
            serial_index: BTreeMap::new(),
            retirements: BTreeMap::new(),
            next_credit_id: FIRST_CREDIT_ID,
        }
    }

    /// The id the next mint will receive.
    pub fn next_credit_id(&self) -> CreditId {
        self.next_credit_id
    }

    /// Looks up a credit.
    pub fn get(&self, credit_id: CreditId) -> Option<&Credit> {
        self.credits.get(&credit_id)
    }

    /// The credit minted under `serial_number`, if any.
    pub fn by_serial(&self, serial_number: &str) -> Option<&Credit> {
        self.serial_index
            .get(serial_number)
            .and_then(|id| self.credits.get(id))
    }

    /// Retirements of `credit_id` in the order they happened.
    pub fn retirement_history(&self, credit_id: CreditId) -> &[RetirementRecord] {
        self.retirements
            .get(&credit_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of credits minted.
    pub fn len(&self) -> usize {
        self.credits.len()
    }

    /// Returns `true` if nothing has been minted.
    pub fn is_empty(&self) -> bool {
        self.credits.is_empty()
    }

    /// All credits in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Credit> {
        self.credits.values()
    }

    /// Fails with `CreditRetired` if the credit exists and is retired.
    ///
    /// Unknown credits pass: callers follow up with a balance check, which
    /// an unknown credit can never satisfy.
    pub fn ensure_not_retired(&self, credit_id: CreditId) -> MarketResult<()> {
        match self.credits.get(&credit_id) {
            Some(credit) if credit.retired => Err(MarketError::CreditRetired(credit_id)),
            _ => Ok(()),
        }
    }

    /// Checks that an issuance can be recorded. No writes.
    pub fn check_issuance(&self, issuance: &CreditIssuance, unique_serials: bool) -> MarketResult<()> {
        if self.credits.contains_key(&self.next_credit_id) {
            return Err(MarketError::CreditAlreadyExists(format!(
                "id {}",
                self.next_credit_id
            )));
        }
        if unique_serials && self.by_serial(&issuance.serial_number).is_some() {
            return Err(MarketError::CreditAlreadyExists(format!(
                "serial {}",
                issuance.serial_number
            )));
        }
        self.next_credit_id
            .checked_add(1)
            .ok_or(MarketError::Overflow("credit id"))?;
        Ok(())
    }

    /// Records a new credit and returns its id.
    ///
    /// Runs [`check_issuance`](Self::check_issuance) first; on error nothing
    /// is written.
    pub fn issue(
        &mut self,
        developer: Principal,
        verifier: Principal,
        issuance: CreditIssuance,
        unique_serials: bool,
        now: DateTime<Utc>,
    ) -> MarketResult<CreditId> {
        self.check_issuance(&issuance, unique_serials)?;

        let credit_id = self.next_credit_id;
        self.next_credit_id += 1;

        // The first credit under a serial keeps the index entry.
        self.serial_index
            .entry(issuance.serial_number.clone())
            .or_insert(credit_id);

        self.credits.insert(
            credit_id,
            Credit {
                credit_id,
                developer,
                verifier,
                amount: issuance.amount,
                project_type: issuance.project_type,
                location: issuance.location,
                standard: issuance.standard,
                vintage_year: issuance.vintage_year,
                serial_number: issuance.serial_number,
                issued_at: now,
                retired: false,
                retirement_beneficiary: None,
                retirement_date: None,
                active_supply: issuance.amount,
            },
        );
        Ok(credit_id)
    }

    /// Checks that `amount` active tons of `credit_id` can be retired. No
    /// writes.
    pub fn check_retirement(&self, credit_id: CreditId, amount: u64) -> MarketResult<()> {
        let credit = self
            .credits
            .get(&credit_id)
            .ok_or(MarketError::CreditRetired(credit_id))?;
        credit
            .active_supply
            .checked_sub(amount)
            .ok_or(MarketError::Overflow("credit active supply"))?;
        Ok(())
    }

    /// Applies a retirement to the credit record. Returns `true` if this
    /// retirement exhausted the credit's active supply.
    pub fn record_retirement(
        &mut self,
        credit_id: CreditId,
        owner: Principal,
        amount: u64,
        beneficiary: Principal,
        now: DateTime<Utc>,
    ) -> MarketResult<bool> {
        self.check_retirement(credit_id, amount)?;
        let credit = self
            .credits
            .get_mut(&credit_id)
            .ok_or(MarketError::CreditRetired(credit_id))?;

        credit.active_supply -= amount;
        credit.retirement_beneficiary = Some(beneficiary.clone());
        credit.retirement_date = Some(now);
        let newly_retired = !credit.retired && credit.active_supply == 0;
        if newly_retired {
            credit.retired = true;
        }

        self.retirements
            .entry(credit_id)
            .or_default()
            .push(RetirementRecord {
                owner,
                amount,
                beneficiary,
                retired_at: now,
            });
        Ok(newly_retired)
    }
}

impl Default for CreditRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Principal {
        Principal::from(s)
    }

    fn issuance(amount: u64, serial: &str) -> CreditIssuance {
        CreditIssuance {
            amount,
            project_type: "reforestation".into(),
            location: "Para, Brazil".into(),
            standard: "VCS".into(),
            vintage_year: 2023,
            serial_number: serial.into(),
        }
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut registry = CreditRegistry::new();
        let now = Utc::now();
        let a = registry
            .issue(p("dev"), p("verra"), issuance(10, "S-1"), true, now)
            .unwrap();
        let b = registry
            .issue(p("dev"), p("verra"), issuance(20, "S-2"), true, now)
            .unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(registry.next_credit_id(), 3);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn metadata_is_recorded() {
        let mut registry = CreditRegistry::new();
        let id = registry
            .issue(p("dev"), p("verra"), issuance(100, "VCS-981"), true, Utc::now())
            .unwrap();
        let credit = registry.get(id).unwrap();
        assert_eq!(credit.amount, 100);
        assert_eq!(credit.active_supply, 100);
        assert_eq!(credit.vintage_year, 2023);
        assert_eq!(credit.verifier, p("verra"));
        assert!(!credit.retired);
        assert_eq!(registry.by_serial("VCS-981").map(|c| c.credit_id), Some(id));
    }

    #[test]
    fn duplicate_serial_rejected_when_enforced() {
        let mut registry = CreditRegistry::new();
        let now = Utc::now();
        registry
            .issue(p("dev"), p("v"), issuance(1, "DUP"), true, now)
            .unwrap();
        let err = registry
            .issue(p("dev"), p("v"), issuance(1, "DUP"), true, now)
            .unwrap_err();
        assert!(matches!(err, MarketError::CreditAlreadyExists(_)));
        assert_eq!(registry.next_credit_id(), 2);

        let id = registry
            .issue(p("dev"), p("v"), issuance(1, "DUP"), false, now)
            .unwrap();
        assert_eq!(id, 2);
        assert_eq!(registry.by_serial("DUP").map(|c| c.credit_id), Some(1));
    }

    #[test]
    fn partial_retirement_keeps_credit_active() {
        let mut registry = CreditRegistry::new();
        let now = Utc::now();
        let id = registry
            .issue(p("dev"), p("v"), issuance(100, "S"), true, now)
            .unwrap();
        let exhausted = registry
            .record_retirement(id, p("dev"), 30, p("acme"), now)
            .unwrap();
        assert!(!exhausted);
        let credit = registry.get(id).unwrap();
        assert!(!credit.retired);
        assert_eq!(credit.active_supply, 70);
        assert_eq!(credit.retirement_beneficiary, Some(p("acme")));
        assert_eq!(registry.retirement_history(id).len(), 1);
    }

    #[test]
    fn full_retirement_flips_flag_once() {
        let mut registry = CreditRegistry::new();
        let now = Utc::now();
        let id = registry
            .issue(p("dev"), p("v"), issuance(50, "S"), true, now)
            .unwrap();
        registry
            .record_retirement(id, p("a"), 20, p("a"), now)
            .unwrap();
        let exhausted = registry
            .record_retirement(id, p("b"), 30, p("b"), now)
            .unwrap();
        assert!(exhausted);
        assert!(registry.get(id).unwrap().retired);
        assert_eq!(registry.ensure_not_retired(id), Err(MarketError::CreditRetired(id)));
        assert_eq!(registry.retirement_history(id).len(), 2);
    }

    #[test]
    fn over_retirement_rejected() {
        let mut registry = CreditRegistry::new();
        let id = registry
            .issue(p("dev"), p("v"), issuance(5, "S"), true, Utc::now())
            .unwrap();
        assert!(registry.check_retirement(id, 6).is_err());
        assert_eq!(registry.get(id).unwrap().active_supply, 5);
    }

    #[test]
    fn unknown_credit_lookups() {
        let registry = CreditRegistry::new();
        assert!(registry.get(42).is_none());
        assert!(registry.retirement_history(42).is_empty());
        assert!(registry.ensure_not_retired(42).is_ok());
    }
}
