//! # Payment Collaborator
//!
//! Trades settle by moving value from the buyer to the seller. The ledger
//! does not own a currency; it asks a [`PaymentGateway`] to perform the
//! transfer and only commits credit movements if that transfer succeeds.
//!
//! [`PaymentLedger`] is the in-memory gateway used by tests and embedded
//! hosts: a flat map of principal to native-token balance with the same
//! rejection rules a chain's native transfer applies (no zero amounts, no
//! self-payments, no overdrafts).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::Principal;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a payment can be refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    /// The payer does not hold enough funds.
    #[error("insufficient funds: {account} has {available}, needs {requested}")]
    InsufficientFunds {
        /// The paying account.
        account: Principal,
        /// Funds currently held.
        available: u64,
        /// Funds the payment needs.
        requested: u64,
    },

    /// Payer and payee are the same principal.
    #[error("payer and payee are both {0}")]
    SelfPayment(Principal),

    /// Zero-value payments are meaningless and rejected.
    #[error("payment amount must be positive")]
    ZeroAmount,

    /// Crediting the payee would overflow its balance.
    #[error("balance overflow crediting {0}")]
    Overflow(Principal),

    /// The external payment system refused or failed the transfer.
    #[error("payment rejected: {0}")]
    Rejected(String),
}

// ---------------------------------------------------------------------------
// Gateway trait
// ---------------------------------------------------------------------------

/// Moves value between two principals, all or nothing.
///
/// Implementations must leave both balances untouched when returning an
/// error.
pub trait PaymentGateway {
    /// Transfers `amount` from `from` to `to`.
    fn transfer(&mut self, from: &Principal, to: &Principal, amount: u64)
        -> Result<(), PaymentError>;
}

// ---------------------------------------------------------------------------
// In-memory ledger
// ---------------------------------------------------------------------------

/// In-memory native-token balances.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentLedger {
    accounts: BTreeMap<Principal, u64>,
}

impl PaymentLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds freshly issued funds to an account.
    pub fn deposit(&mut self, account: &Principal, amount: u64) -> Result<(), PaymentError> {
        let balance = self.accounts.entry(account.clone()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| PaymentError::Overflow(account.clone()))?;
        Ok(())
    }

    /// Returns the balance of `account`, or 0 if it has never been funded.
    pub fn balance_of(&self, account: &Principal) -> u64 {
        self.accounts.get(account).copied().unwrap_or(0)
    }

    /// Sum of all balances. Constant across transfers.
    pub fn total_supply(&self) -> u64 {
        self.accounts.values().fold(0u64, |acc, b| acc.saturating_add(*b))
    }
}

impl PaymentGateway for PaymentLedger {
    fn transfer(
        &mut self,
        from: &Principal,
        to: &Principal,
        amount: u64,
    ) -> Result<(), PaymentError> {
        if amount == 0 {
            return Err(PaymentError::ZeroAmount);
        }
        if from == to {
            return Err(PaymentError::SelfPayment(from.clone()));
        }

        let available = self.balance_of(from);
        if available < amount {
            return Err(PaymentError::InsufficientFunds {
                account: from.clone(),
                available,
                requested: amount,
            });
        }

        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or_else(|| PaymentError::Overflow(to.clone()))?;

        // Both sides validated; apply.
        self.accounts.insert(from.clone(), available - amount);
        self.accounts.insert(to.clone(), credited);
        Ok(())
    }
}
