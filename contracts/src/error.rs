//! # Market Errors
//!
//! Every rejected operation returns one [`MarketError`]. Errors are values,
//! never panics, and a returned error always means nothing was written.
//!
//! Errors fall into four classes (see [`ErrorClass`]):
//!
//! - **Authorization**: the caller lacks the required role.
//! - **State consistency**: the transition is invalid given current
//!   registry contents.
//! - **Resource**: a numeric precondition is unmet.
//! - **Input**: the request was malformed and never admitted.

use std::fmt;

use carbon_ledger::{ConfigError, PaymentError, Principal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sequential credit identifier. Starts at 1, never reused.
pub type CreditId = u64;

/// Sequential listing identifier. Starts at 1, never reused.
pub type ListingId = u64;

/// Errors returned by market operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketError {
    // -- authorization ------------------------------------------------------
    /// The caller does not hold the role this operation requires.
    #[error("not authorized: {caller} may not {action}")]
    NotAuthorized {
        /// The rejected caller.
        caller: Principal,
        /// What the caller attempted.
        action: &'static str,
    },

    /// The principal cannot act as a verifier in this position.
    #[error("invalid verifier: {0}")]
    InvalidVerifier(Principal),

    /// The caller holds no usable developer approval.
    #[error("{0} is not an approved project developer")]
    InvalidProjectDeveloper(Principal),

    // -- state consistency --------------------------------------------------
    /// The principal is already registered in this role.
    #[error("{0} is already registered")]
    AlreadyRegistered(Principal),

    /// No registration exists for this principal.
    #[error("{0} is not registered")]
    NotRegistered(Principal),

    /// A credit with this id or serial number already exists.
    #[error("credit already exists: {0}")]
    CreditAlreadyExists(String),

    /// The credit has no active supply left.
    #[error("credit {0} is retired")]
    CreditRetired(CreditId),

    /// A listing with this id already exists.
    #[error("listing {0} already exists")]
    ListingAlreadyExists(ListingId),

    /// The listing does not exist or is no longer active.
    #[error("listing {0} not found or not active")]
    ListingNotFound(ListingId),

    /// The caller is not the seller of this listing.
    #[error("{caller} does not own listing {listing_id}")]
    NotOwner {
        /// The listing in question.
        listing_id: ListingId,
        /// The rejected caller.
        caller: Principal,
    },

    /// A snapshot could not be restored.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    // -- resource -----------------------------------------------------------
    /// The owner's active balance is below the requested amount.
    #[error(
        "insufficient credits: {owner} holds {available} active tons of credit {credit_id}, needs {requested}"
    )]
    InsufficientCredits {
        /// The balance owner.
        owner: Principal,
        /// The credit being debited.
        credit_id: CreditId,
        /// Active tons currently held.
        available: u64,
        /// Tons the operation needs.
        requested: u64,
    },

    /// Listing prices must be positive.
    #[error("invalid price per ton: {0}")]
    InvalidPrice(u64),

    /// Amounts must be positive.
    #[error("amount must be positive")]
    InvalidAmount,

    /// The payment collaborator refused the settlement payment.
    #[error("payment failed: {0}")]
    PaymentFailed(#[source] PaymentError),

    /// An amount computation would overflow `u64`.
    #[error("amount overflow in {0}")]
    Overflow(&'static str),

    // -- input --------------------------------------------------------------
    /// A request field is malformed.
    #[error("invalid {field}: {reason}")]
    InvalidInput {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The market configuration is inconsistent.
    #[error("invalid market config: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Coarse classification of [`MarketError`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Caller lacks a role.
    Authorization,
    /// Transition invalid for the current state.
    StateConsistency,
    /// Numeric precondition unmet.
    Resource,
    /// Malformed request.
    Input,
}

impl ErrorClass {
    /// Stable lowercase label, used for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Authorization => "authorization",
            ErrorClass::StateConsistency => "state_consistency",
            ErrorClass::Resource => "resource",
            ErrorClass::Input => "input",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MarketError {
    /// The class this error belongs to.
    pub fn class(&self) -> ErrorClass {
        match self {
            MarketError::NotAuthorized { .. }
            | MarketError::InvalidVerifier(_)
            | MarketError::InvalidProjectDeveloper(_) => ErrorClass::Authorization,

            MarketError::AlreadyRegistered(_)
            | MarketError::NotRegistered(_)
            | MarketError::CreditAlreadyExists(_)
            | MarketError::CreditRetired(_)
            | MarketError::ListingAlreadyExists(_)
            | MarketError::ListingNotFound(_)
            | MarketError::NotOwner { .. }
            | MarketError::CorruptSnapshot(_) => ErrorClass::StateConsistency,

            MarketError::InsufficientCredits { .. }
            | MarketError::InvalidPrice(_)
            | MarketError::InvalidAmount
            | MarketError::PaymentFailed(_)
            | MarketError::Overflow(_) => ErrorClass::Resource,

            MarketError::InvalidInput { .. } | MarketError::InvalidConfig(_) => ErrorClass::Input,
        }
    }
}

impl From<PaymentError> for MarketError {
    fn from(err: PaymentError) -> Self {
        MarketError::PaymentFailed(err)
    }
}

/// Result alias for market operations.
pub type MarketResult<T> = Result<T, MarketError>;
