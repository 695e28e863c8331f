// Copyright (c) 2026 Carbon Ledger Contributors. MIT License.
// See LICENSE for details.

//! # Carbon Credit Contracts
//!
//! A registry and marketplace for tokenized carbon offsets. Verified project
//! developers mint credits (one unit is one metric ton of CO2-equivalent),
//! holders transfer or list them for sale, and anyone holding active tons
//! may retire them permanently on behalf of a beneficiary.
//!
//! - **Authorization**: administrator, verifier set and developer approvals.
//! - **Registry**: credit metadata, serial numbers and retirement history.
//! - **Balances**: per-owner active and retired amounts.
//! - **Marketplace**: fixed-price listings settled through a payment
//!   gateway.
//! - **Engine**: [`CarbonMarket`], the facade every operation goes through.
//!
//! ## Design Principles
//!
//! 1. Validate everything, then write. A failed operation leaves no trace.
//! 2. Tons are conserved: per credit, Σ active + Σ retired equals the
//!    minted amount at every observable point.
//! 3. Ids are sequential from 1 and never reused.
//! 4. State transitions are explicit enum variants where a lifecycle exists.

pub mod authorization;
pub mod balances;
pub mod engine;
pub mod error;
pub mod marketplace;
pub mod persistence;
pub mod registry;
pub mod shared;
pub mod stats;

mod serde_support;
mod validation;

pub use authorization::{AuthorizationStore, DeveloperApproval};
pub use balances::{Balance, BalanceLedger, SupplyBreakdown};
pub use engine::{CarbonMarket, LedgerSnapshot};
pub use error::{CreditId, ErrorClass, ListingId, MarketError, MarketResult};
pub use marketplace::{Listing, ListingStatus, Marketplace, Settlement};
pub use persistence::PersistError;
pub use registry::{Credit, CreditIssuance, CreditRegistry, RetirementRecord};
pub use shared::SharedMarket;
pub use stats::MarketStats;
