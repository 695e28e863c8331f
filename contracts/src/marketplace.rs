//! # Marketplace
//!
//! Fixed-price listings of credit tons. The lifecycle is:
//!
//! ```text
//!            list                 cancel
//!   (none) ───────► Active ───────────────► Cancelled
//!                     │
//!                     │ buy (settled)
//!                     ▼
//!                   Filled
//! ```
//!
//! `Cancelled` and `Filled` are terminal. No partial fills.
//!
//! ## No Reservation
//!
//! Listing does not lock the seller's tons. The seller may transfer or
//! retire them afterwards, even list the same tons twice. Settlement
//! re-checks the seller's active balance and refuses the trade if it no
//! longer covers the listing. That window is accepted behavior.

use std::collections::BTreeMap;

use carbon_ledger::config::FIRST_LISTING_ID;
use carbon_ledger::Principal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CreditId, ListingId, MarketError, MarketResult};

/// Lifecycle status of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListingStatus {
    /// Open for purchase.
    Active,
    /// Withdrawn by the seller.
    Cancelled,
    /// Bought in full.
    Filled,
}

impl ListingStatus {
    /// Returns `true` for terminal states.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ListingStatus::Active)
    }
}

impl std::fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListingStatus::Active => write!(f, "Active"),
            ListingStatus::Cancelled => write!(f, "Cancelled"),
            ListingStatus::Filled => write!(f, "Filled"),
        }
    }
}

/// An offer to sell `amount` tons of one credit at a fixed price per ton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Sequential id.
    pub listing_id: ListingId,
    /// Seller.
    pub seller: Principal,
    /// Credit on offer.
    pub credit_id: CreditId,
    /// Tons on offer.
    pub amount: u64,
    /// Price per ton, in payment units.
    pub price_per_ton: u64,
    /// Current status.
    pub status: ListingStatus,
    /// When the listing was created.
    pub created_at: DateTime<Utc>,
    /// When it was cancelled or filled.
    pub closed_at: Option<DateTime<Utc>>,
    /// Who bought it, once filled.
    pub buyer: Option<Principal>,
}

impl Listing {
    /// Returns `true` while the listing can be bought or cancelled.
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// `amount × price_per_ton`, checked.
    pub fn total_price(&self) -> MarketResult<u64> {
        self.amount
            .checked_mul(self.price_per_ton)
            .ok_or(MarketError::Overflow("total price"))
    }
}

/// Receipt of a settled purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// The filled listing.
    pub listing_id: ListingId,
    /// Buyer.
    pub buyer: Principal,
    /// Seller.
    pub seller: Principal,
    /// Credit moved.
    pub credit_id: CreditId,
    /// Tons moved.
    pub amount: u64,
    /// Agreed price per ton.
    pub price_per_ton: u64,
    /// Total paid.
    pub total_price: u64,
    /// Settlement time.
    pub settled_at: DateTime<Utc>,
}

/// All listings ever created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Marketplace {
    listings: BTreeMap<ListingId, Listing>,
    next_listing_id: ListingId,
}

impl Marketplace {
    /// Creates an empty marketplace.
    pub fn new() -> Self {
        Self {
            listings: BTreeMap::new(),
            next_listing_id: FIRST_LISTING_ID,
        }
    }

    /// The id the next listing will receive.
    pub fn next_listing_id(&self) -> ListingId {
        self.next_listing_id
    }

    /// Looks up a listing in any state.
    pub fn get(&self, listing_id: ListingId) -> Option<&Listing> {
        self.listings.get(&listing_id)
    }

    /// The listing if it exists and is active, else `ListingNotFound`.
    pub fn active_listing(&self, listing_id: ListingId) -> MarketResult<&Listing> {
        self.listings
            .get(&listing_id)
            .filter(|l| l.is_active())
            .ok_or(MarketError::ListingNotFound(listing_id))
    }

    /// Open listings in id order.
    pub fn active_listings(&self) -> impl Iterator<Item = &Listing> {
        self.listings.values().filter(|l| l.is_active())
    }

    /// Number of open listings.
    pub fn open_count(&self) -> usize {
        self.active_listings().count()
    }

    /// Every listing in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Listing> {
        self.listings.values()
    }

    /// Records a new active listing. Balance and credit checks are the
    /// caller's job; this only validates the listing itself.
    pub fn open(
        &mut self,
        seller: Principal,
        credit_id: CreditId,
        amount: u64,
        price_per_ton: u64,
        now: DateTime<Utc>,
    ) -> MarketResult<ListingId> {
        let listing_id = self.next_listing_id;
        if self.listings.contains_key(&listing_id) {
            return Err(MarketError::ListingAlreadyExists(listing_id));
        }
        let next = listing_id
            .checked_add(1)
            .ok_or(MarketError::Overflow("listing id"))?;

        self.listings.insert(
            listing_id,
            Listing {
                listing_id,
                seller,
                credit_id,
                amount,
                price_per_ton,
                status: ListingStatus::Active,
                created_at: now,
                closed_at: None,
                buyer: None,
            },
        );
        self.next_listing_id = next;
        Ok(listing_id)
    }

    /// Withdraws an active listing on behalf of its seller.
    ///
    /// Inactive and unknown listings both report `ListingNotFound`.
    pub fn cancel(
        &mut self,
        caller: &Principal,
        listing_id: ListingId,
        now: DateTime<Utc>,
    ) -> MarketResult<&Listing> {
        let listing = self.active_listing(listing_id)?;
        if &listing.seller != caller {
            return Err(MarketError::NotOwner {
                listing_id,
                caller: caller.clone(),
            });
        }

        let listing = self
            .listings
            .get_mut(&listing_id)
            .ok_or(MarketError::ListingNotFound(listing_id))?;
        listing.status = ListingStatus::Cancelled;
        listing.closed_at = Some(now);
        Ok(listing)
    }

    /// Marks an active listing as bought by `buyer`.
    pub fn fill(
        &mut self,
        listing_id: ListingId,
        buyer: Principal,
        now: DateTime<Utc>,
    ) -> MarketResult<&Listing> {
        let listing = self
            .listings
            .get_mut(&listing_id)
            .filter(|l| l.is_active())
            .ok_or(MarketError::ListingNotFound(listing_id))?;
        listing.status = ListingStatus::Filled;
        listing.closed_at = Some(now);
        listing.buyer = Some(buyer);
        Ok(listing)
    }
}

impl Default for Marketplace {
    fn default() -> Self {
        Self::new()
    }
}
