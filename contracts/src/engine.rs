//! # Market Engine
//!
//! [`CarbonMarket`] is the single entry point for every public operation.
//! Each call is atomic: it reads current state, checks every precondition,
//! and only then writes. A returned error means no registry changed.
//!
//! The engine owns its two collaborators:
//!
//! - a [`PaymentGateway`] that moves value from buyer to seller during
//!   settlement;
//! - a [`Clock`] that timestamps approvals, issuance, retirements and
//!   settlements.
//!
//! The caller's identity is passed explicitly to every mutating operation;
//! authenticating it is the host's responsibility.
//!
//! ## Mint Authorization
//!
//! A developer may mint when it holds an `approved` record from at least one
//! verifier. Under the default [`MintAuthorization::ActiveVerifierOnly`]
//! policy that verifier must also still be in the verifier set, so removing
//! a verifier suspends the minting rights it granted without touching the
//! approval records themselves. The qualifying verifier is stamped on the
//! minted credit.

use carbon_ledger::storage::{leaf_hash, merkle_root, StateRoot, StorageError};
use carbon_ledger::{
    Clock, MarketConfig, MarketMetrics, PaymentGateway, PaymentLedger, Principal, SystemClock,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::authorization::{AuthorizationStore, DeveloperApproval};
use crate::balances::{Balance, BalanceLedger, SupplyBreakdown};
use crate::error::{CreditId, ListingId, MarketError, MarketResult};
use crate::marketplace::{Listing, ListingStatus, Marketplace, Settlement};
use crate::registry::{Credit, CreditIssuance, CreditRegistry, RetirementRecord};
use crate::stats::MarketStats;
use crate::validation;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Complete engine state at one instant, minus the external collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Layout version, see [`carbon_ledger::config::SNAPSHOT_FORMAT_VERSION`].
    pub format_version: u32,
    /// Administrator, verifiers and approvals.
    pub authorization: AuthorizationStore,
    /// Credits and retirement history.
    pub registry: CreditRegistry,
    /// Per-owner balances.
    pub balances: BalanceLedger,
    /// Listings.
    pub marketplace: Marketplace,
    /// Counters.
    pub stats: MarketStats,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The carbon credit registry and marketplace.
pub struct CarbonMarket<P = PaymentLedger, C = SystemClock> {
    config: MarketConfig,
    auth: AuthorizationStore,
    registry: CreditRegistry,
    balances: BalanceLedger,
    market: Marketplace,
    stats: MarketStats,
    payments: P,
    clock: C,
    metrics: Option<MarketMetrics>,
}

impl<P: PaymentGateway, C: Clock> CarbonMarket<P, C> {
    /// Creates an empty market administered by `administrator`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidConfig`] if `config` fails validation.
    pub fn new(
        administrator: Principal,
        config: MarketConfig,
        payments: P,
        clock: C,
    ) -> MarketResult<Self> {
        config.validate()?;
        info!(%administrator, "carbon market created");
        Ok(Self {
            config,
            auth: AuthorizationStore::new(administrator),
            registry: CreditRegistry::new(),
            balances: BalanceLedger::new(),
            market: Marketplace::new(),
            stats: MarketStats::default(),
            payments,
            clock,
            metrics: None,
        })
    }

    /// Attaches Prometheus metrics. Counters start from the current stats.
    pub fn with_metrics(mut self, metrics: MarketMetrics) -> Self {
        metrics.minted_tons_total.inc_by(self.stats.total_minted);
        metrics.retired_tons_total.inc_by(self.stats.total_retired);
        metrics.traded_tons_total.inc_by(self.stats.total_traded);
        metrics.listings_open.set(self.market.open_count() as i64);
        self.metrics = Some(metrics);
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// The payment collaborator.
    pub fn payments(&self) -> &P {
        &self.payments
    }

    /// Mutable access to the payment collaborator, e.g. to fund buyers.
    pub fn payments_mut(&mut self) -> &mut P {
        &mut self.payments
    }

    /// Attached metrics, if any.
    pub fn metrics(&self) -> Option<&MarketMetrics> {
        self.metrics.as_ref()
    }

    fn finish<T>(&self, operation: &'static str, result: MarketResult<T>) -> MarketResult<T> {
        if let Err(err) = &result {
            let class = err.class();
            warn!(operation, %class, error = %err, "operation rejected");
            if let Some(metrics) = &self.metrics {
                metrics.record_rejection(operation, class.as_str());
            }
        }
        result
    }

    // -- authorization ------------------------------------------------------

    /// Hands the administrator role to `new_owner`.
    pub fn transfer_ownership(&mut self, caller: &Principal, new_owner: Principal) -> MarketResult<()> {
        let result = self
            .auth
            .transfer_ownership(caller, new_owner)
            .map(|previous| {
                info!(%previous, administrator = %self.auth.administrator(), "ownership transferred");
            });
        self.finish("transfer_ownership", result)
    }

    /// Authorizes a verifier. Administrator only.
    pub fn add_verifier(&mut self, caller: &Principal, verifier: Principal) -> MarketResult<()> {
        let name = verifier.clone();
        let result = self.auth.add_verifier(caller, verifier);
        if result.is_ok() {
            info!(verifier = %name, "verifier added");
        }
        self.finish("add_verifier", result)
    }

    /// Deauthorizes a verifier. Administrator only.
    pub fn remove_verifier(&mut self, caller: &Principal, verifier: &Principal) -> MarketResult<()> {
        let result = self.auth.remove_verifier(caller, verifier);
        if result.is_ok() {
            info!(%verifier, "verifier removed");
        }
        self.finish("remove_verifier", result)
    }

    /// Records `caller`'s approval of `developer` for `project_name`.
    pub fn register_developer(
        &mut self,
        caller: &Principal,
        developer: Principal,
        project_name: impl Into<String>,
    ) -> MarketResult<()> {
        let now = self.clock.now();
        let max = self.config.max_text_field_length;
        let result = self
            .auth
            .register_developer(caller, developer, project_name.into(), now, max)
            .map(|approval| {
                info!(
                    developer = %approval.developer,
                    verifier = %approval.verifier,
                    project = %approval.project_name,
                    "developer approved"
                );
            });
        self.finish("register_developer", result)
    }

    /// Revokes `caller`'s approval of `developer`.
    pub fn revoke_developer(&mut self, caller: &Principal, developer: &Principal) -> MarketResult<()> {
        let now = self.clock.now();
        let result = self.auth.revoke_developer(caller, developer, now);
        if result.is_ok() {
            info!(%developer, verifier = %caller, "developer approval revoked");
        }
        self.finish("revoke_developer", result)
    }

    // -- registry -----------------------------------------------------------

    /// Mints a new credit to `caller` and returns its id.
    pub fn mint(&mut self, caller: &Principal, issuance: CreditIssuance) -> MarketResult<CreditId> {
        let result = self.try_mint(caller, issuance);
        self.finish("mint", result)
    }

    fn try_mint(&mut self, caller: &Principal, issuance: CreditIssuance) -> MarketResult<CreditId> {
        self.check_issuance_fields(&issuance)?;

        let verifier = self
            .auth
            .minting_verifier(caller, self.config.mint_authorization)
            .cloned()
            .ok_or_else(|| MarketError::InvalidProjectDeveloper(caller.clone()))?;

        let unique = self.config.unique_serial_numbers;
        self.registry.check_issuance(&issuance, unique)?;

        let amount = issuance.amount;
        self.balances
            .check_credit(caller, self.registry.next_credit_id(), amount)?;

        let now = self.clock.now();
        let credit_id = self
            .registry
            .issue(caller.clone(), verifier.clone(), issuance, unique, now)?;
        self.balances.credit(caller, credit_id, amount)?;
        self.stats.record_mint(amount);
        if let Some(metrics) = &self.metrics {
            metrics.minted_tons_total.inc_by(amount);
        }

        info!(credit_id, developer = %caller, %verifier, amount, "credit minted");
        Ok(credit_id)
    }

    fn check_issuance_fields(&self, issuance: &CreditIssuance) -> MarketResult<()> {
        validation::positive_amount(issuance.amount)?;
        let max = self.config.max_text_field_length;
        validation::text_field("project_type", &issuance.project_type, max)?;
        validation::text_field("location", &issuance.location, max)?;
        validation::text_field("standard", &issuance.standard, max)?;
        validation::text_field("serial_number", &issuance.serial_number, max)?;

        let (min, max_year) = (self.config.min_vintage_year, self.config.max_vintage_year);
        if !(min..=max_year).contains(&issuance.vintage_year) {
            return Err(MarketError::InvalidInput {
                field: "vintage_year",
                reason: format!("{} outside {}..={}", issuance.vintage_year, min, max_year),
            });
        }
        Ok(())
    }

    // -- balances -----------------------------------------------------------

    /// Moves `amount` active tons of `credit_id` from `caller` to `recipient`.
    pub fn transfer(
        &mut self,
        caller: &Principal,
        recipient: &Principal,
        credit_id: CreditId,
        amount: u64,
    ) -> MarketResult<()> {
        let result = self.try_transfer(caller, recipient, credit_id, amount);
        self.finish("transfer", result)
    }

    fn try_transfer(
        &mut self,
        caller: &Principal,
        recipient: &Principal,
        credit_id: CreditId,
        amount: u64,
    ) -> MarketResult<()> {
        validation::positive_amount(amount)?;
        validation::principal("recipient", recipient)?;
        self.registry.ensure_not_retired(credit_id)?;
        self.balances.transfer(caller, recipient, credit_id, amount)?;
        debug!(credit_id, from = %caller, to = %recipient, amount, "credits transferred");
        Ok(())
    }

    /// Retires `amount` of `caller`'s active tons of `credit_id` on behalf
    /// of `beneficiary` (the caller when `None`). Returns the caller's
    /// updated balance.
    pub fn retire(
        &mut self,
        caller: &Principal,
        credit_id: CreditId,
        amount: u64,
        beneficiary: Option<Principal>,
    ) -> MarketResult<Balance> {
        let result = self.try_retire(caller, credit_id, amount, beneficiary);
        self.finish("retire", result)
    }

    fn try_retire(
        &mut self,
        caller: &Principal,
        credit_id: CreditId,
        amount: u64,
        beneficiary: Option<Principal>,
    ) -> MarketResult<Balance> {
        validation::positive_amount(amount)?;
        if let Some(b) = &beneficiary {
            validation::principal("beneficiary", b)?;
        }
        self.balances.check_retire(caller, credit_id, amount)?;
        self.registry.check_retirement(credit_id, amount)?;

        let now = self.clock.now();
        let beneficiary = beneficiary.unwrap_or_else(|| caller.clone());
        let balance = self.balances.retire(caller, credit_id, amount)?;
        let exhausted = self.registry.record_retirement(
            credit_id,
            caller.clone(),
            amount,
            beneficiary.clone(),
            now,
        )?;
        self.stats.record_retirement(amount);
        if let Some(metrics) = &self.metrics {
            metrics.retired_tons_total.inc_by(amount);
        }

        info!(credit_id, owner = %caller, %beneficiary, amount, "credits retired");
        if exhausted {
            info!(credit_id, "credit fully retired");
        }
        Ok(balance)
    }

    // -- marketplace --------------------------------------------------------

    /// Offers `amount` tons of `credit_id` at `price_per_ton`. Returns the
    /// listing id. The tons are not reserved.
    pub fn list(
        &mut self,
        caller: &Principal,
        credit_id: CreditId,
        amount: u64,
        price_per_ton: u64,
    ) -> MarketResult<ListingId> {
        let result = self.try_list(caller, credit_id, amount, price_per_ton);
        self.finish("list", result)
    }

    fn try_list(
        &mut self,
        caller: &Principal,
        credit_id: CreditId,
        amount: u64,
        price_per_ton: u64,
    ) -> MarketResult<ListingId> {
        validation::positive_amount(amount)?;
        self.registry.ensure_not_retired(credit_id)?;
        self.balances.require_active(caller, credit_id, amount)?;
        if price_per_ton == 0 {
            return Err(MarketError::InvalidPrice(price_per_ton));
        }

        let now = self.clock.now();
        let listing_id = self
            .market
            .open(caller.clone(), credit_id, amount, price_per_ton, now)?;
        if let Some(metrics) = &self.metrics {
            metrics.listings_open.inc();
        }

        debug!(listing_id, credit_id, seller = %caller, amount, price_per_ton, "listing opened");
        Ok(listing_id)
    }

    /// Withdraws an active listing. Seller only.
    pub fn cancel(&mut self, caller: &Principal, listing_id: ListingId) -> MarketResult<()> {
        let now = self.clock.now();
        let result = self.market.cancel(caller, listing_id, now).map(|_| ());
        if result.is_ok() {
            if let Some(metrics) = &self.metrics {
                metrics.listings_open.dec();
            }
            debug!(listing_id, seller = %caller, "listing cancelled");
        }
        self.finish("cancel", result)
    }

    /// Buys an active listing in full.
    ///
    /// The seller's active balance is re-checked here because listing did
    /// not reserve it. Payment runs last among the fallible steps; once it
    /// succeeds the credit movement cannot fail.
    pub fn buy(&mut self, caller: &Principal, listing_id: ListingId) -> MarketResult<Settlement> {
        let result = self.try_buy(caller, listing_id);
        self.finish("buy", result)
    }

    fn try_buy(&mut self, caller: &Principal, listing_id: ListingId) -> MarketResult<Settlement> {
        let listing = self.market.active_listing(listing_id)?.clone();
        self.balances
            .check_transfer(&listing.seller, caller, listing.credit_id, listing.amount)?;
        let total_price = listing.total_price()?;

        self.payments
            .transfer(caller, &listing.seller, total_price)
            .map_err(MarketError::PaymentFailed)?;

        let now = self.clock.now();
        self.balances
            .transfer(&listing.seller, caller, listing.credit_id, listing.amount)?;
        self.market.fill(listing_id, caller.clone(), now)?;
        self.stats.record_trade(listing.amount);
        if let Some(metrics) = &self.metrics {
            metrics.traded_tons_total.inc_by(listing.amount);
            metrics.listings_open.dec();
        }

        info!(
            listing_id,
            credit_id = listing.credit_id,
            seller = %listing.seller,
            buyer = %caller,
            amount = listing.amount,
            total_price,
            "trade settled"
        );
        Ok(Settlement {
            listing_id,
            buyer: caller.clone(),
            seller: listing.seller,
            credit_id: listing.credit_id,
            amount: listing.amount,
            price_per_ton: listing.price_per_ton,
            total_price,
            settled_at: now,
        })
    }

    // -- reads --------------------------------------------------------------

    /// The current administrator.
    pub fn administrator(&self) -> &Principal {
        self.auth.administrator()
    }

    /// Returns `true` if `who` is an authorized verifier.
    pub fn is_verifier(&self, who: &Principal) -> bool {
        self.auth.is_verifier(who)
    }

    /// Authorized verifiers in ascending order.
    pub fn verifiers(&self) -> impl Iterator<Item = &Principal> {
        self.auth.verifiers()
    }

    /// `verifier`'s approval record for `developer`.
    pub fn developer_approval(
        &self,
        developer: &Principal,
        verifier: &Principal,
    ) -> Option<&DeveloperApproval> {
        self.auth.approval(developer, verifier)
    }

    /// Credit metadata and retirement state. `None` for unknown ids.
    pub fn credit_details(&self, credit_id: CreditId) -> Option<&Credit> {
        self.registry.get(credit_id)
    }

    /// All credits in id order.
    pub fn credits(&self) -> impl Iterator<Item = &Credit> {
        self.registry.iter()
    }

    /// The first credit issued under `serial_number`.
    pub fn credit_by_serial(&self, serial_number: &str) -> Option<&Credit> {
        self.registry.by_serial(serial_number)
    }

    /// Retirements of `credit_id`, oldest first.
    pub fn retirement_history(&self, credit_id: CreditId) -> &[RetirementRecord] {
        self.registry.retirement_history(credit_id)
    }

    /// Balance of `owner` in `credit_id`; zero if never held.
    pub fn balance(&self, owner: &Principal, credit_id: CreditId) -> Balance {
        self.balances.get(owner, credit_id)
    }

    /// Minted, Σ active and Σ retired tons of `credit_id` as recorded in the
    /// balance ledger. `None` for unknown credits.
    pub fn supply_of(&self, credit_id: CreditId) -> Option<SupplyBreakdown> {
        let credit = self.registry.get(credit_id)?;
        let (active, retired) = self.balances.totals(credit_id);
        Some(SupplyBreakdown {
            minted: credit.amount,
            active,
            retired,
        })
    }

    /// A listing in any state. `None` for unknown ids.
    pub fn listing_details(&self, listing_id: ListingId) -> Option<&Listing> {
        self.market.get(listing_id)
    }

    /// Open listings in id order.
    pub fn active_listings(&self) -> impl Iterator<Item = &Listing> {
        self.market.active_listings()
    }

    /// Running totals.
    pub fn market_stats(&self) -> MarketStats {
        self.stats
    }

    // -- snapshots ----------------------------------------------------------

    /// Copies out the complete registry state.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            format_version: carbon_ledger::config::SNAPSHOT_FORMAT_VERSION,
            authorization: self.auth.clone(),
            registry: self.registry.clone(),
            balances: self.balances.clone(),
            marketplace: self.market.clone(),
            stats: self.stats,
        }
    }

    /// Rebuilds an engine from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidConfig`] if `config` fails validation,
    /// and [`MarketError::CorruptSnapshot`] if the snapshot is not a state
    /// the engine could have reached itself:
    ///
    /// - unknown format version;
    /// - a balance referencing an unknown credit;
    /// - a credit violating conservation, disagreeing with its recorded
    ///   active supply, or flagged retired while tons remain active;
    /// - an id counter at or below an id already issued;
    /// - stats that differ from the totals derived from credits, balances
    ///   and filled listings.
    pub fn restore(
        snapshot: LedgerSnapshot,
        config: MarketConfig,
        payments: P,
        clock: C,
    ) -> MarketResult<Self> {
        config.validate()?;
        if snapshot.format_version != carbon_ledger::config::SNAPSHOT_FORMAT_VERSION {
            return Err(MarketError::CorruptSnapshot(format!(
                "unsupported format version {}",
                snapshot.format_version
            )));
        }

        let market = Self {
            config,
            auth: snapshot.authorization,
            registry: snapshot.registry,
            balances: snapshot.balances,
            market: snapshot.marketplace,
            stats: snapshot.stats,
            payments,
            clock,
            metrics: None,
        };
        market.check_consistency()?;

        info!(
            credits = market.registry.len(),
            administrator = %market.auth.administrator(),
            "market restored from snapshot"
        );
        Ok(market)
    }

    fn check_consistency(&self) -> MarketResult<()> {
        let corrupt =
            |reason: String| -> MarketResult<()> { Err(MarketError::CorruptSnapshot(reason)) };

        if let Some(((owner, credit_id), _)) = self
            .balances
            .iter()
            .find(|((_, id), _)| self.registry.get(*id).is_none())
        {
            return corrupt(format!("{owner} holds unknown credit {credit_id}"));
        }

        let mut derived = MarketStats::default();
        for credit in self.registry.iter() {
            let supply = self
                .supply_of(credit.credit_id)
                .unwrap_or_default();
            if !supply.is_conserved() || supply.active != credit.active_supply {
                return corrupt(format!(
                    "credit {} supply mismatch: {:?}, recorded active {}",
                    credit.credit_id, supply, credit.active_supply
                ));
            }
            if credit.retired != (credit.active_supply == 0) {
                return corrupt(format!(
                    "credit {} retired flag {} with {} active tons",
                    credit.credit_id, credit.retired, credit.active_supply
                ));
            }
            derived.record_mint(credit.amount);
            derived.record_retirement(supply.retired);
        }

        if let Some(last) = self.registry.iter().map(|c| c.credit_id).max() {
            if self.registry.next_credit_id() <= last {
                return corrupt(format!(
                    "next credit id {} not above issued id {last}",
                    self.registry.next_credit_id()
                ));
            }
        }
        if let Some(last) = self.market.iter().map(|l| l.listing_id).max() {
            if self.market.next_listing_id() <= last {
                return corrupt(format!(
                    "next listing id {} not above issued id {last}",
                    self.market.next_listing_id()
                ));
            }
        }

        for listing in self.market.iter() {
            if listing.status == ListingStatus::Filled {
                derived.record_trade(listing.amount);
            }
        }
        if derived != self.stats {
            return corrupt(format!(
                "stats {:?} differ from derived totals {:?}",
                self.stats, derived
            ));
        }
        Ok(())
    }

    /// Merkle root over every registry entry.
    ///
    /// Equal registry contents give equal roots regardless of the operation
    /// history that produced them.
    pub fn state_root(&self) -> Result<StateRoot, StorageError> {
        let mut leaves = vec![
            leaf_hash("administrator", self.auth.administrator())?,
            leaf_hash("stats", &self.stats)?,
            leaf_hash("next_credit_id", &self.registry.next_credit_id())?,
            leaf_hash("next_listing_id", &self.market.next_listing_id())?,
        ];
        for verifier in self.auth.verifiers() {
            leaves.push(leaf_hash("verifier", verifier)?);
        }
        for approval in self.auth.all_approvals() {
            leaves.push(leaf_hash("approval", approval)?);
        }
        for credit in self.registry.iter() {
            leaves.push(leaf_hash("credit", credit)?);
            for record in self.registry.retirement_history(credit.credit_id) {
                leaves.push(leaf_hash("retirement", record)?);
            }
        }
        for entry in self.balances.iter() {
            leaves.push(leaf_hash("balance", &entry)?);
        }
        for listing in self.market.iter() {
            leaves.push(leaf_hash("listing", listing)?);
        }
        Ok(merkle_root(leaves))
    }
}

impl<P: PaymentGateway, C: Clock> std::fmt::Debug for CarbonMarket<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CarbonMarket")
            .field("administrator", self.auth.administrator())
            .field("credits", &self.registry.len())
            .field("open_listings", &self.market.open_count())
            .field("stats", &self.stats)
            .finish()
    }
}
