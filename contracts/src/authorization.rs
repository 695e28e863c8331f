//! # Identity & Authorization Store
//!
//! Tracks who may do what. The hierarchy has three levels:
//!
//! ```text
//!   administrator ──adds/removes──► verifiers ──approve/revoke──► developers
//! ```
//!
//! Developer approval is a relation, not a flag: each record is keyed by the
//! `(developer, verifier)` pair. A developer approved by one verifier and
//! revoked by another holds one live approval. Revocation flips the
//! verifier's own record to `approved = false` and keeps it for audit.

use std::collections::{BTreeMap, BTreeSet};

use carbon_ledger::{MintAuthorization, Principal};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, MarketResult};
use crate::validation;

/// One verifier's approval of one developer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeveloperApproval {
    /// The approved project developer.
    pub developer: Principal,
    /// The verifier who made the approval.
    pub verifier: Principal,
    /// `false` once revoked.
    pub approved: bool,
    /// The project the approval covers.
    pub project_name: String,
    /// Time of the latest (re-)approval.
    pub timestamp: DateTime<Utc>,
    /// Time of the latest revocation, if currently revoked.
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Administrator, verifier set and developer approvals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationStore {
    administrator: Principal,
    verifiers: BTreeSet<Principal>,
    /// Keyed by `(developer, verifier)`.
    #[serde(with = "crate::serde_support::entry_list")]
    approvals: BTreeMap<(Principal, Principal), DeveloperApproval>,
}

impl AuthorizationStore {
    /// Creates a store administered by `administrator` with no verifiers.
    pub fn new(administrator: Principal) -> Self {
        Self {
            administrator,
            verifiers: BTreeSet::new(),
            approvals: BTreeMap::new(),
        }
    }

    /// The current administrator.
    pub fn administrator(&self) -> &Principal {
        &self.administrator
    }

    /// Returns `true` if `who` is currently an authorized verifier.
    pub fn is_verifier(&self, who: &Principal) -> bool {
        self.verifiers.contains(who)
    }

    /// Authorized verifiers in ascending order.
    pub fn verifiers(&self) -> impl Iterator<Item = &Principal> {
        self.verifiers.iter()
    }

    /// The approval record `verifier` holds for `developer`, if any.
    pub fn approval(&self, developer: &Principal, verifier: &Principal) -> Option<&DeveloperApproval> {
        self.approvals.get(&(developer.clone(), verifier.clone()))
    }

    /// Every approval record for `developer`, live or revoked, by verifier.
    pub fn approvals_of(&self, developer: &Principal) -> impl Iterator<Item = &DeveloperApproval> + '_ {
        let developer = developer.clone();
        self.approvals
            .range((developer.clone(), Principal::new(String::new()))..)
            .take_while(move |((dev, _), _)| *dev == developer)
            .map(|(_, approval)| approval)
    }

    /// The verifier whose approval lets `developer` mint under `policy`.
    ///
    /// When several verifiers qualify the lowest-ordered one is returned,
    /// so the choice is deterministic.
    pub fn minting_verifier(
        &self,
        developer: &Principal,
        policy: MintAuthorization,
    ) -> Option<&Principal> {
        self.approvals_of(developer)
            .filter(|a| a.approved)
            .find(|a| match policy {
                MintAuthorization::AnyRecordedApproval => true,
                MintAuthorization::ActiveVerifierOnly => self.is_verifier(&a.verifier),
            })
            .map(|a| &a.verifier)
    }

    fn require_administrator(&self, caller: &Principal, action: &'static str) -> MarketResult<()> {
        if caller != &self.administrator {
            return Err(MarketError::NotAuthorized {
                caller: caller.clone(),
                action,
            });
        }
        Ok(())
    }

    fn require_verifier(&self, caller: &Principal, action: &'static str) -> MarketResult<()> {
        if !self.is_verifier(caller) {
            return Err(MarketError::NotAuthorized {
                caller: caller.clone(),
                action,
            });
        }
        Ok(())
    }

    /// Hands the administrator role to `new_owner`. Returns the previous
    /// administrator.
    pub fn transfer_ownership(
        &mut self,
        caller: &Principal,
        new_owner: Principal,
    ) -> MarketResult<Principal> {
        self.require_administrator(caller, "transfer ownership")?;
        validation::principal("new_owner", &new_owner)?;
        Ok(std::mem::replace(&mut self.administrator, new_owner))
    }

    /// Authorizes a verifier. Fails with `AlreadyRegistered` rather than
    /// silently succeeding.
    pub fn add_verifier(&mut self, caller: &Principal, verifier: Principal) -> MarketResult<()> {
        self.require_administrator(caller, "add a verifier")?;
        validation::principal("verifier", &verifier)?;
        if self.verifiers.contains(&verifier) {
            return Err(MarketError::AlreadyRegistered(verifier));
        }
        self.verifiers.insert(verifier);
        Ok(())
    }

    /// Deauthorizes a verifier. Its approval records stay in place.
    pub fn remove_verifier(&mut self, caller: &Principal, verifier: &Principal) -> MarketResult<()> {
        self.require_administrator(caller, "remove a verifier")?;
        if !self.verifiers.remove(verifier) {
            return Err(MarketError::NotRegistered(verifier.clone()));
        }
        Ok(())
    }

    /// Creates or refreshes `caller`'s approval of `developer`.
    ///
    /// Re-registration by the same verifier overwrites the record with a new
    /// timestamp and project name; it is not an error.
    pub fn register_developer(
        &mut self,
        caller: &Principal,
        developer: Principal,
        project_name: String,
        now: DateTime<Utc>,
        max_text_len: usize,
    ) -> MarketResult<&DeveloperApproval> {
        self.require_verifier(caller, "register a developer")?;
        validation::principal("developer", &developer)?;
        if &developer == caller {
            return Err(MarketError::InvalidVerifier(caller.clone()));
        }
        validation::text_field("project_name", &project_name, max_text_len)?;

        let key = (developer.clone(), caller.clone());
        let record = DeveloperApproval {
            developer,
            verifier: caller.clone(),
            approved: true,
            project_name,
            timestamp: now,
            revoked_at: None,
        };
        self.approvals.insert(key.clone(), record);
        Ok(&self.approvals[&key])
    }

    /// Revokes `caller`'s approval of `developer`.
    ///
    /// Revoking an already-revoked record succeeds without change.
    pub fn revoke_developer(
        &mut self,
        caller: &Principal,
        developer: &Principal,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        self.require_verifier(caller, "revoke a developer")?;
        let record = self
            .approvals
            .get_mut(&(developer.clone(), caller.clone()))
            .ok_or_else(|| MarketError::NotRegistered(developer.clone()))?;
        if record.approved {
            record.approved = false;
            record.revoked_at = Some(now);
        }
        Ok(())
    }

    /// Iterates over every approval record in key order.
    pub(crate) fn all_approvals(&self) -> impl Iterator<Item = &DeveloperApproval> {
        self.approvals.values()
    }
}
