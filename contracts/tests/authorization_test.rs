//! Integration tests for roles: the administrator, the verifier set and
//! per-verifier developer approvals, including how they gate minting.

use carbon_contracts::{CarbonMarket, CreditIssuance, MarketError};
use carbon_ledger::{Clock, ManualClock, MarketConfig, MintAuthorization, PaymentLedger, Principal};
use chrono::Duration;

type Market = CarbonMarket<PaymentLedger, ManualClock>;

fn p(s: &str) -> Principal {
    Principal::from(s)
}

fn issuance(serial: &str) -> CreditIssuance {
    CreditIssuance {
        amount: 10,
        project_type: "Cookstoves".into(),
        location: "Kenya".into(),
        standard: "Gold Standard".into(),
        vintage_year: 2022,
        serial_number: serial.into(),
    }
}

fn market_with(config: MarketConfig) -> (Market, ManualClock) {
    let clock = ManualClock::default();
    let market = CarbonMarket::new(p("admin"), config, PaymentLedger::new(), clock.clone()).unwrap();
    (market, clock)
}

fn market() -> (Market, ManualClock) {
    market_with(MarketConfig::default())
}

// ---------------------------------------------------------------------------
// Administrator
// ---------------------------------------------------------------------------

#[test]
fn only_admin_manages_verifiers() {
    let (mut market, _) = market();
    assert!(matches!(
        market.add_verifier(&p("mallory"), p("verra")),
        Err(MarketError::NotAuthorized { .. })
    ));
    market.add_verifier(&p("admin"), p("verra")).unwrap();
    assert_eq!(
        market.add_verifier(&p("admin"), p("verra")),
        Err(MarketError::AlreadyRegistered(p("verra")))
    );
    assert!(matches!(
        market.remove_verifier(&p("mallory"), &p("verra")),
        Err(MarketError::NotAuthorized { .. })
    ));
    assert_eq!(
        market.remove_verifier(&p("admin"), &p("gold")),
        Err(MarketError::NotRegistered(p("gold")))
    );
    assert!(market.is_verifier(&p("verra")));
}

#[test]
fn ownership_transfer_moves_admin_rights() {
    let (mut market, _) = market();
    market.transfer_ownership(&p("admin"), p("dao")).unwrap();
    assert_eq!(market.administrator(), &p("dao"));

    assert!(matches!(
        market.add_verifier(&p("admin"), p("verra")),
        Err(MarketError::NotAuthorized { .. })
    ));
    market.add_verifier(&p("dao"), p("verra")).unwrap();
    assert!(matches!(
        market.transfer_ownership(&p("admin"), p("admin")),
        Err(MarketError::NotAuthorized { .. })
    ));
}

#[test]
fn verifiers_listed_in_order() {
    let (mut market, _) = market();
    for v in ["verra", "gold", "acr"] {
        market.add_verifier(&p("admin"), p(v)).unwrap();
    }
    let listed: Vec<&Principal> = market.verifiers().collect();
    assert_eq!(listed, vec![&p("acr"), &p("gold"), &p("verra")]);
}

// ---------------------------------------------------------------------------
// Developer approvals
// ---------------------------------------------------------------------------

#[test]
fn only_verifiers_register_developers() {
    let (mut market, _) = market();
    assert!(matches!(
        market.register_developer(&p("nobody"), p("dev"), "Project"),
        Err(MarketError::NotAuthorized { .. })
    ));
    market.add_verifier(&p("admin"), p("verra")).unwrap();
    assert_eq!(
        market.register_developer(&p("verra"), p("verra"), "Self Dealing"),
        Err(MarketError::InvalidVerifier(p("verra")))
    );
    assert!(matches!(
        market.register_developer(&p("verra"), p("dev"), ""),
        Err(MarketError::InvalidInput { field: "project_name", .. })
    ));
    assert!(market.developer_approval(&p("dev"), &p("verra")).is_none());
}

#[test]
fn re_registration_refreshes_record() {
    let (mut market, clock) = market();
    market.add_verifier(&p("admin"), p("verra")).unwrap();
    market.register_developer(&p("verra"), p("dev"), "Phase One").unwrap();
    market.revoke_developer(&p("verra"), &p("dev")).unwrap();

    clock.advance(Duration::days(1));
    market.register_developer(&p("verra"), p("dev"), "Phase Two").unwrap();

    let approval = market.developer_approval(&p("dev"), &p("verra")).unwrap();
    assert!(approval.approved);
    assert_eq!(approval.project_name, "Phase Two");
    assert_eq!(approval.timestamp, clock.now());
    assert_eq!(approval.revoked_at, None);
}

#[test]
fn revoke_is_idempotent_but_requires_record() {
    let (mut market, clock) = market();
    market.add_verifier(&p("admin"), p("verra")).unwrap();
    assert_eq!(
        market.revoke_developer(&p("verra"), &p("dev")),
        Err(MarketError::NotRegistered(p("dev")))
    );

    market.register_developer(&p("verra"), p("dev"), "Project").unwrap();
    market.revoke_developer(&p("verra"), &p("dev")).unwrap();
    let revoked_at = clock.now();
    clock.advance(Duration::hours(1));
    market.revoke_developer(&p("verra"), &p("dev")).unwrap();

    let approval = market.developer_approval(&p("dev"), &p("verra")).unwrap();
    assert!(!approval.approved);
    assert_eq!(approval.revoked_at, Some(revoked_at));
}

// ---------------------------------------------------------------------------
// Mint gating
// ---------------------------------------------------------------------------

#[test]
fn unapproved_developer_cannot_mint() {
    let (mut market, _) = market();
    assert_eq!(
        market.mint(&p("dev"), issuance("S-1")),
        Err(MarketError::InvalidProjectDeveloper(p("dev")))
    );
}

#[test]
fn revoked_developer_cannot_mint() {
    let (mut market, _) = market();
    market.add_verifier(&p("admin"), p("verra")).unwrap();
    market.register_developer(&p("verra"), p("dev"), "Project").unwrap();
    market.mint(&p("dev"), issuance("S-1")).unwrap();

    market.revoke_developer(&p("verra"), &p("dev")).unwrap();
    assert_eq!(
        market.mint(&p("dev"), issuance("S-2")),
        Err(MarketError::InvalidProjectDeveloper(p("dev")))
    );
}

#[test]
fn any_of_several_approvals_suffices() {
    let (mut market, _) = market();
    market.add_verifier(&p("admin"), p("gold")).unwrap();
    market.add_verifier(&p("admin"), p("verra")).unwrap();
    market.register_developer(&p("gold"), p("dev"), "Project").unwrap();
    market.register_developer(&p("verra"), p("dev"), "Project").unwrap();
    market.revoke_developer(&p("gold"), &p("dev")).unwrap();

    let id = market.mint(&p("dev"), issuance("S-1")).unwrap();
    assert_eq!(market.credit_details(id).unwrap().verifier, p("verra"));
}

#[test]
fn removed_verifier_suspends_minting_by_default() {
    let (mut market, _) = market();
    market.add_verifier(&p("admin"), p("verra")).unwrap();
    market.register_developer(&p("verra"), p("dev"), "Project").unwrap();
    market.remove_verifier(&p("admin"), &p("verra")).unwrap();

    assert_eq!(
        market.mint(&p("dev"), issuance("S-1")),
        Err(MarketError::InvalidProjectDeveloper(p("dev")))
    );
    // The record itself survives removal.
    assert!(market.developer_approval(&p("dev"), &p("verra")).unwrap().approved);

    market.add_verifier(&p("admin"), p("verra")).unwrap();
    assert_eq!(market.mint(&p("dev"), issuance("S-1")).unwrap(), 1);
}

#[test]
fn recorded_approval_policy_ignores_verifier_removal() {
    let config = MarketConfig {
        mint_authorization: MintAuthorization::AnyRecordedApproval,
        ..MarketConfig::default()
    };
    let (mut market, _) = market_with(config);
    market.add_verifier(&p("admin"), p("verra")).unwrap();
    market.register_developer(&p("verra"), p("dev"), "Project").unwrap();
    market.remove_verifier(&p("admin"), &p("verra")).unwrap();

    let id = market.mint(&p("dev"), issuance("S-1")).unwrap();
    assert_eq!(market.credit_details(id).unwrap().verifier, p("verra"));
}
