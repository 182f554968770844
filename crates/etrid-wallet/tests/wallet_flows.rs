//! End-to-end flows across the wallet services

use chrono::{Duration, TimeZone, Utc};
use etrid_wallet::auto_save::RuleUpdate;
use etrid_wallet::bill_split::{equal_shares, percentage_shares};
use etrid_wallet::contacts::ContactInput;
use etrid_wallet::p2p_lending::{LoanStatus, OfferFilter};
use etrid_wallet::savings_goal::{ContributionSource, GoalStatus};
use etrid_wallet::*;
use proptest::prelude::*;
use std::sync::Arc;

const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
const BOB: &str = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";
const CHARLIE: &str = "5FLSigC9HGRKVhB9FiEo4Y3koPsNmBmLJbpXg2mp1hXcS59Y";

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()))
}

#[test]
fn test_auto_save_fills_goal() {
    let clock = clock();
    let mut goals = SavingsGoals::new(ALICE, clock.clone());
    let mut auto = AutoSave::new(clock.clone());

    let goal = goals
        .create_goal(GoalInput {
            name: "Laptop".into(),
            category: "Electronics".into(),
            target: 10_000,
            initial_contribution: 1_000,
            ..Default::default()
        })
        .unwrap()
        .id;

    auto.create_rule(&goals, goal, RuleKind::Roundup { multiplier: 1 }).unwrap();
    let weekly = auto
        .create_rule(
            &goals,
            goal,
            RuleKind::Recurring { amount: 4_000, frequency: Frequency::Weekly },
        )
        .unwrap()
        .id;

    // 47.35 spent: 0.65 rounded up
    let executions = auto.process_transaction(&mut goals, Direction::Outgoing, 4_735);
    assert_eq!(executions.len(), 1);
    assert_eq!(goals.goal(goal).unwrap().current, 1_065);

    assert!(auto.due_rules().is_empty());
    clock.advance(Duration::days(7));
    assert_eq!(auto.due_rules().len(), 1);
    auto.execute_rule(&mut goals, weekly, None).unwrap();
    auto.execute_rule(&mut goals, weekly, None).unwrap();

    let saved = goals.goal(goal).unwrap();
    assert_eq!(saved.current, 9_065);
    assert_eq!(saved.status, GoalStatus::Active);

    // the third run completes the goal, the fourth is rejected
    auto.execute_rule(&mut goals, weekly, None).unwrap();
    assert_eq!(goals.goal(goal).unwrap().status, GoalStatus::Completed);
    assert!(auto.execute_rule(&mut goals, weekly, None).is_err());
    assert_eq!(auto.rule_stats(weekly).total_saved, 12_000);

    let sources: Vec<ContributionSource> =
        goals.contributions(goal).iter().map(|c| c.source).collect();
    assert_eq!(sources.last(), Some(&ContributionSource::Manual));

    auto.update_rule(weekly, RuleUpdate { active: Some(false), ..Default::default() })
        .unwrap();
    assert!(auto.execute_rule(&mut goals, weekly, None).is_err());
}

#[test]
fn test_rule_kind_json_shape() {
    let json = serde_json::to_value(RuleKind::SpareChange { threshold: 100 }).unwrap();
    assert_eq!(json, serde_json::json!({ "type": "spare-change", "threshold": 100 }));

    let parsed: RuleKind =
        serde_json::from_str(r#"{"type":"recurring","amount":2500,"frequency":"monthly"}"#)
            .unwrap();
    assert_eq!(
        parsed,
        RuleKind::Recurring { amount: 2_500, frequency: Frequency::Monthly }
    );
}

#[test]
fn test_p2p_loan_lifecycle() {
    let clock = clock();
    let mut market = P2pLending::new(clock.clone(), Arc::new(StaticPrices::default()));

    let offer = market
        .create_offer(
            ALICE,
            OfferInput {
                asset: "USDT".into(),
                amount: 1_000.0,
                apy: 10.0,
                duration_days: 365,
                min_collateral_ratio: 150.0,
                borrower: None,
            },
        )
        .unwrap()
        .id;
    assert_eq!(
        market
            .offers(&OfferFilter { asset: Some("USDT".into()), ..Default::default() })
            .len(),
        1
    );

    // 0.05 BTC at 45 000 = 2 250 USD against 1 000 USD
    let loan = market
        .accept_offer(BOB, offer, &[("BTC".to_string(), 0.05)])
        .unwrap()
        .id;
    assert!(market.offers(&OfferFilter::default()).is_empty());

    clock.advance(Duration::days(365));
    let interest = market.interest_accrued(loan).unwrap();
    assert!((interest - 100.0).abs() < 1e-6);

    market.repay(BOB, loan, 1_100.0).unwrap();
    assert_eq!(market.loan(loan).unwrap().status, LoanStatus::Repaid);
}

#[test]
fn test_contacts_follow_usernames() {
    let mut names = UsernameRegistry::new();
    names.register("bob", BOB).unwrap();

    let mut contacts = Contacts::new(clock());
    let bob = contacts.add(ContactInput { address: Some(BOB.into()), ..Default::default() }, &names).unwrap();
    assert_eq!(bob.display_name(), "@bob");
    assert_eq!(avatar_color(BOB), avatar_color(&bob.address));
}

#[test]
fn test_split_and_recover() {
    let clock = clock();
    let mut splits = BillSplits::new(ALICE, clock.clone());
    let split = splits
        .create_split(BillSplitInput {
            name: "Groceries".into(),
            description: None,
            total: 10_000,
            kind: SplitKind::Percentage,
            participants: [(ALICE, 50.0), (BOB, 30.0), (CHARLIE, 20.0)]
                .into_iter()
                .map(|(address, pct)| ParticipantInput {
                    address: address.into(),
                    percentage: Some(pct),
                    ..Default::default()
                })
                .collect(),
            notes: None,
        })
        .unwrap();
    let owed: Vec<u64> = split.participants.iter().map(|p| p.amount_owed).collect();
    assert_eq!(owed, vec![5_000, 3_000, 2_000]);

    let mut recovery = SocialRecovery::new(ALICE, clock.clone());
    for guardian in [BOB, CHARLIE] {
        recovery.add_guardian(guardian, None).unwrap();
        recovery.accept_guardian(guardian).unwrap();
    }
    recovery.set_threshold(recommended_threshold(2)).unwrap();
    let id = recovery.initiate_recovery("phone-2", None).unwrap().id;
    recovery.approve_recovery(id, BOB, "0x01").unwrap();
    recovery.approve_recovery(id, CHARLIE, "0x02").unwrap();
    clock.advance(Duration::hours(48));
    assert!(recovery.complete_recovery(id).is_ok());
}

proptest! {
    #[test]
    fn prop_split_shares_are_exact(total in 1u64..1_000_000_000, weights in prop::collection::vec(1u32..1_000, 1..12)) {
        let sum: u32 = weights.iter().sum();
        let pcts: Vec<f64> = weights.iter().map(|w| *w as f64 * 100.0 / sum as f64).collect();
        let shares = percentage_shares(total, &pcts);
        prop_assert_eq!(shares.iter().sum::<u64>(), total);

        let equal = equal_shares(total, weights.len());
        prop_assert_eq!(equal.iter().sum::<u64>(), total);
    }

    #[test]
    fn prop_health_factor_scales_with_collateral(collateral in 1.0f64..1e9, borrow in 1.0f64..1e9) {
        let base = health_factor(collateral, borrow, 80.0).unwrap();
        let doubled = health_factor(collateral * 2.0, borrow, 80.0).unwrap();
        prop_assert!((doubled - base * 2.0).abs() <= base * 1e-9);
    }
}
