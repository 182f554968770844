//! # Bill splitting
//!
//! Divide a bill between participants equally, by custom amounts or by
//! percentage. Shares are whole cents and always add up to the bill total:
//! cents left over by rounding go to the participants that lost the most to
//! it, first listed first.

use crate::clock::Clock;
use crate::error::{ServiceError, ServiceResult};
use crate::{check_address, Cents};
use chrono::{DateTime, Utc};
use etrid_core::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Allowed drift of percentage totals from 100
const PERCENT_TOLERANCE: f64 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitKind {
    Equal,
    Custom,
    Percentage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitStatus {
    Pending,
    Partial,
    Completed,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SplitFilter {
    /// Pending or partially paid
    Open,
    Completed,
}

#[derive(Clone, Debug, Default)]
pub struct ParticipantInput {
    pub address: AccountId,
    pub username: Option<String>,
    /// Custom splits only
    pub amount: Option<Cents>,
    /// Percentage splits only
    pub percentage: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct BillSplitInput {
    pub name: String,
    pub description: Option<String>,
    pub total: Cents,
    pub kind: SplitKind,
    pub participants: Vec<ParticipantInput>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub address: AccountId,
    pub username: Option<String>,
    pub amount_owed: Cents,
    pub amount_paid: Cents,
    pub tx_hash: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn is_paid(&self) -> bool {
        self.amount_paid >= self.amount_owed
    }

    pub fn outstanding(&self) -> Cents {
        self.amount_owed.saturating_sub(self.amount_paid)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillSplit {
    pub id: Uuid,
    pub creator: AccountId,
    pub name: String,
    pub description: Option<String>,
    pub total: Cents,
    pub kind: SplitKind,
    pub status: SplitStatus,
    pub participants: Vec<Participant>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BillSplit {
    fn refresh_status(&mut self) {
        if self.status == SplitStatus::Cancelled {
            return;
        }
        self.status = if self.participants.iter().all(Participant::is_paid) {
            SplitStatus::Completed
        } else if self.participants.iter().any(|p| p.amount_paid > 0) {
            SplitStatus::Partial
        } else {
            SplitStatus::Pending
        };
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status, SplitStatus::Pending | SplitStatus::Partial)
    }

    pub fn participant(&self, address: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.address == address)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BillSplitSummary {
    pub total: usize,
    pub pending: usize,
    pub completed: usize,
    /// What the user still has to pay
    pub total_owed: Cents,
    /// What others still owe on splits the user created
    pub total_receivable: Cents,
}

// ============================================================================
// ALLOCATION
// ============================================================================

/// `total` in `n` shares differing by at most one cent
pub fn equal_shares(total: Cents, n: usize) -> Vec<Cents> {
    if n == 0 {
        return Vec::new();
    }
    let base = total / n as Cents;
    let extra = (total % n as Cents) as usize;
    (0..n).map(|i| base + Cents::from(i < extra)).collect()
}

/// Largest-remainder apportionment of `total` by percentages
///
/// Percentages are normalised by their sum so shares add up to `total` even
/// when the inputs drift slightly from 100. Negative or non-finite entries
/// get no share.
pub fn percentage_shares(total: Cents, percentages: &[f64]) -> Vec<Cents> {
    let weights: Vec<f64> = percentages
        .iter()
        .map(|pct| if pct.is_finite() && *pct > 0.0 { *pct } else { 0.0 })
        .collect();
    let sum: f64 = weights.iter().sum();
    if !sum.is_finite() || sum <= 0.0 {
        return vec![0; percentages.len()];
    }
    let exact: Vec<f64> = weights
        .iter()
        .map(|pct| total as f64 * pct / sum)
        .collect();
    let mut shares: Vec<Cents> = exact.iter().map(|v| v.floor() as Cents).collect();
    let assigned: Cents = shares.iter().sum();
    let leftover = total.saturating_sub(assigned) as usize;

    let mut order: Vec<usize> = (0..exact.len()).collect();
    // stable sort keeps listing order among equal remainders
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.total_cmp(&ra)
    });
    for &i in order.iter().take(leftover) {
        shares[i] += 1;
    }
    shares
}

fn validate(input: &BillSplitInput) -> ServiceResult<()> {
    if input.name.trim().is_empty() {
        return Err(ServiceError::invalid("Bill name is required"));
    }
    if input.total == 0 {
        return Err(ServiceError::invalid("Total amount must be greater than 0"));
    }
    if input.participants.is_empty() {
        return Err(ServiceError::invalid("At least one participant is required"));
    }
    let mut seen = HashSet::new();
    for p in &input.participants {
        check_address(&p.address)?;
        if !seen.insert(p.address.as_str()) {
            return Err(ServiceError::invalid(format!("Duplicate participant {}", p.address)));
        }
    }
    match input.kind {
        SplitKind::Equal => {}
        SplitKind::Custom => {
            let sum: Cents = input.participants.iter().filter_map(|p| p.amount).sum();
            if input.participants.iter().any(|p| p.amount.is_none()) || sum != input.total {
                return Err(ServiceError::invalid("Custom amounts must sum to total amount"));
            }
        }
        SplitKind::Percentage => {
            let pcts: Vec<f64> = input
                .participants
                .iter()
                .map(|p| p.percentage.unwrap_or(0.0))
                .collect();
            if pcts.iter().any(|p| !p.is_finite() || *p < 0.0)
                || (pcts.iter().sum::<f64>() - 100.0).abs() > PERCENT_TOLERANCE
            {
                return Err(ServiceError::invalid("Percentages must sum to 100"));
            }
        }
    }
    Ok(())
}

fn allocate(input: &BillSplitInput) -> Vec<Cents> {
    match input.kind {
        SplitKind::Equal => equal_shares(input.total, input.participants.len()),
        SplitKind::Custom => input
            .participants
            .iter()
            .map(|p| p.amount.unwrap_or(0))
            .collect(),
        SplitKind::Percentage => {
            let pcts: Vec<f64> = input
                .participants
                .iter()
                .map(|p| p.percentage.unwrap_or(0.0))
                .collect();
            percentage_shares(input.total, &pcts)
        }
    }
}

// ============================================================================
// SERVICE
// ============================================================================

/// Bill splits seen by one user
pub struct BillSplits {
    user: AccountId,
    clock: Arc<dyn Clock>,
    splits: Vec<BillSplit>,
}

impl BillSplits {
    pub fn new(user: impl Into<AccountId>, clock: Arc<dyn Clock>) -> Self {
        Self {
            user: user.into(),
            clock,
            splits: Vec::new(),
        }
    }

    pub fn create_split(&mut self, input: BillSplitInput) -> ServiceResult<&BillSplit> {
        validate(&input)?;
        let shares = allocate(&input);
        let now = self.clock.now();

        let participants = input
            .participants
            .into_iter()
            .zip(shares)
            .map(|(p, owed)| Participant {
                address: p.address,
                username: p.username,
                amount_owed: owed,
                amount_paid: 0,
                tx_hash: None,
                paid_at: None,
            })
            .collect();
        self.splits.push(BillSplit {
            id: Uuid::new_v4(),
            creator: self.user.clone(),
            name: input.name,
            description: input.description,
            total: input.total,
            kind: input.kind,
            status: SplitStatus::Pending,
            participants,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        });
        self.splits.last().ok_or(ServiceError::NotFound("Bill split"))
    }

    pub fn splits(&self, filter: Option<SplitFilter>) -> Vec<&BillSplit> {
        self.splits
            .iter()
            .filter(|s| match filter {
                None => true,
                Some(SplitFilter::Open) => s.is_open(),
                Some(SplitFilter::Completed) => s.status == SplitStatus::Completed,
            })
            .collect()
    }

    pub fn split(&self, id: Uuid) -> ServiceResult<&BillSplit> {
        self.splits
            .iter()
            .find(|s| s.id == id)
            .ok_or(ServiceError::NotFound("Bill split"))
    }

    fn split_mut(&mut self, id: Uuid) -> ServiceResult<&mut BillSplit> {
        self.splits
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(ServiceError::NotFound("Bill split"))
    }

    /// Record a participant's share as paid
    ///
    /// Participants settle their own share; the creator may record anyone's.
    pub fn mark_paid(&mut self, id: Uuid, participant: &str, tx_hash: &str) -> ServiceResult<&BillSplit> {
        let now = self.clock.now();
        let user = self.user.clone();
        let split = self.split_mut(id)?;
        if !split.is_open() {
            return Err(ServiceError::InvalidState(format!(
                "Bill split is {:?}",
                split.status
            )));
        }
        if participant != user && split.creator != user {
            return Err(ServiceError::NotPermitted(
                "Only the creator can record other participants' payments".into(),
            ));
        }
        let entry = split
            .participants
            .iter_mut()
            .find(|p| p.address == participant)
            .ok_or(ServiceError::NotFound("Participant"))?;
        if entry.is_paid() {
            return Err(ServiceError::InvalidState("Share already paid".into()));
        }
        entry.amount_paid = entry.amount_owed;
        entry.tx_hash = Some(tx_hash.to_string());
        entry.paid_at = Some(now);
        split.updated_at = now;
        split.refresh_status();
        tracing::debug!(split = %id, participant, status = ?split.status, "Bill share paid");
        Ok(&*split)
    }

    /// Settle the user's own share
    pub fn pay_share(&mut self, id: Uuid, tx_hash: &str) -> ServiceResult<&BillSplit> {
        let user = self.user.clone();
        self.mark_paid(id, &user, tx_hash)
    }

    pub fn cancel_split(&mut self, id: Uuid) -> ServiceResult<&BillSplit> {
        let now = self.clock.now();
        let user = self.user.clone();
        let split = self.split_mut(id)?;
        if split.creator != user {
            return Err(ServiceError::NotPermitted("Only the creator can cancel a split".into()));
        }
        if !split.is_open() {
            return Err(ServiceError::InvalidState("Only open splits can be cancelled".into()));
        }
        split.status = SplitStatus::Cancelled;
        split.updated_at = now;
        Ok(&*split)
    }

    /// Open splits where the user still owes money
    pub fn owed_splits(&self) -> Vec<&BillSplit> {
        self.splits(Some(SplitFilter::Open))
            .into_iter()
            .filter(|s| s.participant(&self.user).is_some_and(|p| !p.is_paid()))
            .collect()
    }

    /// Open splits the user created that others have not fully paid
    pub fn receivable_splits(&self) -> Vec<&BillSplit> {
        self.splits(Some(SplitFilter::Open))
            .into_iter()
            .filter(|s| {
                s.creator == self.user
                    && s.participants
                        .iter()
                        .any(|p| p.address != self.user && !p.is_paid())
            })
            .collect()
    }

    pub fn summary(&self) -> BillSplitSummary {
        let mut summary = BillSplitSummary {
            total: self.splits.len(),
            ..Default::default()
        };
        for split in &self.splits {
            match split.status {
                SplitStatus::Pending | SplitStatus::Partial => summary.pending += 1,
                SplitStatus::Completed => summary.completed += 1,
                SplitStatus::Cancelled => continue,
            }
            if let Some(me) = split.participant(&self.user) {
                summary.total_owed += me.outstanding();
            }
            if split.creator == self.user {
                summary.total_receivable += split
                    .participants
                    .iter()
                    .filter(|p| p.address != self.user)
                    .map(Participant::outstanding)
                    .sum::<Cents>();
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::test_accounts::{ALICE, BOB, CHARLIE};
    use proptest::prelude::*;

    fn participant(address: &str) -> ParticipantInput {
        ParticipantInput {
            address: address.into(),
            ..Default::default()
        }
    }

    fn dinner(kind: SplitKind, total: Cents, participants: Vec<ParticipantInput>) -> BillSplitInput {
        BillSplitInput {
            name: "Dinner".into(),
            description: None,
            total,
            kind,
            participants,
            notes: None,
        }
    }

    fn service(user: &str) -> BillSplits {
        BillSplits::new(user, Arc::new(SystemClock))
    }

    #[test]
    fn test_equal_split_of_150() {
        let mut splits = service(ALICE);
        let split = splits
            .create_split(dinner(
                SplitKind::Equal,
                15_000,
                vec![participant(ALICE), participant(BOB), participant(CHARLIE)],
            ))
            .unwrap();
        assert!(split.participants.iter().all(|p| p.amount_owed == 5_000));
    }

    #[test]
    fn test_rounding_cents_are_handed_out() {
        assert_eq!(equal_shares(10_000, 3), vec![3_334, 3_333, 3_333]);
        assert_eq!(percentage_shares(100, &[33.3, 33.3, 33.4]), vec![33, 33, 34]);
        assert_eq!(percentage_shares(1_001, &[50.0, 50.0]), vec![501, 500]);
    }

    #[test]
    fn test_validation() {
        let mut splits = service(ALICE);
        let bad_custom = dinner(
            SplitKind::Custom,
            1_000,
            vec![
                ParticipantInput { amount: Some(600), ..participant(ALICE) },
                ParticipantInput { amount: Some(300), ..participant(BOB) },
            ],
        );
        assert_eq!(
            splits.create_split(bad_custom).unwrap_err(),
            ServiceError::invalid("Custom amounts must sum to total amount")
        );

        let bad_pct = dinner(
            SplitKind::Percentage,
            1_000,
            vec![
                ParticipantInput { percentage: Some(60.0), ..participant(ALICE) },
                ParticipantInput { percentage: Some(30.0), ..participant(BOB) },
            ],
        );
        assert!(splits.create_split(bad_pct).is_err());
        assert!(splits.create_split(dinner(SplitKind::Equal, 0, vec![participant(BOB)])).is_err());
        assert!(splits.create_split(dinner(SplitKind::Equal, 10, vec![])).is_err());
        assert!(splits
            .create_split(dinner(SplitKind::Equal, 10, vec![participant(BOB), participant(BOB)]))
            .is_err());
        assert!(splits
            .create_split(dinner(SplitKind::Equal, 10, vec![participant("not an address")]))
            .is_err());
    }

    #[test]
    fn test_non_finite_percentages_rejected() {
        let mut splits = service(ALICE);
        for bad in [f64::NAN, f64::INFINITY] {
            let input = dinner(
                SplitKind::Percentage,
                10_000,
                vec![
                    ParticipantInput { percentage: Some(bad), ..participant(ALICE) },
                    ParticipantInput { percentage: Some(100.0), ..participant(BOB) },
                ],
            );
            assert_eq!(
                splits.create_split(input).unwrap_err(),
                ServiceError::invalid("Percentages must sum to 100")
            );
        }
        assert!(splits.splits(None).is_empty());

        // the allocator itself never loses cents to a bad weight
        assert_eq!(percentage_shares(10_000, &[f64::NAN, 100.0]), vec![0, 10_000]);
        assert_eq!(percentage_shares(10_000, &[f64::NAN]), vec![0]);
    }

    #[test]
    fn test_payment_lifecycle_and_summary() {
        let mut splits = service(ALICE);
        let id = splits
            .create_split(dinner(
                SplitKind::Equal,
                15_000,
                vec![participant(ALICE), participant(BOB), participant(CHARLIE)],
            ))
            .unwrap()
            .id;

        assert_eq!(splits.summary().total_owed, 5_000);
        assert_eq!(splits.summary().total_receivable, 10_000);

        assert_eq!(splits.pay_share(id, "0x01").unwrap().status, SplitStatus::Partial);
        assert!(splits.pay_share(id, "0x01").is_err());
        assert!(splits.owed_splits().is_empty());
        assert_eq!(splits.receivable_splits().len(), 1);

        splits.mark_paid(id, BOB, "0x02").unwrap();
        let split = splits.mark_paid(id, CHARLIE, "0x03").unwrap();
        assert_eq!(split.status, SplitStatus::Completed);

        let summary = splits.summary();
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.total_receivable, 0);
        assert_eq!(splits.splits(Some(SplitFilter::Open)).len(), 0);
        assert!(splits.cancel_split(id).is_err());
    }

    #[test]
    fn test_only_creator_records_others() {
        let mut alice = service(ALICE);
        let split = alice
            .create_split(dinner(SplitKind::Equal, 100, vec![participant(BOB), participant(CHARLIE)]))
            .unwrap()
            .clone();

        let mut bob = BillSplits::new(BOB, Arc::new(SystemClock));
        bob.splits.push(split.clone());
        assert!(matches!(
            bob.mark_paid(split.id, CHARLIE, "0x"),
            Err(ServiceError::NotPermitted(_))
        ));
        assert!(matches!(bob.cancel_split(split.id), Err(ServiceError::NotPermitted(_))));
        assert_eq!(bob.owed_splits().len(), 1);
        bob.pay_share(split.id, "0x").unwrap();
        assert!(bob.owed_splits().is_empty());
    }

    proptest! {
        #[test]
        fn prop_equal_shares_sum_to_total(total in 1u64..10_000_000, n in 1usize..50) {
            let shares = equal_shares(total, n);
            prop_assert_eq!(shares.iter().sum::<u64>(), total);
            let max = shares.iter().max().copied().unwrap_or(0);
            let min = shares.iter().min().copied().unwrap_or(0);
            prop_assert!(max - min <= 1);
        }

        #[test]
        fn prop_percentage_shares_sum_to_total(total in 1u64..10_000_000, cut in 1u32..99) {
            let first = cut as f64;
            let shares = percentage_shares(total, &[first, 100.0 - first]);
            prop_assert_eq!(shares.iter().sum::<u64>(), total);
        }
    }
}
