//! # Distribution Pay
//!
//! Daily ÉTR reward distribution across five participant categories.
//!
//! ```text
//!   27,397 ÉTR / day, paid every 17,280 blocks (00:00 UTC)
//!   ┌──────────────┬───────┬──────────────────────────────────┐
//!   │ Voters       │  10 % │ flat 0.1 % share with a vote     │
//!   │ FlareNodes   │  15 % │ 1/N of the session validator set │
//!   │ ValidityNodes│  15 % │ 1/N of the session validator set │
//!   │ Stakers      │  40 % │ active stake / total stake       │
//!   │ Directors    │  20 % │ 1/N of the directors             │
//!   └──────────────┴───────┴──────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use etrid_client::{Call, Client, Signer};
use etrid_core::constants::{BLOCKS_PER_DAY, BLOCK_TIME_SECS, ONE_ETR};
use etrid_core::types::balance_serde;
use etrid_core::{balance_from_value, AccountId, Balance, BlockNumber, HashHex, Lookup, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

const PALLET: &str = "distributionPay";

/// Default daily emission when the chain does not report one
pub const DAILY_DISTRIBUTION: Balance = 27_397 * ONE_ETR;

/// Claims kept in [`ClaimHistory::recent_claims`]
const RECENT_CLAIMS: usize = 10;

// ============================================================================
// CATEGORIES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DistributionCategory {
    Voters,
    FlareNodes,
    ValidityNodes,
    Stakers,
    Directors,
}

impl DistributionCategory {
    pub const ALL: [DistributionCategory; 5] = [
        Self::Voters,
        Self::FlareNodes,
        Self::ValidityNodes,
        Self::Stakers,
        Self::Directors,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Voters => "Voters",
            Self::FlareNodes => "FlareNodes",
            Self::ValidityNodes => "ValidityNodes",
            Self::Stakers => "Stakers",
            Self::Directors => "Directors",
        }
    }

    /// Storage item holding this category's share in basis points
    fn percentage_item(&self) -> &'static str {
        match self {
            Self::Voters => "votersPercentage",
            Self::FlareNodes => "flareNodesPercentage",
            Self::ValidityNodes => "validityNodesPercentage",
            Self::Stakers => "stakersPercentage",
            Self::Directors => "directorsPercentage",
        }
    }

    /// Protocol share in basis points
    pub fn default_basis_points(&self) -> u32 {
        match self {
            Self::Voters => 1_000,
            Self::FlareNodes => 1_500,
            Self::ValidityNodes => 1_500,
            Self::Stakers => 4_000,
            Self::Directors => 2_000,
        }
    }
}

impl fmt::Display for DistributionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClaimReceipt {
    pub block_hash: HashHex,
    pub amount: Balance,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PendingRewards {
    pub total: Balance,
    pub by_category: BTreeMap<DistributionCategory, Balance>,
    pub next_distribution: DateTime<Utc>,
    pub seconds_until_next: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CategoryAllocation {
    pub category: DistributionCategory,
    /// Basis points
    pub percentage: u32,
    pub daily_amount: Balance,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DistributionSchedule {
    pub total_daily: Balance,
    pub categories: Vec<CategoryAllocation>,
    pub distribution_time: &'static str,
    pub last_distribution: BlockNumber,
    pub next_distribution: BlockNumber,
}

impl DistributionSchedule {
    pub fn allocation(&self, category: DistributionCategory) -> Option<&CategoryAllocation> {
        self.categories.iter().find(|c| c.category == category)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NextDistribution {
    pub block: BlockNumber,
    pub blocks_until: u64,
    pub estimated_time: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DistributionEstimate {
    pub category: DistributionCategory,
    pub estimated_amount: Balance,
    pub share_percentage: f64,
    pub blocks_until: u64,
    pub estimated_time: DateTime<Utc>,
}

/// One claim as recorded in `distributionPay.claimHistory`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimEvent {
    pub block_number: BlockNumber,
    pub category: DistributionCategory,
    #[serde(with = "balance_serde")]
    pub amount: Balance,
    pub tx_hash: HashHex,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClaimHistory {
    pub total_claimed: Balance,
    pub claim_count: usize,
    pub by_category: BTreeMap<DistributionCategory, Balance>,
    pub recent_claims: Vec<ClaimEvent>,
    pub first_claim: Option<DateTime<Utc>>,
    pub last_claim: Option<DateTime<Utc>>,
}

impl ClaimHistory {
    fn from_claims(mut claims: Vec<ClaimEvent>) -> Self {
        claims.sort_by_key(|c| c.block_number);
        let mut by_category: BTreeMap<_, Balance> =
            DistributionCategory::ALL.iter().map(|c| (*c, 0)).collect();
        for claim in &claims {
            *by_category.entry(claim.category).or_default() += claim.amount;
        }
        let skip = claims.len().saturating_sub(RECENT_CLAIMS);
        Self {
            total_claimed: claims.iter().map(|c| c.amount).sum(),
            claim_count: claims.len(),
            by_category,
            first_claim: claims.first().map(|c| c.timestamp),
            last_claim: claims.last().map(|c| c.timestamp),
            recent_claims: claims.into_iter().skip(skip).collect(),
        }
    }
}

fn eta(blocks_until: u64) -> DateTime<Utc> {
    let secs = i64::try_from(blocks_until.saturating_mul(BLOCK_TIME_SECS))
        .unwrap_or(i64::MAX)
        .min(i64::MAX / 1000);
    Utc::now() + chrono::Duration::seconds(secs)
}

// ============================================================================
// WRAPPER
// ============================================================================

#[derive(Clone)]
pub struct DistributionPay {
    client: Client,
}

impl DistributionPay {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Claim the signer's pending reward in `category`
    pub async fn claim_reward(
        &self,
        signer: &Signer,
        category: DistributionCategory,
    ) -> Result<ClaimReceipt> {
        let call = Call::new(PALLET, "claimReward").arg(category.name());
        let outcome = self.client.submit(signer, call).await?;
        let event = outcome.expect_event(PALLET, "RewardClaimed")?;
        let amount = event.balance(2)?;
        tracing::info!(%category, amount = %amount, "Reward claimed");
        Ok(ClaimReceipt {
            block_hash: outcome.block_hash.clone(),
            amount,
        })
    }

    /// Unclaimed rewards per category; absent entries count as zero
    pub async fn get_pending_rewards(&self, address: &str) -> Result<PendingRewards> {
        let mut by_category = BTreeMap::new();
        for category in DistributionCategory::ALL {
            let amount = self
                .client
                .query_balance(
                    PALLET,
                    "pendingRewards",
                    vec![address.into(), category.name().into()],
                )
                .await?
                .or_default();
            by_category.insert(category, amount);
        }

        let next = self.get_next_distribution().await?;
        Ok(PendingRewards {
            total: by_category.values().sum(),
            by_category,
            next_distribution: next.estimated_time,
            seconds_until_next: next.blocks_until * BLOCK_TIME_SECS,
        })
    }

    async fn last_distribution(&self) -> Result<BlockNumber> {
        Ok(self
            .client
            .query::<BlockNumber>(PALLET, "lastDistribution", vec![])
            .await?
            .or_default())
    }

    /// Daily emission split into category allocations
    pub async fn get_distribution_schedule(&self) -> Result<DistributionSchedule> {
        let total_daily = self
            .client
            .query_balance(PALLET, "totalDaily", vec![])
            .await?
            .found()
            .unwrap_or(DAILY_DISTRIBUTION);

        let mut categories = Vec::with_capacity(DistributionCategory::ALL.len());
        for category in DistributionCategory::ALL {
            let percentage = self
                .client
                .query::<u32>(PALLET, category.percentage_item(), vec![])
                .await?
                .found()
                .unwrap_or_else(|| category.default_basis_points());
            categories.push(CategoryAllocation {
                category,
                percentage,
                daily_amount: total_daily * percentage as u128 / 10_000,
            });
        }

        let last_distribution = self.last_distribution().await?;
        Ok(DistributionSchedule {
            total_daily,
            categories,
            distribution_time: "00:00 UTC",
            last_distribution,
            next_distribution: last_distribution + BLOCKS_PER_DAY,
        })
    }

    pub async fn get_next_distribution(&self) -> Result<NextDistribution> {
        let block = self.last_distribution().await? + BLOCKS_PER_DAY;
        let current = self.client.block_number().await?;
        let blocks_until = block.saturating_sub(current);
        Ok(NextDistribution {
            block,
            blocks_until,
            estimated_time: eta(blocks_until),
        })
    }

    /// Expected payout of `address` in the next distribution
    pub async fn estimate_next_distribution(
        &self,
        address: &str,
        category: DistributionCategory,
    ) -> Result<DistributionEstimate> {
        let schedule = self.get_distribution_schedule().await?;
        let daily = schedule
            .allocation(category)
            .map(|a| a.daily_amount)
            .unwrap_or_default();

        let (share_percentage, estimated_amount) = match category {
            DistributionCategory::Stakers => self.staker_share(address, daily).await?,
            DistributionCategory::FlareNodes | DistributionCategory::ValidityNodes => {
                let validators = self.members("session", "validators").await?;
                equal_share(&validators, address, daily)
            }
            DistributionCategory::Directors => {
                let directors = self.members("governance", "directors").await?;
                equal_share(&directors, address, daily)
            }
            DistributionCategory::Voters => {
                if self.has_voted(address).await? {
                    // Voter turnout is not on chain; assume a flat 0.1 % share
                    (0.1, daily / 1_000)
                } else {
                    (0.0, 0)
                }
            }
        };

        let current = self.client.block_number().await?;
        let blocks_until = schedule.next_distribution.saturating_sub(current);
        Ok(DistributionEstimate {
            category,
            estimated_amount,
            share_percentage,
            blocks_until,
            estimated_time: eta(blocks_until),
        })
    }

    async fn staker_share(&self, address: &str, daily: Balance) -> Result<(f64, Balance)> {
        let nominating = self
            .client
            .query_raw("staking", "nominators", vec![address.into()])
            .await?
            .is_found();
        if !nominating {
            return Ok((0.0, 0));
        }

        let total = self
            .client
            .query_balance("staking", "totalStake", vec![])
            .await?
            .or_default();
        let ledger = self
            .client
            .query_raw("staking", "ledger", vec![address.into()])
            .await?;
        let mine = match ledger {
            Lookup::Found(value) => balance_from_value(&value["active"])?,
            Lookup::NotFound => return Ok((0.0, 0)),
        };
        if total == 0 {
            return Ok((0.0, 0));
        }

        let share = (mine.saturating_mul(10_000) / total) as f64 / 100.0;
        Ok((share, daily.saturating_mul(mine) / total))
    }

    async fn members(&self, pallet: &str, item: &str) -> Result<Vec<AccountId>> {
        Ok(self
            .client
            .query::<Vec<AccountId>>(pallet, item, vec![])
            .await?
            .or_default())
    }

    async fn has_voted(&self, address: &str) -> Result<bool> {
        Ok(self
            .client
            .query_raw("governance", "lastVote", vec![address.into()])
            .await?
            .is_found())
    }

    /// Whether `address` participates in `category`
    pub async fn is_eligible(&self, address: &str, category: DistributionCategory) -> Result<bool> {
        match category {
            DistributionCategory::Stakers => Ok(self
                .client
                .query_raw("staking", "nominators", vec![address.into()])
                .await?
                .is_found()),
            DistributionCategory::FlareNodes | DistributionCategory::ValidityNodes => Ok(self
                .members("session", "validators")
                .await?
                .iter()
                .any(|v| v == address)),
            DistributionCategory::Directors => Ok(self
                .members("governance", "directors")
                .await?
                .iter()
                .any(|d| d == address)),
            DistributionCategory::Voters => self.has_voted(address).await,
        }
    }

    pub async fn get_eligible_categories(&self, address: &str) -> Result<Vec<DistributionCategory>> {
        let mut eligible = Vec::new();
        for category in DistributionCategory::ALL {
            if self.is_eligible(address, category).await? {
                eligible.push(category);
            }
        }
        Ok(eligible)
    }

    /// Past claims of `address`, oldest first
    pub async fn get_claim_history(&self, address: &str) -> Result<ClaimHistory> {
        let claims = self
            .client
            .query::<Vec<ClaimEvent>>(PALLET, "claimHistory", vec![Value::from(address)])
            .await?
            .or_default();
        Ok(ClaimHistory::from_claims(claims))
    }
}

fn equal_share(members: &[AccountId], address: &str, daily: Balance) -> (f64, Balance) {
    if members.iter().any(|m| m == address) {
        let n = members.len();
        (100.0 / n as f64, daily / n as u128)
    } else {
        (0.0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etrid_client::mock::MockChain;
    use etrid_client::ChainEvent;
    use etrid_core::EtridError;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (Arc<MockChain>, DistributionPay) {
        let chain = Arc::new(MockChain::new());
        chain.set_storage("system", "number", vec![], json!(1_000));
        chain.set_storage(PALLET, "lastDistribution", vec![], json!(0));
        let pay = DistributionPay::new(Client::new(chain.clone()));
        (chain, pay)
    }

    #[test]
    fn test_default_shares_sum_to_whole() {
        let total: u32 = DistributionCategory::ALL
            .iter()
            .map(|c| c.default_basis_points())
            .sum();
        assert_eq!(total, 10_000);
    }

    #[tokio::test]
    async fn test_claim_reward() {
        let (chain, pay) = setup();
        let signer = Signer::from_seed([5u8; 32]);
        chain.finalize_with(vec![ChainEvent::new(
            PALLET,
            "RewardClaimed",
            vec![json!(signer.address()), json!("Stakers"), json!("42000")],
        )]);

        let receipt = pay.claim_reward(&signer, DistributionCategory::Stakers).await.unwrap();
        assert_eq!(receipt.amount, 42_000);
        assert!(receipt.block_hash.starts_with("0x"));
        assert_eq!(chain.last_submitted().unwrap().call.args, vec![json!("Stakers")]);

        chain.finalize_with(vec![]);
        let err = pay.claim_reward(&signer, DistributionCategory::Voters).await.unwrap_err();
        assert_eq!(err, EtridError::MissingEvent("distributionPay.RewardClaimed".into()));
    }

    #[tokio::test]
    async fn test_pending_rewards() {
        let (chain, pay) = setup();
        chain.set_storage(PALLET, "pendingRewards", vec![json!("alice"), json!("Stakers")], json!("300"));
        chain.set_storage(PALLET, "pendingRewards", vec![json!("alice"), json!("Voters")], json!(50));

        let pending = pay.get_pending_rewards("alice").await.unwrap();
        assert_eq!(pending.total, 350);
        assert_eq!(pending.by_category[&DistributionCategory::Directors], 0);
        assert_eq!(pending.seconds_until_next, (17_280 - 1_000) * 5);
    }

    #[tokio::test]
    async fn test_schedule_defaults() {
        let (chain, pay) = setup();
        let schedule = pay.get_distribution_schedule().await.unwrap();
        assert_eq!(schedule.total_daily, DAILY_DISTRIBUTION);
        assert_eq!(schedule.next_distribution, 17_280);
        let stakers = schedule.allocation(DistributionCategory::Stakers).unwrap();
        assert_eq!(stakers.daily_amount, DAILY_DISTRIBUTION * 4 / 10);

        chain.set_storage(PALLET, "totalDaily", vec![], json!("10000"));
        chain.set_storage(PALLET, "votersPercentage", vec![], json!(2_500));
        let schedule = pay.get_distribution_schedule().await.unwrap();
        assert_eq!(schedule.allocation(DistributionCategory::Voters).unwrap().daily_amount, 2_500);
    }

    #[tokio::test]
    async fn test_next_distribution_never_negative() {
        let (chain, pay) = setup();
        chain.set_storage("system", "number", vec![], json!(20_000));
        let next = pay.get_next_distribution().await.unwrap();
        assert_eq!(next.block, 17_280);
        assert_eq!(next.blocks_until, 0);
    }

    #[tokio::test]
    async fn test_estimates() {
        let (chain, pay) = setup();
        chain.set_storage(PALLET, "totalDaily", vec![], json!("1000000"));
        chain.set_storage("staking", "nominators", vec![json!("alice")], json!({ "targets": [] }));
        chain.set_storage("staking", "totalStake", vec![], json!("4000"));
        chain.set_storage("staking", "ledger", vec![json!("alice")], json!({ "active": "1000" }));
        chain.set_storage("session", "validators", vec![], json!(["v1", "v2", "v3", "v4"]));
        chain.set_storage("governance", "lastVote", vec![json!("alice")], json!(900));

        let stakers = pay
            .estimate_next_distribution("alice", DistributionCategory::Stakers)
            .await
            .unwrap();
        assert_eq!(stakers.share_percentage, 25.0);
        assert_eq!(stakers.estimated_amount, 100_000);
        assert_eq!(stakers.blocks_until, 16_280);

        let node = pay
            .estimate_next_distribution("v2", DistributionCategory::FlareNodes)
            .await
            .unwrap();
        assert_eq!(node.share_percentage, 25.0);
        assert_eq!(node.estimated_amount, 150_000 / 4);

        let voter = pay
            .estimate_next_distribution("alice", DistributionCategory::Voters)
            .await
            .unwrap();
        assert_eq!(voter.share_percentage, 0.1);
        assert_eq!(voter.estimated_amount, 100);

        let outsider = pay
            .estimate_next_distribution("bob", DistributionCategory::Directors)
            .await
            .unwrap();
        assert_eq!(outsider.estimated_amount, 0);
    }

    #[tokio::test]
    async fn test_eligibility() {
        let (chain, pay) = setup();
        chain.set_storage("session", "validators", vec![], json!(["alice"]));
        chain.set_storage("governance", "directors", vec![], json!(["bob"]));
        chain.set_storage("governance", "lastVote", vec![json!("alice")], json!(12));

        let eligible = pay.get_eligible_categories("alice").await.unwrap();
        assert_eq!(
            eligible,
            vec![
                DistributionCategory::Voters,
                DistributionCategory::FlareNodes,
                DistributionCategory::ValidityNodes
            ]
        );
        assert!(pay.is_eligible("bob", DistributionCategory::Directors).await.unwrap());
        assert!(!pay.is_eligible("bob", DistributionCategory::Stakers).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_history() {
        let (chain, pay) = setup();
        let claims: Vec<Value> = (0..12)
            .map(|i| {
                json!({
                    "blockNumber": 100 - i,
                    "category": if i % 2 == 0 { "Stakers" } else { "Voters" },
                    "amount": "10",
                    "txHash": format!("0x{:02x}", i),
                    "timestamp": format!("2024-01-{:02}T00:00:00Z", 20 - i),
                })
            })
            .collect();
        chain.set_storage(PALLET, "claimHistory", vec![json!("alice")], Value::Array(claims));

        let history = pay.get_claim_history("alice").await.unwrap();
        assert_eq!(history.claim_count, 12);
        assert_eq!(history.total_claimed, 120);
        assert_eq!(history.by_category[&DistributionCategory::Stakers], 60);
        assert_eq!(history.recent_claims.len(), 10);
        assert_eq!(history.recent_claims.last().unwrap().block_number, 100);
        assert!(history.first_claim < history.last_claim);

        let empty = pay.get_claim_history("bob").await.unwrap();
        assert_eq!(empty.claim_count, 0);
        assert_eq!(empty.first_claim, None);
    }
}
