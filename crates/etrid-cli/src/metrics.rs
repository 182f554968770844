//! Dashboard metrics snapshot (`/metrics.json`)

use chrono::{DateTime, Utc};
use etrid_core::constants::BLOCKS_PER_DAY;
use etrid_core::format::{format_balance, format_compact, format_percentage, BalanceFormat};
use etrid_core::types::balance_serde;
use etrid_core::Balance;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub block_number: u64,
    #[serde(default)]
    pub etr_price_usd: f64,
    #[serde(default, with = "balance_serde")]
    pub reward_per_block: Balance,
    #[serde(default)]
    pub pools: Vec<PoolMetrics>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMetrics {
    pub pid: u32,
    pub name: String,
    #[serde(default)]
    pub tvl_usd: f64,
    /// Percent
    #[serde(default)]
    pub apr: f64,
    #[serde(default)]
    pub alloc_point: u64,
    #[serde(default, with = "balance_serde")]
    pub total_staked: Balance,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MetricsSummary {
    pub block_number: u64,
    pub pool_count: usize,
    pub total_tvl_usd: f64,
    /// TVL-weighted
    pub average_apr: f64,
    pub top_pool: Option<(String, f64)>,
    pub daily_rewards: Balance,
    pub daily_rewards_usd: f64,
}

impl MetricsSnapshot {
    pub fn summary(&self) -> MetricsSummary {
        let total_tvl_usd: f64 = self.pools.iter().map(|p| p.tvl_usd).sum();
        let average_apr = if total_tvl_usd > 0.0 {
            self.pools.iter().map(|p| p.apr * p.tvl_usd).sum::<f64>() / total_tvl_usd
        } else {
            0.0
        };
        let top_pool = self
            .pools
            .iter()
            .max_by(|a, b| a.apr.total_cmp(&b.apr))
            .map(|p| (p.name.clone(), p.apr));
        let daily_rewards = self.reward_per_block.saturating_mul(BLOCKS_PER_DAY as Balance);
        let daily_rewards_usd =
            daily_rewards as f64 / etrid_core::constants::ONE_ETR as f64 * self.etr_price_usd;

        MetricsSummary {
            block_number: self.block_number,
            pool_count: self.pools.len(),
            total_tvl_usd,
            average_apr,
            top_pool,
            daily_rewards,
            daily_rewards_usd,
        }
    }
}

impl fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Block:          #{}", self.block_number)?;
        writeln!(f, "Pools:          {}", self.pool_count)?;
        writeln!(f, "Total TVL:      ${}", format_compact(self.total_tvl_usd))?;
        writeln!(f, "Average APR:    {}", format_percentage(self.average_apr, 2))?;
        if let Some((name, apr)) = &self.top_pool {
            writeln!(f, "Top pool:       {} ({})", name, format_percentage(*apr, 2))?;
        }
        write!(
            f,
            "Daily rewards:  {} (${})",
            format_balance(self.daily_rewards, &BalanceFormat::new().compact()),
            format_compact(self.daily_rewards_usd)
        )
    }
}

pub async fn fetch(url: &str, timeout: Duration) -> anyhow::Result<MetricsSnapshot> {
    let http = reqwest::Client::builder().timeout(timeout).build()?;
    tracing::debug!(url, "Fetching metrics snapshot");
    let snapshot = http
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<MetricsSnapshot>()
        .await?;
    Ok(snapshot)
}
