//! # Savings goals
//!
//! Named targets funded by manual and automatic contributions. Progress
//! milestones at 25/50/75/100 % are re-evaluated after every balance change,
//! so a withdrawal can un-achieve them again.

use crate::clock::Clock;
use crate::error::{ServiceError, ServiceResult};
use crate::Cents;
use chrono::{DateTime, Duration, Utc};
use etrid_core::AccountId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub const MILESTONES: [u8; 4] = [25, 50, 75, 100];

/// A goal on track has at least this share of its time-proportional progress
const ON_TRACK_TOLERANCE: f64 = 0.9;

const DAYS_PER_MONTH: i64 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    Active,
    Completed,
    Archived,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContributionSource {
    Manual,
    AutoRecurring,
    AutoRoundup,
    AutoPercentage,
    AutoSpare,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub percentage: u8,
    pub achieved_at: Option<DateTime<Utc>>,
}

impl Milestone {
    pub fn achieved(&self) -> bool {
        self.achieved_at.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavingsGoal {
    pub id: Uuid,
    pub owner: AccountId,
    pub name: String,
    pub category: String,
    pub target: Cents,
    pub current: Cents,
    pub target_date: Option<DateTime<Utc>>,
    pub status: GoalStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub milestones: Vec<Milestone>,
}

impl SavingsGoal {
    /// Progress in percent; may exceed 100
    pub fn progress(&self) -> f64 {
        self.current as f64 / self.target as f64 * 100.0
    }

    fn refresh_milestones(&mut self, now: DateTime<Utc>) {
        let progress = self.progress();
        for milestone in &mut self.milestones {
            let reached = progress >= milestone.percentage as f64;
            match (reached, milestone.achieved()) {
                (true, false) => milestone.achieved_at = Some(now),
                (false, true) => milestone.achieved_at = None,
                _ => {}
            }
        }
    }

    /// At least 90 % of the progress expected by now; goals without a date always are
    fn is_on_track(&self, now: DateTime<Utc>) -> bool {
        let Some(target_date) = self.target_date else {
            return true;
        };
        let total = (target_date - self.created_at).num_milliseconds();
        let expected = if total <= 0 {
            1.0
        } else {
            (now - self.created_at).num_milliseconds() as f64 / total as f64
        };
        self.progress() / 100.0 >= expected * ON_TRACK_TOLERANCE
    }
}

#[derive(Clone, Debug, Default)]
pub struct GoalInput {
    pub name: String,
    pub category: String,
    pub target: Cents,
    pub target_date: Option<DateTime<Utc>>,
    pub initial_contribution: Cents,
}

#[derive(Clone, Debug, Default)]
pub struct GoalUpdate {
    pub name: Option<String>,
    pub target: Option<Cents>,
    pub target_date: Option<DateTime<Utc>>,
    pub status: Option<GoalStatus>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub amount: Cents,
    pub source: ContributionSource,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GoalStats {
    pub total_saved: Cents,
    pub total_goals: usize,
    pub completed_goals: usize,
    pub active_goals: usize,
    /// Mean progress of active goals, percent
    pub average_progress: f64,
    pub on_track_goals: usize,
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct SavingsGoals {
    owner: AccountId,
    clock: Arc<dyn Clock>,
    goals: Vec<SavingsGoal>,
    contributions: Vec<Contribution>,
}

impl SavingsGoals {
    pub fn new(owner: impl Into<AccountId>, clock: Arc<dyn Clock>) -> Self {
        Self {
            owner: owner.into(),
            clock,
            goals: Vec::new(),
            contributions: Vec::new(),
        }
    }

    pub fn create_goal(&mut self, input: GoalInput) -> ServiceResult<&SavingsGoal> {
        if input.name.trim().is_empty() {
            return Err(ServiceError::invalid("Goal name is required"));
        }
        if input.target == 0 {
            return Err(ServiceError::invalid("Target amount must be greater than 0"));
        }
        let now = self.clock.now();
        let goal = SavingsGoal {
            id: Uuid::new_v4(),
            owner: self.owner.clone(),
            name: input.name,
            category: input.category,
            target: input.target,
            current: 0,
            target_date: input.target_date,
            status: GoalStatus::Active,
            created_at: now,
            completed_at: None,
            milestones: MILESTONES
                .iter()
                .map(|&percentage| Milestone {
                    percentage,
                    achieved_at: None,
                })
                .collect(),
        };
        let id = goal.id;
        tracing::debug!(goal = %id, target = goal.target, "Savings goal created");
        self.goals.push(goal);

        if input.initial_contribution > 0 {
            self.contribute(id, input.initial_contribution, ContributionSource::Manual)?;
        }
        self.goal(id)
    }

    /// Goals, optionally restricted to one status
    pub fn goals(&self, status: Option<GoalStatus>) -> Vec<&SavingsGoal> {
        self.goals
            .iter()
            .filter(|g| status.map_or(true, |s| g.status == s))
            .collect()
    }

    pub fn goal(&self, id: Uuid) -> ServiceResult<&SavingsGoal> {
        self.goals
            .iter()
            .find(|g| g.id == id)
            .ok_or(ServiceError::NotFound("Goal"))
    }

    fn goal_mut(&mut self, id: Uuid) -> ServiceResult<&mut SavingsGoal> {
        self.goals
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or(ServiceError::NotFound("Goal"))
    }

    pub fn update_goal(&mut self, id: Uuid, update: GoalUpdate) -> ServiceResult<&SavingsGoal> {
        if update.target == Some(0) {
            return Err(ServiceError::invalid("Target amount must be greater than 0"));
        }
        let now = self.clock.now();
        let goal = self.goal_mut(id)?;
        if let Some(name) = update.name {
            goal.name = name;
        }
        if let Some(target) = update.target {
            goal.target = target;
        }
        if let Some(date) = update.target_date {
            goal.target_date = Some(date);
        }
        if let Some(status) = update.status {
            goal.status = status;
        }
        goal.refresh_milestones(now);
        Ok(&*goal)
    }

    /// Remove a goal together with its contribution history
    pub fn delete_goal(&mut self, id: Uuid) -> ServiceResult<()> {
        let index = self
            .goals
            .iter()
            .position(|g| g.id == id)
            .ok_or(ServiceError::NotFound("Goal"))?;
        self.goals.remove(index);
        self.contributions.retain(|c| c.goal_id != id);
        Ok(())
    }

    pub fn contribute(
        &mut self,
        id: Uuid,
        amount: Cents,
        source: ContributionSource,
    ) -> ServiceResult<Contribution> {
        if amount == 0 {
            return Err(ServiceError::invalid("Contribution must be greater than 0"));
        }
        let now = self.clock.now();
        let goal = self.goal_mut(id)?;
        if goal.status != GoalStatus::Active {
            return Err(ServiceError::InvalidState(
                "Cannot contribute to non-active goal".into(),
            ));
        }

        goal.current += amount;
        if goal.current >= goal.target {
            goal.status = GoalStatus::Completed;
            goal.completed_at = Some(now);
            tracing::info!(goal = %id, "Savings goal completed");
        }
        goal.refresh_milestones(now);

        let contribution = Contribution {
            id: Uuid::new_v4(),
            goal_id: id,
            amount,
            source,
            timestamp: now,
        };
        self.contributions.push(contribution.clone());
        Ok(contribution)
    }

    pub fn withdraw(&mut self, id: Uuid, amount: Cents) -> ServiceResult<&SavingsGoal> {
        let now = self.clock.now();
        let goal = self.goal_mut(id)?;
        if amount > goal.current {
            return Err(ServiceError::InsufficientFunds("Insufficient funds in goal".into()));
        }
        goal.current -= amount;
        goal.refresh_milestones(now);
        Ok(&*goal)
    }

    /// Contributions to a goal, newest first
    ///
    /// Contributions sharing a timestamp keep reverse insertion order.
    pub fn contributions(&self, goal_id: Uuid) -> Vec<&Contribution> {
        let mut found: Vec<_> = self
            .contributions
            .iter()
            .rev()
            .filter(|c| c.goal_id == goal_id)
            .collect();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        found
    }

    pub fn stats(&self) -> GoalStats {
        let now = self.clock.now();
        let active: Vec<_> = self.goals(Some(GoalStatus::Active));
        let average_progress = if active.is_empty() {
            0.0
        } else {
            active.iter().map(|g| g.progress()).sum::<f64>() / active.len() as f64
        };
        GoalStats {
            total_saved: self.goals.iter().map(|g| g.current).sum(),
            total_goals: self.goals.len(),
            completed_goals: self.goals(Some(GoalStatus::Completed)).len(),
            active_goals: active.len(),
            average_progress,
            on_track_goals: active.iter().filter(|g| g.is_on_track(now)).count(),
        }
    }

    /// Completion date extrapolated from the average saving rate
    ///
    /// `None` for inactive goals and for goals with fewer than two
    /// contributions.
    pub fn projected_completion(&self, id: Uuid) -> ServiceResult<Option<DateTime<Utc>>> {
        let goal = self.goal(id)?;
        if goal.status != GoalStatus::Active {
            return Ok(None);
        }
        let contributions = self.contributions(id);
        if contributions.len() < 2 {
            return Ok(None);
        }
        let now = self.clock.now();
        let first = contributions
            .iter()
            .map(|c| c.timestamp)
            .min()
            .unwrap_or(now);
        let elapsed = (now - first).num_milliseconds();
        if elapsed <= 0 || goal.current == 0 {
            return Ok(None);
        }
        if goal.current >= goal.target {
            return Ok(Some(now));
        }
        // remaining / (current / elapsed), kept in integers
        let remaining_ms =
            (goal.target - goal.current) as i128 * elapsed as i128 / goal.current as i128;
        let remaining_ms = i64::try_from(remaining_ms).unwrap_or(i64::MAX / 2);
        Ok(now.checked_add_signed(Duration::milliseconds(remaining_ms)))
    }

    /// Monthly amount that reaches the target by its date
    ///
    /// Zero without a date; the whole remainder once the date has passed.
    pub fn recommended_monthly_contribution(&self, id: Uuid) -> ServiceResult<Cents> {
        let goal = self.goal(id)?;
        let Some(target_date) = goal.target_date else {
            return Ok(0);
        };
        if goal.status != GoalStatus::Active {
            return Ok(0);
        }
        let remaining = goal.target.saturating_sub(goal.current);
        let left = target_date - self.clock.now();
        if left <= Duration::zero() {
            return Ok(remaining);
        }
        let months = left.num_milliseconds() as f64
            / Duration::days(DAYS_PER_MONTH).num_milliseconds() as f64;
        Ok((remaining as f64 / months).ceil() as Cents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn setup() -> (Arc<ManualClock>, SavingsGoals) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        ));
        let goals = SavingsGoals::new("alice", clock.clone());
        (clock, goals)
    }

    fn input(target: Cents) -> GoalInput {
        GoalInput {
            name: "Emergency Fund".into(),
            category: "Emergency Fund".into(),
            target,
            ..Default::default()
        }
    }

    #[test]
    fn test_initial_contribution_counted_once() {
        let (_, mut goals) = setup();
        let goal = goals
            .create_goal(GoalInput {
                initial_contribution: 2_500,
                ..input(10_000)
            })
            .unwrap()
            .clone();
        assert_eq!(goal.current, 2_500);
        assert!(goal.milestones[0].achieved());
        assert!(!goal.milestones[1].achieved());
        assert_eq!(goals.contributions(goal.id).len(), 1);
    }

    #[test]
    fn test_milestones_reset_on_withdraw() {
        let (_, mut goals) = setup();
        let id = goals.create_goal(input(10_000)).unwrap().id;

        goals.contribute(id, 5_000, ContributionSource::Manual).unwrap();
        assert_eq!(goals.goal(id).unwrap().milestones.iter().filter(|m| m.achieved()).count(), 2);

        let goal = goals.withdraw(id, 3_000).unwrap();
        assert_eq!(goal.current, 2_000);
        assert!(goal.milestones.iter().all(|m| !m.achieved()));

        assert_eq!(
            goals.withdraw(id, 2_001).unwrap_err(),
            ServiceError::InsufficientFunds("Insufficient funds in goal".into())
        );
    }

    #[test]
    fn test_completion_blocks_contributions() {
        let (_, mut goals) = setup();
        let id = goals.create_goal(input(1_000)).unwrap().id;
        goals.contribute(id, 1_200, ContributionSource::AutoRecurring).unwrap();

        let goal = goals.goal(id).unwrap();
        assert_eq!(goal.status, GoalStatus::Completed);
        assert!(goal.completed_at.is_some());
        assert!(goal.milestones.iter().all(|m| m.achieved()));
        assert!(matches!(
            goals.contribute(id, 1, ContributionSource::Manual),
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[test]
    fn test_validation_and_delete() {
        let (_, mut goals) = setup();
        assert!(goals.create_goal(input(0)).is_err());
        assert!(goals
            .create_goal(GoalInput { name: " ".into(), ..input(10) })
            .is_err());

        let id = goals.create_goal(input(100)).unwrap().id;
        goals.contribute(id, 10, ContributionSource::Manual).unwrap();
        goals.delete_goal(id).unwrap();
        assert!(goals.contributions(id).is_empty());
        assert_eq!(goals.delete_goal(id).unwrap_err(), ServiceError::NotFound("Goal"));
    }

    #[test]
    fn test_contributions_newest_first() {
        let (clock, mut goals) = setup();
        let id = goals
            .create_goal(GoalInput {
                initial_contribution: 500,
                ..input(10_000)
            })
            .unwrap()
            .id;
        goals.contribute(id, 100, ContributionSource::AutoRoundup).unwrap();
        clock.advance(Duration::days(1));
        goals.contribute(id, 200, ContributionSource::AutoRecurring).unwrap();

        let sources: Vec<_> = goals.contributions(id).iter().map(|c| c.source).collect();
        assert_eq!(
            sources,
            vec![
                ContributionSource::AutoRecurring,
                ContributionSource::AutoRoundup,
                ContributionSource::Manual,
            ]
        );
    }

    #[test]
    fn test_projection_needs_two_contributions() {
        let (clock, mut goals) = setup();
        let id = goals.create_goal(input(10_000)).unwrap().id;

        goals.contribute(id, 1_000, ContributionSource::Manual).unwrap();
        clock.advance(Duration::days(10));
        assert_eq!(goals.projected_completion(id).unwrap(), None);

        goals.contribute(id, 1_000, ContributionSource::Manual).unwrap();
        // 2,000 saved over 10 days leaves 40 more days for the remaining 8,000
        let projected = goals.projected_completion(id).unwrap().unwrap();
        assert_eq!(projected, clock.now() + Duration::days(40));
    }

    #[test]
    fn test_recommended_monthly_contribution() {
        let (clock, mut goals) = setup();
        let id = goals
            .create_goal(GoalInput {
                target_date: Some(clock.now() + Duration::days(90)),
                ..input(9_000)
            })
            .unwrap()
            .id;
        assert_eq!(goals.recommended_monthly_contribution(id).unwrap(), 3_000);

        clock.advance(Duration::days(91));
        assert_eq!(goals.recommended_monthly_contribution(id).unwrap(), 9_000);
    }

    #[test]
    fn test_stats_on_track() {
        let (clock, mut goals) = setup();
        let behind = goals
            .create_goal(GoalInput {
                target_date: Some(clock.now() + Duration::days(100)),
                ..input(10_000)
            })
            .unwrap()
            .id;
        let ahead = goals
            .create_goal(GoalInput {
                target_date: Some(clock.now() + Duration::days(100)),
                ..input(10_000)
            })
            .unwrap()
            .id;
        clock.advance(Duration::days(50));
        goals.contribute(behind, 1_000, ContributionSource::Manual).unwrap();
        goals.contribute(ahead, 6_000, ContributionSource::Manual).unwrap();

        let stats = goals.stats();
        assert_eq!(stats.total_saved, 7_000);
        assert_eq!(stats.active_goals, 2);
        assert_eq!(stats.on_track_goals, 1);
        assert!((stats.average_progress - 35.0).abs() < 1e-9);
    }
}
