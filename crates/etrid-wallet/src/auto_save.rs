//! # Auto-save rules
//!
//! Rules that feed savings goals without manual action.
//!
//! | Rule         | Trigger              | Saves                                  |
//! |--------------|----------------------|----------------------------------------|
//! | Recurring    | schedule / on demand | fixed amount daily, weekly or monthly  |
//! | RoundUp      | outgoing payment     | change to the next whole unit × 1-10   |
//! | Percentage   | incoming payment     | percentage of the deposit              |
//! | SpareChange  | any payment          | the whole payment when below threshold |

use crate::clock::Clock;
use crate::error::{ServiceError, ServiceResult};
use crate::savings_goal::{ContributionSource, GoalStatus, SavingsGoals};
use crate::Cents;
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const CENTS_PER_UNIT: Cents = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Daily => from.checked_add_signed(Duration::days(1)),
            Self::Weekly => from.checked_add_signed(Duration::days(7)),
            Self::Monthly => from.checked_add_months(Months::new(1)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RuleKind {
    Recurring { amount: Cents, frequency: Frequency },
    Roundup { multiplier: u32 },
    Percentage { percentage: f64 },
    SpareChange { threshold: Cents },
}

impl RuleKind {
    fn validate(&self) -> ServiceResult<()> {
        match *self {
            Self::Recurring { amount, .. } if amount == 0 => Err(ServiceError::invalid(
                "Recurring rules require a positive amount",
            )),
            Self::Roundup { multiplier } if !(1..=10).contains(&multiplier) => Err(
                ServiceError::invalid("Round-up multiplier must be between 1 and 10"),
            ),
            Self::Percentage { percentage } if !(percentage > 0.0 && percentage <= 100.0) => Err(
                ServiceError::invalid("Percentage must be between 0 and 100"),
            ),
            Self::SpareChange { threshold } if threshold == 0 => Err(ServiceError::invalid(
                "Spare-change threshold must be positive",
            )),
            _ => Ok(()),
        }
    }

    fn source(&self) -> ContributionSource {
        match self {
            Self::Recurring { .. } => ContributionSource::AutoRecurring,
            Self::Roundup { .. } => ContributionSource::AutoRoundup,
            Self::Percentage { .. } => ContributionSource::AutoPercentage,
            Self::SpareChange { .. } => ContributionSource::AutoSpare,
        }
    }

    /// Amount this rule saves for a payment of `amount`
    pub fn save_amount(&self, direction: Direction, amount: Cents) -> Cents {
        match *self {
            Self::Recurring { .. } => 0,
            Self::Roundup { multiplier } if direction == Direction::Outgoing => {
                roundup(amount) * multiplier as Cents
            }
            Self::Percentage { percentage } if direction == Direction::Incoming => {
                (amount as f64 * percentage / 100.0).round() as Cents
            }
            Self::SpareChange { threshold } if amount < threshold => amount,
            _ => 0,
        }
    }
}

/// Change needed to reach the next whole unit
pub fn roundup(amount: Cents) -> Cents {
    (CENTS_PER_UNIT - amount % CENTS_PER_UNIT) % CENTS_PER_UNIT
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutoSaveRule {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub kind: RuleKind,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_executed: Option<DateTime<Utc>>,
    /// Only recurring rules are scheduled
    pub next_execution: Option<DateTime<Utc>>,
}

impl AutoSaveRule {
    fn reschedule(&mut self, from: DateTime<Utc>) {
        self.next_execution = match self.kind {
            RuleKind::Recurring { frequency, .. } => frequency.next_after(from),
            _ => None,
        };
    }
}

#[derive(Clone, Debug, Default)]
pub struct RuleUpdate {
    pub kind: Option<RuleKind>,
    pub active: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleExecution {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub amount: Cents,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

impl RuleExecution {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RuleStats {
    pub total_saved: Cents,
    pub execution_count: usize,
    pub average_amount: f64,
    pub last_execution: Option<DateTime<Utc>>,
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct AutoSave {
    clock: Arc<dyn Clock>,
    rules: Vec<AutoSaveRule>,
    executions: Vec<RuleExecution>,
}

impl AutoSave {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            rules: Vec::new(),
            executions: Vec::new(),
        }
    }

    pub fn create_rule(
        &mut self,
        goals: &SavingsGoals,
        goal_id: Uuid,
        kind: RuleKind,
    ) -> ServiceResult<&AutoSaveRule> {
        if goals.goal(goal_id)?.status != GoalStatus::Active {
            return Err(ServiceError::InvalidState(
                "Cannot create rule for non-active goal".into(),
            ));
        }
        kind.validate()?;

        let now = self.clock.now();
        let mut rule = AutoSaveRule {
            id: Uuid::new_v4(),
            goal_id,
            kind,
            active: true,
            created_at: now,
            last_executed: None,
            next_execution: None,
        };
        rule.reschedule(now);
        self.rules.push(rule);
        self.rules.last().ok_or(ServiceError::NotFound("Rule"))
    }

    /// Rules, optionally for one goal
    pub fn rules(&self, goal_id: Option<Uuid>) -> Vec<&AutoSaveRule> {
        self.rules
            .iter()
            .filter(|r| goal_id.map_or(true, |g| r.goal_id == g))
            .collect()
    }

    pub fn rule(&self, id: Uuid) -> ServiceResult<&AutoSaveRule> {
        self.rules
            .iter()
            .find(|r| r.id == id)
            .ok_or(ServiceError::NotFound("Rule"))
    }

    fn rule_mut(&mut self, id: Uuid) -> ServiceResult<&mut AutoSaveRule> {
        self.rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(ServiceError::NotFound("Rule"))
    }

    pub fn update_rule(&mut self, id: Uuid, update: RuleUpdate) -> ServiceResult<&AutoSaveRule> {
        if let Some(kind) = &update.kind {
            kind.validate()?;
        }
        let now = self.clock.now();
        let rule = self.rule_mut(id)?;
        if let Some(kind) = update.kind {
            rule.kind = kind;
            rule.reschedule(now);
        }
        if let Some(active) = update.active {
            rule.active = active;
        }
        Ok(&*rule)
    }

    /// Remove a rule and its execution history
    pub fn delete_rule(&mut self, id: Uuid) -> ServiceResult<()> {
        let index = self
            .rules
            .iter()
            .position(|r| r.id == id)
            .ok_or(ServiceError::NotFound("Rule"))?;
        self.rules.remove(index);
        self.executions.retain(|e| e.rule_id != id);
        Ok(())
    }

    /// Run a rule now
    ///
    /// Recurring rules save their fixed amount. The other kinds need the
    /// payment they react to in `payment`.
    pub fn execute_rule(
        &mut self,
        goals: &mut SavingsGoals,
        id: Uuid,
        payment: Option<(Direction, Cents)>,
    ) -> ServiceResult<RuleExecution> {
        let rule = self.rule(id)?;
        if !rule.active {
            return Err(ServiceError::InvalidState("Rule is not active".into()));
        }
        let amount = match (rule.kind, payment) {
            (RuleKind::Recurring { amount, .. }, _) => amount,
            (kind, Some((direction, value))) => kind.save_amount(direction, value),
            (_, None) => {
                return Err(ServiceError::invalid("Rule requires a payment to react to"));
            }
        };
        if amount == 0 {
            return Err(ServiceError::invalid("Rule saves nothing for this payment"));
        }
        self.apply(goals, id, amount)
    }

    /// Feed a wallet payment through every active rule
    ///
    /// Returns one execution per rule that saved something. A rule whose goal
    /// rejects the contribution is recorded as a failed execution and does
    /// not stop the others.
    pub fn process_transaction(
        &mut self,
        goals: &mut SavingsGoals,
        direction: Direction,
        amount: Cents,
    ) -> Vec<RuleExecution> {
        let triggered: Vec<(Uuid, Cents)> = self
            .rules
            .iter()
            .filter(|r| r.active)
            .map(|r| (r.id, r.kind.save_amount(direction, amount)))
            .filter(|(_, save)| *save > 0)
            .collect();

        let mut executions = Vec::with_capacity(triggered.len());
        for (id, save) in triggered {
            match self.apply(goals, id, save) {
                Ok(execution) => executions.push(execution),
                Err(e) => {
                    tracing::warn!(rule = %id, "Auto-save rule failed: {}", e);
                    executions.extend(self.executions.last().cloned());
                }
            }
        }
        executions
    }

    fn failed_execution(&self, rule_id: Uuid, err: &ServiceError) -> RuleExecution {
        RuleExecution {
            id: Uuid::new_v4(),
            rule_id,
            amount: 0,
            timestamp: self.clock.now(),
            error: Some(err.to_string()),
        }
    }

    fn apply(&mut self, goals: &mut SavingsGoals, id: Uuid, amount: Cents) -> ServiceResult<RuleExecution> {
        let now = self.clock.now();
        let kind = self.rule(id)?.kind;
        let goal_id = self.rule(id)?.goal_id;

        match goals.contribute(goal_id, amount, kind.source()) {
            Ok(_) => {
                let execution = RuleExecution {
                    id: Uuid::new_v4(),
                    rule_id: id,
                    amount,
                    timestamp: now,
                    error: None,
                };
                self.executions.push(execution.clone());
                let rule = self.rule_mut(id)?;
                rule.last_executed = Some(now);
                rule.reschedule(now);
                Ok(execution)
            }
            Err(e) => {
                let failed = self.failed_execution(id, &e);
                self.executions.push(failed);
                Err(e)
            }
        }
    }

    /// Recurring rules whose next execution is due
    pub fn due_rules(&self) -> Vec<&AutoSaveRule> {
        let now = self.clock.now();
        self.rules
            .iter()
            .filter(|r| r.active && r.next_execution.is_some_and(|at| at <= now))
            .collect()
    }

    pub fn history(&self, rule_id: Uuid) -> Vec<&RuleExecution> {
        self.executions.iter().filter(|e| e.rule_id == rule_id).collect()
    }

    pub fn rule_stats(&self, rule_id: Uuid) -> RuleStats {
        let done: Vec<_> = self
            .executions
            .iter()
            .filter(|e| e.rule_id == rule_id && e.succeeded())
            .collect();
        let total_saved: Cents = done.iter().map(|e| e.amount).sum();
        RuleStats {
            total_saved,
            execution_count: done.len(),
            average_amount: if done.is_empty() {
                0.0
            } else {
                total_saved as f64 / done.len() as f64
            },
            last_execution: done.iter().map(|e| e.timestamp).max(),
        }
    }

    /// Everything saved by successful executions
    pub fn total_saved(&self) -> Cents {
        self.executions
            .iter()
            .filter(|e| e.succeeded())
            .map(|e| e.amount)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::savings_goal::GoalInput;
    use chrono::TimeZone;

    struct Fixture {
        clock: Arc<ManualClock>,
        goals: SavingsGoals,
        auto: AutoSave,
        goal: Uuid,
    }

    fn fixture(target: Cents) -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 31, 9, 0, 0).unwrap(),
        ));
        let mut goals = SavingsGoals::new("alice", clock.clone());
        let goal = goals
            .create_goal(GoalInput {
                name: "Vacation".into(),
                category: "Vacation".into(),
                target,
                ..Default::default()
            })
            .unwrap()
            .id;
        let auto = AutoSave::new(clock.clone());
        Fixture { clock, goals, auto, goal }
    }

    #[test]
    fn test_rule_amounts() {
        assert_eq!(roundup(4_735), 65);
        assert_eq!(roundup(500), 0);

        let roundup_rule = RuleKind::Roundup { multiplier: 2 };
        assert_eq!(roundup_rule.save_amount(Direction::Outgoing, 4_735), 130);
        assert_eq!(roundup_rule.save_amount(Direction::Incoming, 4_735), 0);

        let pct = RuleKind::Percentage { percentage: 10.0 };
        assert_eq!(pct.save_amount(Direction::Incoming, 50_000), 5_000);
        assert_eq!(pct.save_amount(Direction::Outgoing, 50_000), 0);

        let spare = RuleKind::SpareChange { threshold: 100 };
        assert_eq!(spare.save_amount(Direction::Outgoing, 73), 73);
        assert_eq!(spare.save_amount(Direction::Incoming, 150), 0);
    }

    #[test]
    fn test_validation() {
        let mut f = fixture(100_000);
        for bad in [
            RuleKind::Recurring { amount: 0, frequency: Frequency::Daily },
            RuleKind::Roundup { multiplier: 11 },
            RuleKind::Percentage { percentage: 0.0 },
            RuleKind::Percentage { percentage: 100.5 },
            RuleKind::SpareChange { threshold: 0 },
        ] {
            assert!(f.auto.create_rule(&f.goals, f.goal, bad).is_err(), "{:?}", bad);
        }
        assert_eq!(
            f.auto
                .create_rule(&f.goals, Uuid::new_v4(), RuleKind::Roundup { multiplier: 1 })
                .unwrap_err(),
            ServiceError::NotFound("Goal")
        );
    }

    #[test]
    fn test_monthly_schedule_clamps_to_month_end() {
        let mut f = fixture(100_000);
        let rule = f
            .auto
            .create_rule(
                &f.goals,
                f.goal,
                RuleKind::Recurring { amount: 5_000, frequency: Frequency::Monthly },
            )
            .unwrap()
            .clone();
        assert_eq!(
            rule.next_execution,
            Some(Utc.with_ymd_and_hms(2025, 2, 28, 9, 0, 0).unwrap())
        );

        assert!(f.auto.due_rules().is_empty());
        f.clock.advance(Duration::days(29));
        assert_eq!(f.auto.due_rules().len(), 1);

        let execution = f.auto.execute_rule(&mut f.goals, rule.id, None).unwrap();
        assert_eq!(execution.amount, 5_000);
        assert_eq!(f.goals.goal(f.goal).unwrap().current, 5_000);
        assert!(f.auto.due_rules().is_empty());
    }

    #[test]
    fn test_process_transaction_routes_by_direction() {
        let mut f = fixture(100_000);
        let round = f
            .auto
            .create_rule(&f.goals, f.goal, RuleKind::Roundup { multiplier: 1 })
            .unwrap()
            .id;
        let pct = f
            .auto
            .create_rule(&f.goals, f.goal, RuleKind::Percentage { percentage: 10.0 })
            .unwrap()
            .id;

        let out = f.auto.process_transaction(&mut f.goals, Direction::Outgoing, 4_735);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rule_id, round);

        let incoming = f.auto.process_transaction(&mut f.goals, Direction::Incoming, 10_000);
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].rule_id, pct);
        assert_eq!(incoming[0].amount, 1_000);

        assert_eq!(f.auto.total_saved(), 1_065);
        assert_eq!(f.goals.goal(f.goal).unwrap().current, 1_065);
        let stats = f.auto.rule_stats(pct);
        assert_eq!(stats.execution_count, 1);
        assert_eq!(stats.total_saved, 1_000);
    }

    #[test]
    fn test_failed_contribution_is_recorded() {
        let mut f = fixture(1_000);
        let rule = f
            .auto
            .create_rule(
                &f.goals,
                f.goal,
                RuleKind::Recurring { amount: 1_000, frequency: Frequency::Daily },
            )
            .unwrap()
            .id;
        f.auto.execute_rule(&mut f.goals, rule, None).unwrap();
        // goal is now completed
        assert!(f.auto.execute_rule(&mut f.goals, rule, None).is_err());

        let history = f.auto.history(rule);
        assert_eq!(history.len(), 2);
        assert!(history[0].succeeded());
        assert!(!history[1].succeeded());
        assert_eq!(f.auto.rule_stats(rule).execution_count, 1);
    }

    #[test]
    fn test_inactive_rules_are_skipped() {
        let mut f = fixture(100_000);
        let rule = f
            .auto
            .create_rule(&f.goals, f.goal, RuleKind::SpareChange { threshold: 100 })
            .unwrap()
            .id;
        f.auto
            .update_rule(rule, RuleUpdate { active: Some(false), ..Default::default() })
            .unwrap();
        assert!(f.auto.process_transaction(&mut f.goals, Direction::Outgoing, 50).is_empty());
        assert!(matches!(
            f.auto.execute_rule(&mut f.goals, rule, Some((Direction::Outgoing, 50))),
            Err(ServiceError::InvalidState(_))
        ));

        f.auto.delete_rule(rule).unwrap();
        assert!(f.auto.rules(Some(f.goal)).is_empty());
    }
}
