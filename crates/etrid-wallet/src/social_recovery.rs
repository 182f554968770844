//! # Social recovery
//!
//! Trusted guardians can restore access to a wallet on a new device.
//!
//! ```text
//!   add_guardian ──► Pending ──accept──► Active
//!
//!   initiate ──► Initiated ──approve × threshold──► Approved
//!                   │                                  │ 48 h after initiation
//!                   └──cancel──► Cancelled             └──complete──► Completed
//! ```
//!
//! The threshold defaults to a majority of the guardians and can be set to
//! anything between one and the number of active guardians.

use crate::check_address;
use crate::clock::Clock;
use crate::error::{ServiceError, ServiceResult};
use chrono::{DateTime, Duration, Utc};
use etrid_core::AccountId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub const MAX_GUARDIANS: usize = 10;

/// Time between initiation and completion
pub const RECOVERY_DELAY_HOURS: i64 = 48;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardianStatus {
    Pending,
    Active,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guardian {
    pub id: Uuid,
    pub address: AccountId,
    pub username: Option<String>,
    pub status: GuardianStatus,
    pub added_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryStatus {
    Initiated,
    Approved,
    Completed,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub guardian: AccountId,
    pub signature: String,
    pub approved_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryProcess {
    pub id: Uuid,
    pub new_device_id: String,
    pub new_address: Option<AccountId>,
    pub status: RecoveryStatus,
    pub required_approvals: usize,
    pub approvals: Vec<Approval>,
    pub initiated_at: DateTime<Utc>,
    pub completes_at: DateTime<Utc>,
}

impl RecoveryProcess {
    /// Enough guardians have approved
    pub fn is_ready(&self) -> bool {
        self.approvals.len() >= self.required_approvals
    }

    pub fn delay_passed(&self, now: DateTime<Utc>) -> bool {
        now >= self.completes_at
    }

    fn in_progress(&self) -> bool {
        matches!(self.status, RecoveryStatus::Initiated | RecoveryStatus::Approved)
    }
}

/// Suggested approvals for `guardians` guardians
///
/// | guardians | threshold |
/// |-----------|-----------|
/// | 1, 2      | all       |
/// | 3         | 2         |
/// | 4         | 3         |
/// | 5         | 3         |
/// | 6+        | ⌈60 %⌉    |
pub fn recommended_threshold(guardians: usize) -> usize {
    match guardians {
        0..=2 => guardians,
        3 => 2,
        4 | 5 => 3,
        n => (n * 3).div_ceil(5),
    }
}

/// Recovery configuration of one wallet
pub struct SocialRecovery {
    wallet: AccountId,
    clock: Arc<dyn Clock>,
    guardians: Vec<Guardian>,
    threshold: Option<usize>,
    recoveries: Vec<RecoveryProcess>,
}

impl SocialRecovery {
    pub fn new(wallet: impl Into<AccountId>, clock: Arc<dyn Clock>) -> Self {
        Self {
            wallet: wallet.into(),
            clock,
            guardians: Vec::new(),
            threshold: None,
            recoveries: Vec::new(),
        }
    }

    // ========================================================================
    // GUARDIANS
    // ========================================================================

    pub fn guardians(&self) -> &[Guardian] {
        &self.guardians
    }

    pub fn active_guardians(&self) -> impl Iterator<Item = &Guardian> {
        self.guardians
            .iter()
            .filter(|g| g.status == GuardianStatus::Active)
    }

    /// Invite a guardian; it stays pending until accepted
    pub fn add_guardian(&mut self, address: &str, username: Option<String>) -> ServiceResult<&Guardian> {
        check_address(address)?;
        if address == self.wallet {
            return Err(ServiceError::invalid("Cannot add yourself as a guardian"));
        }
        if self.guardians.iter().any(|g| g.address == address) {
            return Err(ServiceError::AlreadyExists("Guardian".into()));
        }
        if self.guardians.len() >= MAX_GUARDIANS {
            return Err(ServiceError::invalid("Maximum number of guardians reached"));
        }
        self.guardians.push(Guardian {
            id: Uuid::new_v4(),
            address: address.to_string(),
            username,
            status: GuardianStatus::Pending,
            added_at: self.clock.now(),
            activated_at: None,
        });
        tracing::debug!(wallet = %self.wallet, guardian = address, "Guardian invited");
        self.guardians.last().ok_or(ServiceError::NotFound("Guardian"))
    }

    /// The invited guardian accepts the role
    pub fn accept_guardian(&mut self, address: &str) -> ServiceResult<&Guardian> {
        let now = self.clock.now();
        let guardian = self
            .guardians
            .iter_mut()
            .find(|g| g.address == address)
            .ok_or(ServiceError::NotFound("Guardian"))?;
        if guardian.status == GuardianStatus::Active {
            return Err(ServiceError::InvalidState("Guardian already active".into()));
        }
        guardian.status = GuardianStatus::Active;
        guardian.activated_at = Some(now);
        Ok(&*guardian)
    }

    /// Remove a guardian, clamping an explicit threshold to what remains
    pub fn remove_guardian(&mut self, address: &str) -> ServiceResult<Guardian> {
        let index = self
            .guardians
            .iter()
            .position(|g| g.address == address)
            .ok_or(ServiceError::NotFound("Guardian"))?;
        let removed = self.guardians.remove(index);
        let active = self.active_guardians().count();
        if let Some(t) = self.threshold {
            self.threshold = (active > 0).then_some(t.min(active));
        }
        Ok(removed)
    }

    // ========================================================================
    // THRESHOLD
    // ========================================================================

    /// Explicit threshold, or a majority of all guardians
    pub fn threshold(&self) -> usize {
        self.threshold
            .unwrap_or_else(|| self.guardians.len().div_ceil(2))
    }

    pub fn set_threshold(&mut self, threshold: usize) -> ServiceResult<()> {
        if threshold < 1 {
            return Err(ServiceError::invalid("Threshold must be at least 1"));
        }
        if threshold > self.active_guardians().count() {
            return Err(ServiceError::invalid(
                "Threshold cannot exceed number of active guardians",
            ));
        }
        self.threshold = Some(threshold);
        Ok(())
    }

    // ========================================================================
    // RECOVERY
    // ========================================================================

    pub fn initiate_recovery(
        &mut self,
        new_device_id: &str,
        new_address: Option<AccountId>,
    ) -> ServiceResult<&RecoveryProcess> {
        let threshold = self.threshold();
        if threshold == 0 || self.active_guardians().count() < threshold {
            return Err(ServiceError::InvalidState(
                "Not enough active guardians for recovery".into(),
            ));
        }
        if let Some(address) = &new_address {
            check_address(address)?;
        }
        if self.active_recovery().is_some() {
            return Err(ServiceError::InvalidState("Recovery already in progress".into()));
        }

        let now = self.clock.now();
        self.recoveries.push(RecoveryProcess {
            id: Uuid::new_v4(),
            new_device_id: new_device_id.to_string(),
            new_address,
            status: RecoveryStatus::Initiated,
            required_approvals: threshold,
            approvals: Vec::new(),
            initiated_at: now,
            completes_at: now + Duration::hours(RECOVERY_DELAY_HOURS),
        });
        tracing::info!(wallet = %self.wallet, threshold, "Recovery initiated");
        self.recoveries.last().ok_or(ServiceError::NotFound("Recovery"))
    }

    pub fn active_recovery(&self) -> Option<&RecoveryProcess> {
        self.recoveries.iter().find(|r| r.in_progress())
    }

    pub fn recovery(&self, id: Uuid) -> ServiceResult<&RecoveryProcess> {
        self.recoveries
            .iter()
            .find(|r| r.id == id)
            .ok_or(ServiceError::NotFound("Recovery"))
    }

    fn recovery_mut(&mut self, id: Uuid) -> ServiceResult<&mut RecoveryProcess> {
        self.recoveries
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(ServiceError::NotFound("Recovery"))
    }

    pub fn approve_recovery(&mut self, id: Uuid, guardian: &str, signature: &str) -> ServiceResult<&RecoveryProcess> {
        if !self.active_guardians().any(|g| g.address == guardian) {
            return Err(ServiceError::NotPermitted(
                "Only active guardians can approve a recovery".into(),
            ));
        }
        let now = self.clock.now();
        let recovery = self.recovery_mut(id)?;
        if !recovery.in_progress() {
            return Err(ServiceError::InvalidState("Recovery is not in progress".into()));
        }
        if recovery.approvals.iter().any(|a| a.guardian == guardian) {
            return Err(ServiceError::AlreadyExists("Approval".into()));
        }
        recovery.approvals.push(Approval {
            guardian: guardian.to_string(),
            signature: signature.to_string(),
            approved_at: now,
        });
        if recovery.is_ready() {
            recovery.status = RecoveryStatus::Approved;
        }
        Ok(&*recovery)
    }

    pub fn cancel_recovery(&mut self, id: Uuid) -> ServiceResult<()> {
        let recovery = self.recovery_mut(id)?;
        if !recovery.in_progress() {
            return Err(ServiceError::InvalidState("Recovery is not in progress".into()));
        }
        recovery.status = RecoveryStatus::Cancelled;
        Ok(())
    }

    pub fn delay_passed(&self, id: Uuid) -> ServiceResult<bool> {
        Ok(self.recovery(id)?.delay_passed(self.clock.now()))
    }

    /// Finish an approved recovery once the delay has passed
    pub fn complete_recovery(&mut self, id: Uuid) -> ServiceResult<&RecoveryProcess> {
        let now = self.clock.now();
        let recovery = self.recovery_mut(id)?;
        if recovery.status != RecoveryStatus::Approved {
            return Err(ServiceError::InvalidState(
                "Recovery has not reached its approval threshold".into(),
            ));
        }
        if !recovery.delay_passed(now) {
            return Err(ServiceError::InvalidState(format!(
                "Recovery delay ends at {}",
                recovery.completes_at
            )));
        }
        recovery.status = RecoveryStatus::Completed;
        Ok(&*recovery)
    }
}
