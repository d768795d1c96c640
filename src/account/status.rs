// Account status model.
//
// The persisted form is the integer code used by the account table
// (0 unset, 1..=4 migrate chain, 5..=6 decommission chain). In memory the two
// chains are separate variants so a migrate stage can never be compared with
// a decommission stage.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stages of an account being migrated into the target organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MigrationState {
    /// Left the source organization, ready to accept an invitation.
    Invited,
    /// Member of the target organization.
    Joined,
    /// Moved into the default organizational unit.
    Updated,
    /// Registered for monitoring.
    Monitored,
}

/// Stages of an account that is removed from its organization and closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DecommissionState {
    Left,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AccountStatus {
    /// Loaded but not yet touched by any step.
    #[default]
    Pending,
    Migrating(MigrationState),
    Decommissioning(DecommissionState),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusError {
    #[error("account status {from} cannot move to {to}: the account is on the other branch")]
    CrossBranch { from: AccountStatus, to: String },
    #[error("unknown account status code {0}")]
    UnknownCode(u8),
}

impl AccountStatus {
    pub fn code(&self) -> u8 {
        match self {
            AccountStatus::Pending => 0,
            AccountStatus::Migrating(MigrationState::Invited) => 1,
            AccountStatus::Migrating(MigrationState::Joined) => 2,
            AccountStatus::Migrating(MigrationState::Updated) => 3,
            AccountStatus::Migrating(MigrationState::Monitored) => 4,
            AccountStatus::Decommissioning(DecommissionState::Left) => 5,
            AccountStatus::Decommissioning(DecommissionState::Suspended) => 6,
        }
    }

    /// True when a migrate-chain step targeting `stage` has nothing left to do:
    /// the account is at or past it, or it has been routed to decommissioning.
    pub fn satisfies(&self, stage: MigrationState) -> bool {
        match self {
            AccountStatus::Pending => false,
            AccountStatus::Migrating(current) => *current >= stage,
            AccountStatus::Decommissioning(_) => true,
        }
    }

    /// True for accounts that have not yet reached `stage` on the migrate chain.
    pub fn is_below(&self, stage: MigrationState) -> bool {
        match self {
            AccountStatus::Pending => true,
            AccountStatus::Migrating(current) => *current < stage,
            AccountStatus::Decommissioning(_) => false,
        }
    }

    /// Move forward along the migrate chain. Never lowers the status; returns
    /// whether anything changed.
    pub fn advance_to(&mut self, stage: MigrationState) -> Result<bool, StatusError> {
        match *self {
            AccountStatus::Pending => {
                *self = AccountStatus::Migrating(stage);
                Ok(true)
            }
            AccountStatus::Migrating(current) if current < stage => {
                *self = AccountStatus::Migrating(stage);
                Ok(true)
            }
            AccountStatus::Migrating(_) => Ok(false),
            AccountStatus::Decommissioning(_) => Err(StatusError::CrossBranch {
                from: *self,
                to: format!("{stage:?}"),
            }),
        }
    }

    /// Move forward along the decommission chain.
    pub fn decommission(&mut self, stage: DecommissionState) -> Result<bool, StatusError> {
        match *self {
            AccountStatus::Pending => {
                *self = AccountStatus::Decommissioning(stage);
                Ok(true)
            }
            AccountStatus::Decommissioning(current) if current < stage => {
                *self = AccountStatus::Decommissioning(stage);
                Ok(true)
            }
            AccountStatus::Decommissioning(_) => Ok(false),
            AccountStatus::Migrating(_) => Err(StatusError::CrossBranch {
                from: *self,
                to: format!("{stage:?}"),
            }),
        }
    }
}

impl TryFrom<u8> for AccountStatus {
    type Error = StatusError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => AccountStatus::Pending,
            1 => AccountStatus::Migrating(MigrationState::Invited),
            2 => AccountStatus::Migrating(MigrationState::Joined),
            3 => AccountStatus::Migrating(MigrationState::Updated),
            4 => AccountStatus::Migrating(MigrationState::Monitored),
            5 => AccountStatus::Decommissioning(DecommissionState::Left),
            6 => AccountStatus::Decommissioning(DecommissionState::Suspended),
            other => return Err(StatusError::UnknownCode(other)),
        })
    }
}

impl From<AccountStatus> for u8 {
    fn from(status: AccountStatus) -> Self {
        status.code()
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountStatus::Pending => write!(f, "Pending"),
            AccountStatus::Migrating(stage) => write!(f, "{stage:?}"),
            AccountStatus::Decommissioning(stage) => write!(f, "{stage:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_is_monotonic() {
        let mut status = AccountStatus::Pending;
        assert_eq!(status.advance_to(MigrationState::Joined), Ok(true));
        assert_eq!(status.advance_to(MigrationState::Invited), Ok(false));
        assert_eq!(status, AccountStatus::Migrating(MigrationState::Joined));
        assert_eq!(status.advance_to(MigrationState::Updated), Ok(true));
        assert_eq!(status.code(), 3);
    }

    #[test]
    fn branches_do_not_cross() {
        let mut left = AccountStatus::Decommissioning(DecommissionState::Left);
        assert!(matches!(
            left.advance_to(MigrationState::Invited),
            Err(StatusError::CrossBranch { .. })
        ));

        let mut joined = AccountStatus::Migrating(MigrationState::Joined);
        assert!(joined.decommission(DecommissionState::Left).is_err());
        assert_eq!(joined, AccountStatus::Migrating(MigrationState::Joined));
    }

    #[test]
    fn decommission_only_moves_forward() {
        let mut status = AccountStatus::Pending;
        assert_eq!(status.decommission(DecommissionState::Left), Ok(true));
        assert_eq!(status.decommission(DecommissionState::Suspended), Ok(true));
        assert_eq!(status.decommission(DecommissionState::Left), Ok(false));
        assert_eq!(status.code(), 6);
    }

    #[test]
    fn satisfies_treats_decommissioned_accounts_as_done() {
        let left = AccountStatus::Decommissioning(DecommissionState::Left);
        assert!(left.satisfies(MigrationState::Updated));
        assert!(!left.is_below(MigrationState::Updated));
        assert!(!AccountStatus::Pending.satisfies(MigrationState::Invited));
        assert!(AccountStatus::Migrating(MigrationState::Joined).is_below(MigrationState::Updated));
    }

    #[test]
    fn persisted_as_integer_codes() {
        let json = serde_json::to_string(&AccountStatus::Migrating(MigrationState::Updated)).unwrap();
        assert_eq!(json, "3");
        let status: AccountStatus = serde_json::from_str("5").unwrap();
        assert_eq!(status, AccountStatus::Decommissioning(DecommissionState::Left));
        assert!(serde_json::from_str::<AccountStatus>("9").is_err());
    }
}
