use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{AccountId, AccountStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    Linked,
    Master,
    Standalone,
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccountType::Linked => "Linked",
            AccountType::Master => "Master",
            AccountType::Standalone => "Standalone",
        };
        f.write_str(name)
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Linked" => Ok(AccountType::Linked),
            "Master" => Ok(AccountType::Master),
            "Standalone" => Ok(AccountType::Standalone),
            other => Err(format!("unknown account type '{other}'")),
        }
    }
}

fn default_migrate() -> bool {
    true
}

/// One row of the account table, keyed by (company name, account id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountRecord {
    pub company_name: String,
    pub account_id: AccountId,
    pub account_type: AccountType,
    /// Role assumed to act inside this account.
    pub admin_role: String,
    #[serde(default = "default_migrate")]
    pub migrate: bool,
    #[serde(default)]
    pub account_status: AccountStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handshake_id: Option<String>,
    /// Latest human-readable failure, for operators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub org_level_permissions: Vec<String>,
    #[serde(default)]
    pub is_permissions_scanned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_case_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_case_display_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_case_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_on: Option<DateTime<Utc>>,
}

impl AccountRecord {
    pub fn new(
        company_name: impl Into<String>,
        account_id: AccountId,
        account_type: AccountType,
        admin_role: impl Into<String>,
    ) -> Self {
        Self {
            company_name: company_name.into(),
            account_id,
            account_type,
            admin_role: admin_role.into(),
            migrate: true,
            account_status: AccountStatus::Pending,
            handshake_id: None,
            error: None,
            email: None,
            name: None,
            org_level_permissions: Vec::new(),
            is_permissions_scanned: false,
            support_case_id: None,
            support_case_display_id: None,
            support_case_status: None,
            slack_handle: None,
            last_updated_on: None,
        }
    }

    pub fn with_migrate(mut self, migrate: bool) -> Self {
        self.migrate = migrate;
        self
    }

    pub fn with_status(mut self, status: AccountStatus) -> Self {
        self.account_status = status;
        self
    }

    pub fn with_slack_handle(mut self, handle: impl Into<String>) -> Self {
        self.slack_handle = Some(handle.into());
        self
    }

    pub fn is_type(&self, account_type: AccountType) -> bool {
        self.account_type == account_type
    }

    pub fn slack_handle(&self) -> Option<&str> {
        self.slack_handle.as_deref()
    }
}
