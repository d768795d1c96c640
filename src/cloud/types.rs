// Data shapes exchanged with the remote organization-management services

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::account::AccountId;

/// The principal an API call runs as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub account_id: AccountId,
    /// `None` for the engine's own credentials in the management account.
    pub role_name: Option<String>,
}

impl Session {
    pub fn engine(account_id: AccountId) -> Self {
        Self {
            account_id,
            role_name: None,
        }
    }

    pub fn assumed(account_id: AccountId, role_name: impl Into<String>) -> Self {
        Self {
            account_id,
            role_name: Some(role_name.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleArn {
    pub account_id: AccountId,
    pub role_name: String,
}

impl RoleArn {
    pub fn new(account_id: &AccountId, role_name: &str) -> Self {
        Self {
            account_id: account_id.clone(),
            role_name: role_name.to_string(),
        }
    }
}

impl fmt::Display for RoleArn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "arn:aws:iam::{}:role/{}", self.account_id, self.role_name)
    }
}

impl FromStr for RoleArn {
    type Err = String;

    fn from_str(arn: &str) -> Result<Self, Self::Err> {
        let rest = arn
            .strip_prefix("arn:aws:iam::")
            .ok_or_else(|| format!("'{arn}' is not an IAM role ARN"))?;
        let (account, role) = rest
            .split_once(":role/")
            .ok_or_else(|| format!("'{arn}' is not an IAM role ARN"))?;
        let account_id = account.parse::<AccountId>().map_err(|e| e.to_string())?;
        if role.is_empty() {
            return Err(format!("'{arn}' has no role name"));
        }
        Ok(Self {
            account_id,
            role_name: role.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub management_account_id: AccountId,
}

/// An account as described by the organization it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgAccount {
    pub id: AccountId,
    pub arn: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeState {
    Open,
    Accepted,
    Declined,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyType {
    Account,
    Organization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeParty {
    pub id: String,
    pub party_type: PartyType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub id: String,
    pub state: HandshakeState,
    pub parties: Vec<HandshakeParty>,
}

impl Handshake {
    pub fn is_open_invite_for(&self, account_id: &AccountId) -> bool {
        self.state == HandshakeState::Open
            && self
                .parties
                .iter()
                .any(|p| p.party_type == PartyType::Account && p.id == account_id.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParentType {
    Root,
    OrganizationalUnit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parent {
    pub id: String,
    pub parent_type: ParentType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analyzer {
    pub name: String,
    pub arn: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FindingStatus {
    Active,
    Archived,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub resource: String,
    pub status: FindingStatus,
}

/// Organization-scoped policy conditions the analyzer can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrgCondition {
    PrincipalOrgId,
    PrincipalOrgPaths,
}

impl OrgCondition {
    pub const ALL: [OrgCondition; 2] = [OrgCondition::PrincipalOrgId, OrgCondition::PrincipalOrgPaths];

    pub fn filter_key(&self) -> &'static str {
        match self {
            OrgCondition::PrincipalOrgId => "condition.aws:PrincipalOrgID",
            OrgCondition::PrincipalOrgPaths => "condition.aws:PrincipalOrgPaths",
        }
    }
}

/// "findings whose `condition` contains `value`"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingFilter {
    pub condition: OrgCondition,
    pub contains: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRequest {
    pub subject: String,
    pub communication_body: String,
    pub severity_code: String,
    pub category_code: String,
    pub service_code: String,
    pub language: String,
    pub issue_type: String,
    pub cc_email_addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportCase {
    pub case_id: String,
    pub display_id: Option<String>,
    pub status: String,
}

impl SupportCase {
    pub fn is_resolved(&self) -> bool {
        self.status.eq_ignore_ascii_case("resolved")
    }
}
