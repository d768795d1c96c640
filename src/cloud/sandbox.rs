// Deterministic in-process cloud backend.
//
// Backs rehearsal runs from the CLI and the integration tests. Every call is
// journaled as "<operation>:<account id>", and failures can be injected per
// operation so each error path of a step can be exercised.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::errors::{ApiError, ApiErrorKind, ApiResult};
use super::traits::*;
use super::types::*;
use crate::account::AccountId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxOrganization {
    pub id: String,
    pub management_account_id: AccountId,
    pub root_id: String,
    #[serde(default)]
    pub units: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxRole {
    pub trust_policy: serde_json::Value,
    #[serde(default)]
    pub managed_policies: Vec<String>,
    #[serde(default)]
    pub inline_policies: BTreeMap<String, serde_json::Value>,
    /// Assume attempts that still fail before the role takes effect.
    #[serde(default)]
    pub propagation_delay: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxFinding {
    pub region: String,
    pub resource: String,
    pub status: FindingStatus,
    #[serde(default)]
    pub org_ids: Vec<String>,
    #[serde(default)]
    pub org_paths: Vec<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxAccount {
    pub id: AccountId,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub roles: BTreeMap<String, SandboxRole>,
    #[serde(default = "default_true")]
    pub billing_access: bool,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub analyzers: BTreeMap<String, Vec<Analyzer>>,
    #[serde(default)]
    pub findings: Vec<SandboxFinding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxHandshake {
    pub organization_id: String,
    pub handshake: Handshake,
}

fn default_times() -> u32 {
    1
}

/// A canned failure returned by the next matching call(s).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectedFailure {
    pub operation: String,
    #[serde(default)]
    pub account_id: Option<AccountId>,
    pub code: String,
    pub message: String,
    #[serde(default = "default_times")]
    pub times: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SandboxState {
    #[serde(default)]
    pub organizations: BTreeMap<String, SandboxOrganization>,
    #[serde(default)]
    pub accounts: BTreeMap<AccountId, SandboxAccount>,
    #[serde(default)]
    pub handshakes: Vec<SandboxHandshake>,
    #[serde(default)]
    pub support_cases: Vec<SupportCase>,
    #[serde(default)]
    pub regions: Vec<String>,
    /// Propagation delay given to roles created through the API.
    #[serde(default)]
    pub role_propagation_delay: u32,
    #[serde(default)]
    pub failures: Vec<InjectedFailure>,
    #[serde(default)]
    pub journal: Vec<String>,
    #[serde(default)]
    pub next_id: u64,
}

impl SandboxState {
    pub fn add_account(&mut self, id: &AccountId, email: &str, name: &str) -> &mut Self {
        self.accounts.entry(id.clone()).or_insert_with(|| SandboxAccount {
            id: id.clone(),
            email: email.to_string(),
            name: name.to_string(),
            organization_id: None,
            parent_id: None,
            roles: BTreeMap::new(),
            billing_access: true,
            closed: false,
            analyzers: BTreeMap::new(),
            findings: Vec::new(),
        });
        self
    }

    /// Create an organization whose management account sits under its root.
    pub fn add_organization(&mut self, org_id: &str, management: &AccountId) -> &mut Self {
        let root_id = format!("r-{}", org_id.trim_start_matches("o-"));
        self.organizations.insert(
            org_id.to_string(),
            SandboxOrganization {
                id: org_id.to_string(),
                management_account_id: management.clone(),
                root_id,
                units: Vec::new(),
            },
        );
        let email = format!("{management}@management.example");
        self.add_account(management, &email, "management");
        self.place(management, org_id, None)
    }

    pub fn add_unit(&mut self, org_id: &str, unit_id: &str) -> &mut Self {
        if let Some(org) = self.organizations.get_mut(org_id) {
            org.units.push(unit_id.to_string());
        }
        self
    }

    /// Put an account into an organization, under `parent` or the root.
    pub fn place(&mut self, account: &AccountId, org_id: &str, parent: Option<&str>) -> &mut Self {
        let root = self.organizations.get(org_id).map(|o| o.root_id.clone());
        if let Some(acct) = self.accounts.get_mut(account) {
            acct.organization_id = Some(org_id.to_string());
            acct.parent_id = parent.map(str::to_string).or(root);
        }
        self
    }

    pub fn add_role(&mut self, account: &AccountId, role_name: &str) -> &mut Self {
        if let Some(acct) = self.accounts.get_mut(account) {
            acct.roles.insert(
                role_name.to_string(),
                SandboxRole {
                    trust_policy: serde_json::Value::Null,
                    managed_policies: Vec::new(),
                    inline_policies: BTreeMap::new(),
                    propagation_delay: 0,
                },
            );
        }
        self
    }

    pub fn add_analyzer(&mut self, account: &AccountId, region: &str) -> &mut Self {
        if let Some(acct) = self.accounts.get_mut(account) {
            let analyzer = Analyzer {
                name: format!("analyzer-{region}"),
                arn: format!("arn:aws:access-analyzer:{region}:{account}:analyzer/analyzer-{region}"),
            };
            acct.analyzers.entry(region.to_string()).or_default().push(analyzer);
        }
        self
    }

    pub fn add_finding(&mut self, account: &AccountId, finding: SandboxFinding) -> &mut Self {
        if let Some(acct) = self.accounts.get_mut(account) {
            acct.findings.push(finding);
        }
        self
    }

    pub fn fail(
        &mut self,
        operation: &str,
        account: Option<&AccountId>,
        code: &str,
        times: u32,
    ) -> &mut Self {
        self.failures.push(InjectedFailure {
            operation: operation.to_string(),
            account_id: account.cloned(),
            code: code.to_string(),
            message: format!("injected failure for {operation}"),
            times,
        });
        self
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, operation: &str, account: &AccountId) -> ApiResult<()> {
        self.journal.push(format!("{operation}:{account}"));
        let position = self.failures.iter().position(|f| {
            f.operation == operation
                && f.times > 0
                && f.account_id.as_ref().map_or(true, |id| id == account)
        });
        if let Some(index) = position {
            let failure = &mut self.failures[index];
            failure.times -= 1;
            let error = ApiError::new(failure.code.clone(), failure.message.clone());
            if failure.times == 0 {
                self.failures.remove(index);
            }
            debug!(operation, account = %account, code = %error.code, "sandbox injected failure");
            return Err(error);
        }
        Ok(())
    }

    fn account(&self, id: &AccountId) -> ApiResult<&SandboxAccount> {
        self.accounts.get(id).ok_or_else(|| {
            ApiError::of_kind(ApiErrorKind::AccountNotFound, format!("account {id} does not exist"))
        })
    }

    fn account_mut(&mut self, id: &AccountId) -> ApiResult<&mut SandboxAccount> {
        self.accounts.get_mut(id).ok_or_else(|| {
            ApiError::of_kind(ApiErrorKind::AccountNotFound, format!("account {id} does not exist"))
        })
    }

    fn organization_of(&self, session: &Session) -> ApiResult<SandboxOrganization> {
        let not_in_use = || {
            ApiError::of_kind(
                ApiErrorKind::OrganizationsNotInUse,
                format!("account {} is not a member of an organization", session.account_id),
            )
        };
        let org_id = self
            .accounts
            .get(&session.account_id)
            .and_then(|a| a.organization_id.clone())
            .ok_or_else(not_in_use)?;
        self.organizations.get(&org_id).cloned().ok_or_else(not_in_use)
    }

    fn member_of(&self, org: &SandboxOrganization, id: &AccountId) -> ApiResult<&SandboxAccount> {
        let account = self.account(id)?;
        if account.organization_id.as_deref() != Some(org.id.as_str()) {
            return Err(ApiError::of_kind(
                ApiErrorKind::AccountNotFound,
                format!("account {id} is not a member of {}", org.id),
            ));
        }
        Ok(account)
    }

    fn org_account(org: &SandboxOrganization, account: &SandboxAccount) -> OrgAccount {
        OrgAccount {
            id: account.id.clone(),
            arn: format!(
                "arn:aws:organizations::{}:account/{}/{}",
                org.management_account_id, org.id, account.id
            ),
            email: account.email.clone(),
            name: account.name.clone(),
        }
    }

    fn role_mut(&mut self, session: &Session, role_name: &str) -> ApiResult<&mut SandboxRole> {
        self.account_mut(&session.account_id)?
            .roles
            .get_mut(role_name)
            .ok_or_else(|| {
                ApiError::of_kind(ApiErrorKind::NoSuchEntity, format!("role {role_name} not found"))
            })
    }
}

/// In-memory implementation of every cloud interface.
#[derive(Debug, Default)]
pub struct SandboxCloud {
    state: Mutex<SandboxState>,
}

impl SandboxCloud {
    pub fn new(state: SandboxState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(Self::new(serde_json::from_str(&raw)?))
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(&self.snapshot())?;
        tokio::fs::write(path, raw).await?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, SandboxState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> SandboxState {
        self.lock().clone()
    }

    /// Mutate the simulated world between step invocations.
    pub fn update(&self, f: impl FnOnce(&mut SandboxState)) {
        f(&mut self.lock());
    }

    pub fn journal(&self) -> Vec<String> {
        self.lock().journal.clone()
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        let prefix = format!("{operation}:");
        self.lock()
            .journal
            .iter()
            .filter(|entry| entry.starts_with(&prefix))
            .count()
    }

    pub fn set_case_status(&self, case_id: &str, status: &str) {
        let mut state = self.lock();
        if let Some(case) = state.support_cases.iter_mut().find(|c| c.case_id == case_id) {
            case.status = status.to_string();
        }
    }
}

#[async_trait]
impl SessionProvider for SandboxCloud {
    async fn assume_role(&self, role: &RoleArn, _via: Option<&Session>) -> ApiResult<Session> {
        let mut state = self.lock();
        state.record("assume_role", &role.account_id)?;
        let denied = |why: &str| ApiError::of_kind(ApiErrorKind::AccessDenied, format!("cannot assume {role}: {why}"));
        let account = state.accounts.get_mut(&role.account_id).ok_or_else(|| denied("no such account"))?;
        if account.closed {
            return Err(denied("account is closed"));
        }
        let sandbox_role = account.roles.get_mut(&role.role_name).ok_or_else(|| denied("no such role"))?;
        if sandbox_role.propagation_delay > 0 {
            sandbox_role.propagation_delay -= 1;
            return Err(denied("role has not propagated"));
        }
        Ok(Session::assumed(role.account_id.clone(), role.role_name.clone()))
    }
}

#[async_trait]
impl OrganizationsApi for SandboxCloud {
    async fn describe_organization(&self, session: &Session) -> ApiResult<Organization> {
        let mut state = self.lock();
        state.record("describe_organization", &session.account_id)?;
        let org = state.organization_of(session)?;
        Ok(Organization {
            id: org.id,
            management_account_id: org.management_account_id,
        })
    }

    async fn describe_account(&self, session: &Session, account_id: &AccountId) -> ApiResult<OrgAccount> {
        let mut state = self.lock();
        state.record("describe_account", account_id)?;
        let org = state.organization_of(session)?;
        let account = state.member_of(&org, account_id)?;
        Ok(SandboxState::org_account(&org, account))
    }

    async fn list_accounts(&self, session: &Session) -> ApiResult<Vec<OrgAccount>> {
        let mut state = self.lock();
        state.record("list_accounts", &session.account_id)?;
        let org = state.organization_of(session)?;
        Ok(state
            .accounts
            .values()
            .filter(|a| a.organization_id.as_deref() == Some(org.id.as_str()))
            .map(|a| SandboxState::org_account(&org, a))
            .collect())
    }

    async fn remove_account_from_organization(&self, session: &Session, account_id: &AccountId) -> ApiResult<()> {
        let mut state = self.lock();
        state.record("remove_account_from_organization", account_id)?;
        let org = state.organization_of(session)?;
        state.member_of(&org, account_id)?;
        if org.management_account_id == *account_id {
            return Err(ApiError::of_kind(
                ApiErrorKind::ConstraintViolation,
                "the management account cannot leave its own organization",
            ));
        }
        let account = state.account_mut(account_id)?;
        account.organization_id = None;
        account.parent_id = None;
        Ok(())
    }

    async fn delete_organization(&self, session: &Session) -> ApiResult<()> {
        let mut state = self.lock();
        state.record("delete_organization", &session.account_id)?;
        let org = state.organization_of(session)?;
        let members = state
            .accounts
            .values()
            .filter(|a| a.organization_id.as_deref() == Some(org.id.as_str()))
            .count();
        if members > 1 {
            return Err(ApiError::new(
                "OrganizationNotEmptyException",
                format!("organization {} still has member accounts", org.id),
            ));
        }
        state.organizations.remove(&org.id);
        let management = state.account_mut(&org.management_account_id)?;
        management.organization_id = None;
        management.parent_id = None;
        Ok(())
    }

    async fn list_invite_handshakes(&self, session: &Session) -> ApiResult<Vec<Handshake>> {
        let mut state = self.lock();
        state.record("list_invite_handshakes", &session.account_id)?;
        let org = state.organization_of(session)?;
        Ok(state
            .handshakes
            .iter()
            .filter(|h| h.organization_id == org.id)
            .map(|h| h.handshake.clone())
            .collect())
    }

    async fn invite_account(&self, session: &Session, account_id: &AccountId, _notes: &str) -> ApiResult<Handshake> {
        let mut state = self.lock();
        state.record("invite_account", account_id)?;
        let org = state.organization_of(session)?;
        state.account(account_id)?;
        let handshake = Handshake {
            id: format!("h-{:08}", state.next()),
            state: HandshakeState::Open,
            parties: vec![
                HandshakeParty {
                    id: org.id.clone(),
                    party_type: PartyType::Organization,
                },
                HandshakeParty {
                    id: account_id.to_string(),
                    party_type: PartyType::Account,
                },
            ],
        };
        state.handshakes.push(SandboxHandshake {
            organization_id: org.id,
            handshake: handshake.clone(),
        });
        Ok(handshake)
    }

    async fn accept_handshake(&self, session: &Session, handshake_id: &str) -> ApiResult<()> {
        let mut state = self.lock();
        state.record("accept_handshake", &session.account_id)?;
        let index = state
            .handshakes
            .iter()
            .position(|h| h.handshake.id == handshake_id)
            .ok_or_else(|| ApiError::new("HandshakeNotFoundException", format!("{handshake_id} not found")))?;
        let entry = state.handshakes[index].clone();
        if !entry.handshake.is_open_invite_for(&session.account_id) {
            return Err(ApiError::new(
                "InvalidHandshakeTransitionException",
                format!("{handshake_id} is not an open invitation for {}", session.account_id),
            ));
        }
        if state.account(&session.account_id)?.organization_id.is_some() {
            return Err(ApiError::of_kind(
                ApiErrorKind::HandshakeConstraintViolation,
                "the account is already a member of an organization",
            ));
        }
        state.handshakes[index].handshake.state = HandshakeState::Accepted;
        let account = session.account_id.clone();
        state.place(&account, &entry.organization_id, None);
        Ok(())
    }

    async fn list_parents(&self, session: &Session, account_id: &AccountId) -> ApiResult<Vec<Parent>> {
        let mut state = self.lock();
        state.record("list_parents", account_id)?;
        let org = state.organization_of(session)?;
        let account = state.member_of(&org, account_id)?;
        Ok(account
            .parent_id
            .iter()
            .map(|id| Parent {
                id: id.clone(),
                parent_type: if *id == org.root_id {
                    ParentType::Root
                } else {
                    ParentType::OrganizationalUnit
                },
            })
            .collect())
    }

    async fn move_account(
        &self,
        session: &Session,
        account_id: &AccountId,
        source_parent_id: &str,
        destination_parent_id: &str,
    ) -> ApiResult<()> {
        let mut state = self.lock();
        state.record("move_account", account_id)?;
        let org = state.organization_of(session)?;
        let account = state.member_of(&org, account_id)?;
        if account.parent_id.as_deref() != Some(source_parent_id) {
            return Err(ApiError::new(
                "SourceParentNotFoundException",
                format!("{account_id} is not under {source_parent_id}"),
            ));
        }
        if destination_parent_id != org.root_id && !org.units.iter().any(|u| u == destination_parent_id) {
            return Err(ApiError::new(
                "DestinationParentNotFoundException",
                format!("{destination_parent_id} does not exist in {}", org.id),
            ));
        }
        state.account_mut(account_id)?.parent_id = Some(destination_parent_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl IamApi for SandboxCloud {
    async fn get_role(&self, session: &Session, role_name: &str) -> ApiResult<Role> {
        let mut state = self.lock();
        state.record("get_role", &session.account_id)?;
        state.role_mut(session, role_name)?;
        Ok(Role {
            name: role_name.to_string(),
            arn: RoleArn::new(&session.account_id, role_name).to_string(),
        })
    }

    async fn create_role(&self, session: &Session, role_name: &str, trust_policy: &serde_json::Value) -> ApiResult<Role> {
        let mut state = self.lock();
        state.record("create_role", &session.account_id)?;
        let delay = state.role_propagation_delay;
        let account = state.account_mut(&session.account_id)?;
        if account.roles.contains_key(role_name) {
            return Err(ApiError::new("EntityAlreadyExists", format!("role {role_name} exists")));
        }
        account.roles.insert(
            role_name.to_string(),
            SandboxRole {
                trust_policy: trust_policy.clone(),
                managed_policies: Vec::new(),
                inline_policies: BTreeMap::new(),
                propagation_delay: delay,
            },
        );
        Ok(Role {
            name: role_name.to_string(),
            arn: RoleArn::new(&session.account_id, role_name).to_string(),
        })
    }

    async fn attach_role_policy(&self, session: &Session, role_name: &str, policy_arn: &str) -> ApiResult<()> {
        let mut state = self.lock();
        state.record("attach_role_policy", &session.account_id)?;
        state.role_mut(session, role_name)?.managed_policies.push(policy_arn.to_string());
        Ok(())
    }

    async fn put_role_policy(
        &self,
        session: &Session,
        role_name: &str,
        policy_name: &str,
        document: &serde_json::Value,
    ) -> ApiResult<()> {
        let mut state = self.lock();
        state.record("put_role_policy", &session.account_id)?;
        state
            .role_mut(session, role_name)?
            .inline_policies
            .insert(policy_name.to_string(), document.clone());
        Ok(())
    }
}

#[async_trait]
impl BillingApi for SandboxCloud {
    async fn get_cost_and_usage(&self, session: &Session, _start: NaiveDate, _end: NaiveDate) -> ApiResult<()> {
        let mut state = self.lock();
        state.record("get_cost_and_usage", &session.account_id)?;
        if !state.account(&session.account_id)?.billing_access {
            return Err(ApiError::new(
                "AccessDeniedException",
                "user is not authorized to perform ce:GetCostAndUsage",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl AccessAnalyzerApi for SandboxCloud {
    async fn list_analyzers(&self, session: &Session, region: &str) -> ApiResult<Vec<Analyzer>> {
        let mut state = self.lock();
        state.record("list_analyzers", &session.account_id)?;
        Ok(state
            .account(&session.account_id)?
            .analyzers
            .get(region)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_analyzer(&self, session: &Session, region: &str, name: &str) -> ApiResult<Analyzer> {
        let mut state = self.lock();
        state.record("create_analyzer", &session.account_id)?;
        let account = state.account_mut(&session.account_id)?;
        let analyzer = Analyzer {
            name: name.to_string(),
            arn: format!("arn:aws:access-analyzer:{region}:{}:analyzer/{name}", account.id),
        };
        account.analyzers.entry(region.to_string()).or_default().push(analyzer.clone());
        Ok(analyzer)
    }

    async fn list_findings(
        &self,
        session: &Session,
        region: &str,
        _analyzer_arn: &str,
        filter: &FindingFilter,
    ) -> ApiResult<Vec<Finding>> {
        let mut state = self.lock();
        state.record("list_findings", &session.account_id)?;
        let account = state.account(&session.account_id)?;
        Ok(account
            .findings
            .iter()
            .enumerate()
            .filter(|(_, f)| f.region == region)
            .filter(|(_, f)| {
                let values = match filter.condition {
                    OrgCondition::PrincipalOrgId => &f.org_ids,
                    OrgCondition::PrincipalOrgPaths => &f.org_paths,
                };
                values.iter().any(|v| v.contains(&filter.contains))
            })
            .map(|(index, f)| Finding {
                id: format!("finding-{index}"),
                resource: f.resource.clone(),
                status: f.status,
            })
            .collect())
    }
}

#[async_trait]
impl SupportApi for SandboxCloud {
    async fn create_case(&self, session: &Session, _request: &CaseRequest) -> ApiResult<String> {
        let mut state = self.lock();
        state.record("create_case", &session.account_id)?;
        let n = state.next();
        let case = SupportCase {
            case_id: format!("case-{}-{n:06}", session.account_id),
            display_id: Some(format!("{n:010}")),
            status: "opened".to_string(),
        };
        let id = case.case_id.clone();
        state.support_cases.push(case);
        Ok(id)
    }

    async fn describe_case(&self, session: &Session, case_id: &str) -> ApiResult<SupportCase> {
        let mut state = self.lock();
        state.record("describe_case", &session.account_id)?;
        state
            .support_cases
            .iter()
            .find(|c| c.case_id == case_id)
            .cloned()
            .ok_or_else(|| ApiError::new("CaseIdNotFound", format!("case {case_id} not found")))
    }
}

#[async_trait]
impl RegionDirectory for SandboxCloud {
    async fn enabled_regions(&self, session: &Session) -> ApiResult<Vec<String>> {
        let mut state = self.lock();
        state.record("enabled_regions", &session.account_id)?;
        Ok(state.regions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> AccountId {
        raw.parse().unwrap()
    }

    #[tokio::test]
    async fn handshake_moves_account_between_organizations() {
        let mut state = SandboxState::default();
        state
            .add_organization("o-target", &id("1"))
            .add_account(&id("2"), "two@example.com", "two");
        let cloud = SandboxCloud::new(state);
        let engine = Session::engine(id("1"));

        let handshake = cloud.invite_account(&engine, &id("2"), "join us").await.unwrap();
        let member = Session::assumed(id("2"), "MasterRole");
        cloud.accept_handshake(&member, &handshake.id).await.unwrap();

        let accounts = cloud.list_accounts(&engine).await.unwrap();
        assert_eq!(accounts.len(), 2);
        let second = cloud.accept_handshake(&member, &handshake.id).await.unwrap_err();
        assert_eq!(second.code, "InvalidHandshakeTransitionException");
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let mut state = SandboxState::default();
        state
            .add_organization("o-target", &id("1"))
            .fail("list_accounts", None, "ConcurrentModificationException", 1);
        let cloud = SandboxCloud::new(state);
        let engine = Session::engine(id("1"));

        let err = cloud.list_accounts(&engine).await.unwrap_err();
        assert!(err.is(ApiErrorKind::ConcurrentModification));
        assert!(cloud.list_accounts(&engine).await.is_ok());
        assert_eq!(cloud.calls_to("list_accounts"), 2);
    }

    #[tokio::test]
    async fn new_roles_wait_for_propagation() {
        let mut state = SandboxState::default();
        state.add_account(&id("3"), "three@example.com", "three");
        state.role_propagation_delay = 1;
        let cloud = SandboxCloud::new(state);
        let session = Session::engine(id("3"));
        cloud.create_role(&session, "MasterRole", &serde_json::json!({})).await.unwrap();

        let arn = RoleArn::new(&id("3"), "MasterRole");
        assert!(cloud.assume_role(&arn, None).await.is_err());
        assert!(cloud.assume_role(&arn, None).await.is_ok());
    }
}
