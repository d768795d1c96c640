// Interfaces to the remote cloud services, injected so steps can run against
// the sandbox as well as a live backend.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

use super::errors::ApiResult;
use super::types::*;
use crate::account::AccountId;

/// Credential assumption
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Assume `role`, optionally chaining from an already assumed session.
    async fn assume_role(&self, role: &RoleArn, via: Option<&Session>) -> ApiResult<Session>;
}

/// Organization management interface
#[async_trait]
pub trait OrganizationsApi: Send + Sync {
    /// Describe the organization the session's account belongs to
    async fn describe_organization(&self, session: &Session) -> ApiResult<Organization>;

    /// Describe a member account of the session's organization
    async fn describe_account(&self, session: &Session, account_id: &AccountId)
        -> ApiResult<OrgAccount>;

    /// List all member accounts, management account included
    async fn list_accounts(&self, session: &Session) -> ApiResult<Vec<OrgAccount>>;

    /// Remove a member account from the session's organization
    async fn remove_account_from_organization(
        &self,
        session: &Session,
        account_id: &AccountId,
    ) -> ApiResult<()>;

    /// Delete the session's organization; it must have no other members
    async fn delete_organization(&self, session: &Session) -> ApiResult<()>;

    /// List invitation handshakes sent by the session's organization
    async fn list_invite_handshakes(&self, session: &Session) -> ApiResult<Vec<Handshake>>;

    /// Invite an account into the session's organization
    async fn invite_account(
        &self,
        session: &Session,
        account_id: &AccountId,
        notes: &str,
    ) -> ApiResult<Handshake>;

    /// Accept a handshake on behalf of the session's account
    async fn accept_handshake(&self, session: &Session, handshake_id: &str) -> ApiResult<()>;

    /// Parents of an account inside the session's organization
    async fn list_parents(&self, session: &Session, account_id: &AccountId) -> ApiResult<Vec<Parent>>;

    /// Move an account between parents
    async fn move_account(
        &self,
        session: &Session,
        account_id: &AccountId,
        source_parent_id: &str,
        destination_parent_id: &str,
    ) -> ApiResult<()>;
}

/// Identity and access management interface
#[async_trait]
pub trait IamApi: Send + Sync {
    /// Fetch a role; fails with `NoSuchEntity` when it does not exist
    async fn get_role(&self, session: &Session, role_name: &str) -> ApiResult<Role>;

    async fn create_role(
        &self,
        session: &Session,
        role_name: &str,
        trust_policy: &serde_json::Value,
    ) -> ApiResult<Role>;

    /// Attach a managed policy by ARN
    async fn attach_role_policy(&self, session: &Session, role_name: &str, policy_arn: &str)
        -> ApiResult<()>;

    /// Put an inline policy document
    async fn put_role_policy(
        &self,
        session: &Session,
        role_name: &str,
        policy_name: &str,
        document: &serde_json::Value,
    ) -> ApiResult<()>;
}

/// Cost and billing interface
#[async_trait]
pub trait BillingApi: Send + Sync {
    /// Daily unblended cost for `[start, end)`; only the access outcome matters here
    async fn get_cost_and_usage(&self, session: &Session, start: NaiveDate, end: NaiveDate)
        -> ApiResult<()>;
}

/// External-access analyzer interface
#[async_trait]
pub trait AccessAnalyzerApi: Send + Sync {
    async fn list_analyzers(&self, session: &Session, region: &str) -> ApiResult<Vec<Analyzer>>;

    /// Create an account-scoped analyzer
    async fn create_analyzer(&self, session: &Session, region: &str, name: &str) -> ApiResult<Analyzer>;

    async fn list_findings(
        &self,
        session: &Session,
        region: &str,
        analyzer_arn: &str,
        filter: &FindingFilter,
    ) -> ApiResult<Vec<Finding>>;
}

/// Provider support-case interface
#[async_trait]
pub trait SupportApi: Send + Sync {
    /// Open a case and return its id
    async fn create_case(&self, session: &Session, request: &CaseRequest) -> ApiResult<String>;

    async fn describe_case(&self, session: &Session, case_id: &str) -> ApiResult<SupportCase>;
}

/// Region discovery
#[async_trait]
pub trait RegionDirectory: Send + Sync {
    /// Regions enabled for the account that need no explicit opt-in
    async fn enabled_regions(&self, session: &Session) -> ApiResult<Vec<String>>;
}

/// Handles to every remote service a step may touch.
#[derive(Clone)]
pub struct CloudClients {
    pub sessions: Arc<dyn SessionProvider>,
    pub organizations: Arc<dyn OrganizationsApi>,
    pub iam: Arc<dyn IamApi>,
    pub billing: Arc<dyn BillingApi>,
    pub analyzer: Arc<dyn AccessAnalyzerApi>,
    pub support: Arc<dyn SupportApi>,
    pub regions: Arc<dyn RegionDirectory>,
}

impl CloudClients {
    /// Use one backend for every service.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: SessionProvider
            + OrganizationsApi
            + IamApi
            + BillingApi
            + AccessAnalyzerApi
            + SupportApi
            + RegionDirectory
            + 'static,
    {
        Self {
            sessions: backend.clone(),
            organizations: backend.clone(),
            iam: backend.clone(),
            billing: backend.clone(),
            analyzer: backend.clone(),
            support: backend.clone(),
            regions: backend,
        }
    }
}
