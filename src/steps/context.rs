use regex::Regex;
use std::sync::Arc;

use crate::account::{AccountId, AccountRecord};
use crate::cloud::{ApiError, ApiResult, CloudClients, RoleArn, Session};
use crate::config::{ConfigError, MigrationConfig};
use crate::error::{MigrationError, MigrationResult};
use crate::notify::{ErrorReporter, ErrorType, Incident, Notifier};
use crate::store::AccountStore;
use crate::workflow::{RetryPolicy, Signal};

/// Everything a step needs, built once per process.
#[derive(Clone)]
pub struct StepContext {
    pub config: Arc<MigrationConfig>,
    pub store: Arc<dyn AccountStore>,
    pub cloud: CloudClients,
    pub reporter: ErrorReporter,
}

impl StepContext {
    pub fn new(
        config: Arc<MigrationConfig>,
        store: Arc<dyn AccountStore>,
        cloud: CloudClients,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let reporter = ErrorReporter::new(notifier, config.notifications.title.clone());
        Self {
            config,
            store,
            cloud,
            reporter,
        }
    }

    /// The engine's own principal in the target management account.
    pub fn engine_session(&self) -> Session {
        Session::engine(self.config.target.management_account_id.clone())
    }

    pub async fn assume(&self, account_id: &AccountId, role_name: &str, via: Option<&Session>) -> ApiResult<Session> {
        let arn = RoleArn::new(account_id, role_name);
        self.cloud.sessions.assume_role(&arn, via).await
    }

    /// Session through the role provisioned for cross-account access.
    pub async fn access_session(&self, account_id: &AccountId) -> ApiResult<Session> {
        self.assume(account_id, &self.config.roles.access_role, None).await
    }

    /// Session through the account's own admin role.
    pub async fn admin_session(&self, account: &AccountRecord) -> ApiResult<Session> {
        self.assume(&account.account_id, &account.admin_role, None).await
    }

    /// The company's Master record; its absence is an integrity error.
    pub async fn require_master(&self, company_name: &str) -> MigrationResult<AccountRecord> {
        self.store.master_account(company_name).await?.ok_or_else(|| {
            MigrationError::Integrity(format!("no master account recorded for company {company_name}"))
        })
    }

    pub fn propagation_policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.config.roles.propagation)
    }

    pub fn pattern(&self, pattern: &str) -> MigrationResult<Regex> {
        Regex::new(pattern).map_err(|e| ConfigError::Invalid(format!("{pattern}: {e}")).into())
    }

    /// Record a transient remote failure on the account and ask to be
    /// invoked again.
    pub async fn wait_on(&self, error_type: ErrorType, account: &mut AccountRecord, err: &ApiError) -> Signal {
        let incident = Incident::for_account(error_type, account, err.to_string()).with_api_error(err);
        account.error = Some(self.reporter.report(incident).await);
        Signal::Wait
    }

    /// Record a user-visible problem on the account and wait for it to be fixed.
    pub async fn wait_with_error(
        &self,
        error_type: ErrorType,
        account: &mut AccountRecord,
        message: impl Into<String>,
    ) -> Signal {
        let incident = Incident::for_account(error_type, account, message);
        account.error = Some(self.reporter.report(incident).await);
        Signal::Wait
    }
}
