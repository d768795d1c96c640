// Cross-account role bootstrap.
//
// Every account gets the same role table, trusted by the target management
// account. The access role is used by every later step, so after creating it
// the step polls until it can actually be assumed.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{AccountStep, CompanyStep, StepContext};
use crate::account::{AccountId, AccountRecord, AccountType};
use crate::cloud::{ApiErrorKind, ApiResult, Session};
use crate::config::MigrationConfig;
use crate::error::{MigrationError, MigrationResult};
use crate::notify::{ErrorType, Incident};
use crate::workflow::{Signal, StepEnvelope, StepKind};

const INLINE_POLICY_NAME: &str = "RolePolicy";

/// Permissions granted to a provisioned role.
#[derive(Debug, Clone, PartialEq)]
pub enum RolePolicy {
    /// Managed policy attached by ARN.
    Managed(String),
    /// Inline policy document.
    Inline(Value),
}

impl RolePolicy {
    /// A JSON object is an inline document, anything else a managed policy ARN.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(document @ Value::Object(_)) => RolePolicy::Inline(document),
            _ => RolePolicy::Managed(raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoleTemplate {
    pub name: String,
    pub trust_policy: Value,
    pub policy: RolePolicy,
}

impl RoleTemplate {
    /// The role table, sorted by role name.
    pub fn table(config: &MigrationConfig) -> Vec<RoleTemplate> {
        let trust_policy = trust_policy_for(&config.target.management_account_id);
        let mut table = vec![
            RoleTemplate {
                name: config.roles.access_role.clone(),
                trust_policy: trust_policy.clone(),
                policy: RolePolicy::parse(&config.roles.access_policy_arn),
            },
            RoleTemplate {
                name: config.roles.read_only_role.clone(),
                trust_policy,
                policy: RolePolicy::parse(&config.roles.read_only_policy_arn),
            },
        ];
        table.sort_by(|a, b| a.name.cmp(&b.name));
        table
    }
}

fn trust_policy_for(principal: &AccountId) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Principal": { "AWS": principal.as_str() },
                "Action": ["sts:AssumeRole"]
            }
        ]
    })
}

/// Result of provisioning the role table in one account.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleProvisioning {
    /// Roles created by this call; empty when all of them existed.
    pub created: Vec<String>,
    /// Whether the access role could be assumed before the retries ran out.
    pub access_ready: bool,
}

impl RoleProvisioning {
    /// Log the outcome and hand the created roles to the scheduler.
    fn record(&self, account_id: &AccountId, envelope: &mut StepEnvelope) {
        info!(
            account_id = %account_id,
            roles = ?self.created,
            access_ready = self.access_ready,
            "roles provisioned"
        );
        envelope.created_roles = Some(self.created.clone());
    }
}

/// Create every missing role of the table through `session`, then poll the
/// access role until it is assumable.
pub async fn provision_roles(ctx: &StepContext, session: &Session) -> ApiResult<RoleProvisioning> {
    let account_id = &session.account_id;
    let iam = &ctx.cloud.iam;
    let mut created = Vec::new();

    for template in RoleTemplate::table(&ctx.config) {
        match iam.get_role(session, &template.name).await {
            Ok(_) => {
                debug!(account_id = %account_id, role = %template.name, "role already exists");
                continue;
            }
            Err(err) if err.is(ApiErrorKind::NoSuchEntity) => {}
            Err(err) => return Err(err),
        }

        info!(account_id = %account_id, role = %template.name, "creating role");
        iam.create_role(session, &template.name, &template.trust_policy).await?;
        match &template.policy {
            RolePolicy::Managed(arn) => iam.attach_role_policy(session, &template.name, arn).await?,
            RolePolicy::Inline(document) => {
                iam.put_role_policy(session, &template.name, INLINE_POLICY_NAME, document)
                    .await?
            }
        }
        created.push(template.name);
    }

    let access_ready = match ctx
        .propagation_policy()
        .until_accessible(|| ctx.access_session(account_id))
        .await
    {
        Ok(_) => true,
        Err(err) if err.is(ApiErrorKind::AccessDenied) => false,
        Err(err) => return Err(err),
    };
    if !access_ready {
        info!(account_id = %account_id, "access role has not propagated yet");
    }

    Ok(RoleProvisioning {
        created,
        access_ready,
    })
}

/// Provision the role table in one account.
pub struct CreateRoles;

#[async_trait]
impl AccountStep for CreateRoles {
    fn kind(&self) -> StepKind {
        StepKind::CreateRoles
    }

    fn error_type(&self) -> ErrorType {
        ErrorType::CreateLinkedRoles
    }

    async fn run(
        &self,
        ctx: &StepContext,
        account: &mut AccountRecord,
        envelope: &mut StepEnvelope,
    ) -> MigrationResult<Signal> {
        envelope.stamp_process_name();

        let session = if account.is_type(AccountType::Linked) {
            let master = ctx.require_master(&account.company_name).await?;
            match ctx.admin_session(&master).await {
                Ok(master_session) => {
                    ctx.assume(&account.account_id, &account.admin_role, Some(&master_session))
                        .await
                }
                Err(err) => Err(err),
            }
        } else {
            ctx.admin_session(account).await
        };

        let provisioning = match session {
            Ok(session) => provision_roles(ctx, &session).await,
            Err(err) => Err(err),
        };

        if let Ok(provisioned) = &provisioning {
            provisioned.record(&account.account_id, envelope);
        }

        match provisioning {
            Ok(RoleProvisioning { access_ready: false, .. }) => Ok(Signal::Wait),
            Ok(_) if account.is_type(AccountType::Standalone) => Ok(Signal::StandaloneFlow),
            Ok(_) => Ok(Signal::Completed),
            Err(err) => Ok(ctx.wait_on(ErrorType::CreateLinkedRoles, account, &err).await),
        }
    }
}

/// Provision the role table in the company's master account and route the
/// scheduler to the linked or standalone branch.
pub struct CreateMasterRoles;

#[async_trait]
impl CompanyStep for CreateMasterRoles {
    fn kind(&self) -> StepKind {
        StepKind::CreateMasterRoles
    }

    fn error_type(&self) -> ErrorType {
        ErrorType::CreateMasterRoles
    }

    async fn run(&self, ctx: &StepContext, envelope: &mut StepEnvelope) -> MigrationResult<Signal> {
        let master = ctx.store.master_account(&envelope.company_name).await?;
        let Some(mut master) = master else {
            info!(company = %envelope.company_name, "no master account, standalone flow");
            envelope.account_id = None;
            envelope.stamp_process_name();
            return Ok(Signal::StandaloneFlow);
        };

        envelope.account_id = Some(master.account_id.clone());
        envelope.stamp_process_name();

        let provisioning = match ctx.admin_session(&master).await {
            Ok(session) => provision_roles(ctx, &session).await,
            Err(err) => Err(err),
        };
        if let Ok(provisioned) = &provisioning {
            provisioned.record(&master.account_id, envelope);
        }

        let outcome = match provisioning {
            Ok(RoleProvisioning { access_ready: false, .. }) => Ok(Signal::Wait),
            Ok(_) => Ok(Signal::LinkedFlow),
            Err(err) => {
                let incident = Incident::for_account(ErrorType::CreateMasterRoles, &master, err.to_string())
                    .with_api_error(&err);
                master.error = Some(ctx.reporter.report(incident).await);
                Err(MigrationError::from(err))
            }
        };

        ctx.store.upsert(&master).await?;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AccountStore;
    use crate::steps::testing::*;

    fn master() -> AccountRecord {
        AccountRecord::new("Acme", source_master(), AccountType::Master, "OrganizationAccountAccessRole")
    }

    #[test]
    fn role_table_is_sorted_and_trusts_management() {
        let table = RoleTemplate::table(&config());
        let names: Vec<_> = table.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["MasterReadOnlyRole", "MasterRole"]);
        assert_eq!(
            table[0].trust_policy["Statement"][0]["Principal"]["AWS"],
            management().as_str()
        );
        assert_eq!(
            table[1].policy,
            RolePolicy::Managed("arn:aws:iam::aws:policy/AdministratorAccess".to_string())
        );
    }

    #[test]
    fn json_objects_are_inline_policies() {
        let policy = RolePolicy::parse(r#"{"Version":"2012-10-17","Statement":[]}"#);
        assert!(matches!(policy, RolePolicy::Inline(_)));
    }

    #[tokio::test]
    async fn master_roles_route_to_linked_flow() {
        let h = harness(base_state(), vec![master()], config());

        let mut envelope = StepEnvelope::for_company("Acme");
        let signal = CreateMasterRoles.run(&h.ctx, &mut envelope).await.unwrap();

        assert_eq!(signal, Signal::LinkedFlow);
        assert_eq!(envelope.account_id, Some(source_master()));
        assert!(envelope.process_name.is_some());
        assert_eq!(h.cloud.calls_to("create_role"), 2);
        assert_eq!(
            envelope.created_roles,
            Some(vec!["MasterReadOnlyRole".to_string(), "MasterRole".to_string()])
        );

        let again = CreateMasterRoles.run(&h.ctx, &mut envelope).await.unwrap();
        assert_eq!(again, Signal::LinkedFlow);
        assert_eq!(h.cloud.calls_to("create_role"), 2);
        assert_eq!(envelope.created_roles, Some(Vec::new()));
    }

    #[tokio::test]
    async fn rerun_creates_nothing_and_keeps_existing_roles() {
        let h = harness(base_state(), vec![], config());
        let session = h.ctx.admin_session(&master()).await.unwrap();

        let first = provision_roles(&h.ctx, &session).await.unwrap();
        assert_eq!(first.created, vec!["MasterReadOnlyRole", "MasterRole"]);
        assert!(first.access_ready);
        let roles_before = h.cloud.snapshot().accounts[&source_master()].roles.clone();

        let second = provision_roles(&h.ctx, &session).await.unwrap();
        assert!(second.created.is_empty());
        assert!(second.access_ready);
        assert_eq!(h.cloud.calls_to("create_role"), 2);
        assert_eq!(h.cloud.calls_to("attach_role_policy"), 2);
        assert_eq!(h.cloud.snapshot().accounts[&source_master()].roles, roles_before);
    }

    #[tokio::test]
    async fn preexisting_access_role_is_left_alone() {
        let mut state = base_state();
        state.add_role(&source_master(), "MasterRole");
        let h = harness(state, vec![], config());

        let mut record = master();
        let mut envelope = StepEnvelope::for_account("Acme", source_master());
        let signal = CreateRoles.run(&h.ctx, &mut record, &mut envelope).await.unwrap();

        assert_eq!(signal, Signal::Completed);
        assert_eq!(envelope.created_roles, Some(vec!["MasterReadOnlyRole".to_string()]));
        assert_eq!(h.cloud.calls_to("create_role"), 1);
    }

    #[tokio::test]
    async fn company_without_master_is_standalone() {
        let h = harness(base_state(), vec![], config());

        let mut envelope = StepEnvelope::for_company("Acme");
        let signal = CreateMasterRoles.run(&h.ctx, &mut envelope).await.unwrap();

        assert_eq!(signal, Signal::StandaloneFlow);
        assert!(envelope.process_name.unwrap().starts_with("Acme-None-"));
    }

    #[tokio::test]
    async fn master_role_failures_are_fatal_and_recorded() {
        let mut state = base_state();
        state.fail("create_role", None, "LimitExceeded", 1);
        let h = harness(state, vec![master()], config());

        let err = CreateMasterRoles
            .run(&h.ctx, &mut StepEnvelope::for_company("Acme"))
            .await
            .unwrap_err();

        assert_eq!(err.api().unwrap().code, "LimitExceeded");
        let stored = h.store.get_account("Acme", &source_master()).await.unwrap().unwrap();
        assert!(stored.error.unwrap().starts_with("LimitExceeded"));
    }

    #[tokio::test]
    async fn slow_propagation_waits() {
        let mut state = base_state();
        state.role_propagation_delay = 10;
        let h = harness(state, vec![master()], config());

        let mut record = master();
        let signal = CreateRoles
            .run(&h.ctx, &mut record, &mut StepEnvelope::default())
            .await
            .unwrap();

        assert_eq!(signal, Signal::Wait);
        // admin session, then one assume per propagation attempt
        assert_eq!(
            h.cloud
                .journal()
                .iter()
                .filter(|e| e.as_str() == format!("assume_role:{}", source_master()))
                .count(),
            1 + 4
        );
    }

    #[tokio::test]
    async fn standalone_accounts_take_the_standalone_branch() {
        let mut state = base_state();
        state
            .add_account(&id("300000000002"), "solo@AWS.com", "solo")
            .add_role(&id("300000000002"), "OrganizationAccountAccessRole");
        let h = harness(state, vec![], config());

        let mut record = AccountRecord::new(
            "Acme",
            id("300000000002"),
            AccountType::Standalone,
            "OrganizationAccountAccessRole",
        );
        let mut envelope = StepEnvelope::for_account("Acme", id("300000000002"));
        let signal = CreateRoles.run(&h.ctx, &mut record, &mut envelope).await.unwrap();

        assert_eq!(signal, Signal::StandaloneFlow);
        assert!(envelope.process_name.is_some());
        assert!(h.cloud.snapshot().accounts[&id("300000000002")].roles.contains_key("MasterRole"));
    }
}
