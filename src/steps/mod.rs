// Step contracts of the account migration workflow.
//
// Each step loads one account record, does at most one unit of remote work,
// and returns a signal for the scheduler. The record is written back after
// every run, successful or not, so the latest error is always visible in the
// account table.

use async_trait::async_trait;
use tracing::{info, warn, Instrument};

use crate::account::AccountRecord;
use crate::error::{MigrationError, MigrationResult};
use crate::notify::{ErrorType, Incident};
use crate::telemetry::{generate_correlation_id, step_span};
use crate::workflow::{Signal, StepEnvelope, StepKind};

pub mod billing;
pub mod context;
pub mod join;
pub mod leave;
pub mod roles;
pub mod scan;
pub mod support_case;
pub mod update_ou;

pub use billing::CheckBillingAccess;
pub use context::StepContext;
pub use join::JoinOrganization;
pub use leave::LeaveOrganization;
pub use roles::{CreateMasterRoles, CreateRoles, RolePolicy, RoleProvisioning, RoleTemplate};
pub use scan::{ActivateAnalyzer, CheckScanStatus, EnabledRegions, ScanOrgPermissions};
pub use support_case::SupportCaseGate;
pub use update_ou::UpdateOu;

/// A step acting on a single account record.
#[async_trait]
pub trait AccountStep: Send + Sync {
    fn kind(&self) -> StepKind;

    /// Category used when the step fails.
    fn error_type(&self) -> ErrorType;

    /// Mutations to `account` are persisted by the caller whatever the outcome.
    async fn run(
        &self,
        ctx: &StepContext,
        account: &mut AccountRecord,
        envelope: &mut StepEnvelope,
    ) -> MigrationResult<Signal>;
}

/// A step acting on a whole company.
#[async_trait]
pub trait CompanyStep: Send + Sync {
    fn kind(&self) -> StepKind;

    fn error_type(&self) -> ErrorType;

    async fn run(&self, ctx: &StepContext, envelope: &mut StepEnvelope) -> MigrationResult<Signal>;
}

/// Run the step named by `kind` on `envelope` and return the envelope with
/// `Status` set.
pub async fn execute(ctx: &StepContext, kind: StepKind, envelope: StepEnvelope) -> MigrationResult<StepEnvelope> {
    match kind {
        StepKind::LeaveOrganization => run_account_step(ctx, &LeaveOrganization, envelope).await,
        StepKind::JoinOrganization => run_account_step(ctx, &JoinOrganization, envelope).await,
        StepKind::CreateRoles => run_account_step(ctx, &CreateRoles, envelope).await,
        StepKind::UpdateOu => run_account_step(ctx, &UpdateOu, envelope).await,
        StepKind::CheckBillingAccess => run_account_step(ctx, &CheckBillingAccess, envelope).await,
        StepKind::EnabledRegions => run_account_step(ctx, &EnabledRegions, envelope).await,
        StepKind::ActivateAnalyzer => run_account_step(ctx, &ActivateAnalyzer, envelope).await,
        StepKind::ScanOrgPermissions => run_account_step(ctx, &ScanOrgPermissions, envelope).await,
        StepKind::CheckScanStatus => run_account_step(ctx, &CheckScanStatus, envelope).await,
        StepKind::CreateMasterRoles => run_company_step(ctx, &CreateMasterRoles, envelope).await,
        StepKind::SupportCase => run_company_step(ctx, &SupportCaseGate, envelope).await,
    }
}

pub async fn run_account_step(
    ctx: &StepContext,
    step: &dyn AccountStep,
    mut envelope: StepEnvelope,
) -> MigrationResult<StepEnvelope> {
    let correlation_id = generate_correlation_id();
    let account_id = envelope.account_id()?.clone();
    let span = step_span(
        step.kind().name(),
        &envelope.company_name,
        Some(account_id.as_str()),
        &correlation_id,
    );

    async move {
        let mut account = match ctx.store.require_account(&envelope.company_name, &account_id).await {
            Ok(account) => account,
            Err(err) => {
                let err = MigrationError::from(err);
                let mut incident = Incident::new(step.error_type(), envelope.company_name.clone(), err.to_string());
                incident.account_id = Some(account_id.clone());
                ctx.reporter.report(incident).await;
                return Err(err);
            }
        };

        let outcome = step.run(ctx, &mut account, &mut envelope).await;
        let signal = settle(ctx, step.error_type(), &mut account, outcome).await?;

        if signal.is_wait() {
            info!(
                signal = %signal,
                status = %account.account_status,
                error = account.error.as_deref().unwrap_or(""),
                "step waiting"
            );
        } else {
            info!(signal = %signal, status = %account.account_status, "step finished");
        }
        Ok(envelope.with_status(signal))
    }
    .instrument(span)
    .await
}

pub async fn run_company_step(
    ctx: &StepContext,
    step: &dyn CompanyStep,
    mut envelope: StepEnvelope,
) -> MigrationResult<StepEnvelope> {
    let correlation_id = generate_correlation_id();
    let span = step_span(step.kind().name(), &envelope.company_name, None, &correlation_id);

    async move {
        match step.run(ctx, &mut envelope).await {
            Ok(signal) => {
                info!(signal = %signal, "step finished");
                Ok(envelope.with_status(signal))
            }
            Err(err) => {
                if err.is_integrity() {
                    let incident = Incident::new(ErrorType::AccountIntegrity, envelope.company_name.clone(), err.to_string());
                    ctx.reporter.report(incident).await;
                }
                Err(err)
            }
        }
    }
    .instrument(span)
    .await
}

/// Persist the record after a run. A failure is reported and written to the
/// `Error` field before it propagates.
pub(crate) async fn settle(
    ctx: &StepContext,
    error_type: ErrorType,
    account: &mut AccountRecord,
    outcome: MigrationResult<Signal>,
) -> MigrationResult<Signal> {
    if let Err(err) = &outcome {
        let error_type = if err.is_integrity() {
            ErrorType::AccountIntegrity
        } else {
            error_type
        };
        let message = ctx.reporter.report(Incident::from_error(error_type, account, err)).await;
        account.error = Some(message);
    }

    match (ctx.store.upsert(account).await, outcome) {
        (Ok(_), outcome) => outcome,
        (Err(store_err), Ok(_)) => Err(store_err.into()),
        (Err(store_err), Err(err)) => {
            warn!(
                account_id = %account.account_id,
                "failed to persist account after step failure: {}",
                store_err
            );
            Err(err)
        }
    }
}
