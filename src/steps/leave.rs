use async_trait::async_trait;
use tracing::{info, warn};

use super::{AccountStep, StepContext};
use crate::account::{AccountRecord, AccountType, DecommissionState, MigrationState};
use crate::cloud::ApiErrorKind;
use crate::error::{MigrationError, MigrationResult};
use crate::notify::ErrorType;
use crate::workflow::{Signal, StepEnvelope, StepKind};

/// Detach the account from its current organization.
pub struct LeaveOrganization;

/// What the type-specific leave flow decided.
enum Departure {
    Left,
    AlreadyJoined,
    Blocked(Signal),
}

#[async_trait]
impl AccountStep for LeaveOrganization {
    fn kind(&self) -> StepKind {
        StepKind::LeaveOrganization
    }

    fn error_type(&self) -> ErrorType {
        ErrorType::LeaveOrganization
    }

    async fn run(
        &self,
        ctx: &StepContext,
        account: &mut AccountRecord,
        _envelope: &mut StepEnvelope,
    ) -> MigrationResult<Signal> {
        if !account.account_status.is_below(MigrationState::Invited) {
            return Ok(Signal::Completed);
        }

        let departure = match account.account_type {
            AccountType::Linked => leave_linked(ctx, account).await,
            AccountType::Master => disband_master(ctx, account).await,
            AccountType::Standalone => confirm_standalone(ctx, account).await,
        };

        match departure {
            Ok(Departure::Left) => {
                mark_left(account)?;
                Ok(Signal::Completed)
            }
            Ok(Departure::AlreadyJoined) => {
                account.account_status.advance_to(MigrationState::Joined)?;
                info!(account_id = %account.account_id, "account already belongs to the target organization");
                Ok(Signal::JoinCheck)
            }
            Ok(Departure::Blocked(signal)) => Ok(signal),
            Err(err) if err.is_api(ApiErrorKind::AccountNotFound) => {
                info!(account_id = %account.account_id, "account is no longer a member of its organization");
                mark_left(account)?;
                Ok(Signal::Completed)
            }
            Err(MigrationError::Api(err)) => Ok(ctx.wait_on(ErrorType::LeaveOrganization, account, &err).await),
            Err(err) => Err(err),
        }
    }
}

/// Accounts staying with the migration wait for an invitation; the rest are
/// routed to decommissioning.
fn mark_left(account: &mut AccountRecord) -> MigrationResult<()> {
    if account.migrate {
        account.account_status.advance_to(MigrationState::Invited)?;
    } else {
        account.account_status.decommission(DecommissionState::Left)?;
    }
    Ok(())
}

async fn leave_linked(ctx: &StepContext, account: &mut AccountRecord) -> MigrationResult<Departure> {
    let master = ctx.require_master(&account.company_name).await?;
    let master_session = ctx.admin_session(&master).await?;
    let described = ctx
        .cloud
        .organizations
        .describe_account(&master_session, &account.account_id)
        .await?;
    account.email = Some(described.email.clone());
    account.name = Some(described.name.clone());

    let target_marker = format!(
        "arn:aws:organizations::{}",
        ctx.config.target.management_account_id
    );
    if described.arn.contains(&target_marker) {
        return Ok(Departure::AlreadyJoined);
    }

    let validation = &ctx.config.validation;
    if validation.email_enabled && !ctx.pattern(&validation.email_pattern)?.is_match(&described.email) {
        let message = format!("AccountId({}): Email is not AWS's org compatible", account.account_id);
        let signal = ctx.wait_with_error(ErrorType::CheckAccountType, account, message).await;
        return Ok(Departure::Blocked(signal));
    }
    if validation.name_enabled && !ctx.pattern(&validation.name_pattern)?.is_match(&described.name) {
        let message = format!("AccountId({}): Account name is not AWS's org compatible", account.account_id);
        let signal = ctx.wait_with_error(ErrorType::CheckAccountType, account, message).await;
        return Ok(Departure::Blocked(signal));
    }

    ctx.cloud
        .organizations
        .remove_account_from_organization(&master_session, &account.account_id)
        .await?;
    info!(account_id = %account.account_id, master = %master.account_id, "removed account from source organization");
    Ok(Departure::Left)
}

/// The organization can only be deleted once every linked account is gone.
async fn disband_master(ctx: &StepContext, account: &AccountRecord) -> MigrationResult<Departure> {
    let session = ctx.admin_session(account).await?;
    let members = ctx.cloud.organizations.list_accounts(&session).await?;
    if members.len() > 1 {
        info!(
            account_id = %account.account_id,
            members = members.len(),
            "organization still has member accounts"
        );
        return Ok(Departure::Blocked(Signal::Wait));
    }

    ctx.cloud.organizations.delete_organization(&session).await?;
    info!(account_id = %account.account_id, "deleted source organization");
    Ok(Departure::Left)
}

async fn confirm_standalone(ctx: &StepContext, account: &AccountRecord) -> MigrationResult<Departure> {
    let session = ctx.access_session(&account.account_id).await?;
    match ctx.cloud.organizations.list_accounts(&session).await {
        Ok(_) => Err(MigrationError::Integrity(format!(
            "Standalone account {} has organization setup.",
            account.account_id
        ))),
        Err(err) if err.is(ApiErrorKind::OrganizationsNotInUse) => Ok(Departure::Left),
        Err(err) => {
            warn!(account_id = %account.account_id, "could not confirm standalone account: {}", err);
            Err(err.into())
        }
    }
}
