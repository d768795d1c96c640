use async_trait::async_trait;
use tracing::info;

use super::{AccountStep, StepContext};
use crate::account::{AccountRecord, MigrationState};
use crate::cloud::{ApiErrorKind, ApiResult};
use crate::error::MigrationResult;
use crate::notify::ErrorType;
use crate::workflow::{Signal, StepEnvelope, StepKind};

const INVITATION_NOTES: &str = "Invitation to join AWS Organization";

/// Invite the account into the target organization and accept on its behalf.
pub struct JoinOrganization;

#[async_trait]
impl AccountStep for JoinOrganization {
    fn kind(&self) -> StepKind {
        StepKind::JoinOrganization
    }

    fn error_type(&self) -> ErrorType {
        ErrorType::JoinOrganization
    }

    async fn run(
        &self,
        ctx: &StepContext,
        account: &mut AccountRecord,
        _envelope: &mut StepEnvelope,
    ) -> MigrationResult<Signal> {
        if account.account_status.satisfies(MigrationState::Joined) {
            return Ok(Signal::Completed);
        }

        match invite_and_accept(ctx, account).await {
            Ok(()) => {
                account.account_status.advance_to(MigrationState::Joined)?;
                Ok(Signal::Completed)
            }
            Err(err) if err.is(ApiErrorKind::ConcurrentModification) => {
                info!(account_id = %account.account_id, "organization busy with another invitation");
                Ok(Signal::ConcurrencyWait)
            }
            Err(err) => Ok(ctx.wait_on(ErrorType::JoinOrganization, account, &err).await),
        }
    }
}

async fn invite_and_accept(ctx: &StepContext, account: &mut AccountRecord) -> ApiResult<()> {
    let engine = ctx.engine_session();
    let organizations = &ctx.cloud.organizations;

    let open_invite = organizations
        .list_invite_handshakes(&engine)
        .await?
        .into_iter()
        .find(|h| h.is_open_invite_for(&account.account_id));

    let handshake_id = match open_invite {
        Some(handshake) => handshake.id,
        None => {
            let handshake = organizations
                .invite_account(&engine, &account.account_id, INVITATION_NOTES)
                .await?;
            info!(
                account_id = %account.account_id,
                handshake_id = %handshake.id,
                "invitation sent"
            );
            handshake.id
        }
    };
    account.handshake_id = Some(handshake_id.clone());

    let member = ctx.access_session(&account.account_id).await?;
    organizations.accept_handshake(&member, &handshake_id).await?;
    info!(
        account_id = %account.account_id,
        handshake_id = %handshake_id,
        "invitation accepted"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountStatus, AccountType, DecommissionState};
    use crate::steps::testing::*;

    fn invited(raw: &str) -> AccountRecord {
        AccountRecord::new("Acme", id(raw), AccountType::Linked, "OrganizationAccountAccessRole")
            .with_status(AccountStatus::Migrating(MigrationState::Invited))
    }

    fn detached(raw: &str) -> crate::cloud::SandboxState {
        let mut state = base_state();
        state
            .add_account(&id(raw), "dev@AWS.com", "dev")
            .add_role(&id(raw), "MasterRole");
        state
    }

    #[tokio::test]
    async fn joins_and_reuses_open_invitations() {
        let h = harness(detached("200000000010"), vec![], config());
        h.cloud.update(|s| {
            s.fail("accept_handshake", None, "ConcurrentModificationException", 1);
        });

        let mut record = invited("200000000010");
        let first = JoinOrganization
            .run(&h.ctx, &mut record, &mut StepEnvelope::default())
            .await
            .unwrap();
        assert_eq!(first, Signal::ConcurrencyWait);
        assert_eq!(record.account_status, AccountStatus::Migrating(MigrationState::Invited));

        let second = JoinOrganization
            .run(&h.ctx, &mut record, &mut StepEnvelope::default())
            .await
            .unwrap();
        assert_eq!(second, Signal::Completed);
        assert_eq!(record.account_status, AccountStatus::Migrating(MigrationState::Joined));
        assert_eq!(h.cloud.calls_to("invite_account"), 1);
        assert!(record.handshake_id.is_some());
    }

    #[tokio::test]
    async fn decommissioned_accounts_are_skipped() {
        let h = harness(detached("200000000011"), vec![], config());

        let mut record = invited("200000000011")
            .with_status(AccountStatus::Decommissioning(DecommissionState::Left));
        let signal = JoinOrganization
            .run(&h.ctx, &mut record, &mut StepEnvelope::default())
            .await
            .unwrap();

        assert_eq!(signal, Signal::Completed);
        assert!(h.cloud.journal().is_empty());
    }

    #[tokio::test]
    async fn missing_access_role_waits() {
        let mut state = base_state();
        state.add_account(&id("200000000012"), "dev@AWS.com", "dev");
        let h = harness(state, vec![], config());

        let mut record = invited("200000000012");
        let signal = JoinOrganization
            .run(&h.ctx, &mut record, &mut StepEnvelope::default())
            .await
            .unwrap();

        assert_eq!(signal, Signal::Wait);
        assert!(record.error.as_deref().unwrap().starts_with("AccessDenied"));
        assert_eq!(h.notifier.count_of(ErrorType::JoinOrganization), 1);
    }
}
