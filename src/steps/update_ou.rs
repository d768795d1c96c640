use async_trait::async_trait;
use tracing::info;

use super::{AccountStep, StepContext};
use crate::account::{AccountRecord, MigrationState};
use crate::cloud::ParentType;
use crate::error::MigrationResult;
use crate::notify::ErrorType;
use crate::workflow::{Signal, StepEnvelope, StepKind};

/// Move a freshly joined account from the target root into the default OU.
pub struct UpdateOu;

#[async_trait]
impl AccountStep for UpdateOu {
    fn kind(&self) -> StepKind {
        StepKind::UpdateOu
    }

    fn error_type(&self) -> ErrorType {
        ErrorType::ChangeOu
    }

    async fn run(
        &self,
        ctx: &StepContext,
        account: &mut AccountRecord,
        _envelope: &mut StepEnvelope,
    ) -> MigrationResult<Signal> {
        if account.account_status.satisfies(MigrationState::Updated) {
            return Ok(Signal::Completed);
        }

        let engine = ctx.engine_session();
        let organizations = &ctx.cloud.organizations;

        let parents = match organizations.list_parents(&engine, &account.account_id).await {
            Ok(parents) => parents,
            Err(err) => return Ok(ctx.wait_on(ErrorType::ChangeOu, account, &err).await),
        };

        // Only accounts sitting directly under the root are moved.
        let Some(root) = parents.into_iter().find(|p| p.parent_type == ParentType::Root) else {
            let message = format!(
                "Account {} of Company {} is currently at OU level we don't support OU level account migration as of now.",
                account.account_id, account.company_name
            );
            return Ok(ctx.wait_with_error(ErrorType::ChangeOu, account, message).await);
        };

        let destination = &ctx.config.target.default_ou_id;
        if let Err(err) = organizations
            .move_account(&engine, &account.account_id, &root.id, destination)
            .await
        {
            return Ok(ctx.wait_on(ErrorType::ChangeOu, account, &err).await);
        }

        info!(account_id = %account.account_id, ou = %destination, "moved account into default OU");
        account.account_status.advance_to(MigrationState::Updated)?;
        Ok(Signal::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountStatus, AccountType};
    use crate::steps::testing::*;

    fn joined(raw: &str) -> AccountRecord {
        AccountRecord::new("Acme", id(raw), AccountType::Linked, "OrganizationAccountAccessRole")
            .with_status(AccountStatus::Migrating(MigrationState::Joined))
    }

    #[tokio::test]
    async fn moves_root_accounts_into_default_ou() {
        let mut state = base_state();
        state
            .add_account(&id("200000000020"), "dev@AWS.com", "dev")
            .place(&id("200000000020"), TARGET_ORG, None);
        let h = harness(state, vec![], config());

        let mut record = joined("200000000020");
        let signal = UpdateOu
            .run(&h.ctx, &mut record, &mut StepEnvelope::default())
            .await
            .unwrap();

        assert_eq!(signal, Signal::Completed);
        assert_eq!(record.account_status, AccountStatus::Migrating(MigrationState::Updated));
        let parent = h.cloud.snapshot().accounts[&id("200000000020")].parent_id.clone();
        assert_eq!(parent.as_deref(), Some(TARGET_OU));

        let again = UpdateOu
            .run(&h.ctx, &mut record, &mut StepEnvelope::default())
            .await
            .unwrap();
        assert_eq!(again, Signal::Completed);
        assert_eq!(h.cloud.calls_to("move_account"), 1);
    }

    #[tokio::test]
    async fn accounts_inside_an_ou_wait() {
        let mut state = base_state();
        state
            .add_unit(TARGET_ORG, "ou-other")
            .add_account(&id("200000000021"), "dev@AWS.com", "dev")
            .place(&id("200000000021"), TARGET_ORG, Some("ou-other"));
        let h = harness(state, vec![], config());

        let mut record = joined("200000000021");
        let signal = UpdateOu
            .run(&h.ctx, &mut record, &mut StepEnvelope::default())
            .await
            .unwrap();

        assert_eq!(signal, Signal::Wait);
        assert_eq!(record.account_status, AccountStatus::Migrating(MigrationState::Joined));
        assert!(record.error.unwrap().contains("currently at OU level"));
        assert_eq!(h.cloud.calls_to("move_account"), 0);
    }
}
