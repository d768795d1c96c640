// Company-scope completion watcher.
//
// Polled by the scheduler after every account has been fanned out. Accounts
// routed to decommissioning are nagged until their owners close them; once
// none are left and every migrating account reached its OU, the migration of
// the company is declared done.

use tracing::{info, Instrument};

use crate::account::{AccountStatus, DecommissionState, MigrationState};
use crate::cloud::ApiErrorKind;
use crate::error::MigrationResult;
use crate::notify::{ErrorType, Incident, Notification};
use crate::steps::StepContext;
use crate::store::StatusQuery;
use crate::telemetry::{generate_correlation_id, step_span};
use crate::workflow::{Signal, StepEnvelope};

const USER_ACTION_REQUIRED: &str = "User Action Required";
const MIGRATION_STOPPED: &str = "Migration Engine Stopped";

pub struct CompletionWatcher {
    ctx: StepContext,
}

impl CompletionWatcher {
    pub fn new(ctx: StepContext) -> Self {
        Self { ctx }
    }

    /// One polling round for `company_name`.
    pub async fn check(&self, company_name: &str) -> MigrationResult<StepEnvelope> {
        let span = step_span("cleanup", company_name, None, &generate_correlation_id());
        async move {
            let signal = if self.chase_left_accounts(company_name).await? {
                Signal::Wait
            } else {
                self.check_completion(company_name).await?
            };
            info!(signal = %signal, "cleanup finished");
            Ok(StepEnvelope::for_company(company_name).with_status(signal))
        }
        .instrument(span)
        .await
    }

    /// Returns whether any account is still waiting to be closed.
    async fn chase_left_accounts(&self, company_name: &str) -> MigrationResult<bool> {
        let ctx = &self.ctx;
        let left = ctx
            .store
            .accounts_with_status(
                company_name,
                StatusQuery::Exactly(AccountStatus::Decommissioning(DecommissionState::Left)),
            )
            .await?;

        for mut account in left.iter().cloned() {
            // An account that can no longer be entered has been closed.
            match ctx.access_session(&account.account_id).await {
                Ok(_) => {
                    let message = format!(
                        "Account: {} of company {} is being removed from the current organization. \
                         Please close the account using your root username/password.",
                        account.account_id, company_name
                    );
                    let notification = Notification::new(ctx.reporter.title(), USER_ACTION_REQUIRED, message)
                        .for_company(company_name)
                        .for_account(&account.account_id)
                        .with_slack_handle(account.slack_handle())
                        .with_action_item("Close the account using the root user credentials.");
                    ctx.reporter.publish(&notification).await;
                }
                Err(err) if err.is(ApiErrorKind::AccessDenied) => {
                    account.account_status.decommission(DecommissionState::Suspended)?;
                    info!(account_id = %account.account_id, "account closed, marked suspended");
                    ctx.store.upsert(&account).await?;
                }
                Err(err) => {
                    let incident = Incident::for_account(ErrorType::Cleanup, &account, err.to_string())
                        .with_api_error(&err);
                    account.error = Some(ctx.reporter.report(incident).await);
                    ctx.store.upsert(&account).await?;
                }
            }
        }

        Ok(!left.is_empty())
    }

    async fn check_completion(&self, company_name: &str) -> MigrationResult<Signal> {
        let ctx = &self.ctx;
        let in_flight = ctx
            .store
            .accounts_with_status(company_name, StatusQuery::MigratingBelow(MigrationState::Updated))
            .await?;
        if !in_flight.is_empty() {
            info!(company = %company_name, remaining = in_flight.len(), "accounts still migrating");
            return Ok(Signal::Wait);
        }

        let message = format!(
            "Migration Engine ran successfully for company {company_name}\n\n{}",
            ctx.config.notifications.notes
        );
        let summary = Notification::new(ctx.reporter.title(), MIGRATION_STOPPED, message).for_company(company_name);
        ctx.reporter.publish(&summary).await;
        Ok(Signal::Completed)
    }

    /// Envelopes for every account of the company that has not reached its OU
    /// yet, for the scheduler's fan-out.
    pub async fn pending_accounts(&self, company_name: &str) -> MigrationResult<Vec<StepEnvelope>> {
        let mut accounts = self.ctx.store.accounts_for_company(company_name).await?;
        accounts.retain(|a| a.account_status.is_below(MigrationState::Updated));
        accounts.sort_by(|a, b| a.account_id.cmp(&b.account_id));

        Ok(accounts
            .into_iter()
            .map(|account| {
                let mut envelope = StepEnvelope::for_account(company_name, account.account_id);
                envelope.account_type = Some(account.account_type);
                envelope.stamp_process_name();
                envelope
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountRecord, AccountType};
    use crate::steps::testing::*;
    use crate::store::AccountStore;

    fn record(raw: &str, status: AccountStatus) -> AccountRecord {
        AccountRecord::new("Acme", id(raw), AccountType::Linked, "OrganizationAccountAccessRole").with_status(status)
    }

    const LEFT: AccountStatus = AccountStatus::Decommissioning(DecommissionState::Left);
    const UPDATED: AccountStatus = AccountStatus::Migrating(MigrationState::Updated);

    #[tokio::test]
    async fn reachable_left_accounts_get_a_reminder() {
        let mut state = base_state();
        state
            .add_account(&id("200000000050"), "old@AWS.com", "old")
            .add_role(&id("200000000050"), "MasterRole");
        let h = harness(state, vec![record("200000000050", LEFT)], config());

        let envelope = CompletionWatcher::new(h.ctx.clone()).check("Acme").await.unwrap();

        assert_eq!(envelope.status, Some(Signal::Wait));
        let published = h.notifier.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].kind, USER_ACTION_REQUIRED);
        assert!(published[0].action_item.is_some());
    }

    #[tokio::test]
    async fn closed_accounts_are_marked_suspended() {
        let mut state = base_state();
        state.add_account(&id("200000000051"), "old@AWS.com", "old");
        if let Some(account) = state.accounts.get_mut(&id("200000000051")) {
            account.closed = true;
        }
        let h = harness(state, vec![record("200000000051", LEFT)], config());
        let watcher = CompletionWatcher::new(h.ctx.clone());

        let first = watcher.check("Acme").await.unwrap();
        assert_eq!(first.status, Some(Signal::Wait));
        let stored = h.store.get_account("Acme", &id("200000000051")).await.unwrap().unwrap();
        assert_eq!(stored.account_status, AccountStatus::Decommissioning(DecommissionState::Suspended));

        let second = watcher.check("Acme").await.unwrap();
        assert_eq!(second.status, Some(Signal::Completed));
        assert_eq!(h.notifier.published()[0].kind, MIGRATION_STOPPED);
    }

    #[tokio::test]
    async fn waits_while_accounts_are_migrating() {
        let records = vec![
            record("200000000052", UPDATED),
            record("200000000053", AccountStatus::Migrating(MigrationState::Joined)),
        ];
        let h = harness(base_state(), records, config());

        let envelope = CompletionWatcher::new(h.ctx.clone()).check("Acme").await.unwrap();

        assert_eq!(envelope.status, Some(Signal::Wait));
        assert!(h.notifier.published().is_empty());
    }

    #[tokio::test]
    async fn accounts_opted_out_of_migration_do_not_block_completion() {
        let records = vec![
            record("200000000054", UPDATED),
            record("200000000055", AccountStatus::Pending).with_migrate(false),
        ];
        let h = harness(base_state(), records, config());

        let envelope = CompletionWatcher::new(h.ctx.clone()).check("Acme").await.unwrap();

        assert_eq!(envelope.status, Some(Signal::Completed));
        assert!(h.notifier.published()[0].message.contains("company Acme"));
    }

    #[tokio::test]
    async fn pending_accounts_fan_out_with_unique_process_names() {
        let records = vec![
            record("200000000057", AccountStatus::Pending),
            record("200000000056", AccountStatus::Migrating(MigrationState::Joined)),
            record("200000000058", UPDATED),
        ];
        let h = harness(base_state(), records, config());

        let envelopes = CompletionWatcher::new(h.ctx.clone()).pending_accounts("Acme").await.unwrap();

        let ids: Vec<_> = envelopes.iter().map(|e| e.account_id.clone().unwrap()).collect();
        assert_eq!(ids, vec![id("200000000056"), id("200000000057")]);
        assert_eq!(envelopes[0].account_type, Some(AccountType::Linked));
        assert_ne!(envelopes[0].process_name, envelopes[1].process_name);
    }
}
