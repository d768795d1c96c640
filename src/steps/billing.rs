use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::info;

use super::{AccountStep, StepContext};
use crate::account::{AccountRecord, AccountType};
use crate::cloud::{ApiErrorKind, ApiResult};
use crate::error::MigrationResult;
use crate::notify::ErrorType;
use crate::workflow::{Signal, StepEnvelope, StepKind};

const COST_WINDOW_DAYS: i64 = 5;

/// Check that the access role can read billing data.
pub struct CheckBillingAccess;

#[async_trait]
impl AccountStep for CheckBillingAccess {
    fn kind(&self) -> StepKind {
        StepKind::CheckBillingAccess
    }

    fn error_type(&self) -> ErrorType {
        ErrorType::BillingAccess
    }

    async fn run(
        &self,
        ctx: &StepContext,
        account: &mut AccountRecord,
        _envelope: &mut StepEnvelope,
    ) -> MigrationResult<Signal> {
        if account.is_type(AccountType::Standalone) {
            return Ok(Signal::Completed);
        }

        match query_recent_costs(ctx, account).await {
            Ok(()) => {
                info!(account_id = %account.account_id, "billing data is readable");
                Ok(Signal::Completed)
            }
            Err(err) if err.is(ApiErrorKind::AccessDenied) => {
                Ok(ctx.wait_on(ErrorType::BillingAccess, account, &err).await)
            }
            Err(err) => Err(err.into()),
        }
    }
}

async fn query_recent_costs(ctx: &StepContext, account: &AccountRecord) -> ApiResult<()> {
    let session = ctx.access_session(&account.account_id).await?;
    let end = Utc::now().date_naive();
    let start = end - Duration::days(COST_WINDOW_DAYS);
    ctx.cloud.billing.get_cost_and_usage(&session, start, end).await
}
