// Second-pass recovery for published failures.
//
// Known remote error codes map to a handler that either repairs the account
// record or explains what the account owner must do by hand. Everything else
// is marked unhandled so it stays visible to operators.

use std::sync::Arc;
use tracing::info;

use super::{ErrorReporter, ErrorType, HandlingStatus, Incident, Notification};
use crate::account::{AccountId, MigrationState};
use crate::cloud::ApiErrorKind;
use crate::error::{MigrationError, MigrationResult};
use crate::store::{AccountStore, StoreError};

const PHONE_PIN_ACTION: &str = "Account owner need to preform required action manually. \
To complete phone pin verification someone logged in as the root user must visit this \
URL: https://portal.aws.amazon.com/gp/aws/developer/registration/index.html?client=organizations&enforcePI=True";

const AGREEMENT_ACTION: &str = "Account owner need to preform required action manually. \
To accept the agreement someone logged in as the root user must visit this \
URL: https://portal.aws.amazon.com/billing/signup?type=resubscribe#/resubscribed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorHandler {
    ConstraintViolation,
    HandshakeConstraintViolation,
    DuplicateAccount,
    /// No recovery; the notification stays unhandled.
    Notify,
}

impl ErrorHandler {
    pub fn for_code(code: Option<&str>) -> Self {
        match code.map(ApiErrorKind::from_code) {
            Some(ApiErrorKind::ConstraintViolation) => ErrorHandler::ConstraintViolation,
            Some(ApiErrorKind::HandshakeConstraintViolation) => ErrorHandler::HandshakeConstraintViolation,
            Some(ApiErrorKind::DuplicateAccount) => ErrorHandler::DuplicateAccount,
            _ => ErrorHandler::Notify,
        }
    }
}

pub struct NotificationClassifier {
    store: Arc<dyn AccountStore>,
    reporter: ErrorReporter,
}

impl NotificationClassifier {
    pub fn new(store: Arc<dyn AccountStore>, reporter: ErrorReporter) -> Self {
        Self { store, reporter }
    }

    /// Annotate `notification` with a handling status, applying the recovery
    /// its error code calls for.
    pub async fn classify(&self, mut notification: Notification) -> MigrationResult<Notification> {
        let handler = ErrorHandler::for_code(notification.error_code.as_deref());
        info!(?handler, code = notification.error_code.as_deref().unwrap_or(""), "classifying notification");

        match handler {
            ErrorHandler::Notify => {
                notification.status = Some(HandlingStatus::Unhandled);
            }
            ErrorHandler::ConstraintViolation => constraint_violation(&mut notification),
            ErrorHandler::HandshakeConstraintViolation => {
                notification.slack_handle = None;
                if self.advance(&notification, MigrationState::Joined).await? {
                    notification.status = Some(HandlingStatus::Handled);
                }
            }
            ErrorHandler::DuplicateAccount => {
                notification.status = Some(HandlingStatus::Handled);
                notification.slack_handle = None;
                self.advance(&notification, MigrationState::Updated).await?;
            }
        }
        Ok(notification)
    }

    /// Move the referenced account forward. Store and status failures are
    /// reported and yield `false`; a missing account is an error.
    async fn advance(&self, notification: &Notification, stage: MigrationState) -> MigrationResult<bool> {
        let company = notification
            .company_name
            .clone()
            .ok_or_else(|| MigrationError::InvalidInput("notification has no CompanyName".to_string()))?;
        let account_id: AccountId = notification
            .account_id
            .as_deref()
            .ok_or_else(|| MigrationError::InvalidInput("notification has no AccountId".to_string()))?
            .parse()?;

        let outcome: MigrationResult<()> = async {
            let mut account = self.store.require_account(&company, &account_id).await?;
            account.account_status.advance_to(stage)?;
            self.store.upsert(&account).await?;
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => Ok(true),
            Err(err @ MigrationError::Store(StoreError::AccountNotFound { .. })) => {
                let mut incident = Incident::new(ErrorType::NotificationHandler, company, err.to_string());
                incident.account_id = Some(account_id);
                self.reporter.report(incident).await;
                Err(err)
            }
            Err(err) => {
                let mut incident = Incident::new(ErrorType::NotificationHandler, company, err.to_string());
                incident.account_id = Some(account_id);
                self.reporter.report(incident).await;
                Ok(false)
            }
        }
    }
}

fn constraint_violation(notification: &mut Notification) {
    let message = notification.error_message.clone().unwrap_or_default();

    if message.contains("valid payment method") {
        notification.slack_handle = None;
        notification.status = Some(HandlingStatus::Unhandled);
        return;
    }
    if message.contains("completed phone pin verification") {
        notification.action_item = Some(PHONE_PIN_ACTION.to_string());
        notification.status = Some(HandlingStatus::Handled);
    }
    if message.contains("signed the Customer Agreement") {
        notification.action_item = Some(AGREEMENT_ACTION.to_string());
        notification.status = Some(HandlingStatus::Handled);
    }
}
