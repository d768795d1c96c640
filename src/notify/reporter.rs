use std::sync::Arc;
use tracing::{error, warn};

use super::{ErrorType, Notification, Notifier};
use crate::account::{AccountId, AccountRecord};
use crate::cloud::ApiError;
use crate::error::MigrationError;

/// A failure worth telling an operator about.
#[derive(Debug, Clone)]
pub struct Incident {
    pub error_type: ErrorType,
    pub company_name: String,
    pub account_id: Option<AccountId>,
    pub message: String,
    pub api_error: Option<ApiError>,
    pub slack_handle: Option<String>,
}

impl Incident {
    pub fn new(error_type: ErrorType, company_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type,
            company_name: company_name.into(),
            account_id: None,
            message: message.into(),
            api_error: None,
            slack_handle: None,
        }
    }

    /// Incident about `account`, routed to its Slack handle.
    pub fn for_account(error_type: ErrorType, account: &AccountRecord, message: impl Into<String>) -> Self {
        Self {
            account_id: Some(account.account_id.clone()),
            slack_handle: account.slack_handle.clone(),
            ..Self::new(error_type, account.company_name.clone(), message)
        }
    }

    /// Incident whose message is the error text; remote errors keep their code.
    pub fn from_error(error_type: ErrorType, account: &AccountRecord, err: &MigrationError) -> Self {
        let mut incident = Self::for_account(error_type, account, err.to_string());
        incident.api_error = err.api().cloned();
        incident
    }

    pub fn with_api_error(mut self, err: &ApiError) -> Self {
        self.api_error = Some(err.clone());
        self
    }
}

/// Logs failures and forwards them to the notifier.
#[derive(Clone)]
pub struct ErrorReporter {
    notifier: Arc<dyn Notifier>,
    title: String,
}

impl ErrorReporter {
    pub fn new(notifier: Arc<dyn Notifier>, title: impl Into<String>) -> Self {
        Self {
            notifier,
            title: title.into(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Log the incident and publish it. Returns the message to store in the
    /// account's `Error` field.
    pub async fn report(&self, incident: Incident) -> String {
        error!(
            company = %incident.company_name,
            account_id = incident.account_id.as_ref().map(|id| id.as_str()).unwrap_or(""),
            error_type = %incident.error_type,
            error_code = incident.api_error.as_ref().map(|e| e.code.as_str()).unwrap_or(""),
            "{}",
            incident.message
        );

        let mut notification = Notification::new(
            self.title.clone(),
            incident.error_type.as_str(),
            incident.message.clone(),
        )
        .for_company(incident.company_name.clone())
        .with_slack_handle(incident.slack_handle.as_deref());
        if let Some(id) = &incident.account_id {
            notification = notification.for_account(id);
        }
        if let Some(err) = &incident.api_error {
            notification = notification.with_api_error(err);
        }
        self.publish(&notification).await;

        incident.message
    }

    /// Publish a notification; delivery failures are logged, never raised.
    pub async fn publish(&self, notification: &Notification) {
        if let Err(err) = self.notifier.publish(notification).await {
            warn!(kind = %notification.kind, "notification delivery failed: {}", err);
        }
    }
}
