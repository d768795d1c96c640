//! Operator notifications
//!
//! Steps report failures through [`ErrorReporter`], which logs the failure and
//! optionally publishes a [`Notification`] through a [`Notifier`]. Delivery
//! transports (chat webhooks, topic fan-out) live outside this crate; the
//! notifiers here either log the payload or keep it in memory.
//!
//! Published notifications flow back into [`NotificationClassifier`], a second
//! recovery pass that recognizes known remote error codes and repairs the
//! account record or attaches instructions for the account owner.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

use crate::account::AccountId;
use crate::cloud::ApiError;

pub mod classifier;
pub mod reporter;

pub use classifier::{ErrorHandler, NotificationClassifier};
pub use reporter::{ErrorReporter, Incident};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to publish notification to {topic}: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure categories shown to operators in the notification `Type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorType {
    #[serde(rename = "Account Integrity Error")]
    AccountIntegrity,
    #[serde(rename = "Check Account Type Error")]
    CheckAccountType,
    #[serde(rename = "Change OU Error")]
    ChangeOu,
    #[serde(rename = "Create master role in Linked account  Error")]
    CreateLinkedRoles,
    #[serde(rename = "Create master role in Master account error")]
    CreateMasterRoles,
    #[serde(rename = "Cleanup Error")]
    Cleanup,
    #[serde(rename = "Notification Handler Error")]
    NotificationHandler,
    #[serde(rename = "Join Organization Error")]
    JoinOrganization,
    #[serde(rename = "Leave Organization Error")]
    LeaveOrganization,
    #[serde(rename = "Org Level Resource Permission Scan Error")]
    OrgPermissionScan,
    #[serde(rename = "Billing Access Check Error")]
    BillingAccess,
    #[serde(rename = "Support Case Error")]
    SupportCase,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::AccountIntegrity => "Account Integrity Error",
            ErrorType::CheckAccountType => "Check Account Type Error",
            ErrorType::ChangeOu => "Change OU Error",
            ErrorType::CreateLinkedRoles => "Create master role in Linked account  Error",
            ErrorType::CreateMasterRoles => "Create master role in Master account error",
            ErrorType::Cleanup => "Cleanup Error",
            ErrorType::NotificationHandler => "Notification Handler Error",
            ErrorType::JoinOrganization => "Join Organization Error",
            ErrorType::LeaveOrganization => "Leave Organization Error",
            ErrorType::OrgPermissionScan => "Org Level Resource Permission Scan Error",
            ErrorType::BillingAccess => "Billing Access Check Error",
            ErrorType::SupportCase => "Support Case Error",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the second-pass classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandlingStatus {
    Handled,
    Unhandled,
}

/// Notification payload shared with the delivery transports.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Notification {
    pub title: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    /// Error category, or the summary heading for non-error notices
    #[serde(rename = "Type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_item: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<HandlingStatus>,
}

impl Notification {
    pub fn new(title: impl Into<String>, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            kind: kind.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn for_company(mut self, company_name: impl Into<String>) -> Self {
        self.company_name = Some(company_name.into());
        self
    }

    pub fn for_account(mut self, account_id: &AccountId) -> Self {
        self.account_id = Some(account_id.to_string());
        self
    }

    pub fn with_api_error(mut self, error: &ApiError) -> Self {
        self.error_code = Some(error.code.clone());
        self.error_message = Some(error.message.clone());
        self
    }

    pub fn with_slack_handle(mut self, handle: Option<&str>) -> Self {
        self.slack_handle = handle.map(str::to_string);
        self
    }

    pub fn with_action_item(mut self, action_item: impl Into<String>) -> Self {
        self.action_item = Some(action_item.into());
        self
    }
}

/// Delivery channel for notifications
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Publish one notification
    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes each notification to the log, tagged with the topic it would be
/// routed to.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    topic: Option<String>,
    slack_topic: Option<String>,
}

impl LogNotifier {
    pub fn new(topic: Option<String>, slack_topic: Option<String>) -> Self {
        Self { topic, slack_topic }
    }

    /// Notifications carrying a Slack handle go to the Slack topic when one is
    /// configured.
    pub fn topic_for(&self, notification: &Notification) -> &str {
        let slack = notification
            .slack_handle
            .as_ref()
            .and(self.slack_topic.as_deref());
        slack.or(self.topic.as_deref()).unwrap_or("default")
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(notification)?;
        info!(
            topic = self.topic_for(notification),
            kind = %notification.kind,
            company = notification.company_name.as_deref().unwrap_or(""),
            account_id = notification.account_id.as_deref().unwrap_or(""),
            payload = %payload,
            "notification published"
        );
        Ok(())
    }
}

/// Keeps published notifications for inspection.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    published: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn published(&self) -> Vec<Notification> {
        self.published
            .lock()
            .map(|n| n.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn count_of(&self, kind: ErrorType) -> usize {
        self.published()
            .iter()
            .filter(|n| n.kind == kind.as_str())
            .count()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut published = self
            .published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        published.push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_uses_pascal_case_keys() {
        let notification = Notification::new("Migration Engine", ErrorType::ChangeOu.as_str(), "moved")
            .for_company("Acme")
            .with_api_error(&ApiError::new("ConstraintViolationException", "limit"));
        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["Type"], "Change OU Error");
        assert_eq!(value["CompanyName"], "Acme");
        assert_eq!(value["ErrorCode"], "ConstraintViolationException");
        assert!(value.get("SlackHandle").is_none());
    }

    #[test]
    fn slack_handles_route_to_slack_topic() {
        let notifier = LogNotifier::new(Some("ops".into()), Some("slack".into()));
        let plain = Notification::new("t", "k", "m");
        let routed = plain.clone().with_slack_handle(Some("https://hooks.example/x"));
        assert_eq!(notifier.topic_for(&plain), "ops");
        assert_eq!(notifier.topic_for(&routed), "slack");
    }

    #[test]
    fn log_notifier_accepts_every_payload() {
        let notifier = LogNotifier::default();
        tokio_test::block_on(async {
            let n = Notification::new("t", ErrorType::Cleanup.as_str(), "m").with_action_item("close it");
            assert!(notifier.publish(&n).await.is_ok());
            assert_eq!(notifier.topic_for(&n), "default");
        });
    }

    #[tokio::test]
    async fn memory_notifier_counts_by_kind() {
        let notifier = MemoryNotifier::default();
        let n = Notification::new("t", ErrorType::JoinOrganization.as_str(), "m");
        notifier.publish(&n).await.unwrap();
        notifier.publish(&n).await.unwrap();
        assert_eq!(notifier.count_of(ErrorType::JoinOrganization), 2);
        assert_eq!(notifier.count_of(ErrorType::ChangeOu), 0);
    }
}
