use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicI64, Ordering};

use super::Signal;
use crate::account::{AccountId, AccountType};
use crate::error::{MigrationError, MigrationResult};

/// Step input and output. Fields the engine does not know are carried through
/// untouched so the scheduler can keep its own state in the envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StepEnvelope {
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_type: Option<AccountType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Signal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
    /// Roles the last role step had to create; empty when all were present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_roles: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

static LAST_PROCESS_STAMP: AtomicI64 = AtomicI64::new(0);

impl StepEnvelope {
    pub fn for_company(company_name: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
            ..Default::default()
        }
    }

    pub fn for_account(company_name: impl Into<String>, account_id: AccountId) -> Self {
        Self {
            account_id: Some(account_id),
            ..Self::for_company(company_name)
        }
    }

    /// Parse scheduler input, unwrapping a `{"Data": ...}` wrapper or a
    /// single-element list.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let value = match value {
            Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
            other => other,
        };
        let value = match value {
            Value::Object(mut map) if map.contains_key("Data") && !map.contains_key("CompanyName") => {
                map.remove("Data").unwrap_or(Value::Null)
            }
            other => other,
        };
        serde_json::from_value(value)
    }

    pub fn account_id(&self) -> MigrationResult<&AccountId> {
        self.account_id
            .as_ref()
            .ok_or_else(|| MigrationError::InvalidInput("envelope has no AccountId".to_string()))
    }

    pub fn with_status(mut self, signal: Signal) -> Self {
        self.status = Some(signal);
        self
    }

    /// Stamp a unique `ProcessName` for the scheduler's child executions.
    pub fn stamp_process_name(&mut self) {
        let account = self
            .account_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "None".to_string());
        self.process_name = Some(format!(
            "{}-{}-{}",
            self.company_name,
            account,
            next_process_stamp()
        ));
    }
}

/// Wall-clock nanoseconds, bumped so that successive calls never repeat.
fn next_process_stamp() -> i64 {
    let now = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let previous = LAST_PROCESS_STAMP
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
        .unwrap_or(now);
    now.max(previous + 1)
}
