use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{AccountStore, StoreError};
use crate::account::{AccountId, AccountRecord};

type Key = (String, AccountId);

/// Process-local account table.
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    rows: RwLock<BTreeMap<Key, AccountRecord>>,
}

impl InMemoryAccountStore {
    pub fn with_records(records: impl IntoIterator<Item = AccountRecord>) -> Self {
        let rows = records
            .into_iter()
            .map(|r| ((r.company_name.clone(), r.account_id.clone()), r))
            .collect();
        Self {
            rows: RwLock::new(rows),
        }
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get_account(
        &self,
        company_name: &str,
        account_id: &AccountId,
    ) -> Result<Option<AccountRecord>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&(company_name.to_string(), account_id.clone()))
            .cloned())
    }

    async fn accounts_for_company(&self, company_name: &str) -> Result<Vec<AccountRecord>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|r| r.company_name == company_name)
            .cloned()
            .collect())
    }

    async fn upsert(&self, record: &AccountRecord) -> Result<AccountRecord, StoreError> {
        let mut stored = record.clone();
        stored.last_updated_on = Some(Utc::now());
        let mut rows = self.rows.write().await;
        rows.insert(
            (stored.company_name.clone(), stored.account_id.clone()),
            stored.clone(),
        );
        Ok(stored)
    }
}
