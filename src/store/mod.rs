// Account table storage.
//
// The table is the single source of truth shared by every step and by the
// completion watcher. Writes are plain upserts: last writer wins, and every
// write stamps `LastUpdatedOn`.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::account::{AccountId, AccountRecord, AccountStatus, AccountType, MigrationState};
use crate::config::{StoreBackend, StoreConfig};

pub mod file;
pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

pub use file::JsonFileAccountStore;
pub use memory::InMemoryAccountStore;
#[cfg(feature = "database")]
pub use sqlite::SqliteAccountStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "database")]
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Account {account_id} of company {company_name} not found")]
    AccountNotFound {
        company_name: String,
        account_id: AccountId,
    },

    #[error("System Error: {count} master accounts found for company {company_name}")]
    DuplicateMaster { company_name: String, count: usize },

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Status predicates used by the batch queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusQuery {
    Exactly(AccountStatus),
    /// Accounts flagged for migration that have not reached the stage yet.
    MigratingBelow(MigrationState),
}

impl StatusQuery {
    pub fn matches(&self, record: &AccountRecord) -> bool {
        match self {
            StatusQuery::Exactly(status) => record.account_status == *status,
            StatusQuery::MigratingBelow(stage) => {
                record.migrate && record.account_status.is_below(*stage)
            }
        }
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(
        &self,
        company_name: &str,
        account_id: &AccountId,
    ) -> Result<Option<AccountRecord>, StoreError>;

    async fn accounts_for_company(&self, company_name: &str) -> Result<Vec<AccountRecord>, StoreError>;

    /// Insert or replace the record, returning it as stored.
    async fn upsert(&self, record: &AccountRecord) -> Result<AccountRecord, StoreError>;

    async fn accounts_by_type(
        &self,
        company_name: &str,
        account_type: AccountType,
    ) -> Result<Vec<AccountRecord>, StoreError> {
        Ok(self
            .accounts_for_company(company_name)
            .await?
            .into_iter()
            .filter(|r| r.is_type(account_type))
            .collect())
    }

    async fn accounts_with_status(
        &self,
        company_name: &str,
        query: StatusQuery,
    ) -> Result<Vec<AccountRecord>, StoreError> {
        Ok(self
            .accounts_for_company(company_name)
            .await?
            .into_iter()
            .filter(|r| query.matches(r))
            .collect())
    }

    async fn require_account(
        &self,
        company_name: &str,
        account_id: &AccountId,
    ) -> Result<AccountRecord, StoreError> {
        self.get_account(company_name, account_id)
            .await?
            .ok_or_else(|| StoreError::AccountNotFound {
                company_name: company_name.to_string(),
                account_id: account_id.clone(),
            })
    }

    /// The company's Master record, if any. More than one is an integrity
    /// violation.
    async fn master_account(&self, company_name: &str) -> Result<Option<AccountRecord>, StoreError> {
        let mut masters = self.accounts_by_type(company_name, AccountType::Master).await?;
        if masters.len() > 1 {
            return Err(StoreError::DuplicateMaster {
                company_name: company_name.to_string(),
                count: masters.len(),
            });
        }
        Ok(masters.pop())
    }
}

/// Open the store selected by configuration.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn AccountStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryAccountStore::default())),
        StoreBackend::JsonFile => Ok(Arc::new(JsonFileAccountStore::new(&config.path))),
        #[cfg(feature = "database")]
        StoreBackend::Sqlite => Ok(Arc::new(
            SqliteAccountStore::connect(&config.database_url, config.max_connections, config.auto_migrate)
                .await?,
        )),
        #[cfg(not(feature = "database"))]
        StoreBackend::Sqlite => Err(StoreError::Backend(
            "sqlite backend requires the 'database' feature".to_string(),
        )),
    }
}
