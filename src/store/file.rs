// JSON file implementation of the account table.
//
// Every operation reads the whole table, so separate CLI invocations see each
// other's writes. A sidecar lock file serializes read-modify-write cycles
// across processes.

use async_trait::async_trait;
use chrono::Utc;
use fd_lock::RwLock;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{AccountStore, StoreError};
use crate::account::{AccountId, AccountRecord};

#[derive(Debug, Clone)]
pub struct JsonFileAccountStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonFileAccountStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let lock_path = path.with_extension("lock");
        Self { path, lock_path }
    }

    fn read_table(path: &Path) -> Result<Vec<AccountRecord>, StoreError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(path)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn write_table(path: &Path, rows: &[AccountRecord]) -> Result<(), StoreError> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(rows)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Run `f` over the table while holding the file lock.
    async fn with_table<T, F>(&self, write: bool, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Vec<AccountRecord>) -> T + Send + 'static,
    {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let lock_file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&lock_path)?;
            let mut lock = RwLock::new(lock_file);
            let _guard = lock.write()?;

            let mut rows = Self::read_table(&path)?;
            let out = f(&mut rows);
            if write {
                Self::write_table(&path, &rows)?;
                debug!(path = %path.display(), rows = rows.len(), "account table written");
            }
            Ok(out)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("account table task failed: {e}")))?
    }
}

#[async_trait]
impl AccountStore for JsonFileAccountStore {
    async fn get_account(
        &self,
        company_name: &str,
        account_id: &AccountId,
    ) -> Result<Option<AccountRecord>, StoreError> {
        let company = company_name.to_string();
        let id = account_id.clone();
        self.with_table(false, move |rows| {
            rows.iter()
                .find(|r| r.company_name == company && r.account_id == id)
                .cloned()
        })
        .await
    }

    async fn accounts_for_company(&self, company_name: &str) -> Result<Vec<AccountRecord>, StoreError> {
        let company = company_name.to_string();
        self.with_table(false, move |rows| {
            rows.iter()
                .filter(|r| r.company_name == company)
                .cloned()
                .collect()
        })
        .await
    }

    async fn upsert(&self, record: &AccountRecord) -> Result<AccountRecord, StoreError> {
        let mut stored = record.clone();
        stored.last_updated_on = Some(Utc::now());
        let row = stored.clone();
        self.with_table(true, move |rows| {
            match rows
                .iter_mut()
                .find(|r| r.company_name == row.company_name && r.account_id == row.account_id)
            {
                Some(existing) => *existing = row,
                None => rows.push(row),
            }
        })
        .await?;
        Ok(stored)
    }
}
