use async_trait::async_trait;
use chrono::Utc;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Row, SqlitePool};
use tracing::info;

use super::{AccountStore, StatusQuery, StoreError};
use crate::account::{AccountId, AccountRecord, AccountStatus, AccountType};

/// Account table backed by SQLite.
///
/// The full record is kept as JSON; the key, type, and status columns exist
/// for indexed lookups.
pub struct SqliteAccountStore {
    pool: SqlitePool,
}

impl SqliteAccountStore {
    /// Connect, creating the database file and running migrations as needed.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        auto_migrate: bool,
    ) -> Result<Self, StoreError> {
        if !sqlx::Sqlite::database_exists(database_url).await? {
            info!("Creating database at {}", database_url);
            sqlx::Sqlite::create_database(database_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;

        if auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Database migrations completed");
        }

        Ok(Self { pool })
    }

    fn decode(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<AccountRecord>, StoreError> {
        rows.into_iter()
            .map(|row| {
                let raw: String = row.get("record");
                serde_json::from_str(&raw).map_err(StoreError::from)
            })
            .collect()
    }
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn get_account(
        &self,
        company_name: &str,
        account_id: &AccountId,
    ) -> Result<Option<AccountRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT record FROM accounts
            WHERE company_name = ?1 AND account_id = ?2
            "#,
        )
        .bind(company_name)
        .bind(account_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("record");
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn accounts_for_company(&self, company_name: &str) -> Result<Vec<AccountRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT record FROM accounts
            WHERE company_name = ?1
            ORDER BY account_id ASC
            "#,
        )
        .bind(company_name)
        .fetch_all(&self.pool)
        .await?;
        Self::decode(rows)
    }

    async fn accounts_by_type(
        &self,
        company_name: &str,
        account_type: AccountType,
    ) -> Result<Vec<AccountRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT record FROM accounts
            WHERE company_name = ?1 AND account_type = ?2
            ORDER BY account_id ASC
            "#,
        )
        .bind(company_name)
        .bind(account_type.to_string())
        .fetch_all(&self.pool)
        .await?;
        Self::decode(rows)
    }

    async fn accounts_with_status(
        &self,
        company_name: &str,
        query: StatusQuery,
    ) -> Result<Vec<AccountRecord>, StoreError> {
        // Status codes order Pending below the migrate chain and the
        // decommission chain above it.
        let rows = match query {
            StatusQuery::Exactly(status) => {
                sqlx::query(
                    r#"
                    SELECT record FROM accounts
                    WHERE company_name = ?1 AND account_status = ?2
                    ORDER BY account_id ASC
                    "#,
                )
                .bind(company_name)
                .bind(i64::from(status.code()))
                .fetch_all(&self.pool)
                .await?
            }
            StatusQuery::MigratingBelow(stage) => {
                sqlx::query(
                    r#"
                    SELECT record FROM accounts
                    WHERE company_name = ?1 AND migrate = 1 AND account_status < ?2
                    ORDER BY account_id ASC
                    "#,
                )
                .bind(company_name)
                .bind(i64::from(AccountStatus::Migrating(stage).code()))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Self::decode(rows)
    }

    async fn upsert(&self, record: &AccountRecord) -> Result<AccountRecord, StoreError> {
        let mut stored = record.clone();
        let now = Utc::now();
        stored.last_updated_on = Some(now);

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO accounts
                (company_name, account_id, account_type, account_status, migrate, record, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&stored.company_name)
        .bind(stored.account_id.as_str())
        .bind(stored.account_type.to_string())
        .bind(i64::from(stored.account_status.code()))
        .bind(stored.migrate)
        .bind(serde_json::to_string(&stored)?)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{DecommissionState, MigrationState};

    async fn store_in(dir: &tempfile::TempDir) -> SqliteAccountStore {
        let url = format!("sqlite://{}", dir.path().join("accounts.db").display());
        SqliteAccountStore::connect(&url, 1, true).await.unwrap()
    }

    #[tokio::test]
    async fn round_trips_through_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        let record = AccountRecord::new("Acme", "42".parse().unwrap(), AccountType::Master, "Admin")
            .with_status(AccountStatus::Migrating(MigrationState::Joined));
        store.upsert(&record).await.unwrap();

        let master = store.master_account("Acme").await.unwrap().unwrap();
        assert_eq!(master.account_id.as_str(), "000000000042");
        assert_eq!(master.account_status, record.account_status);
    }

    #[tokio::test]
    async fn status_queries_run_against_the_status_column() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        let linked = |raw: &str, status: AccountStatus| {
            AccountRecord::new("Acme", raw.parse().unwrap(), AccountType::Linked, "Admin").with_status(status)
        };
        for record in [
            linked("1", AccountStatus::Pending),
            linked("2", AccountStatus::Migrating(MigrationState::Joined)),
            linked("3", AccountStatus::Migrating(MigrationState::Updated)),
            linked("4", AccountStatus::Decommissioning(DecommissionState::Left)),
            linked("5", AccountStatus::Pending).with_migrate(false),
        ] {
            store.upsert(&record).await.unwrap();
        }

        let ids = |records: Vec<AccountRecord>| {
            records
                .into_iter()
                .map(|r| r.account_id.to_string())
                .collect::<Vec<_>>()
        };

        let stragglers = store
            .accounts_with_status("Acme", StatusQuery::MigratingBelow(MigrationState::Updated))
            .await
            .unwrap();
        assert_eq!(ids(stragglers), vec!["000000000001", "000000000002"]);

        let left = store
            .accounts_with_status(
                "Acme",
                StatusQuery::Exactly(AccountStatus::Decommissioning(DecommissionState::Left)),
            )
            .await
            .unwrap();
        assert_eq!(ids(left), vec!["000000000004"]);
    }
}
