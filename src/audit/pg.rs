//! PostgreSQL audit log over the append-only `ledger_entries` table

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::models::{EntryStatus, LedgerEntry};
use super::store::{AuditLog, AuditLogError};
use crate::core_types::{AccountId, Amount, TransactionId};

pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: &PgRow) -> Result<LedgerEntry, AuditLogError> {
        let id: String = row.try_get("_id")?;
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<EntryStatus>()
            .map_err(|reason| AuditLogError::Corrupt {
                id: id.clone(),
                reason,
            })?;

        Ok(LedgerEntry {
            transaction_id: TransactionId::new(row.try_get::<String, _>("transaction_id")?),
            from_account_id: AccountId::new(row.try_get::<String, _>("from_account_id")?),
            to_account_id: AccountId::new(row.try_get::<String, _>("to_account_id")?),
            amount: Amount::from_minor(row.try_get("amount")?),
            currency: row.try_get("currency")?,
            status,
            timestamp: row.try_get("timestamp")?,
            id,
        })
    }
}

#[async_trait]
impl AuditLog for PgAuditLog {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn append(&self, entry: &LedgerEntry) -> Result<(), AuditLogError> {
        sqlx::query(
            r#"INSERT INTO ledger_entries
                   (_id, transaction_id, from_account_id, to_account_id,
                    amount, currency, status, timestamp)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(&entry.id)
        .bind(entry.transaction_id.as_str())
        .bind(entry.from_account_id.as_str())
        .bind(entry.to_account_id.as_str())
        .bind(entry.amount.minor())
        .bind(&entry.currency)
        .bind(entry.status.as_str())
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query(&self, account: &AccountId) -> Result<Vec<LedgerEntry>, AuditLogError> {
        let rows = sqlx::query(
            r#"SELECT _id, transaction_id, from_account_id, to_account_id,
                      amount, currency, status, timestamp
               FROM ledger_entries
               WHERE from_account_id = $1 OR to_account_id = $1
               ORDER BY timestamp DESC, seq DESC"#,
        )
        .bind(account.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn find_by_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Vec<LedgerEntry>, AuditLogError> {
        let rows = sqlx::query(
            r#"SELECT _id, transaction_id, from_account_id, to_account_id,
                      amount, currency, status, timestamp
               FROM ledger_entries
               WHERE transaction_id = $1
               ORDER BY seq ASC"#,
        )
        .bind(transaction_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn health_check(&self) -> Result<(), AuditLogError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
