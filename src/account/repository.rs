//! Account ledger contract and its PostgreSQL backend

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use super::error::LedgerError;
use super::models::Account;
use super::outbox::{OutboxIntent, TransferOutbox, lease_deadline};
use crate::core_types::{AccountId, Amount, TransactionId};

/// Balance storage
///
/// Each method touches exactly one account row and is atomic on its own.
/// Two calls (a debit and its credit) are NOT atomic as a pair.
/// Non-negative balances are the caller's policy, except in
/// [`debit_if_sufficient`](AccountLedger::debit_if_sufficient).
#[async_trait]
pub trait AccountLedger: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Point lookup, no side effects
    async fn get(&self, id: &AccountId) -> Result<Account, LedgerError>;

    /// `balance += delta` as a single-row atomic update
    async fn adjust_balance(&self, id: &AccountId, delta: Amount) -> Result<(), LedgerError>;

    /// `balance -= amount` only if `balance >= amount`, checked and applied
    /// in the same atomic step
    async fn debit_if_sufficient(&self, id: &AccountId, amount: Amount)
    -> Result<(), LedgerError>;

    /// Insert a new account row (seeding and tests)
    async fn open(&self, account: &Account) -> Result<(), LedgerError>;

    async fn health_check(&self) -> Result<(), LedgerError>;
}

/// PostgreSQL-backed ledger over the `accounts` table
pub struct PgAccountLedger {
    pool: PgPool,
}

impl PgAccountLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_account(row: &sqlx::postgres::PgRow) -> Result<Account, LedgerError> {
        Ok(Account {
            id: AccountId::new(row.try_get::<String, _>("id")?),
            owner_name: row.try_get("owner_name")?,
            balance: Amount::from_minor(row.try_get("balance")?),
            currency: row.try_get("currency")?,
            created_at: row.try_get("created_at")?,
        })
    }

    /// Explain why a conditional debit touched zero rows
    async fn explain_failed_debit<'e, E>(
        executor: E,
        id: &AccountId,
        amount: Amount,
    ) -> LedgerError
    where
        E: sqlx::PgExecutor<'e>,
    {
        let balance = sqlx::query_scalar::<_, i64>("SELECT balance FROM accounts WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(executor)
            .await;

        match balance {
            Ok(Some(available)) => LedgerError::InsufficientFunds {
                account: id.clone(),
                available: Amount::from_minor(available),
                requested: amount,
            },
            Ok(None) => LedgerError::NotFound(id.clone()),
            Err(e) => e.into(),
        }
    }
}

#[async_trait]
impl AccountLedger for PgAccountLedger {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, id: &AccountId) -> Result<Account, LedgerError> {
        let row = sqlx::query(
            r#"SELECT id, owner_name, balance, currency, created_at
               FROM accounts WHERE id = $1"#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_account(&row),
            None => Err(LedgerError::NotFound(id.clone())),
        }
    }

    async fn adjust_balance(&self, id: &AccountId, delta: Amount) -> Result<(), LedgerError> {
        let result = sqlx::query("UPDATE accounts SET balance = balance + $1 WHERE id = $2")
            .bind(delta.minor())
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(id.clone()));
        }
        debug!(account = %id, delta = delta.minor(), "Balance adjusted");
        Ok(())
    }

    async fn debit_if_sufficient(
        &self,
        id: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "UPDATE accounts SET balance = balance - $1 WHERE id = $2 AND balance >= $1",
        )
        .bind(amount.minor())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::explain_failed_debit(&self.pool, id, amount).await);
        }
        debug!(account = %id, amount = amount.minor(), "Conditional debit applied");
        Ok(())
    }

    async fn open(&self, account: &Account) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"INSERT INTO accounts (id, owner_name, balance, currency, created_at)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (id) DO NOTHING"#,
        )
        .bind(account.id.as_str())
        .bind(&account.owner_name)
        .bind(account.balance.minor())
        .bind(&account.currency)
        .bind(account.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::AlreadyExists(account.id.clone()));
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), LedgerError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl TransferOutbox for PgAccountLedger {
    async fn commit_transfer(&self, intent: &OutboxIntent) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;

        // Intent first: the unique transaction_id makes a concurrent second
        // commit for the same transfer fail before it touches a balance.
        let inserted = sqlx::query(
            r#"INSERT INTO audit_outbox
                   (intent_id, transaction_id, from_account_id, to_account_id,
                    amount, currency, created_at, claimed_until)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(intent.intent_id)
        .bind(intent.transaction_id.as_str())
        .bind(intent.from_account_id.as_str())
        .bind(intent.to_account_id.as_str())
        .bind(intent.amount.minor())
        .bind(&intent.currency)
        .bind(intent.created_at)
        .bind(intent.claimed_until)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            let unique_violation = e
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation());
            tx.rollback().await?;
            return Err(if unique_violation {
                LedgerError::AlreadyCommitted(intent.transaction_id.clone())
            } else {
                e.into()
            });
        }

        let debited = sqlx::query(
            "UPDATE accounts SET balance = balance - $1 WHERE id = $2 AND balance >= $1",
        )
        .bind(intent.amount.minor())
        .bind(intent.from_account_id.as_str())
        .execute(&mut *tx)
        .await?;

        if debited.rows_affected() == 0 {
            let err =
                Self::explain_failed_debit(&mut *tx, &intent.from_account_id, intent.amount).await;
            tx.rollback().await?;
            return Err(err);
        }

        let credited = sqlx::query("UPDATE accounts SET balance = balance + $1 WHERE id = $2")
            .bind(intent.amount.minor())
            .bind(intent.to_account_id.as_str())
            .execute(&mut *tx)
            .await?;

        if credited.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(LedgerError::NotFound(intent.to_account_id.clone()));
        }

        tx.commit().await?;
        debug!(
            transaction_id = %intent.transaction_id,
            intent_id = %intent.intent_id,
            "Transfer committed with outbox intent"
        );
        Ok(())
    }

    async fn has_intent(&self, transaction_id: &TransactionId) -> Result<bool, LedgerError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM audit_outbox WHERE transaction_id = $1)",
        )
        .bind(transaction_id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn claim_pending(
        &self,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<OutboxIntent>, LedgerError> {
        let now = Utc::now();
        // SKIP LOCKED: rows being claimed by another scanner are left to it
        let rows = sqlx::query(
            r#"UPDATE audit_outbox SET claimed_until = $3
               WHERE intent_id IN (
                   SELECT intent_id FROM audit_outbox
                   WHERE resolved_at IS NULL
                     AND (claimed_until IS NULL OR claimed_until <= $2)
                   ORDER BY created_at ASC
                   LIMIT $1
                   FOR UPDATE SKIP LOCKED
               )
               RETURNING intent_id, transaction_id, from_account_id, to_account_id,
                         amount, currency, created_at, attempts, claimed_until"#,
        )
        .bind(limit as i64)
        .bind(now)
        .bind(lease_deadline(now, lease))
        .fetch_all(&self.pool)
        .await?;

        let mut claimed = rows
            .iter()
            .map(|row| -> Result<OutboxIntent, LedgerError> {
                let created_at: DateTime<Utc> = row.try_get("created_at")?;
                Ok(OutboxIntent {
                    intent_id: row.try_get::<Uuid, _>("intent_id")?,
                    transaction_id: TransactionId::new(row.try_get::<String, _>("transaction_id")?),
                    from_account_id: AccountId::new(row.try_get::<String, _>("from_account_id")?),
                    to_account_id: AccountId::new(row.try_get::<String, _>("to_account_id")?),
                    amount: Amount::from_minor(row.try_get("amount")?),
                    currency: row.try_get("currency")?,
                    created_at,
                    attempts: row.try_get("attempts")?,
                    claimed_until: row.try_get("claimed_until")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        // RETURNING does not keep the subquery order
        claimed.sort_by_key(|i| i.created_at);
        Ok(claimed)
    }

    async fn resolve(&self, intent_id: Uuid) -> Result<(), LedgerError> {
        sqlx::query(
            "UPDATE audit_outbox SET resolved_at = NOW() WHERE intent_id = $1 AND resolved_at IS NULL",
        )
        .bind(intent_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_failure(&self, intent_id: Uuid, error: &str) -> Result<(), LedgerError> {
        sqlx::query(
            r#"UPDATE audit_outbox
               SET attempts = attempts + 1, last_error = $1, claimed_until = NULL
               WHERE intent_id = $2"#,
        )
        .bind(error)
        .bind(intent_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_database;

    fn unique_id(prefix: &str) -> AccountId {
        AccountId::new(format!("{}_{}", prefix, ulid::Ulid::new()))
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL database"]
    async fn test_open_get_adjust() {
        let db = test_database().await.expect("database not available");
        let ledger = PgAccountLedger::new(db.pool().clone());

        let id = unique_id("alice");
        let account = Account::new(id.clone(), "Alice", Amount::from_minor(10_000), "USD");
        ledger.open(&account).await.unwrap();
        assert!(matches!(
            ledger.open(&account).await,
            Err(LedgerError::AlreadyExists(_))
        ));

        ledger
            .adjust_balance(&id, Amount::from_minor(-2_000))
            .await
            .unwrap();
        assert_eq!(ledger.get(&id).await.unwrap().balance, Amount::from_minor(8_000));
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL database"]
    async fn test_unknown_account() {
        let db = test_database().await.expect("database not available");
        let ledger = PgAccountLedger::new(db.pool().clone());
        let ghost = unique_id("ghost");

        assert_eq!(
            ledger.get(&ghost).await,
            Err(LedgerError::NotFound(ghost.clone()))
        );
        assert_eq!(
            ledger.adjust_balance(&ghost, Amount::from_minor(1)).await,
            Err(LedgerError::NotFound(ghost.clone()))
        );
        assert_eq!(
            ledger.debit_if_sufficient(&ghost, Amount::from_minor(1)).await,
            Err(LedgerError::NotFound(ghost))
        );
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL database"]
    async fn test_conditional_debit_rejects_overdraft() {
        let db = test_database().await.expect("database not available");
        let ledger = PgAccountLedger::new(db.pool().clone());
        let id = unique_id("alice");
        ledger
            .open(&Account::new(id.clone(), "Alice", Amount::from_minor(100), "USD"))
            .await
            .unwrap();

        let err = ledger
            .debit_if_sufficient(&id, Amount::from_minor(200))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(ledger.get(&id).await.unwrap().balance, Amount::from_minor(100));
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL database"]
    async fn test_commit_transfer_is_all_or_nothing() {
        let db = test_database().await.expect("database not available");
        let ledger = PgAccountLedger::new(db.pool().clone());
        let alice = unique_id("alice");
        ledger
            .open(&Account::new(alice.clone(), "Alice", Amount::from_minor(500), "USD"))
            .await
            .unwrap();

        // Destination missing: the debit must not survive
        let intent = OutboxIntent {
            intent_id: Uuid::new_v4(),
            transaction_id: TransactionId::generate(),
            from_account_id: alice.clone(),
            to_account_id: unique_id("ghost"),
            amount: Amount::from_minor(200),
            currency: "USD".to_string(),
            created_at: Utc::now(),
            attempts: 0,
            claimed_until: None,
        };
        assert!(matches!(
            ledger.commit_transfer(&intent).await,
            Err(LedgerError::NotFound(_))
        ));
        assert_eq!(ledger.get(&alice).await.unwrap().balance, Amount::from_minor(500));
        assert!(!ledger.has_intent(&intent.transaction_id).await.unwrap());
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL database"]
    async fn test_one_intent_per_transaction_and_exclusive_claims() {
        let db = test_database().await.expect("database not available");
        let ledger = PgAccountLedger::new(db.pool().clone());
        let alice = unique_id("alice");
        let bob = unique_id("bob");
        for id in [&alice, &bob] {
            ledger
                .open(&Account::new(id.clone(), "Holder", Amount::from_minor(1_000), "USD"))
                .await
                .unwrap();
        }

        let first = OutboxIntent {
            intent_id: Uuid::new_v4(),
            transaction_id: TransactionId::generate(),
            from_account_id: alice.clone(),
            to_account_id: bob.clone(),
            amount: Amount::from_minor(100),
            currency: "USD".to_string(),
            created_at: Utc::now(),
            attempts: 0,
            claimed_until: Some(Utc::now() + chrono::Duration::seconds(60)),
        };
        ledger.commit_transfer(&first).await.unwrap();

        let second = OutboxIntent {
            intent_id: Uuid::new_v4(),
            ..first.clone()
        };
        assert_eq!(
            ledger.commit_transfer(&second).await,
            Err(LedgerError::AlreadyCommitted(first.transaction_id.clone()))
        );
        assert_eq!(ledger.get(&alice).await.unwrap().balance, Amount::from_minor(900));

        // Held by the committing caller, then released by a failure
        let lease = Duration::from_secs(30);
        let claimed = ledger.claim_pending(1_000, lease).await.unwrap();
        assert!(claimed.iter().all(|i| i.intent_id != first.intent_id));

        ledger.record_failure(first.intent_id, "audit down").await.unwrap();
        let claimed = ledger.claim_pending(1_000, lease).await.unwrap();
        assert!(claimed.iter().any(|i| i.intent_id == first.intent_id));
        let again = ledger.claim_pending(1_000, lease).await.unwrap();
        assert!(again.iter().all(|i| i.intent_id != first.intent_id));

        ledger.resolve(first.intent_id).await.unwrap();
    }
}
