//! In-process audit log

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::models::LedgerEntry;
use super::store::{AuditLog, AuditLogError};
use crate::core_types::{AccountId, TransactionId};

/// Append-only vector; index order is insertion order
#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<LedgerEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Copy of every entry, in insertion order
    pub async fn snapshot(&self) -> Vec<LedgerEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn append(&self, entry: &LedgerEntry) -> Result<(), AuditLogError> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn query(&self, account: &AccountId) -> Result<Vec<LedgerEntry>, AuditLogError> {
        let entries = self.entries.read().await;
        let mut matched: Vec<LedgerEntry> = entries
            .iter()
            .rev()
            .filter(|e| e.involves(account))
            .cloned()
            .collect();
        // Stable sort keeps the reversed insertion order among equal timestamps
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(matched)
    }

    async fn find_by_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Vec<LedgerEntry>, AuditLogError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| &e.transaction_id == transaction_id)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<(), AuditLogError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::EntryStatus;
    use crate::core_types::Amount;
    use chrono::{DateTime, Duration, Utc};

    fn entry(id: &str, from: &str, to: &str, at: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            id: id.to_string(),
            transaction_id: TransactionId::new(id),
            from_account_id: from.into(),
            to_account_id: to.into(),
            amount: Amount::from_minor(100),
            currency: "USD".to_string(),
            status: EntryStatus::Success,
            timestamp: at,
        }
    }

    #[tokio::test]
    async fn test_query_filters_and_orders() {
        let log = InMemoryAuditLog::new();
        let t0 = Utc::now();
        log.append(&entry("e1", "alice", "bob", t0)).await.unwrap();
        log.append(&entry("e2", "carol", "dave", t0 + Duration::seconds(1)))
            .await
            .unwrap();
        log.append(&entry("e3", "bob", "alice", t0 + Duration::seconds(2)))
            .await
            .unwrap();
        log.append(&entry("e0", "alice", "carol", t0 - Duration::seconds(5)))
            .await
            .unwrap();

        let ids: Vec<String> = log
            .query(&"alice".into())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["e3", "e1", "e0"]);
        assert!(log.query(&"nobody".into()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_equal_timestamps_newest_insert_first() {
        let log = InMemoryAuditLog::new();
        let t = Utc::now();
        log.append(&entry("first", "alice", "bob", t)).await.unwrap();
        log.append(&entry("second", "alice", "bob", t)).await.unwrap();

        let history = log.query(&"alice".into()).await.unwrap();
        assert_eq!(history[0].id, "second");
        assert_eq!(history[1].id, "first");
    }

    #[tokio::test]
    async fn test_duplicate_append_is_kept() {
        let log = InMemoryAuditLog::new();
        let e = entry("dup", "alice", "bob", Utc::now());
        log.append(&e).await.unwrap();
        log.append(&e).await.unwrap();

        assert_eq!(log.len().await, 2);
        assert_eq!(
            log.find_by_transaction(&TransactionId::new("dup")).await.unwrap().len(),
            2
        );
    }
}
