//! Account data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::core_types::{AccountId, Amount};

/// Account balance row
///
/// Created outside this service (or by `AccountLedger::open` for seeding)
/// and never deleted. `balance` changes only through the ledger's
/// single-row adjustment primitives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Account {
    pub id: AccountId,
    pub owner_name: String,
    pub balance: Amount,
    #[schema(example = "USD")]
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(
        id: impl Into<AccountId>,
        owner_name: impl Into<String>,
        balance: Amount,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_name: owner_name.into(),
            balance,
            currency: currency.into(),
            created_at: crate::transfer::clock::now_micros(),
        }
    }

    /// Whether a debit of `amount` keeps the balance non-negative
    pub fn can_cover(&self, amount: Amount) -> bool {
        self.balance >= amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_cover() {
        let alice = Account::new("alice", "Alice", Amount::from_minor(100), "USD");
        assert!(alice.can_cover(Amount::from_minor(100)));
        assert!(!alice.can_cover(Amount::from_minor(200)));
    }
}
