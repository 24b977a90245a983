//! Queue message schema
//!
//! JSON object `{id?, fromAccountId, toAccountId, amount, currency}`.
//! snake_case field names and numeric account ids from older producers are
//! accepted; unknown fields (`status`, `created_at`) are ignored.

use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

use super::error::ChannelError;
use crate::core_types::{AccountId, Amount, TransactionId};
use crate::transfer::TransferRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferMessage {
    /// Pre-assigned transaction id; an empty string counts as absent
    #[serde(
        default,
        deserialize_with = "optional_id",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<String>)]
    pub id: Option<TransactionId>,

    #[serde(alias = "from_account_id", deserialize_with = "account_id")]
    pub from_account_id: AccountId,

    #[serde(alias = "to_account_id", deserialize_with = "account_id")]
    pub to_account_id: AccountId,

    /// Minor units
    pub amount: Amount,

    #[schema(example = "USD")]
    pub currency: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireAccountId {
    Text(String),
    Number(i64),
}

fn account_id<'de, D: Deserializer<'de>>(d: D) -> Result<AccountId, D::Error> {
    Ok(match WireAccountId::deserialize(d)? {
        WireAccountId::Text(s) => AccountId::new(s),
        WireAccountId::Number(n) => AccountId::new(n.to_string()),
    })
}

fn optional_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<TransactionId>, D::Error> {
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw.filter(|s| !s.is_empty()).map(TransactionId::new))
}

impl TransferMessage {
    pub fn decode(body: &[u8]) -> Result<Self, ChannelError> {
        Ok(serde_json::from_slice(body)?)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ChannelError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn into_request(self) -> TransferRequest {
        let request = TransferRequest::new(
            self.from_account_id,
            self.to_account_id,
            self.amount,
            self.currency,
        );
        match self.id {
            Some(id) => request.with_id(id),
            None => request,
        }
    }
}

impl From<&TransferRequest> for TransferMessage {
    fn from(request: &TransferRequest) -> Self {
        Self {
            id: request.id.clone(),
            from_account_id: request.from_account_id.clone(),
            to_account_id: request.to_account_id.clone(),
            amount: request.amount,
            currency: request.currency.clone(),
        }
    }
}
