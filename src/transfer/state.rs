//! Transfer stage model
//!
//! ```text
//! VALIDATING → DEBITING → CREDITING → AUDITING → DONE
//!      ↓           ↓          ↓           ↓
//!   rejected   persistence persistence  audit
//!                error    (debit kept)  error
//! ```
//!
//! No retry loop and no automatic reversal from any error exit.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStage {
    /// Input checks, source lookup and balance check
    Validating,

    /// Source debit (or, in outbox mode, the whole atomic commit)
    Debiting,

    /// Destination credit. Failing here leaves the debit in place.
    Crediting,

    /// Audit append. Failing here leaves the transfer settled but unaudited.
    Auditing,

    /// Terminal
    Done,
}

impl TransferStage {
    /// Whether an error exit from this stage can leave balances changed
    #[inline]
    pub fn may_leave_partial_state(&self) -> bool {
        matches!(self, TransferStage::Crediting | TransferStage::Auditing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStage::Validating => "VALIDATING",
            TransferStage::Debiting => "DEBITING",
            TransferStage::Crediting => "CREDITING",
            TransferStage::Auditing => "AUDITING",
            TransferStage::Done => "DONE",
        }
    }
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
