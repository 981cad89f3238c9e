//! Transaction phase state machine.

use serde::{Deserialize, Serialize};

/// The phase a coordinator is in.
///
/// State transitions:
/// ```text
/// Idle ──► Trying ──┬──► Confirming ──► Done
///                   └──► Canceling  ──► Done
/// Done ──► Trying (next run over the same participants)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TransactionState {
    /// No transaction has run yet.
    #[default]
    Idle,

    /// Try operations are in flight.
    Trying,

    /// Every Try succeeded and Confirm operations are in flight.
    Confirming,

    /// Some Try failed and Cancel operations are in flight.
    Canceling,

    /// The last transaction finished, successfully or not (terminal state).
    Done,
}

impl TransactionState {
    /// Returns true if a new transaction can start from this state.
    pub fn can_begin(&self) -> bool {
        matches!(self, TransactionState::Idle | TransactionState::Done)
    }

    /// Returns true if the Confirm phase can be entered.
    pub fn can_confirm(&self) -> bool {
        matches!(self, TransactionState::Trying)
    }

    /// Returns true if the Cancel phase can be entered.
    pub fn can_cancel(&self) -> bool {
        matches!(self, TransactionState::Trying)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Done)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Idle => "Idle",
            TransactionState::Trying => "Trying",
            TransactionState::Confirming => "Confirming",
            TransactionState::Canceling => "Canceling",
            TransactionState::Done => "Done",
        }
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
