//! TCC error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed cause returned by participant operations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The phase in which a transaction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailedPhase {
    /// At least one Try failed; every tried participant was then canceled
    /// successfully.
    TryFailed,

    /// Every Try succeeded but some Confirm kept failing after all retries.
    /// Try is supposed to guarantee Confirm, so the state has to be
    /// reconciled by hand.
    ConfirmFailed,

    /// A Try failed and the compensating Cancel of some participant kept
    /// failing after all retries. External state may be inconsistent.
    CancelFailed,
}

impl FailedPhase {
    /// Returns the phase name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailedPhase::TryFailed => "try",
            FailedPhase::ConfirmFailed => "confirm",
            FailedPhase::CancelFailed => "cancel",
        }
    }
}

impl std::fmt::Display for FailedPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The single error surfaced by a failed coordinator run.
///
/// Only the first failure recorded in the deciding phase is carried here.
/// The per-participant status flags hold the rest of the picture.
#[derive(Debug, Error)]
#[error("{phase} phase failed for participant '{participant}': {cause}")]
pub struct TransactionError {
    phase: FailedPhase,
    participant: String,
    #[source]
    cause: BoxError,
}

impl TransactionError {
    /// Creates a new transaction error.
    pub fn new(
        phase: FailedPhase,
        participant: impl Into<String>,
        cause: impl Into<BoxError>,
    ) -> Self {
        Self {
            phase,
            participant: participant.into(),
            cause: cause.into(),
        }
    }

    /// Returns the phase that failed.
    pub fn failed_phase(&self) -> FailedPhase {
        self.phase
    }

    /// Returns the name of the participant whose operation failed.
    pub fn participant_name(&self) -> &str {
        &self.participant
    }

    /// Returns the underlying failure of the last attempt.
    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.cause.as_ref()
    }

    /// Returns true if the failure left external state needing reconciliation.
    pub fn requires_manual_intervention(&self) -> bool {
        matches!(
            self.phase,
            FailedPhase::ConfirmFailed | FailedPhase::CancelFailed
        )
    }
}

/// Plain message error for participant operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ParticipantError(String);

impl ParticipantError {
    /// Creates a participant error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Convenience type alias for coordinator results.
pub type Result<T> = std::result::Result<T, TransactionError>;
