//! Per-run transaction record.

use chrono::{DateTime, Utc};
use common::TransactionId;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TransactionError};
use crate::participant::ParticipantStatus;
use crate::state::TransactionState;

/// A participant's final status within one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantReport {
    pub name: String,
    pub status: ParticipantStatus,
}

/// Everything observed during one coordinator run.
///
/// Unlike the flags on a [`Participant`](crate::Participant), which the next
/// run clears, a report stays valid after the coordinator is reused.
#[derive(Debug)]
pub struct TransactionReport {
    pub(crate) id: TransactionId,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) finished_at: DateTime<Utc>,
    pub(crate) resolution: TransactionState,
    pub(crate) participants: Vec<ParticipantReport>,
    pub(crate) result: Result<()>,
}

impl TransactionReport {
    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    /// Returns the second phase that was entered: `Confirming` or `Canceling`.
    pub fn resolution(&self) -> TransactionState {
        self.resolution
    }

    /// Returns every participant's status, in coordinator order.
    pub fn participants(&self) -> &[ParticipantReport] {
        &self.participants
    }

    /// Returns the status of the first participant with the given name.
    pub fn participant(&self, name: &str) -> Option<&ParticipantStatus> {
        self.participants
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.status)
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Returns the surfaced error, if the run failed.
    pub fn error(&self) -> Option<&TransactionError> {
        self.result.as_ref().err()
    }

    pub fn into_result(self) -> Result<()> {
        self.result
    }
}
