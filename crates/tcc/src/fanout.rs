//! Fan-out/fan-in for one phase: one task per participant, joined as a barrier.

use std::collections::HashMap;
use std::future::Future;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio::task::{Id, JoinHandle};

use crate::error::{FailedPhase, ParticipantError, TransactionError};

/// The set of tasks running one phase.
///
/// Every spawned task runs to completion; a failure never aborts its
/// siblings. Only the first failure to complete is kept.
///
/// Tasks are spawned detached. Dropping the group, or the future awaiting
/// [`PhaseGroup::join`], leaves in-flight operations running to completion.
pub(crate) struct PhaseGroup {
    phase: FailedPhase,
    tasks: FuturesUnordered<JoinHandle<Result<(), TransactionError>>>,
    participants: HashMap<Id, String>,
}

impl PhaseGroup {
    pub(crate) fn new(phase: FailedPhase) -> Self {
        Self {
            phase,
            tasks: FuturesUnordered::new(),
            participants: HashMap::new(),
        }
    }

    /// Starts the task handling `participant` in this phase.
    pub(crate) fn spawn<F>(&mut self, participant: &str, task: F)
    where
        F: Future<Output = Result<(), TransactionError>> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.participants.insert(handle.id(), participant.to_string());
        self.tasks.push(handle);
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for every task and returns the first recorded failure.
    ///
    /// Later failures are logged and dropped. A task that panicked counts as
    /// a failure of this phase for its participant.
    pub(crate) async fn join(mut self) -> Option<TransactionError> {
        let mut first: Option<TransactionError> = None;

        while let Some(joined) = self.tasks.next().await {
            let err = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(join_err) => {
                    let participant = self
                        .participants
                        .get(&join_err.id())
                        .cloned()
                        .unwrap_or_default();
                    let reason = if join_err.is_panic() {
                        "participant task panicked"
                    } else {
                        "participant task was cancelled"
                    };
                    tracing::error!(
                        phase = %self.phase,
                        %participant,
                        reason,
                        "phase task aborted"
                    );
                    TransactionError::new(self.phase, participant, ParticipantError::new(reason))
                }
            };

            if first.is_none() {
                first = Some(err);
            } else {
                tracing::warn!(
                    phase = %self.phase,
                    participant = err.participant_name(),
                    error = %err.cause(),
                    "additional failure in phase, not surfaced"
                );
            }
        }

        first
    }
}
