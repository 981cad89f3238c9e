//! Coordinator driving participants through Try, then Confirm or Cancel.

use std::sync::Arc;

use chrono::Utc;
use common::TransactionId;

use crate::error::{FailedPhase, ParticipantError, Result, TransactionError};
use crate::fanout::PhaseGroup;
use crate::participant::Participant;
use crate::report::{ParticipantReport, TransactionReport};
use crate::retry::RetryPolicy;
use crate::state::TransactionState;

/// Orchestrates all-or-nothing transactions over a fixed participant set.
///
/// Every phase runs one task per participant concurrently and waits for all
/// of them before the next phase is decided:
/// - Try on everyone, once, never retried.
/// - If every Try succeeded, Confirm on everyone under the retry policy.
/// - Otherwise Cancel, under the retry policy, on everyone whose Try was
///   attempted.
///
/// The coordinator can be reused; each run clears the participants' flags
/// first.
#[derive(Debug)]
pub struct Coordinator {
    participants: Vec<Arc<Participant>>,
    retry_policy: Arc<RetryPolicy>,
    state: TransactionState,
}

impl Coordinator {
    /// Creates a coordinator with the default retry policy.
    pub fn new(participants: Vec<Participant>) -> Self {
        Self::builder().participants(participants).build()
    }

    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    /// Returns the participants in the order they were added.
    pub fn participants(&self) -> &[Arc<Participant>] {
        &self.participants
    }

    /// Returns the first participant with the given name.
    pub fn participant(&self, name: &str) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.name() == name)
            .map(Arc::as_ref)
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Returns the current phase. `Done` after every completed run.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Runs one transaction.
    ///
    /// Returns the single surfaced error on failure. `CancelFailed` takes
    /// precedence over the `TryFailed` that triggered the cancel.
    pub async fn orchestrate(&mut self) -> Result<()> {
        self.execute().await.into_result()
    }

    /// Runs one transaction and returns its full record.
    ///
    /// Dropping the returned future (for example under a timeout) does not
    /// abort operations already in flight: the current phase's tasks still
    /// run to completion and update their flags, but no later phase starts,
    /// so tentative reservations from a dropped run are not compensated.
    #[tracing::instrument(
        skip(self),
        fields(transaction_id = tracing::field::Empty, participants = self.participants.len())
    )]
    pub async fn execute(&mut self) -> TransactionReport {
        let id = TransactionId::new();
        tracing::Span::current().record("transaction_id", tracing::field::display(id));
        metrics::counter!("tcc_transactions_total").increment(1);
        let started_at = Utc::now();
        let timer = std::time::Instant::now();

        if !self.state.can_begin() {
            tracing::warn!(state = %self.state, "previous transaction was interrupted");
        }
        for participant in &self.participants {
            participant.reset();
        }

        self.transition(TransactionState::Trying);
        let result = match self.try_all().await {
            Some(try_err) => {
                debug_assert!(self.state.can_cancel());
                self.transition(TransactionState::Canceling);
                match self.cancel_all().await {
                    Some(cancel_err) => Err(cancel_err),
                    None => Err(try_err),
                }
            }
            None => {
                debug_assert!(self.state.can_confirm());
                self.transition(TransactionState::Confirming);
                match self.confirm_all().await {
                    Some(confirm_err) => Err(confirm_err),
                    None => Ok(()),
                }
            }
        };
        let resolution = self.state;
        self.transition(TransactionState::Done);

        let duration = timer.elapsed().as_secs_f64();
        metrics::histogram!("tcc_transaction_duration_seconds").record(duration);
        match &result {
            Ok(()) => {
                metrics::counter!("tcc_transactions_committed").increment(1);
                tracing::info!(%id, duration, "transaction committed");
            }
            Err(err) => {
                let phase = err.failed_phase().as_str();
                metrics::counter!("tcc_transactions_failed", "phase" => phase).increment(1);
                if err.requires_manual_intervention() {
                    tracing::error!(
                        %id,
                        phase = %err.failed_phase(),
                        participant = err.participant_name(),
                        error = %err.cause(),
                        "transaction left inconsistent state, manual reconciliation required"
                    );
                } else {
                    tracing::warn!(
                        %id,
                        participant = err.participant_name(),
                        error = %err.cause(),
                        "transaction canceled"
                    );
                }
            }
        }

        TransactionReport {
            id,
            started_at,
            finished_at: Utc::now(),
            resolution,
            participants: self
                .participants
                .iter()
                .map(|p| ParticipantReport {
                    name: p.name().to_string(),
                    status: p.status(),
                })
                .collect(),
            result,
        }
    }

    fn transition(&mut self, next: TransactionState) {
        tracing::info!(from = %self.state, to = %next, "transaction state changed");
        self.state = next;
    }

    /// Try phase: each participant once, no retry.
    async fn try_all(&self) -> Option<TransactionError> {
        let mut group = PhaseGroup::new(FailedPhase::TryFailed);

        for participant in &self.participants {
            let p = Arc::clone(participant);
            group.spawn(participant.name(), async move {
                p.mark_tried();
                metrics::counter!("tcc_operation_attempts_total", "phase" => "try").increment(1);
                match p.try_reserve().await {
                    Ok(()) => {
                        p.mark_try_succeeded();
                        Ok(())
                    }
                    Err(cause) => {
                        tracing::warn!(participant = p.name(), error = %cause, "try failed");
                        Err(TransactionError::new(FailedPhase::TryFailed, p.name(), cause))
                    }
                }
            });
        }

        group.join().await
    }

    /// Confirm phase: every participant, retried under the policy.
    async fn confirm_all(&self) -> Option<TransactionError> {
        let mut group = PhaseGroup::new(FailedPhase::ConfirmFailed);

        for participant in &self.participants {
            let p = Arc::clone(participant);
            let policy = Arc::clone(&self.retry_policy);
            group.spawn(participant.name(), async move {
                p.mark_confirmed();
                // Unreachable through the Try gate unless the flags were
                // tampered with mid-run.
                if !p.try_succeeded() {
                    return Err(TransactionError::new(
                        FailedPhase::ConfirmFailed,
                        p.name(),
                        ParticipantError::new("try did not succeed"),
                    ));
                }

                let confirmed = policy
                    .retry(|| {
                        metrics::counter!("tcc_operation_attempts_total", "phase" => "confirm")
                            .increment(1);
                        p.confirm()
                    })
                    .await;
                match confirmed {
                    Ok(()) => {
                        p.mark_confirm_succeeded();
                        Ok(())
                    }
                    Err(err) => {
                        tracing::error!(
                            participant = p.name(),
                            attempts = err.attempts(),
                            error = %err.last(),
                            "confirm failed after retries"
                        );
                        Err(TransactionError::new(
                            FailedPhase::ConfirmFailed,
                            p.name(),
                            err.into_last(),
                        ))
                    }
                }
            });
        }

        group.join().await
    }

    /// Cancel phase: every participant whose Try was attempted, retried
    /// under the policy. Participants never tried are skipped.
    async fn cancel_all(&self) -> Option<TransactionError> {
        let mut group = PhaseGroup::new(FailedPhase::CancelFailed);

        for participant in self.participants.iter().filter(|p| p.tried()) {
            let p = Arc::clone(participant);
            let policy = Arc::clone(&self.retry_policy);
            group.spawn(participant.name(), async move {
                p.mark_canceled();

                let canceled = policy
                    .retry(|| {
                        metrics::counter!("tcc_operation_attempts_total", "phase" => "cancel")
                            .increment(1);
                        p.cancel()
                    })
                    .await;
                match canceled {
                    Ok(()) => {
                        p.mark_cancel_succeeded();
                        Ok(())
                    }
                    Err(err) => {
                        tracing::error!(
                            participant = p.name(),
                            attempts = err.attempts(),
                            error = %err.last(),
                            "cancel failed after retries"
                        );
                        Err(TransactionError::new(
                            FailedPhase::CancelFailed,
                            p.name(),
                            err.into_last(),
                        ))
                    }
                }
            });
        }

        tracing::debug!(tasks = group.len(), "cancel phase started");
        group.join().await
    }
}

/// Builder for [`Coordinator`].
#[derive(Default)]
pub struct CoordinatorBuilder {
    participants: Vec<Participant>,
    retry_policy: RetryPolicy,
}

impl CoordinatorBuilder {
    /// Adds one participant.
    pub fn participant(mut self, participant: Participant) -> Self {
        self.participants.push(participant);
        self
    }

    /// Adds several participants, keeping their order.
    pub fn participants(mut self, participants: impl IntoIterator<Item = Participant>) -> Self {
        self.participants.extend(participants);
        self
    }

    /// Overrides only the attempt budget of the current policy.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry_policy = self.retry_policy.with_max_attempts(max_attempts);
        self
    }

    /// Replaces the whole retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn build(self) -> Coordinator {
        Coordinator {
            participants: self.participants.into_iter().map(Arc::new).collect(),
            retry_policy: Arc::new(self.retry_policy),
            state: TransactionState::Idle,
        }
    }
}
