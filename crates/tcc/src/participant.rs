//! Participants: named Try/Confirm/Cancel operations plus per-phase status.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::BoxError;

/// Future returned by a participant operation.
pub type OperationFuture = BoxFuture<'static, Result<(), BoxError>>;

/// A fallible zero-argument async operation.
///
/// Implemented for every `Fn() -> impl Future<Output = Result<(), E>>`
/// closure whose error converts into [`BoxError`].
pub trait Operation: Send + Sync + 'static {
    /// Starts one invocation of the operation.
    fn call(&self) -> OperationFuture;
}

impl<F, Fut, E> Operation for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError>,
{
    fn call(&self) -> OperationFuture {
        let fut = self();
        async move { fut.await.map_err(Into::into) }.boxed()
    }
}

/// A service that takes part in TCC transactions.
///
/// Alternative to passing three closures to [`Participant::new`].
#[async_trait]
pub trait TccService: Send + Sync + 'static {
    /// Error returned by the service's operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Tentatively reserves the resource. Never retried.
    async fn try_reserve(&self) -> Result<(), Self::Error>;

    /// Makes the tentative reservation permanent. Retried on failure,
    /// so it must be safe to repeat.
    async fn confirm(&self) -> Result<(), Self::Error>;

    /// Releases the tentative reservation. Retried on failure, so it must be
    /// safe to repeat, and it must tolerate a Try that reserved nothing.
    async fn cancel(&self) -> Result<(), Self::Error>;
}

/// Snapshot of a participant's per-phase flags.
///
/// "Attempted" and "succeeded" are recorded separately for each phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParticipantStatus {
    pub tried: bool,
    pub try_succeeded: bool,
    pub confirmed: bool,
    pub confirm_succeeded: bool,
    pub canceled: bool,
    pub cancel_succeeded: bool,
}

impl ParticipantStatus {
    /// Checks the implications between flags:
    /// `try_succeeded ⇒ tried`, `confirm_succeeded ⇒ confirmed ⇒ tried`,
    /// `cancel_succeeded ⇒ canceled ⇒ tried`.
    pub fn is_consistent(&self) -> bool {
        let implies = |a: bool, b: bool| !a || b;
        implies(self.try_succeeded, self.tried)
            && implies(self.confirmed, self.tried)
            && implies(self.confirm_succeeded, self.confirmed)
            && implies(self.canceled, self.tried)
            && implies(self.cancel_succeeded, self.canceled)
    }
}

#[derive(Debug, Default)]
struct PhaseFlags {
    tried: AtomicBool,
    try_succeeded: AtomicBool,
    confirmed: AtomicBool,
    confirm_succeeded: AtomicBool,
    canceled: AtomicBool,
    cancel_succeeded: AtomicBool,
}

impl PhaseFlags {
    fn all(&self) -> [&AtomicBool; 6] {
        [
            &self.tried,
            &self.try_succeeded,
            &self.confirmed,
            &self.confirm_succeeded,
            &self.canceled,
            &self.cancel_succeeded,
        ]
    }
}

/// One resource owner taking part in a transaction.
///
/// The operation bindings never change after construction. The status flags
/// belong to the coordinator for the duration of a run and are cleared at the
/// start of the next one. Each flag is written by the single task handling
/// this participant in a phase, so plain atomics are enough.
pub struct Participant {
    name: String,
    try_op: Arc<dyn Operation>,
    confirm_op: Arc<dyn Operation>,
    cancel_op: Arc<dyn Operation>,
    flags: PhaseFlags,
}

impl Participant {
    /// Creates a participant from three operations.
    pub fn new(
        name: impl Into<String>,
        try_op: impl Operation,
        confirm_op: impl Operation,
        cancel_op: impl Operation,
    ) -> Self {
        Self {
            name: name.into(),
            try_op: Arc::new(try_op),
            confirm_op: Arc::new(confirm_op),
            cancel_op: Arc::new(cancel_op),
            flags: PhaseFlags::default(),
        }
    }

    /// Creates a participant backed by a [`TccService`].
    pub fn from_service<S: TccService>(name: impl Into<String>, service: S) -> Self {
        let service = Arc::new(service);
        let (s1, s2, s3) = (service.clone(), service.clone(), service);
        Self::new(
            name,
            move || {
                let s = s1.clone();
                async move { s.try_reserve().await }
            },
            move || {
                let s = s2.clone();
                async move { s.confirm().await }
            },
            move || {
                let s = s3.clone();
                async move { s.cancel().await }
            },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the Try operation once.
    pub fn try_reserve(&self) -> OperationFuture {
        self.try_op.call()
    }

    /// Invokes the Confirm operation once.
    pub fn confirm(&self) -> OperationFuture {
        self.confirm_op.call()
    }

    /// Invokes the Cancel operation once.
    pub fn cancel(&self) -> OperationFuture {
        self.cancel_op.call()
    }

    /// Whether Try was attempted in the current transaction.
    pub fn tried(&self) -> bool {
        self.flags.tried.load(Ordering::Acquire)
    }

    /// Whether Try succeeded.
    pub fn try_succeeded(&self) -> bool {
        self.flags.try_succeeded.load(Ordering::Acquire)
    }

    /// Whether Confirm was attempted.
    pub fn confirmed(&self) -> bool {
        self.flags.confirmed.load(Ordering::Acquire)
    }

    /// Whether Confirm eventually succeeded.
    pub fn confirm_succeeded(&self) -> bool {
        self.flags.confirm_succeeded.load(Ordering::Acquire)
    }

    /// Whether Cancel was attempted.
    pub fn canceled(&self) -> bool {
        self.flags.canceled.load(Ordering::Acquire)
    }

    /// Whether Cancel eventually succeeded.
    pub fn cancel_succeeded(&self) -> bool {
        self.flags.cancel_succeeded.load(Ordering::Acquire)
    }

    /// Returns a snapshot of all six flags.
    pub fn status(&self) -> ParticipantStatus {
        ParticipantStatus {
            tried: self.tried(),
            try_succeeded: self.try_succeeded(),
            confirmed: self.confirmed(),
            confirm_succeeded: self.confirm_succeeded(),
            canceled: self.canceled(),
            cancel_succeeded: self.cancel_succeeded(),
        }
    }

    pub(crate) fn reset(&self) {
        for flag in self.flags.all() {
            flag.store(false, Ordering::Release);
        }
    }

    pub(crate) fn mark_tried(&self) {
        self.flags.tried.store(true, Ordering::Release);
    }

    pub(crate) fn mark_try_succeeded(&self) {
        self.flags.try_succeeded.store(true, Ordering::Release);
    }

    pub(crate) fn mark_confirmed(&self) {
        self.flags.confirmed.store(true, Ordering::Release);
    }

    pub(crate) fn mark_confirm_succeeded(&self) {
        self.flags.confirm_succeeded.store(true, Ordering::Release);
    }

    pub(crate) fn mark_canceled(&self) {
        self.flags.canceled.store(true, Ordering::Release);
    }

    pub(crate) fn mark_cancel_succeeded(&self) {
        self.flags.cancel_succeeded.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
