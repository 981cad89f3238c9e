//! Try-Confirm-Cancel (TCC) coordination.
//!
//! This crate coordinates an all-or-nothing outcome across independent
//! participants without a global lock. Each participant exposes three
//! operations:
//! 1. Try: tentatively reserve a resource
//! 2. Confirm: make the reservation permanent
//! 3. Cancel: release the tentative reservation
//!
//! The [`Coordinator`] runs Try on every participant concurrently. If all of
//! them succeed it confirms everyone; otherwise it cancels everyone that was
//! tried. Confirm and Cancel are retried with exponential backoff; Try never
//! is.

pub mod coordinator;
pub mod error;
mod fanout;
pub mod participant;
pub mod report;
pub mod retry;
pub mod state;

pub use common::TransactionId;
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use error::{BoxError, FailedPhase, ParticipantError, Result, TransactionError};
pub use participant::{Operation, OperationFuture, Participant, ParticipantStatus, TccService};
pub use report::{ParticipantReport, TransactionReport};
pub use retry::{Backoff, RetryError, RetryPolicy};
pub use state::TransactionState;
