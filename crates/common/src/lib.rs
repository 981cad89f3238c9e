//! Shared types for the TCC workspace.

mod types;

pub use types::TransactionId;
