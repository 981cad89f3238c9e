//! Booking error types.

use thiserror::Error;

use crate::inventory::Resource;

/// Errors returned by the in-memory booking services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    /// No flight seat left to hold.
    #[error("no seat")]
    NoSeat,

    /// No hotel room left to hold.
    #[error("no room")]
    NoRoom,

    /// Confirm or release without a matching hold.
    #[error("no {0} hold")]
    NoHold(Resource),

    /// Injected outage, used to exercise retries.
    #[error("{0} service unavailable")]
    Unavailable(Resource),
}

/// Convenience type alias for booking results.
pub type Result<T> = std::result::Result<T, BookingError>;
