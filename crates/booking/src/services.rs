//! TCC services over the in-memory inventory.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tcc::{Participant, TccService};

use crate::error::BookingError;
use crate::inventory::{InMemoryInventory, Resource};

/// Participant name of the flight seat service.
pub const FLIGHT_RESERVATION: &str = "flight reservation";

/// Participant name of the hotel room service.
pub const HOTEL_RESERVATION: &str = "hotel reservation";

/// Reserves one unit of a resource per transaction.
///
/// Remembers whether its own latest Try took a hold, so Confirm and Cancel
/// only ever act on that hold and never on units held by other services
/// sharing the inventory. A new Try forgets any hold left over from an
/// earlier transaction whose Confirm failed; that one needs reconciling.
#[derive(Debug)]
pub struct ReservationService {
    inventory: InMemoryInventory,
    resource: Resource,
    holding: AtomicBool,
}

impl ReservationService {
    pub fn new(inventory: InMemoryInventory, resource: Resource) -> Self {
        Self {
            inventory,
            resource,
            holding: AtomicBool::new(false),
        }
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    /// Whether this service's latest Try holds a unit not yet confirmed or
    /// released.
    pub fn is_holding(&self) -> bool {
        self.holding.load(Ordering::Acquire)
    }
}

#[async_trait]
impl TccService for ReservationService {
    type Error = BookingError;

    async fn try_reserve(&self) -> Result<(), BookingError> {
        self.holding.store(false, Ordering::Release);
        self.inventory.try_hold(self.resource)?;
        self.holding.store(true, Ordering::Release);
        Ok(())
    }

    async fn confirm(&self) -> Result<(), BookingError> {
        if !self.is_holding() {
            return Err(BookingError::NoHold(self.resource));
        }
        self.inventory.confirm_hold(self.resource)?;
        self.holding.store(false, Ordering::Release);
        Ok(())
    }

    /// No-op when the latest Try took nothing, e.g. because it failed.
    async fn cancel(&self) -> Result<(), BookingError> {
        if !self.is_holding() {
            tracing::debug!(resource = %self.resource, "nothing held, cancel skipped");
            return Ok(());
        }
        self.inventory.release_hold(self.resource)?;
        self.holding.store(false, Ordering::Release);
        Ok(())
    }
}

/// Builds the flight seat participant.
pub fn flight_participant(inventory: &InMemoryInventory) -> Participant {
    Participant::from_service(
        FLIGHT_RESERVATION,
        ReservationService::new(inventory.clone(), Resource::Flight),
    )
}

/// Builds the hotel room participant.
pub fn hotel_participant(inventory: &InMemoryInventory) -> Participant {
    Participant::from_service(
        HOTEL_RESERVATION,
        ReservationService::new(inventory.clone(), Resource::Hotel),
    )
}
