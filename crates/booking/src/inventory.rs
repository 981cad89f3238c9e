//! In-memory flight seat and hotel room stock.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{BookingError, Result};

/// A bookable resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resource {
    Flight,
    Hotel,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Flight => "flight",
            Resource::Hotel => "hotel",
        }
    }

    fn out_of_stock(&self) -> BookingError {
        match self {
            Resource::Flight => BookingError::NoSeat,
            Resource::Hotel => BookingError::NoRoom,
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counters for one resource.
///
/// `stock` is what can still be held, `pending` is held by a Try but not yet
/// confirmed, `reserved` is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockLevel {
    pub stock: u64,
    pub pending: u64,
    pub reserved: u64,
}

#[derive(Debug, Default)]
struct ResourceState {
    level: StockLevel,
    fail_next_confirms: u32,
    fail_next_cancels: u32,
}

impl ResourceState {
    fn take_failure(counter: &mut u32) -> bool {
        if *counter > 0 {
            *counter -= 1;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    flight: ResourceState,
    hotel: ResourceState,
}

impl InMemoryInventoryState {
    fn resource(&mut self, resource: Resource) -> &mut ResourceState {
        match resource {
            Resource::Flight => &mut self.flight,
            Resource::Hotel => &mut self.hotel,
        }
    }
}

/// In-memory inventory shared by the flight and hotel services.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventory {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventory {
    /// Creates an inventory with the given seat and room stock.
    pub fn new(flight_seats: u64, hotel_rooms: u64) -> Self {
        let inventory = Self::default();
        {
            let mut state = inventory.state.write().unwrap();
            state.flight.level.stock = flight_seats;
            state.hotel.level.stock = hotel_rooms;
        }
        inventory
    }

    /// Returns the current counters for a resource.
    pub fn level(&self, resource: Resource) -> StockLevel {
        let state = self.state.read().unwrap();
        match resource {
            Resource::Flight => state.flight.level,
            Resource::Hotel => state.hotel.level,
        }
    }

    /// Makes the next `count` Confirm calls for `resource` fail.
    pub fn set_fail_on_confirm(&self, resource: Resource, count: u32) {
        self.state.write().unwrap().resource(resource).fail_next_confirms = count;
    }

    /// Makes the next `count` Cancel calls for `resource` fail.
    pub fn set_fail_on_cancel(&self, resource: Resource, count: u32) {
        self.state.write().unwrap().resource(resource).fail_next_cancels = count;
    }

    /// Takes one unit out of stock and holds it.
    pub fn try_hold(&self, resource: Resource) -> Result<()> {
        let mut state = self.state.write().unwrap();
        let level = &mut state.resource(resource).level;
        if level.stock == 0 {
            return Err(resource.out_of_stock());
        }
        level.stock -= 1;
        level.pending += 1;
        tracing::debug!(%resource, stock = level.stock, "unit held");
        Ok(())
    }

    /// Turns a held unit into a reservation.
    ///
    /// Holds are not attributed to callers here; callers must only confirm a
    /// hold they took (see [`ReservationService`](crate::ReservationService)).
    pub fn confirm_hold(&self, resource: Resource) -> Result<()> {
        let mut state = self.state.write().unwrap();
        let entry = state.resource(resource);
        if ResourceState::take_failure(&mut entry.fail_next_confirms) {
            return Err(BookingError::Unavailable(resource));
        }
        if entry.level.pending == 0 {
            return Err(BookingError::NoHold(resource));
        }
        entry.level.pending -= 1;
        entry.level.reserved += 1;
        tracing::debug!(%resource, reserved = entry.level.reserved, "hold confirmed");
        Ok(())
    }

    /// Returns a held unit to stock. Same caller contract as
    /// [`confirm_hold`](Self::confirm_hold).
    pub fn release_hold(&self, resource: Resource) -> Result<()> {
        let mut state = self.state.write().unwrap();
        let entry = state.resource(resource);
        if ResourceState::take_failure(&mut entry.fail_next_cancels) {
            return Err(BookingError::Unavailable(resource));
        }
        if entry.level.pending == 0 {
            return Err(BookingError::NoHold(resource));
        }
        entry.level.pending -= 1;
        entry.level.stock += 1;
        tracing::debug!(%resource, stock = entry.level.stock, "hold released");
        Ok(())
    }
}
