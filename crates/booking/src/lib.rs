//! Flight and hotel booking on top of the TCC coordinator.
//!
//! A single in-memory inventory backs two participants: one holding a flight
//! seat, one holding a hotel room. Either both are booked or neither is.

pub mod config;
pub mod error;
pub mod inventory;
pub mod services;

use tcc::Coordinator;

pub use config::Config;
pub use error::BookingError;
pub use inventory::{InMemoryInventory, Resource, StockLevel};
pub use services::{
    FLIGHT_RESERVATION, HOTEL_RESERVATION, ReservationService, flight_participant,
    hotel_participant,
};

/// Builds a coordinator booking one seat and one room per transaction.
pub fn trip_coordinator(inventory: &InMemoryInventory, config: &Config) -> Coordinator {
    Coordinator::builder()
        .participant(flight_participant(inventory))
        .participant(hotel_participant(inventory))
        .retry_policy(config.retry_policy())
        .build()
}
