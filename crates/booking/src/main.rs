//! Booking demo entry point.
//!
//! Runs two trips against the same stock. The first books a seat and the only
//! room; the second finds no room, so its seat hold is released again.

use booking::{Config, InMemoryInventory, Resource, trip_coordinator};
use tcc::Coordinator;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

async fn book_trip(label: &str, coordinator: &mut Coordinator, inventory: &InMemoryInventory) {
    let report = coordinator.execute().await;
    let outcome = if report.is_success() { "booked" } else { "rejected" };
    metrics::counter!("booking_trips_total", "outcome" => outcome).increment(1);

    match report.error() {
        None => tracing::info!(trip = label, id = %report.id(), "trip booked"),
        Some(err) => tracing::warn!(
            trip = label,
            id = %report.id(),
            error = %err.cause(),
            failed_phase = %err.failed_phase(),
            participant = err.participant_name(),
            "trip not booked"
        ),
    }

    for resource in [Resource::Flight, Resource::Hotel] {
        let level = inventory.level(resource);
        tracing::info!(
            trip = label,
            %resource,
            stock = level.stock,
            pending = level.pending,
            reserved = level.reserved,
            "inventory"
        );
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Build stock and the trip coordinator
    let inventory = InMemoryInventory::new(config.flight_seats, config.hotel_rooms);
    let mut coordinator = trip_coordinator(&inventory, &config);
    tracing::info!(
        flight_seats = config.flight_seats,
        hotel_rooms = config.hotel_rooms,
        max_attempts = config.max_attempts,
        "starting booking demo"
    );

    // 4. Book twice against the same stock
    book_trip("first", &mut coordinator, &inventory).await;
    book_trip("second", &mut coordinator, &inventory).await;

    if config.print_metrics {
        tracing::info!(metrics = %metrics_handle.render(), "metrics snapshot");
    }
}
