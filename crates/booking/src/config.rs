//! Demo configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use tcc::RetryPolicy;

/// Booking demo configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `TCC_MAX_ATTEMPTS`: Confirm/Cancel attempts, first one included (default: `2`)
/// - `TCC_INITIAL_INTERVAL_MS`: first retry delay (default: `500`)
/// - `BOOKING_FLIGHT_SEATS`: initial seat stock (default: `3`)
/// - `BOOKING_HOTEL_ROOMS`: initial room stock (default: `1`)
/// - `BOOKING_PRINT_METRICS`: log a Prometheus snapshot on exit (default: `false`)
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub log_level: String,
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub flight_seats: u64,
    pub hotel_rooms: u64,
    pub print_metrics: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`; missing or unparsable values
    /// keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            max_attempts: parse_var(&lookup, "TCC_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts),
            initial_interval: parse_var(&lookup, "TCC_INITIAL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_interval),
            flight_seats: parse_var(&lookup, "BOOKING_FLIGHT_SEATS")
                .unwrap_or(defaults.flight_seats),
            hotel_rooms: parse_var(&lookup, "BOOKING_HOTEL_ROOMS").unwrap_or(defaults.hotel_rooms),
            print_metrics: parse_var(&lookup, "BOOKING_PRINT_METRICS")
                .unwrap_or(defaults.print_metrics),
        }
    }

    /// Returns the coordinator retry policy described by this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_initial_interval(self.initial_interval)
            .with_max_attempts(self.max_attempts)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            max_attempts: 2,
            initial_interval: Duration::from_millis(500),
            flight_seats: 3,
            hotel_rooms: 1,
            print_metrics: false,
        }
    }
}
