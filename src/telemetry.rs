//! Logging initialization.
//!
//! Controlled by two environment variables:
//! - `VELLUM_LOG` — an `EnvFilter` directive string (default `"info"`),
//!   e.g. `VELLUM_LOG=vellum=debug`.
//! - `VELLUM_LOG_FORMAT` — `"json"` for newline-delimited JSON events to
//!   stderr; anything else (or unset) for the compact human format.
//!
//! All log output goes to stderr so stdout stays parseable.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const LOG_ENV: &str = "VELLUM_LOG";
const FORMAT_ENV: &str = "VELLUM_LOG_FORMAT";

/// Install the global subscriber. Call once, early in `main`.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var(FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .init();
    }
}
