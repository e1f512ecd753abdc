//! Logging initialization.
//!
//! Controlled by two environment variables:
//! - `RUST_LOG` — standard `EnvFilter` directives; defaults to `warn` so
//!   normal CLI runs stay quiet
//! - `WORKSHED_LOG_FORMAT` — `"json"` switches the stderr output to JSON
//!   events with span-close timings; anything else keeps the compact
//!   human formatter

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Install the global subscriber. Call once, at the top of `main()`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let json =
        std::env::var("WORKSHED_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .without_time(),
            )
            .init();
    }
}
