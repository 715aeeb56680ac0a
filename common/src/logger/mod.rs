use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use tracing::warn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Initialize the global tracing subscriber.
///
/// Safe to call more than once; only the first call installs the
/// subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init(service_name: &'static str, json: bool) {
    LOGGER_INIT.get_or_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let base = fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_span_events(fmt::format::FmtSpan::CLOSE);

        if json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(base.json())
                .init();
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(base)
                .init();
        }

        tracing::info!(service = service_name, "logger initialized");
    });
}

/// Await `fut`, warning if it ran longer than `threshold`.
///
/// Used around store calls so a slow persistence backend shows up in the
/// logs without failing the operation.
pub async fn warn_if_slow<F, T>(op: &'static str, threshold: Duration, fut: F) -> T
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let out = fut.await;

    let elapsed = start.elapsed();
    if elapsed > threshold {
        warn!(
            op,
            elapsed_ms = elapsed.as_millis() as u64,
            threshold_ms = threshold.as_millis() as u64,
            "operation exceeded latency threshold"
        );
    }

    out
}
