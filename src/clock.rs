//! Host monotonic clock shared by producers and estimators

use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Seconds elapsed on the host monotonic clock since the process-wide epoch.
///
/// The epoch is fixed on first use. Every producer in this crate stamps its
/// packets with this clock, so latencies computed against it share one domain.
pub fn host_now() -> f64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_secs_f64()
}
