//! Health-check interval policy for disabled workers.

use std::time::Duration;

/// Interval before the first re-check after a worker fails while healthy.
pub const START_INTERVAL: Duration = Duration::from_secs(1);

/// Ceiling on the re-check interval.
pub const MAX_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Next re-check interval after another failure.
///
/// The floor of one second prevents a tight re-check loop for workers that
/// were added with a zero interval; the ceiling keeps a long-dead worker
/// probed at least hourly. Growth is 3/2 per failure, about twenty steps
/// from floor to ceiling.
pub fn next_interval(prev: Duration) -> Duration {
    (prev * 3 / 2).clamp(START_INTERVAL, MAX_INTERVAL)
}
