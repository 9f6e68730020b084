//! Idle channel reaping.

use std::time::Duration;

use tracing::debug;

use crate::net::ConnectionSocket;
use crate::observability::metrics;
use crate::server::registry::Registry;

/// Close every channel idle for at least `channel_timeout` at `now`.
///
/// Channels with a task in flight are skipped regardless of age. Returns
/// the number of channels closed.
pub fn maintenance<S: ConnectionSocket>(
    registry: &Registry<S>,
    now: Duration,
    channel_timeout: Duration,
) -> usize {
    let mut reaped = 0;
    for channel in registry.channels() {
        if channel.mark_if_idle(now, channel_timeout) {
            debug!(
                connection_id = %channel.id(),
                idle_secs = now.saturating_sub(channel.last_activity()).as_secs_f64(),
                "Closing idle channel"
            );
            channel.close();
            reaped += 1;
        }
    }

    if reaped > 0 {
        metrics::record_channels_reaped(reaped);
    }
    reaped
}
