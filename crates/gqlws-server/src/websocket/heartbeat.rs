//! Keep-alive packets and inbound liveness monitoring.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::Connection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// No inbound traffic within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
    /// The keep-alive could not be queued; the writer is gone.
    Disconnected,
}

/// Send keep-alives for a connection and watch for inbound silence.
///
/// Every `interval` the negotiated keep-alive packet (`ping` or `ka`) is
/// queued and the alive flag is checked. Once `timeout / interval`
/// consecutive ticks (at least one) pass without inbound traffic,
/// [`HeartbeatResult::TimedOut`] is returned.
pub async fn run_heartbeat(
    connection: Arc<Connection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval(interval);
    // Skip the immediate first tick
    let _ = ticker.tick().await;
    let mut missed: u32 = 0;
    let interval_ms = interval.as_millis().max(1);
    let max_missed = (timeout.as_millis() / interval_ms).max(1) as u32;

    loop {
        tokio::select! {
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
            _ = ticker.tick() => {
                if connection.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
                if !connection.send_keep_alive().await {
                    return HeartbeatResult::Disconnected;
                }
            }
        }
    }
}
