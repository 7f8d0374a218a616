use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::SessionHandle;

/// Feed elapsed seconds into a session every `interval` until it closes.
///
/// Elapsed time is measured from the moment the timer starts. The task ends
/// when the session's cancel token fires or the session task is gone.
pub fn spawn_session_timer(handle: SessionHandle, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let started = Instant::now();
        let cancel = handle.cancel_token();
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let elapsed = started.elapsed().as_secs();
                    if let Err(e) = handle.tick(elapsed).await {
                        debug!(attempt_id = %handle.attempt_id(), error = %e, "session timer stopping");
                        break;
                    }
                }
            }
        }
    })
}
