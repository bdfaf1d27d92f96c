use crate::connector::{Connector, ConnectorError};
use crate::errors::ErrorKind;
use crate::repository::Repository;
use crate::sync::{with_retry, SyncState};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// The periodic full-refresh worker.
///
/// Runs one authoritative fetch of all flags and segments per interval and
/// writes them through the repository's version gate. Errors are logged and
/// swallowed; the next tick always runs at the configured interval. While the
/// stream is healthy the poller stays idle and resumes when the stream drops.
pub(crate) fn start(
    connector: Arc<dyn Connector>,
    repository: Arc<Repository>,
    state: Arc<SyncState>,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // A refresh outlasting the interval must not be followed by a burst of
        // catch-up ticks.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The immediate first tick is skipped; the initial load happens during
        // client startup.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !state.is_poller_active() {
                        continue;
                    }
                    match refresh(&connector, &repository).await {
                        Ok(()) => {
                            debug!("Full refresh cycle completed");
                            state.set_ready();
                        }
                        Err(err) => {
                            warn!(event_id = ErrorKind::SyncFailure.as_u16(); "Full refresh cycle failed: {err}");
                        }
                    }
                },
                _ = token.cancelled() => break
            }
        }
    })
}

/// Fetches the full flag and segment sets and applies them to the repository.
///
/// Segments are written first so freshly referenced segments are resolvable by
/// the time their flags land.
pub(crate) async fn refresh(
    connector: &Arc<dyn Connector>,
    repository: &Arc<Repository>,
) -> Result<(), ConnectorError> {
    let segments = with_retry("segment list fetch", || connector.segments()).await?;
    let flags = with_retry("flag list fetch", || connector.flags()).await?;
    for segment in segments {
        repository.set_segment(segment);
    }
    for flag in flags {
        repository.set_flag(flag);
    }
    Ok(())
}
