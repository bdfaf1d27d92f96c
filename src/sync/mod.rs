pub(crate) mod poller;
pub(crate) mod streamer;

use crate::connector::ConnectorError;
use log::debug;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;

const MAX_FETCH_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Signal state shared between the poller, the streamer, and the client.
pub(crate) struct SyncState {
    ready_tx: watch::Sender<bool>,
    stream_ready: AtomicBool,
    poller_active: AtomicBool,
}

impl SyncState {
    pub(crate) fn new() -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            ready_tx,
            stream_ready: AtomicBool::new(false),
            poller_active: AtomicBool::new(true),
        }
    }

    /// Marks the client ready. The flag transitions at most once and is never
    /// cleared afterwards, even if the data paths degrade later.
    pub(crate) fn set_ready(&self) {
        self.ready_tx.send_replace(true);
    }

    pub(crate) fn is_ready(&self) -> bool {
        *self.ready_tx.borrow()
    }

    /// Suspends until the client becomes ready.
    pub(crate) async fn wait_ready(&self) {
        let mut rx = self.ready_tx.subscribe();
        // The sender lives as long as this state, so waiting cannot fail.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    pub(crate) fn set_stream_ready(&self, ready: bool) {
        self.stream_ready.store(ready, Ordering::SeqCst);
    }

    pub(crate) fn is_stream_ready(&self) -> bool {
        self.stream_ready.load(Ordering::SeqCst)
    }

    pub(crate) fn set_poller_active(&self, active: bool) {
        self.poller_active.store(active, Ordering::SeqCst);
    }

    pub(crate) fn is_poller_active(&self) -> bool {
        self.poller_active.load(Ordering::SeqCst)
    }
}

/// Runs a fetch with bounded exponential backoff on retryable failures.
pub(crate) async fn with_retry<T, F, Fut>(what: &str, mut op: F) -> Result<T, ConnectorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ConnectorError>>,
{
    let mut delay = RETRY_BASE_DELAY;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.retryable && attempt < MAX_FETCH_ATTEMPTS => {
                debug!("{what} failed (attempt {attempt}): {err}, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
