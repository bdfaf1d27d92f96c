use crate::connector::{Connector, Message};
use crate::errors::ErrorKind;
use crate::model::enums::{Domain, Event};
use crate::repository::Repository;
use crate::sync::{with_retry, SyncState};
use log::{debug, info, warn};
use rand::{thread_rng, Rng};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const BASE_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_BACKOFF_EXPONENT: u32 = 6;
const RETRY_ESCALATION_THRESHOLD: u32 = 5;

/// The push-stream worker.
///
/// Consumes change notifications and applies them by re-fetching the changed
/// entity, which bounds staleness to one round trip regardless of what the
/// notification carried. Reconnects forever with doubling backoff and jitter;
/// while disconnected the poller serves as the fallback data path.
pub(crate) fn start(
    connector: Arc<dyn Connector>,
    repository: Arc<Repository>,
    state: Arc<SyncState>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut retries: u32 = 0;
        loop {
            if token.is_cancelled() {
                break;
            }
            match connector.stream().await {
                Ok(mut stream) => {
                    if retries > 0 {
                        info!("Stream reconnected");
                    }
                    state.set_poller_active(false);
                    state.set_stream_ready(true);
                    state.set_ready();
                    retries = 0;
                    loop {
                        tokio::select! {
                            _ = token.cancelled() => return,
                            message = stream.next_message() => match message {
                                Ok(Some(message)) => handle_message(&connector, &repository, message).await,
                                Ok(None) => {
                                    debug!("Stream ended");
                                    break;
                                }
                                Err(err) => {
                                    debug!("Stream read failed: {err}");
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(err) => {
                    debug!("Stream connect failed: {err}");
                }
            }

            // One disconnect log per outage episode; reconnect attempts stay at
            // debug until the escalation threshold.
            if state.is_stream_ready() {
                warn!(event_id = ErrorKind::StreamDisconnected.as_u16(); "Stream disconnected, polling resumed as the fallback data path");
            }
            state.set_stream_ready(false);
            state.set_poller_active(true);
            retries += 1;
            let delay = backoff_with_jitter(retries);
            if retries > RETRY_ESCALATION_THRESHOLD {
                warn!(
                    "Stream reconnect attempt {retries} pending, retrying in {}ms",
                    delay.as_millis()
                );
            } else {
                debug!(
                    "Stream reconnect attempt {retries} pending, retrying in {}ms",
                    delay.as_millis()
                );
            }
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    })
}

async fn handle_message(
    connector: &Arc<dyn Connector>,
    repository: &Arc<Repository>,
    message: Message,
) {
    match (message.domain, message.event) {
        (Domain::Flag, Event::Create | Event::Patch) => {
            // Inline payloads are never trusted; the entity is always re-fetched.
            match with_retry("flag fetch", || connector.flag(&message.identifier)).await {
                Ok(flag) => repository.set_flag(flag),
                Err(err) => {
                    warn!(event_id = ErrorKind::SyncFailure.as_u16(); "Fetching flag '{}' after a stream notification failed: {err}", message.identifier);
                }
            }
        }
        (Domain::Flag, Event::Delete) => repository.remove_flag(&message.identifier),
        (Domain::Segment, Event::Create | Event::Patch) => {
            match with_retry("segment fetch", || connector.segment(&message.identifier)).await {
                Ok(segment) => repository.set_segment(segment),
                Err(err) => {
                    warn!(event_id = ErrorKind::SyncFailure.as_u16(); "Fetching segment '{}' after a stream notification failed: {err}", message.identifier);
                }
            }
        }
        (Domain::Segment, Event::Delete) => repository.remove_segment(&message.identifier),
    }
}

/// Doubling backoff capped at `2^MAX_BACKOFF_EXPONENT` seconds, plus a uniform
/// random jitter of up to one base delay.
fn backoff_with_jitter(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    let base = BASE_RETRY_DELAY * 2u32.pow(exponent);
    base + thread_rng().gen_range(Duration::ZERO..BASE_RETRY_DELAY)
}

#[cfg(test)]
mod backoff_tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        for _ in 0..20 {
            assert!(backoff_with_jitter(1) >= Duration::from_secs(1));
            assert!(backoff_with_jitter(1) < Duration::from_secs(2));
            assert!(backoff_with_jitter(3) >= Duration::from_secs(4));
            assert!(backoff_with_jitter(3) < Duration::from_secs(5));
            // Attempts past the cap keep the capped base.
            assert!(backoff_with_jitter(50) >= Duration::from_secs(64));
            assert!(backoff_with_jitter(50) < Duration::from_secs(65));
        }
    }
}
