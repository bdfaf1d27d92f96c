use crate::connector::Connector;
use crate::errors::ErrorKind;
use crate::model::config::Variation;
use crate::target::Target;
use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

const MAX_TARGETS_PER_BATCH: usize = 1000;
const MAX_TARGET_BATCHES: usize = 200;
const MAX_CONCURRENT_UPLOADS: usize = 10;
const BATCH_SUBMIT_STAGGER: Duration = Duration::from_millis(100);
pub(crate) const MIN_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

const METRICS_TYPE: &str = "FFMETRICS";
const FEATURE_IDENTIFIER_ATTR: &str = "featureIdentifier";
const FEATURE_VALUE_ATTR: &str = "featureValue";
const VARIATION_IDENTIFIER_ATTR: &str = "variationIdentifier";
const TARGET_ATTR: &str = "target";
const GLOBAL_TARGET: &str = "global";
const SDK_TYPE_ATTR: &str = "SDK_TYPE";
const SDK_LANGUAGE_ATTR: &str = "SDK_LANGUAGE";
const SDK_VERSION_ATTR: &str = "SDK_VERSION";

/// One key/value attribute of a metrics or target-metadata record.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct KeyValue {
    /// Attribute name.
    pub key: String,
    /// Attribute value.
    pub value: String,
}

impl KeyValue {
    fn new(key: &str, value: impl Into<String>) -> Self {
        Self {
            key: key.to_owned(),
            value: value.into(),
        }
    }
}

/// Metadata of one unique non-anonymous target observed since the last flush.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TargetData {
    /// The target's unique identifier.
    pub identifier: String,
    /// The target's display name, falling back to the identifier.
    pub name: String,
    /// The target's custom attributes.
    pub attributes: Vec<KeyValue>,
}

/// One deduplicated evaluation counter.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MetricsData {
    /// Flush timestamp in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// How often the keyed evaluation occurred since the last flush.
    pub count: u64,
    /// Record discriminator, always `FFMETRICS`.
    pub metrics_type: String,
    /// Flag/variation/SDK attributes of the aggregated evaluations.
    pub attributes: Vec<KeyValue>,
}

/// The payload of one metrics upload.
#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct MetricsPayload {
    /// Unique target metadata collected since the last flush.
    pub target_data: Vec<TargetData>,
    /// Deduplicated evaluation counters.
    pub metrics_data: Vec<MetricsData>,
}

// Usage is aggregated globally, so target identity is deliberately not part of
// the key.
#[derive(Hash, PartialEq, Eq, Clone, Debug)]
struct EvaluationKey {
    flag: String,
    variation: String,
    value: String,
}

#[derive(Default)]
struct MetricsState {
    counters: HashMap<EvaluationKey, u64>,
    batches: Vec<Vec<TargetData>>,
    seen_targets: HashSet<String>,
    capacity_warned: bool,
}

/// Aggregates evaluation telemetry for asynchronous, rate-limited upload.
///
/// Producers are arbitrary evaluation-call threads; the flusher is the sole
/// consumer. One mutex serializes both, held for the shortest possible
/// critical section.
pub(crate) struct MetricsProcessor {
    state: Mutex<MetricsState>,
    targets_per_batch: usize,
    max_batches: usize,
}

impl MetricsProcessor {
    pub(crate) fn new() -> Self {
        Self::with_caps(MAX_TARGETS_PER_BATCH, MAX_TARGET_BATCHES)
    }

    fn with_caps(targets_per_batch: usize, max_batches: usize) -> Self {
        Self {
            state: Mutex::new(MetricsState::default()),
            targets_per_batch,
            max_batches,
        }
    }

    /// Records one evaluation. Non-blocking; called once per evaluation when
    /// analytics are enabled.
    pub(crate) fn enqueue(&self, target: &Target, flag_identifier: &str, variation: &Variation) {
        let key = EvaluationKey {
            flag: flag_identifier.to_owned(),
            variation: variation.identifier.clone(),
            value: variation.value.clone(),
        };
        let mut state = self.state.lock().unwrap();
        *state.counters.entry(key).or_insert(0) += 1;
        if !target.is_anonymous() {
            self.record_target(&mut state, target);
        }
    }

    fn record_target(&self, state: &mut MetricsState, target: &Target) {
        if state.seen_targets.contains(target.identifier()) {
            return;
        }
        let batches_full = state.batches.len() == self.max_batches
            && state
                .batches
                .last()
                .is_some_and(|last| last.len() >= self.targets_per_batch);
        if batches_full {
            if !state.capacity_warned {
                warn!(event_id = ErrorKind::MetricsCapacityExceeded.as_u16(); "Target metadata capacity exceeded, further unique targets are dropped until the next flush");
                state.capacity_warned = true;
            }
            return;
        }
        let needs_new_batch = state
            .batches
            .last()
            .map_or(true, |last| last.len() >= self.targets_per_batch);
        if needs_new_batch {
            state.batches.push(Vec::new());
        }
        let data = TargetData {
            identifier: target.identifier().to_owned(),
            name: target
                .display_name()
                .unwrap_or(target.identifier())
                .to_owned(),
            attributes: target
                .attributes()
                .iter()
                .map(|(key, value)| KeyValue::new(key, value.to_string()))
                .collect(),
        };
        state.seen_targets.insert(data.identifier.clone());
        // A batch with room exists at this point.
        state.batches.last_mut().unwrap().push(data);
    }

    pub(crate) fn has_pending(&self) -> bool {
        let state = self.state.lock().unwrap();
        !state.counters.is_empty() || !state.batches.is_empty()
    }

    /// Uploads all accumulated state and clears it regardless of the outcome;
    /// metrics are best-effort and never retried across flush cycles.
    pub(crate) async fn flush(&self, connector: &Arc<dyn Connector>) {
        let (counters, mut batches) = {
            let mut state = self.state.lock().unwrap();
            state.seen_targets.clear();
            state.capacity_warned = false;
            (mem::take(&mut state.counters), mem::take(&mut state.batches))
        };
        if counters.is_empty() && batches.is_empty() {
            return;
        }

        let timestamp = Utc::now().timestamp_millis();
        let metrics_data = counters
            .into_iter()
            .map(|(key, count)| MetricsData {
                timestamp,
                count,
                metrics_type: METRICS_TYPE.to_owned(),
                attributes: vec![
                    KeyValue::new(FEATURE_IDENTIFIER_ATTR, key.flag),
                    KeyValue::new(VARIATION_IDENTIFIER_ATTR, key.variation),
                    KeyValue::new(FEATURE_VALUE_ATTR, key.value),
                    KeyValue::new(TARGET_ATTR, GLOBAL_TARGET),
                    KeyValue::new(SDK_TYPE_ATTR, "server"),
                    KeyValue::new(SDK_LANGUAGE_ATTR, "rust"),
                    KeyValue::new(SDK_VERSION_ATTR, crate::constants::PKG_VERSION),
                ],
            })
            .collect();

        let first_batch = if batches.is_empty() {
            Vec::new()
        } else {
            batches.remove(0)
        };
        let payload = MetricsPayload {
            target_data: first_batch,
            metrics_data,
        };

        let mut statuses: HashMap<String, usize> = HashMap::new();
        record_status(&mut statuses, connector.post_metrics(&payload).await);

        // Remaining target batches go up concurrently through a bounded pool,
        // staggered to avoid a submission burst.
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_UPLOADS));
        let mut uploads = JoinSet::new();
        for (index, batch) in batches.into_iter().enumerate() {
            let connector = Arc::clone(connector);
            let semaphore = Arc::clone(&semaphore);
            uploads.spawn(async move {
                tokio::time::sleep(BATCH_SUBMIT_STAGGER * index as u32).await;
                // The semaphore is never closed while uploads run.
                let _permit = semaphore.acquire().await.unwrap();
                let payload = MetricsPayload {
                    target_data: batch,
                    metrics_data: Vec::new(),
                };
                connector.post_metrics(&payload).await
            });
        }
        while let Some(joined) = uploads.join_next().await {
            match joined {
                Ok(result) => record_status(&mut statuses, result),
                Err(_) => {
                    *statuses.entry("panicked".to_owned()).or_insert(0) += 1;
                }
            }
        }

        let mut summary: Vec<String> = statuses
            .iter()
            .map(|(status, count)| format!("{status}: {count}"))
            .collect();
        summary.sort();
        info!("Metrics flush finished, outcomes by status: [{}]", summary.join(", "));
    }
}

fn record_status(
    statuses: &mut HashMap<String, usize>,
    result: Result<u16, crate::connector::ConnectorError>,
) {
    match result {
        Ok(status) => *statuses.entry(status.to_string()).or_insert(0) += 1,
        Err(err) => {
            debug!(event_id = ErrorKind::MetricsUploadFailure.as_u16(); "Metrics upload failed: {err}");
            *statuses.entry("error".to_owned()).or_insert(0) += 1;
        }
    }
}

/// The periodic flush worker. Intervals below the service-side rate limit are
/// clamped up to one minute.
pub(crate) fn start(
    processor: Arc<MetricsProcessor>,
    connector: Arc<dyn Connector>,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    let interval = if interval < MIN_FLUSH_INTERVAL {
        debug!(
            "Metrics flush interval {}s clamped to the {}s minimum",
            interval.as_secs(),
            MIN_FLUSH_INTERVAL.as_secs()
        );
        MIN_FLUSH_INTERVAL
    } else {
        interval
    };
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so the first flush happens
        // one full interval after startup.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => processor.flush(&connector).await,
                _ = token.cancelled() => break
            }
        }
    })
}

#[cfg(test)]
mod metrics_tests {
    use super::*;
    use crate::connector::{AuthInfo, Connector, ConnectorError, MessageStream};
    use crate::model::config::{FeatureConfig, Segment};
    use async_trait::async_trait;

    struct CapturingConnector {
        payloads: Mutex<Vec<MetricsPayload>>,
        status: u16,
    }

    impl CapturingConnector {
        fn new(status: u16) -> Self {
            Self {
                payloads: Mutex::new(Vec::new()),
                status,
            }
        }
    }

    #[async_trait]
    impl Connector for CapturingConnector {
        async fn authenticate(&self) -> Result<AuthInfo, ConnectorError> {
            Ok(AuthInfo::default())
        }
        async fn flags(&self) -> Result<Vec<FeatureConfig>, ConnectorError> {
            Ok(Vec::new())
        }
        async fn segments(&self) -> Result<Vec<Segment>, ConnectorError> {
            Ok(Vec::new())
        }
        async fn flag(&self, identifier: &str) -> Result<FeatureConfig, ConnectorError> {
            Err(ConnectorError::fatal(format!("no flag '{identifier}'")))
        }
        async fn segment(&self, identifier: &str) -> Result<Segment, ConnectorError> {
            Err(ConnectorError::fatal(format!("no segment '{identifier}'")))
        }
        async fn post_metrics(&self, payload: &MetricsPayload) -> Result<u16, ConnectorError> {
            self.payloads.lock().unwrap().push(payload.clone());
            Ok(self.status)
        }
        async fn stream(&self) -> Result<Box<dyn MessageStream>, ConnectorError> {
            Err(ConnectorError::retryable("no stream"))
        }
    }

    fn variation(identifier: &str, value: &str) -> Variation {
        Variation {
            identifier: identifier.to_owned(),
            value: value.to_owned(),
            name: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn deduplicates_by_flag_and_variation() {
        let processor = MetricsProcessor::new();
        let capturing = Arc::new(CapturingConnector::new(200));
        let connector: Arc<dyn Connector> = capturing.clone();
        let john = Target::new("john");

        for _ in 0..5 {
            processor.enqueue(&john, "bool-flag", &variation("true", "true"));
        }
        processor.enqueue(&john, "bool-flag", &variation("false", "false"));
        processor.flush(&connector).await;

        let payloads = capturing.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        let payload = &payloads[0];
        assert_eq!(payload.metrics_data.len(), 2);
        let counted = payload
            .metrics_data
            .iter()
            .find(|m| {
                m.attributes
                    .iter()
                    .any(|a| a.key == VARIATION_IDENTIFIER_ATTR && a.value == "true")
            })
            .unwrap();
        assert_eq!(counted.count, 5);
    }

    #[tokio::test]
    async fn anonymous_targets_are_not_batched() {
        let processor = MetricsProcessor::new();
        let capturing = Arc::new(CapturingConnector::new(200));
        let connector: Arc<dyn Connector> = capturing.clone();

        processor.enqueue(
            &Target::new("anon").anonymous(true),
            "bool-flag",
            &variation("true", "true"),
        );
        processor.enqueue(&Target::new("john"), "bool-flag", &variation("true", "true"));
        processor.flush(&connector).await;

        let payloads = capturing.payloads.lock().unwrap();
        assert_eq!(payloads[0].target_data.len(), 1);
        assert_eq!(payloads[0].target_data[0].identifier, "john");
    }

    #[tokio::test]
    async fn targets_are_unique_per_flush_window() {
        let processor = MetricsProcessor::new();
        let capturing = Arc::new(CapturingConnector::new(200));
        let connector: Arc<dyn Connector> = capturing.clone();

        for _ in 0..3 {
            processor.enqueue(&Target::new("john"), "bool-flag", &variation("true", "true"));
        }
        processor.flush(&connector).await;
        assert_eq!(capturing.payloads.lock().unwrap()[0].target_data.len(), 1);

        // A new flush window records the same target again.
        processor.enqueue(&Target::new("john"), "bool-flag", &variation("true", "true"));
        processor.flush(&connector).await;
        assert_eq!(capturing.payloads.lock().unwrap()[1].target_data.len(), 1);
    }

    #[tokio::test]
    async fn state_clears_even_when_upload_fails() {
        struct FailingConnector;
        #[async_trait]
        impl Connector for FailingConnector {
            async fn authenticate(&self) -> Result<AuthInfo, ConnectorError> {
                Ok(AuthInfo::default())
            }
            async fn flags(&self) -> Result<Vec<FeatureConfig>, ConnectorError> {
                Ok(Vec::new())
            }
            async fn segments(&self) -> Result<Vec<Segment>, ConnectorError> {
                Ok(Vec::new())
            }
            async fn flag(&self, _: &str) -> Result<FeatureConfig, ConnectorError> {
                Err(ConnectorError::fatal("unused"))
            }
            async fn segment(&self, _: &str) -> Result<Segment, ConnectorError> {
                Err(ConnectorError::fatal("unused"))
            }
            async fn post_metrics(&self, _: &MetricsPayload) -> Result<u16, ConnectorError> {
                Err(ConnectorError::retryable("service unavailable"))
            }
            async fn stream(&self) -> Result<Box<dyn MessageStream>, ConnectorError> {
                Err(ConnectorError::retryable("no stream"))
            }
        }

        let processor = MetricsProcessor::new();
        let connector: Arc<dyn Connector> = Arc::new(FailingConnector);
        processor.enqueue(&Target::new("john"), "bool-flag", &variation("true", "true"));
        assert!(processor.has_pending());
        processor.flush(&connector).await;
        assert!(!processor.has_pending());
    }

    #[tokio::test]
    async fn targets_roll_over_into_additional_batches() {
        let processor = MetricsProcessor::new();
        let capturing = Arc::new(CapturingConnector::new(200));
        let connector: Arc<dyn Connector> = capturing.clone();

        for index in 0..1001 {
            processor.enqueue(
                &Target::new(&format!("user-{index}")),
                "bool-flag",
                &variation("true", "true"),
            );
        }
        processor.flush(&connector).await;

        let payloads = capturing.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 2);
        // The counters ride along with the first batch only.
        assert_eq!(payloads[0].target_data.len(), 1000);
        assert_eq!(payloads[0].metrics_data.len(), 1);
        assert_eq!(payloads[0].metrics_data[0].count, 1001);
        assert_eq!(payloads[1].target_data.len(), 1);
        assert!(payloads[1].metrics_data.is_empty());
    }

    #[tokio::test]
    async fn extra_batches_upload_through_the_bounded_pool() {
        let processor = MetricsProcessor::with_caps(1, 5);
        let capturing = Arc::new(CapturingConnector::new(200));
        let connector: Arc<dyn Connector> = capturing.clone();

        for index in 0..5 {
            processor.enqueue(
                &Target::new(&format!("user-{index}")),
                "bool-flag",
                &variation("true", "true"),
            );
        }
        processor.flush(&connector).await;

        let payloads = capturing.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 5);
        for payload in payloads.iter() {
            assert_eq!(payload.target_data.len(), 1);
        }
        for payload in payloads.iter().skip(1) {
            assert!(payload.metrics_data.is_empty());
        }
    }

    #[tokio::test]
    async fn capped_target_batches_drop_overflow_until_flush() {
        let processor = MetricsProcessor::with_caps(2, 2);
        let capturing = Arc::new(CapturingConnector::new(200));
        let connector: Arc<dyn Connector> = capturing.clone();

        for index in 0..7 {
            processor.enqueue(
                &Target::new(&format!("user-{index}")),
                "bool-flag",
                &variation("true", "true"),
            );
        }
        processor.flush(&connector).await;

        {
            let payloads = capturing.payloads.lock().unwrap();
            assert_eq!(payloads.len(), 2);
            let batched: usize = payloads.iter().map(|p| p.target_data.len()).sum();
            assert_eq!(batched, 4);
            // Counters are unaffected by the target-metadata cap.
            assert_eq!(payloads[0].metrics_data[0].count, 7);
        }

        // The capacity window resets at flush.
        processor.enqueue(
            &Target::new("user-0"),
            "bool-flag",
            &variation("true", "true"),
        );
        processor.flush(&connector).await;
        assert_eq!(capturing.payloads.lock().unwrap()[2].target_data.len(), 1);
    }

    #[tokio::test]
    async fn empty_state_skips_upload() {
        let processor = MetricsProcessor::new();
        let capturing = Arc::new(CapturingConnector::new(200));
        let connector: Arc<dyn Connector> = capturing.clone();
        processor.flush(&connector).await;
        assert!(capturing.payloads.lock().unwrap().is_empty());
    }
}
