#![allow(dead_code)]

use async_trait::async_trait;
use flagstream::{
    AuthInfo, Connector, ConnectorError, Domain, Event, FeatureConfig, Message, MessageStream,
    MetricsPayload, Segment,
};
use log::kv::Key;
use log::{LevelFilter, Log, Metadata, Record};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Scriptable in-memory [`Connector`]. Tests mutate the backing flag/segment
/// maps and push stream notifications through [`TestConnector::notify`].
pub struct TestConnector {
    auth_ok: bool,
    flags: Mutex<HashMap<String, FeatureConfig>>,
    segments: Mutex<HashMap<String, Segment>>,
    stream_tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    pub metrics: Mutex<Vec<MetricsPayload>>,
}

impl TestConnector {
    pub fn new() -> Self {
        Self {
            auth_ok: true,
            flags: Mutex::new(HashMap::new()),
            segments: Mutex::new(HashMap::new()),
            stream_tx: Mutex::new(None),
            metrics: Mutex::new(Vec::new()),
        }
    }

    pub fn with_failing_auth() -> Self {
        Self {
            auth_ok: false,
            ..Self::new()
        }
    }

    pub fn upsert_flag(&self, flag: FeatureConfig) {
        self.flags
            .lock()
            .unwrap()
            .insert(flag.feature.clone(), flag);
    }

    pub fn upsert_segment(&self, segment: Segment) {
        self.segments
            .lock()
            .unwrap()
            .insert(segment.identifier.clone(), segment);
    }

    pub fn stream_connected(&self) -> bool {
        self.stream_tx.lock().unwrap().is_some()
    }

    pub fn notify(&self, domain: Domain, event: Event, identifier: &str) {
        let tx = self.stream_tx.lock().unwrap();
        tx.as_ref()
            .expect("no stream connected")
            .send(Message {
                domain,
                event,
                identifier: identifier.to_owned(),
            })
            .expect("stream receiver dropped");
    }
}

#[async_trait]
impl Connector for TestConnector {
    async fn authenticate(&self) -> Result<AuthInfo, ConnectorError> {
        if self.auth_ok {
            Ok(AuthInfo {
                environment: "test".to_owned(),
                cluster: "1".to_owned(),
                account: None,
            })
        } else {
            Err(ConnectorError::fatal("invalid api key"))
        }
    }

    async fn flags(&self) -> Result<Vec<FeatureConfig>, ConnectorError> {
        Ok(self.flags.lock().unwrap().values().cloned().collect())
    }

    async fn segments(&self) -> Result<Vec<Segment>, ConnectorError> {
        Ok(self.segments.lock().unwrap().values().cloned().collect())
    }

    async fn flag(&self, identifier: &str) -> Result<FeatureConfig, ConnectorError> {
        self.flags
            .lock()
            .unwrap()
            .get(identifier)
            .cloned()
            .ok_or_else(|| ConnectorError::retryable(format!("flag '{identifier}' not found")))
    }

    async fn segment(&self, identifier: &str) -> Result<Segment, ConnectorError> {
        self.segments
            .lock()
            .unwrap()
            .get(identifier)
            .cloned()
            .ok_or_else(|| ConnectorError::retryable(format!("segment '{identifier}' not found")))
    }

    async fn post_metrics(&self, payload: &MetricsPayload) -> Result<u16, ConnectorError> {
        self.metrics.lock().unwrap().push(payload.clone());
        Ok(200)
    }

    async fn stream(&self) -> Result<Box<dyn MessageStream>, ConnectorError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.stream_tx.lock().unwrap() = Some(tx);
        Ok(Box::new(ChannelStream { rx }))
    }
}

struct ChannelStream {
    rx: mpsc::UnboundedReceiver<Message>,
}

#[async_trait]
impl MessageStream for ChannelStream {
    async fn next_message(&mut self) -> Result<Option<Message>, ConnectorError> {
        Ok(self.rx.recv().await)
    }
}

pub fn bool_flag(identifier: &str, state: &str, version: i64) -> FeatureConfig {
    flag_from_json(serde_json::json!({
        "project": "demo",
        "environment": "test",
        "feature": identifier,
        "state": state,
        "kind": "boolean",
        "variations": [
            {"identifier": "true", "value": "true"},
            {"identifier": "false", "value": "false"}
        ],
        "offVariation": "false",
        "defaultServe": {"variation": "true"},
        "version": version
    }))
}

pub fn flag_from_json(json: serde_json::Value) -> FeatureConfig {
    serde_json::from_value(json).expect("invalid flag fixture")
}

pub fn segment_from_json(json: serde_json::Value) -> Segment {
    serde_json::from_value(json).expect("invalid segment fixture")
}

/// Captures log lines per thread as `LEVEL [event_id] message`.
pub struct RecordingLogger {}

impl RecordingLogger {
    thread_local!(
        pub static LOGS: RefCell<String> = RefCell::new(String::default())
    );
}

impl Log for RecordingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level() && metadata.target().contains("flagstream")
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let event_id = record
            .key_values()
            .get(Key::from("event_id"))
            .and_then(|value| value.to_u64())
            .unwrap_or_default();
        Self::LOGS.with_borrow_mut(|logs| {
            logs.push_str(format!("{} [{event_id}] {}\n", record.level(), record.args()).as_str())
        });
    }

    fn flush(&self) {}
}

pub fn log_record_init() {
    log::set_max_level(LevelFilter::Warn);
    _ = log::set_logger(&RecordingLogger {});
}

/// Polls `check` until it holds or five seconds pass.
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}
