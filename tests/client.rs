use crate::utils::{bool_flag, eventually, flag_from_json, segment_from_json, TestConnector};
use flagstream::{Client, Connector, Domain, Event, Target};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

mod utils;

const INIT_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn serves_flags_after_initialization() {
    let connector = Arc::new(TestConnector::new());
    connector.upsert_flag(bool_flag("bool-flag", "on", 1));

    let client = polling_client(&connector);
    timeout(INIT_TIMEOUT, client.wait_for_initialization())
        .await
        .unwrap();
    assert!(client.is_initialized());

    let target = Target::new("john");
    assert!(client.bool_variation("bool-flag", &target, false));

    client.close().await;
}

#[tokio::test]
async fn missing_flag_serves_default() {
    let connector = Arc::new(TestConnector::new());
    let client = polling_client(&connector);
    timeout(INIT_TIMEOUT, client.wait_for_initialization())
        .await
        .unwrap();

    let target = Target::new("john");
    assert!(client.bool_variation("no-such-flag", &target, true));
    assert_eq!(client.string_variation("no-such-flag", &target, "fallback"), "fallback");

    client.close().await;
}

#[tokio::test]
async fn kind_mismatch_serves_default() {
    let connector = Arc::new(TestConnector::new());
    connector.upsert_flag(bool_flag("bool-flag", "on", 1));

    let client = polling_client(&connector);
    timeout(INIT_TIMEOUT, client.wait_for_initialization())
        .await
        .unwrap();

    let target = Target::new("john");
    assert_eq!(client.int_variation("bool-flag", &target, 7), 7);

    client.close().await;
}

#[tokio::test]
async fn json_flags_resolve_to_parsed_values() {
    let connector = Arc::new(TestConnector::new());
    connector.upsert_flag(flag_from_json(serde_json::json!({
        "project": "demo",
        "environment": "test",
        "feature": "json-flag",
        "state": "on",
        "kind": "json",
        "variations": [
            {"identifier": "limits", "value": "{\"max_items\": 25, \"beta\": true}"}
        ],
        "offVariation": "limits",
        "defaultServe": {"variation": "limits"},
        "version": 1
    })));

    let client = polling_client(&connector);
    timeout(INIT_TIMEOUT, client.wait_for_initialization())
        .await
        .unwrap();

    let target = Target::new("john");
    let value = client.json_variation("json-flag", &target, serde_json::json!({}));
    assert_eq!(value["max_items"], 25);
    assert_eq!(value["beta"], true);

    client.close().await;
}

#[tokio::test]
async fn targeting_rules_select_variations() {
    let connector = Arc::new(TestConnector::new());
    connector.upsert_flag(flag_from_json(serde_json::json!({
        "project": "demo",
        "environment": "test",
        "feature": "email-flag",
        "state": "on",
        "kind": "boolean",
        "variations": [
            {"identifier": "true", "value": "true"},
            {"identifier": "false", "value": "false"}
        ],
        "offVariation": "false",
        "defaultServe": {"variation": "false"},
        "rules": [
            {
                "priority": 1,
                "clauses": [{"attribute": "email", "op": "equal", "values": ["john@doe.com"]}],
                "serve": {"variation": "true"}
            }
        ],
        "version": 1
    })));

    let client = polling_client(&connector);
    timeout(INIT_TIMEOUT, client.wait_for_initialization())
        .await
        .unwrap();

    let john = Target::new("john").attribute("email", "john@doe.com");
    let jane = Target::new("jane").attribute("email", "jane@doe.com");
    assert!(client.bool_variation("email-flag", &john, false));
    assert!(!client.bool_variation("email-flag", &jane, true));

    client.close().await;
}

#[tokio::test]
async fn segment_membership_grants_variation() {
    let connector = Arc::new(TestConnector::new());
    connector.upsert_segment(segment_from_json(serde_json::json!({
        "identifier": "beta",
        "name": "Beta testers",
        "included": [{"identifier": "john"}],
        "version": 1
    })));
    connector.upsert_flag(flag_from_json(serde_json::json!({
        "project": "demo",
        "environment": "test",
        "feature": "beta-flag",
        "state": "on",
        "kind": "boolean",
        "variations": [
            {"identifier": "true", "value": "true"},
            {"identifier": "false", "value": "false"}
        ],
        "offVariation": "false",
        "defaultServe": {"variation": "false"},
        "rules": [
            {
                "priority": 1,
                "clauses": [{"attribute": "identifier", "op": "segment_match", "values": ["beta"]}],
                "serve": {"variation": "true"}
            }
        ],
        "version": 1
    })));

    let client = polling_client(&connector);
    timeout(INIT_TIMEOUT, client.wait_for_initialization())
        .await
        .unwrap();

    assert!(client.bool_variation("beta-flag", &Target::new("john"), false));
    assert!(!client.bool_variation("beta-flag", &Target::new("jane"), true));

    client.close().await;
}

#[tokio::test]
async fn stream_notifications_update_the_replica() {
    let connector = Arc::new(TestConnector::new());
    connector.upsert_flag(bool_flag("bool-flag", "off", 1));

    let connector_handle: Arc<dyn Connector> = connector.clone();
    let client = Client::builder(connector_handle)
        .poll_interval(Duration::from_secs(60))
        .analytics(false)
        .build();
    timeout(INIT_TIMEOUT, client.wait_for_initialization())
        .await
        .unwrap();
    eventually("stream connect", || connector.stream_connected()).await;

    let target = Target::new("john");
    assert!(!client.bool_variation("bool-flag", &target, true));

    connector.upsert_flag(bool_flag("bool-flag", "on", 2));
    connector.notify(Domain::Flag, Event::Patch, "bool-flag");
    eventually("patched flag to apply", || {
        client.bool_variation("bool-flag", &target, false)
    })
    .await;

    // A stale notification must not roll the replica back.
    connector.upsert_flag(bool_flag("bool-flag", "off", 1));
    connector.notify(Domain::Flag, Event::Patch, "bool-flag");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(client.bool_variation("bool-flag", &target, false));

    // Deletes drop the flag entirely.
    connector.notify(Domain::Flag, Event::Delete, "bool-flag");
    eventually("deleted flag to serve the default", || {
        client.bool_variation("bool-flag", &target, true)
    })
    .await;

    client.close().await;
}

#[tokio::test]
async fn failed_authentication_unblocks_waiters() {
    let connector = Arc::new(TestConnector::with_failing_auth());
    connector.upsert_flag(bool_flag("bool-flag", "on", 1));

    let client = polling_client(&connector);
    timeout(INIT_TIMEOUT, client.wait_for_initialization())
        .await
        .unwrap();

    // Degraded mode: no data was loaded, every evaluation serves the default.
    let target = Target::new("john");
    assert!(!client.bool_variation("bool-flag", &target, false));

    client.close().await;
}

#[tokio::test]
async fn close_flushes_pending_metrics() {
    let connector = Arc::new(TestConnector::new());
    connector.upsert_flag(bool_flag("bool-flag", "on", 1));

    let connector_handle: Arc<dyn Connector> = connector.clone();
    let client = Client::builder(connector_handle)
        .streaming(false)
        .build();
    timeout(INIT_TIMEOUT, client.wait_for_initialization())
        .await
        .unwrap();

    let target = Target::new("john");
    assert!(client.bool_variation("bool-flag", &target, false));
    client.close().await;

    let payloads = connector.metrics.lock().unwrap();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].metrics_data.len(), 1);
    assert_eq!(payloads[0].metrics_data[0].count, 1);
    assert!(payloads[0]
        .metrics_data[0]
        .attributes
        .iter()
        .any(|a| a.key == "featureIdentifier" && a.value == "bool-flag"));
    assert_eq!(payloads[0].target_data.len(), 1);
    assert_eq!(payloads[0].target_data[0].identifier, "john");
}

#[tokio::test]
async fn kind_mismatch_still_records_telemetry() {
    let connector = Arc::new(TestConnector::new());
    connector.upsert_flag(bool_flag("bool-flag", "on", 1));

    let connector_handle: Arc<dyn Connector> = connector.clone();
    let client = Client::builder(connector_handle).streaming(false).build();
    timeout(INIT_TIMEOUT, client.wait_for_initialization())
        .await
        .unwrap();

    // The served variation counts even though the typed read falls back.
    let target = Target::new("john");
    assert_eq!(client.int_variation("bool-flag", &target, 7), 7);
    client.close().await;

    let payloads = connector.metrics.lock().unwrap();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].metrics_data.len(), 1);
    assert_eq!(payloads[0].metrics_data[0].count, 1);
}

#[tokio::test]
async fn evaluations_keep_serving_after_close() {
    let connector = Arc::new(TestConnector::new());
    connector.upsert_flag(bool_flag("bool-flag", "on", 1));

    let client = polling_client(&connector);
    timeout(INIT_TIMEOUT, client.wait_for_initialization())
        .await
        .unwrap();
    client.close().await;

    // The local replica outlives the workers.
    assert!(client.bool_variation("bool-flag", &Target::new("john"), false));
}

fn polling_client(connector: &Arc<TestConnector>) -> Client {
    let connector: Arc<dyn Connector> = connector.clone();
    Client::builder(connector)
        .streaming(false)
        .analytics(false)
        .poll_interval(Duration::from_millis(50))
        .build()
}
