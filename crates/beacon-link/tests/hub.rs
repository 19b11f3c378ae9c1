//! Hub client over the in-memory transport.

mod common;

use std::sync::{Arc, Mutex};

use beacon_link::{ConnectionState, HubClient, HubEvent, LinkError};
use common::{Responder, harness};
use serde_json::{Value, json};
use tokio::sync::mpsc;

#[tokio::test]
async fn hub_methods_send_expected_arguments() {
    let mut h = harness(3);
    let mut responder = Responder::spawn(h.connected().await);
    let client = HubClient::new(h.conn.clone());

    let _ = client.subscribe_to_performance_updates(Some("onboarding")).await.unwrap();
    let _ = client.subscribe_to_performance_updates(None).await.unwrap();
    let _ = client.subscribe_to_ab_test_updates().await.unwrap();
    let _ = client.subscribe_to_alerts().await.unwrap();
    let dashboard = client.get_real_time_dashboard().await.unwrap();
    let _ = client.get_template_performance("welcome-email").await.unwrap();

    assert_eq!(dashboard, json!({"target": "GetRealTimeDashboard"}));
    let expected = [
        ("SubscribeToPerformanceUpdates", vec![json!("onboarding")]),
        ("SubscribeToPerformanceUpdates", vec![]),
        ("SubscribeToABTestUpdates", vec![]),
        ("SubscribeToAlerts", vec![]),
        ("GetRealTimeDashboard", vec![]),
        ("GetTemplatePerformance", vec![json!("welcome-email")]),
    ];
    for (target, arguments) in expected {
        assert_eq!(responder.next_call().await, (target.to_owned(), arguments));
    }
}

#[tokio::test]
async fn only_successful_subscriptions_are_remembered() {
    let mut h = harness(3);
    let client = HubClient::new(h.conn.clone());

    assert_eq!(client.subscribe_to_alerts().await, Err(LinkError::NotConnected));
    assert_eq!(client.durable_subscriptions(), 0);

    let _responder = Responder::spawn(h.connected().await);
    let _ = client.subscribe_to_alerts().await.unwrap();
    let _ = client.subscribe_to_alerts().await.unwrap();
    let _ = client.subscribe_to_ab_test_updates().await.unwrap();
    let _ = client.get_real_time_dashboard().await.unwrap();
    assert_eq!(client.durable_subscriptions(), 2);

    client.forget_subscriptions();
    assert_eq!(client.durable_subscriptions(), 0);
}

#[tokio::test(start_paused = true)]
async fn subscriptions_are_replayed_after_reconnect() {
    let mut h = harness(3);
    let mut first = Responder::spawn(h.connected().await);
    let client = HubClient::new(h.conn.clone());

    let _ = client.subscribe_to_alerts().await.unwrap();
    let _ = client.subscribe_to_performance_updates(Some("billing")).await.unwrap();
    let _ = first.next_call().await;
    let _ = first.next_call().await;

    first.hang_up().await;
    let mut second = Responder::spawn(h.server.accept().await.unwrap());
    h.wait_for_state(ConnectionState::Connected).await;

    assert_eq!(second.next_call().await, ("SubscribeToAlerts".to_owned(), vec![]));
    assert_eq!(
        second.next_call().await,
        ("SubscribeToPerformanceUpdates".to_owned(), vec![json!("billing")])
    );
}

#[tokio::test]
async fn typed_events_reach_on_event() {
    let mut h = harness(3);
    let client = HubClient::new(h.conn.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let group = client.on_event(move |event: &HubEvent| {
        let _ = tx.send(event.clone());
    });
    assert_eq!(group.len(), 11);

    let peer = h.connected().await;
    assert!(peer.push("ABTestUpdate", vec![json!("t-42"), json!({"leader": "B"})]));
    assert!(peer.send_text(r#"{"type":"query_progress","percent":40}"#));
    assert!(peer.push("Error", vec![json!("quota exceeded")]));

    assert_eq!(
        rx.recv().await.unwrap(),
        HubEvent::AbTestUpdate {
            test_id: "t-42".into(),
            data: json!({"leader": "B"}),
        }
    );
    assert_eq!(
        rx.recv().await.unwrap(),
        HubEvent::Channel {
            event: "query_progress".into(),
            payload: json!({"type": "query_progress", "percent": 40}),
        }
    );
    assert_eq!(rx.recv().await.unwrap(), HubEvent::Error("quota exceeded".into()));

    assert_eq!(group.unsubscribe(), 11);
}

#[tokio::test]
async fn performance_listener_filters_by_template() {
    let mut h = harness(3);
    let client = HubClient::new(h.conn.clone());
    let seen: Arc<Mutex<Vec<(String, Value)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = client.on_performance_update(Some("welcome-email".into()), move |key, data| {
        sink.lock().unwrap().push((key.to_owned(), data.clone()));
    });
    let (mut all, _all_sub) = common::forward(h.conn.bus(), "PerformanceUpdate");

    let peer = h.connected().await;
    assert!(peer.push("PerformanceUpdate", vec![json!("digest"), json!({"openRate": 0.1})]));
    assert!(peer.push("PerformanceUpdate", vec![json!("welcome-email"), json!({"openRate": 0.6})]));

    // Both reach the unfiltered listener; only the second passes the filter.
    let _ = all.recv().await.unwrap();
    let _ = all.recv().await.unwrap();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![("welcome-email".to_owned(), json!({"openRate": 0.6}))]
    );
}

#[tokio::test]
async fn dropping_client_removes_replay_listener() {
    let h = harness(3);
    let baseline = h.conn.bus().listener_count(beacon_events::CONNECTION);
    let client = HubClient::new(h.conn.clone());
    assert_eq!(h.conn.bus().listener_count(beacon_events::CONNECTION), baseline + 1);
    drop(client);
    assert_eq!(h.conn.bus().listener_count(beacon_events::CONNECTION), baseline);
}
