//! Analytics hub client on top of [`HubConnection`].
//!
//! Wraps the hub's method names, remembers `SubscribeTo*` calls so they can
//! be replayed after an automatic reconnect, and parses push events into
//! [`HubEvent`].

use std::sync::Arc;

use beacon_events::names::{channel, hub};
use beacon_events::{CONNECTION, ConnectionEvent, ConnectionStatus, Subscription};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::connection::{HubConnection, WeakHubConnection};
use crate::errors::Result;

/// Hub method names.
pub mod methods {
    /// `SubscribeToPerformanceUpdates(intentType?)`
    pub const SUBSCRIBE_TO_PERFORMANCE_UPDATES: &str = "SubscribeToPerformanceUpdates";
    /// `SubscribeToABTestUpdates()`
    pub const SUBSCRIBE_TO_AB_TEST_UPDATES: &str = "SubscribeToABTestUpdates";
    /// `SubscribeToAlerts()`
    pub const SUBSCRIBE_TO_ALERTS: &str = "SubscribeToAlerts";
    /// `GetRealTimeDashboard()`
    pub const GET_REAL_TIME_DASHBOARD: &str = "GetRealTimeDashboard";
    /// `GetTemplatePerformance(templateKey)`
    pub const GET_TEMPLATE_PERFORMANCE: &str = "GetTemplatePerformance";
}

/// Every hub push event name.
pub const HUB_EVENTS: [&str; 6] = [
    hub::DASHBOARD_UPDATE,
    hub::PERFORMANCE_UPDATE,
    hub::AB_TEST_UPDATE,
    hub::NEW_ALERT,
    hub::REAL_TIME_UPDATE,
    hub::ERROR,
];

/// Every channel event name.
pub const CHANNEL_EVENTS: [&str; 5] = [
    channel::QUERY_PROGRESS,
    channel::SYSTEM_METRICS,
    channel::COST_ALERT,
    channel::USER_ACTIVITY,
    channel::DASHBOARD_UPDATE,
];

// ─────────────────────────────────────────────────────────────────────────────
// Typed events
// ─────────────────────────────────────────────────────────────────────────────

/// A known push event with its arguments unpacked.
#[derive(Clone, Debug, PartialEq)]
pub enum HubEvent {
    /// Full dashboard snapshot.
    DashboardUpdate(Value),
    /// Metrics for one template.
    PerformanceUpdate {
        /// Template the metrics belong to.
        template_key: String,
        /// Metrics.
        data: Value,
    },
    /// Progress of one A/B test.
    AbTestUpdate {
        /// Test id.
        test_id: String,
        /// Progress data.
        data: Value,
    },
    /// New alert.
    NewAlert(Value),
    /// Real-time analytics tick.
    RealTimeUpdate(Value),
    /// Error reported by the server.
    Error(String),
    /// Channel message, payload is the whole frame.
    Channel {
        /// Channel event name.
        event: String,
        /// The frame as received.
        payload: Value,
    },
}

impl HubEvent {
    /// Parse a bus payload published under `event`.
    ///
    /// Hub events carry their arguments as an array; channel events carry
    /// the frame. Returns `None` for unknown names or missing arguments.
    pub fn parse(event: &str, payload: &Value) -> Option<Self> {
        let arg = |index: usize| payload.get(index).cloned().unwrap_or(Value::Null);
        let key = |index: usize| payload.get(index).and_then(Value::as_str).map(str::to_owned);

        let parsed = match event {
            hub::DASHBOARD_UPDATE => Self::DashboardUpdate(arg(0)),
            hub::PERFORMANCE_UPDATE => Self::PerformanceUpdate {
                template_key: key(0)?,
                data: arg(1),
            },
            hub::AB_TEST_UPDATE => Self::AbTestUpdate {
                test_id: key(0)?,
                data: arg(1),
            },
            hub::NEW_ALERT => Self::NewAlert(arg(0)),
            hub::REAL_TIME_UPDATE => Self::RealTimeUpdate(arg(0)),
            hub::ERROR => Self::Error(match payload.get(0) {
                Some(Value::String(message)) => message.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            }),
            name if CHANNEL_EVENTS.contains(&name) => Self::Channel {
                event: name.to_owned(),
                payload: payload.clone(),
            },
            _ => return None,
        };
        Some(parsed)
    }

    /// Event name this variant is published under.
    pub fn name(&self) -> &str {
        match self {
            Self::DashboardUpdate(_) => hub::DASHBOARD_UPDATE,
            Self::PerformanceUpdate { .. } => hub::PERFORMANCE_UPDATE,
            Self::AbTestUpdate { .. } => hub::AB_TEST_UPDATE,
            Self::NewAlert(_) => hub::NEW_ALERT,
            Self::RealTimeUpdate(_) => hub::REAL_TIME_UPDATE,
            Self::Error(_) => hub::ERROR,
            Self::Channel { event, .. } => event,
        }
    }
}

/// Several registrations released together.
#[must_use = "dropping a SubscriptionGroup unsubscribes its listeners"]
#[derive(Debug, Default)]
pub struct SubscriptionGroup(Vec<Subscription>);

impl SubscriptionGroup {
    /// Number of registrations held.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the group is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Remove every registration. Returns how many were still registered.
    pub fn unsubscribe(self) -> usize {
        self.0
            .into_iter()
            .map(Subscription::unsubscribe)
            .filter(|removed| *removed)
            .count()
    }

    /// Keep every registration for the lifetime of the bus.
    pub fn detach(self) {
        self.0.into_iter().for_each(Subscription::detach);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
struct DurableCall {
    target: String,
    arguments: Vec<Value>,
}

/// Typed client for the analytics hub.
#[derive(Clone)]
pub struct HubClient {
    connection: HubConnection,
    durable: Arc<Mutex<Vec<DurableCall>>>,
    _replay: Arc<Subscription>,
}

impl HubClient {
    /// Wrap a connection. Successful `SubscribeTo*` calls are replayed after
    /// every `reconnected` transition.
    pub fn new(connection: HubConnection) -> Self {
        let durable: Arc<Mutex<Vec<DurableCall>>> = Arc::new(Mutex::new(Vec::new()));
        let replay = connection.on(
            CONNECTION,
            replay_listener(connection.downgrade(), Arc::clone(&durable)),
        );
        Self {
            connection,
            durable,
            _replay: Arc::new(replay),
        }
    }

    /// Underlying connection.
    pub fn connection(&self) -> &HubConnection {
        &self.connection
    }

    /// Join the performance-update group, optionally narrowed to one intent type.
    pub async fn subscribe_to_performance_updates(&self, intent_type: Option<&str>) -> Result<Value> {
        let arguments = intent_type.map(|t| vec![json!(t)]).unwrap_or_default();
        self.durable_invoke(methods::SUBSCRIBE_TO_PERFORMANCE_UPDATES, arguments)
            .await
    }

    /// Join the A/B test group.
    pub async fn subscribe_to_ab_test_updates(&self) -> Result<Value> {
        self.durable_invoke(methods::SUBSCRIBE_TO_AB_TEST_UPDATES, Vec::new())
            .await
    }

    /// Join the alerts group.
    pub async fn subscribe_to_alerts(&self) -> Result<Value> {
        self.durable_invoke(methods::SUBSCRIBE_TO_ALERTS, Vec::new())
            .await
    }

    /// Fetch the current dashboard snapshot.
    pub async fn get_real_time_dashboard(&self) -> Result<Value> {
        self.connection
            .invoke(methods::GET_REAL_TIME_DASHBOARD, Vec::new())
            .await
    }

    /// Fetch metrics for one template.
    pub async fn get_template_performance(&self, template_key: &str) -> Result<Value> {
        self.connection
            .invoke(methods::GET_TEMPLATE_PERFORMANCE, vec![json!(template_key)])
            .await
    }

    /// Fire-and-forget message.
    pub async fn send(&self, event: &str, data: Value) -> Result<()> {
        self.connection.send(event, data).await
    }

    /// Number of remembered subscription calls.
    pub fn durable_subscriptions(&self) -> usize {
        self.durable.lock().len()
    }

    /// Stop replaying subscription calls after reconnects.
    pub fn forget_subscriptions(&self) {
        self.durable.lock().clear();
    }

    /// Deliver every known hub and channel event to `callback` as a [`HubEvent`].
    pub fn on_event<F>(&self, callback: F) -> SubscriptionGroup
    where
        F: Fn(&HubEvent) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let subscriptions = HUB_EVENTS
            .iter()
            .chain(CHANNEL_EVENTS.iter())
            .map(|&name| {
                let callback = Arc::clone(&callback);
                self.connection.on(name, move |payload: &Value| {
                    match HubEvent::parse(name, payload) {
                        Some(event) => callback(&event),
                        None => debug!(event = name, "unparseable hub event dropped"),
                    }
                })
            })
            .collect();
        SubscriptionGroup(subscriptions)
    }

    /// Deliver `PerformanceUpdate` events, optionally only for one template.
    pub fn on_performance_update<F>(&self, template_key: Option<String>, callback: F) -> Subscription
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.connection.bus().subscribe_filtered(
            hub::PERFORMANCE_UPDATE,
            move |payload: &Value| {
                template_key
                    .as_deref()
                    .is_none_or(|key| payload.get(0).and_then(Value::as_str) == Some(key))
            },
            move |payload: &Value| {
                if let Some(HubEvent::PerformanceUpdate { template_key, data }) =
                    HubEvent::parse(hub::PERFORMANCE_UPDATE, payload)
                {
                    callback(&template_key, &data);
                }
            },
        )
    }

    async fn durable_invoke(&self, target: &str, arguments: Vec<Value>) -> Result<Value> {
        let result = self.connection.invoke(target, arguments.clone()).await?;
        let call = DurableCall {
            target: target.to_owned(),
            arguments,
        };
        let mut durable = self.durable.lock();
        if !durable.contains(&call) {
            durable.push(call);
        }
        Ok(result)
    }
}

fn replay_listener(
    connection: WeakHubConnection,
    durable: Arc<Mutex<Vec<DurableCall>>>,
) -> impl Fn(&Value) + Send + Sync + 'static {
    move |payload: &Value| {
        let Some(event) = ConnectionEvent::from_payload(payload) else {
            return;
        };
        if event.status != ConnectionStatus::Reconnected {
            return;
        }
        let calls = durable.lock().clone();
        if calls.is_empty() {
            return;
        }
        let Some(connection) = connection.upgrade() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no runtime to replay hub subscriptions on");
            return;
        };
        info!(count = calls.len(), "replaying hub subscriptions");
        let _ = runtime.spawn(async move {
            for call in calls {
                if let Err(err) = connection.invoke(&call.target, call.arguments).await {
                    warn!(target = %call.target, error = %err, "subscription replay failed");
                }
            }
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parse_performance_update() {
        let event = HubEvent::parse(hub::PERFORMANCE_UPDATE, &json!(["welcome-email", {"openRate": 0.41}]));
        assert_eq!(
            event,
            Some(HubEvent::PerformanceUpdate {
                template_key: "welcome-email".into(),
                data: json!({"openRate": 0.41}),
            })
        );
    }

    #[test]
    fn parse_ab_test_requires_id() {
        assert!(HubEvent::parse(hub::AB_TEST_UPDATE, &json!([])).is_none());
        assert_matches!(
            HubEvent::parse(hub::AB_TEST_UPDATE, &json!(["t-1", {"winner": "B"}])),
            Some(HubEvent::AbTestUpdate { ref test_id, .. }) if test_id == "t-1"
        );
    }

    #[test]
    fn parse_single_argument_events() {
        assert_eq!(
            HubEvent::parse(hub::NEW_ALERT, &json!([{"level": "high"}])),
            Some(HubEvent::NewAlert(json!({"level": "high"})))
        );
        assert_eq!(
            HubEvent::parse(hub::DASHBOARD_UPDATE, &json!([])),
            Some(HubEvent::DashboardUpdate(Value::Null))
        );
        assert_eq!(
            HubEvent::parse(hub::ERROR, &json!(["quota exceeded"])),
            Some(HubEvent::Error("quota exceeded".into()))
        );
    }

    #[test]
    fn parse_channel_event_keeps_frame() {
        let frame = json!({"type": "cost_alert", "spent": 12});
        let event = HubEvent::parse(channel::COST_ALERT, &frame).unwrap();
        assert_eq!(event.name(), channel::COST_ALERT);
        assert_matches!(event, HubEvent::Channel { ref payload, .. } if *payload == frame);
    }

    #[test]
    fn unknown_event_is_none() {
        assert!(HubEvent::parse("SomethingElse", &json!([])).is_none());
    }

    #[test]
    fn names_roundtrip() {
        for name in HUB_EVENTS {
            let payload = json!(["k", {}]);
            let event = HubEvent::parse(name, &payload).unwrap();
            assert_eq!(event.name(), name);
        }
    }
}
