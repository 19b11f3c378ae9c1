//! `beacon watch`: stream hub events to stdout.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use beacon_events::{CONNECTION, EventBus, Subscription};
use beacon_link::hub::{CHANNEL_EVENTS, HUB_EVENTS};
use beacon_link::{
    AuthCredential, ConnectionConfig, ConnectionState, HubClient, HubConnection, StaticCredential,
};
use beacon_settings::BeaconSettings;
use clap::Args;
use serde_json::Value;
use tracing::info;

use crate::output::event_line;

/// Environment variable consulted when `--token` is absent.
pub const TOKEN_ENV: &str = "BEACON_TOKEN";

/// Value of a bare `--performance` flag: every intent type.
const ALL_INTENTS: &str = "*";

/// Arguments for `beacon watch`.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Hub URL (overrides `connection.url`).
    #[arg(long)]
    pub url: Option<String>,

    /// Bearer token; falls back to `BEACON_TOKEN`.
    #[arg(long)]
    pub token: Option<String>,

    /// Subscribe to alerts.
    #[arg(long)]
    pub alerts: bool,

    /// Subscribe to A/B test updates.
    #[arg(long)]
    pub ab_tests: bool,

    /// Subscribe to performance updates, optionally for one intent type.
    #[arg(long, value_name = "INTENT", num_args = 0..=1, default_missing_value = ALL_INTENTS)]
    pub performance: Option<String>,
}

/// Connect, subscribe, and print events until interrupted or the reconnect
/// budget runs out.
pub async fn run(settings: &BeaconSettings, args: WatchArgs) -> Result<()> {
    let token = args
        .token
        .clone()
        .or_else(|| std::env::var(TOKEN_ENV).ok())
        .with_context(|| format!("No token: pass --token or set {TOKEN_ENV}"))?;
    let credential = AuthCredential::from_token(token).context("Unusable token")?;

    let mut config = ConnectionConfig::from(&settings.connection);
    if let Some(url) = &args.url {
        config.url.clone_from(url);
    }

    let bus = EventBus::new();
    let _printers = print_events(&bus);
    let connection =
        HubConnection::websocket(config, Arc::new(StaticCredential::new(credential)), bus);
    let client = HubClient::new(connection.clone());

    connection.connect().await.context("Failed to connect")?;
    subscribe(&client, &args).await?;

    let mut state = connection.watch_state();
    let failed = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            false
        }
        _ = state.wait_for(|s| *s == ConnectionState::Failed) => true,
    };
    connection.shutdown().await;

    if failed {
        bail!("Connection failed after exhausting reconnect attempts");
    }
    Ok(())
}

async fn subscribe(client: &HubClient, args: &WatchArgs) -> Result<()> {
    if args.alerts {
        let _ = client.subscribe_to_alerts().await.context("SubscribeToAlerts")?;
    }
    if args.ab_tests {
        let _ = client
            .subscribe_to_ab_test_updates()
            .await
            .context("SubscribeToABTestUpdates")?;
    }
    if let Some(intent) = args.performance.as_deref() {
        let intent = (intent != ALL_INTENTS).then_some(intent);
        let _ = client
            .subscribe_to_performance_updates(intent)
            .await
            .context("SubscribeToPerformanceUpdates")?;
    }
    Ok(())
}

/// Print every lifecycle, hub, and channel event published on `bus`.
fn print_events(bus: &EventBus) -> Vec<Subscription> {
    std::iter::once(CONNECTION)
        .chain(HUB_EVENTS)
        .chain(CHANNEL_EVENTS)
        .map(|name| {
            bus.subscribe(name, move |payload: &Value| {
                println!("{}", event_line(name, payload));
            })
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printers_cover_every_event() {
        let bus = EventBus::new();
        let printers = print_events(&bus);
        assert_eq!(printers.len(), 1 + HUB_EVENTS.len() + CHANNEL_EVENTS.len());
        assert_eq!(bus.listener_count(CONNECTION), 1);
        assert_eq!(bus.listener_count("query_progress"), 1);
        drop(printers);
        assert_eq!(bus.listener_count(CONNECTION), 0);
    }

    #[tokio::test]
    async fn missing_token_is_reported() {
        if std::env::var(TOKEN_ENV).is_ok() {
            return;
        }
        let args = WatchArgs {
            url: None,
            token: None,
            alerts: false,
            ab_tests: false,
            performance: None,
        };
        let err = run(&BeaconSettings::default(), args).await.unwrap_err();
        assert!(err.to_string().contains(TOKEN_ENV));
    }

    #[tokio::test]
    async fn blank_token_is_reported() {
        let args = WatchArgs {
            url: None,
            token: Some(" ".into()),
            alerts: false,
            ab_tests: false,
            performance: None,
        };
        let err = run(&BeaconSettings::default(), args).await.unwrap_err();
        assert!(err.to_string().contains("Unusable token"));
    }
}
