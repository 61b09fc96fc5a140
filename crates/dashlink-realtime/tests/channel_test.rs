//! Channel lifecycle scenarios against the in-memory transport.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;

use dashlink_core::config::ChannelConfig;
use dashlink_core::{AppError, AppResult};
use dashlink_realtime::{ChannelManager, ChannelState, Connector, Transport};

use common::{Harness, RecordingObserver, fast_config, forwarding_listener, settle, wait_until};

#[tokio::test(start_paused = true)]
async fn test_refused_opens_exhaust_after_max_attempts() {
    let config = ChannelConfig {
        max_reconnect_attempts: 2,
        reconnect_interval_ms: 100,
        ..Default::default()
    };
    let mut h = Harness::new(config);
    h.connector.set_refusing(true);

    let started = Instant::now();
    h.manager.connect().await.unwrap();
    let liveness = wait_until(&h.manager, |l| l.state == ChannelState::Exhausted).await;

    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(h.connector.attempts(), 3);
    assert_eq!(liveness.reconnect_attempts, 2);
    assert!(!liveness.connected);

    let events = h.observer.events();
    assert_eq!(h.observer.count("error"), 3);
    assert_eq!(h.observer.count("close"), 3);
    assert!(events.contains(&"reconnect 1/2".to_string()));
    assert!(events.contains(&"reconnect 2/2".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("exhausted 2"));

    // Nothing further happens on its own.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.connector.attempts(), 3);
    assert_eq!(h.manager.state(), ChannelState::Exhausted);

    let metrics = h.manager.metrics();
    assert_eq!(metrics.reconnects_scheduled, 2);
    assert_eq!(metrics.reconnect_timers_peak, 1);
    assert_eq!(metrics.reconnect_timers_pending, 0);
    assert!(h.peers.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_connect_resumes_from_exhausted() {
    let config = ChannelConfig {
        max_reconnect_attempts: 1,
        reconnect_interval_ms: 100,
        ..Default::default()
    };
    let mut h = Harness::new(config);
    h.connector.set_refusing(true);
    h.manager.connect().await.unwrap();
    wait_until(&h.manager, |l| l.state == ChannelState::Exhausted).await;

    h.connector.set_refusing(false);
    let _peer = h.open().await;

    let liveness = h.manager.liveness();
    assert_eq!(liveness.state, ChannelState::Open);
    assert_eq!(liveness.reconnect_attempts, 0);
    assert!(liveness.last_heartbeat_ack_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_peer_close_schedules_single_reconnect() {
    let mut h = Harness::new(fast_config());
    let first = h.open().await;
    assert_eq!(first.url(), "mem://dashboard?token=secret");

    first.close();
    let liveness = wait_until(&h.manager, |l| !l.connected).await;
    assert!(matches!(
        liveness.state,
        ChannelState::Idle | ChannelState::Reconnecting { attempt: 1 }
    ));

    let _second = h.next_peer().await;
    let liveness = wait_until(&h.manager, |l| l.connected).await;
    assert_eq!(liveness.reconnect_attempts, 0);
    assert_eq!(h.connector.attempts(), 2);
    assert_eq!(h.connector.open_connections(), 1);
    assert_eq!(
        h.observer.events(),
        vec!["open", "close", "reconnect 1/3", "open"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_reports_then_reconnects() {
    let mut h = Harness::new(fast_config());
    let peer = h.open().await;

    peer.fail("connection reset");
    wait_until(&h.manager, |l| {
        matches!(l.state, ChannelState::Reconnecting { .. })
    })
    .await;

    assert_eq!(
        h.observer.events(),
        vec!["open", "error", "close", "reconnect 1/3"]
    );
    let _peer = h.next_peer().await;
    wait_until(&h.manager, |l| l.connected).await;
}

#[tokio::test(start_paused = true)]
async fn test_listeners_run_in_order_and_failures_are_isolated() {
    let mut h = Harness::new(fast_config());
    let peer = h.open().await;

    let log = Arc::new(Mutex::new(Vec::new()));
    let (tx, mut delivered) = mpsc::unbounded_channel();

    let failing_log = log.clone();
    h.manager.register_fn("a", move |message| {
        failing_log.lock().unwrap().push(format!("a:{}", message.kind));
        Err(AppError::internal("listener a is broken"))
    });
    h.manager
        .register_fn("b", forwarding_listener(log.clone(), "b", Some(tx)));

    peer.push_json(&json!({"type": "lead_updated", "data": {"id": 7}}));
    assert_eq!(delivered.recv().await.as_deref(), Some("lead_updated"));

    assert_eq!(*log.lock().unwrap(), vec!["a:lead_updated", "b:lead_updated"]);
    let metrics = h.manager.metrics();
    assert_eq!(metrics.messages_dispatched, 1);
    assert_eq!(metrics.listener_failures, 1);
    assert!(h.manager.is_connected());
    assert!(h.observer.events().contains(&"message:lead_updated".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_listener_does_not_stop_others() {
    let mut h = Harness::new(fast_config());
    let peer = h.open().await;

    let log = Arc::new(Mutex::new(Vec::new()));
    let (tx, mut delivered) = mpsc::unbounded_channel();
    h.manager.register_fn("boom", |_| panic!("listener exploded"));
    h.manager
        .register_fn("after", forwarding_listener(log.clone(), "after", Some(tx)));

    peer.push_json(&json!({"type": "contact_created"}));
    assert_eq!(delivered.recv().await.as_deref(), Some("contact_created"));
    assert_eq!(h.manager.metrics().listener_failures, 1);
    assert!(h.manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_listener_may_unregister_itself_during_dispatch() {
    let mut h = Harness::new(fast_config());
    let peer = h.open().await;

    let log = Arc::new(Mutex::new(Vec::new()));
    let (tx, mut delivered) = mpsc::unbounded_channel();

    let registry = h.manager.listeners().clone();
    let once_log = log.clone();
    h.manager.register_fn("once", move |message| {
        once_log.lock().unwrap().push(format!("once:{}", message.kind));
        registry.unregister("once");
        Ok(())
    });
    h.manager
        .register_fn("tail", forwarding_listener(log.clone(), "tail", Some(tx)));

    peer.push_json(&json!({"type": "first"}));
    peer.push_json(&json!({"type": "second"}));
    assert_eq!(delivered.recv().await.as_deref(), Some("first"));
    assert_eq!(delivered.recv().await.as_deref(), Some("second"));

    assert_eq!(
        *log.lock().unwrap(),
        vec!["once:first", "tail:first", "tail:second"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_acks_are_not_forwarded() {
    let mut h = Harness::new(fast_config());
    let peer = h.open().await;

    let log = Arc::new(Mutex::new(Vec::new()));
    let (tx, mut delivered) = mpsc::unbounded_channel();
    h.manager
        .register_fn("all", forwarding_listener(log.clone(), "all", Some(tx)));

    peer.push_json(&json!({"type": "heartbeat_ack", "data": {"message": "ok"}}));
    peer.push_json(&json!({"type": "heartbeat"}));
    peer.push_json(&json!({"type": "pong"}));
    peer.push_json(&json!({"type": "account_deleted"}));

    assert_eq!(delivered.recv().await.as_deref(), Some("account_deleted"));
    assert_eq!(*log.lock().unwrap(), vec!["all:account_deleted"]);
    assert_eq!(h.manager.metrics().acks_received, 3);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frames_are_dropped() {
    let mut h = Harness::new(fast_config());
    let peer = h.open().await;

    let log = Arc::new(Mutex::new(Vec::new()));
    let (tx, mut delivered) = mpsc::unbounded_channel();
    h.manager
        .register_fn("all", forwarding_listener(log.clone(), "all", Some(tx)));

    peer.push("this is not json");
    peer.push(r#"{"data": {"missing": "type"}}"#);
    peer.push("[1, 2, 3]");
    peer.push_json(&json!({"type": "user_updated"}));

    assert_eq!(delivered.recv().await.as_deref(), Some("user_updated"));
    assert_eq!(*log.lock().unwrap(), vec!["all:user_updated"]);

    let metrics = h.manager.metrics();
    assert_eq!(metrics.malformed_frames, 3);
    assert!(h.manager.is_connected());
    assert_eq!(h.observer.count("error"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_probe_then_ack_cancels_timeout() {
    let mut h = Harness::new(fast_config());
    let mut peer = h.open().await;

    let probe = peer.next_frame().await.expect("probe");
    let probe: Value = serde_json::from_str(&probe).unwrap();
    assert_eq!(probe["type"], "heartbeat");
    assert!(probe["timestamp"].as_i64().is_some());

    peer.push_json(&json!({"type": "heartbeat_ack"}));
    while h.manager.metrics().acks_received == 0 {
        settle().await;
    }

    // Past the deadline but before the next probe.
    tokio::time::sleep(Duration::from_millis(700)).await;

    let metrics = h.manager.metrics();
    assert_eq!(metrics.forced_closes, 0);
    assert_eq!(metrics.heartbeat_timeouts_pending, 0);
    assert_eq!(metrics.acks_received, 1);
    assert!(h.manager.is_connected());
    assert!(!peer.is_client_closed());
    assert_eq!(h.connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_silent_peer_is_closed_once_and_replaced() {
    let mut h = Harness::new(fast_config());
    let mut zombie = h.open().await;

    let _probe = zombie.next_frame().await.expect("probe");
    let probed_at = Instant::now();

    let _replacement = h.next_peer().await;
    assert!(probed_at.elapsed() >= Duration::from_millis(600));
    assert!(zombie.is_client_closed());

    wait_until(&h.manager, |l| l.connected).await;
    let metrics = h.manager.metrics();
    assert_eq!(metrics.forced_closes, 1);
    assert_eq!(metrics.closes, 1);
    assert_eq!(metrics.heartbeat_timeouts_peak, 1);
    assert_eq!(metrics.reconnect_timers_peak, 1);
    assert_eq!(h.connector.open_connections(), 1);
    assert_eq!(
        h.observer.events(),
        vec!["open", "close", "reconnect 1/3", "open"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeout_clears_connected_before_close() {
    let mut h = Harness::new(fast_config());
    let mut zombie = h.open().await;
    let _probe = zombie.next_frame().await.expect("probe");

    let liveness = wait_until(&h.manager, |l| !l.connected).await;
    assert!(matches!(
        liveness.state,
        ChannelState::Closing | ChannelState::Idle | ChannelState::Reconnecting { .. }
    ));
    assert_eq!(h.observer.count("error"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_send_while_disconnected_is_dropped() {
    let mut h = Harness::new(fast_config());

    assert!(!h.manager.send(&json!({"type": "subscribe", "channel": "leads"})));
    assert_eq!(h.manager.metrics().sends_dropped, 1);
    assert_eq!(h.connector.attempts(), 0);

    let mut peer = h.open().await;
    assert!(h.manager.send(&json!({"type": "subscribe", "channel": "leads"})));
    let frame: Value = serde_json::from_str(&peer.next_frame().await.unwrap()).unwrap();
    assert_eq!(frame, json!({"type": "subscribe", "channel": "leads"}));

    // Nothing sent while offline is replayed later.
    settle().await;
    assert!(peer.drain_frames().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_everything() {
    let mut h = Harness::new(fast_config());
    let peer = h.open().await;
    h.manager.register_fn("x", |_| Ok(()));

    peer.close();
    wait_until(&h.manager, |l| {
        matches!(l.state, ChannelState::Reconnecting { .. })
    })
    .await;

    h.manager.disconnect().await.unwrap();
    assert_eq!(h.manager.state(), ChannelState::Idle);
    assert!(h.manager.listeners().is_empty());
    assert_eq!(h.manager.metrics().reconnect_timers_pending, 0);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.connector.attempts(), 1);
    assert!(h.peers.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_then_connect_leaves_one_live_connection() {
    let mut h = Harness::new(fast_config());
    let first = h.open().await;

    h.manager.disconnect().await.unwrap();
    let _second = h.open().await;
    settle().await;

    assert!(first.is_client_closed());
    assert_eq!(h.connector.open_connections(), 1);
    assert_eq!(h.manager.metrics().reconnects_scheduled, 0);
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_open_replaces_connection() {
    let mut h = Harness::new(fast_config());
    let first = h.open().await;

    let _second = h.open().await;
    settle().await;

    assert!(first.is_client_closed());
    assert_eq!(h.connector.open_connections(), 1);
    assert_eq!(h.observer.events(), vec!["open", "open"]);
    assert_eq!(h.manager.metrics().reconnects_scheduled, 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_manager_closes_connection() {
    let mut h = Harness::new(fast_config());
    let peer = h.open().await;

    drop(h.manager);
    settle().await;
    assert!(peer.is_client_closed());
    assert_eq!(h.connector.open_connections(), 0);
}

/// Opens connections to a peer that never reads, never writes and never
/// acknowledges a close.
#[derive(Debug, Default)]
struct StalledConnector {
    connects: AtomicUsize,
}

struct StalledTransport;

#[async_trait]
impl Connector for StalledConnector {
    async fn connect(&self, _url: &str) -> AppResult<Box<dyn Transport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StalledTransport))
    }
}

#[async_trait]
impl Transport for StalledTransport {
    async fn send(&mut self, _frame: String) -> AppResult<()> {
        std::future::pending().await
    }

    async fn recv(&mut self) -> Option<AppResult<String>> {
        std::future::pending().await
    }

    async fn close(&mut self) -> AppResult<()> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_stalled_write_still_closes_and_reconnects() {
    let connector = Arc::new(StalledConnector::default());
    let observer = Arc::new(RecordingObserver::default());
    let manager = ChannelManager::builder("mem://stalled")
        .config(fast_config())
        .connector(connector.clone())
        .observer(observer.clone())
        .spawn()
        .unwrap();

    manager.connect().await.unwrap();
    wait_until(&manager, |l| l.connected).await;

    // The probe write hangs, the deadline forces a close, the hung close is
    // abandoned, and the normal reconnect path takes over.
    tokio::time::timeout(Duration::from_secs(30), async {
        while manager.metrics().opens < 2 {
            settle().await;
        }
    })
    .await
    .expect("no reconnect after a stalled write");

    let metrics = manager.metrics();
    assert_eq!(metrics.forced_closes, 1);
    assert_eq!(metrics.closes, 1);
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    assert_eq!(observer.events(), vec!["open", "close", "reconnect 1/3", "open"]);
}
