//! Shared harness for channel scenario tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use dashlink_core::config::ChannelConfig;
use dashlink_core::AppError;
use dashlink_realtime::{
    ApplicationMessage, ChannelManager, ChannelObserver, Liveness, MemoryConnector, MemoryPeer,
};

/// Observer that records lifecycle events as short strings.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl ChannelObserver for RecordingObserver {
    fn on_open(&self) {
        self.push("open".into());
    }

    fn on_close(&self) {
        self.push("close".into());
    }

    fn on_error(&self, _error: &AppError) {
        self.push("error".into());
    }

    fn on_message(&self, message: &ApplicationMessage) {
        self.push(format!("message:{}", message.kind));
    }

    fn on_reconnect_scheduled(&self, attempt: u32, max_attempts: u32) {
        self.push(format!("reconnect {attempt}/{max_attempts}"));
    }

    fn on_exhausted(&self, attempts: u32) {
        self.push(format!("exhausted {attempts}"));
    }
}

pub struct Harness {
    pub manager: ChannelManager,
    pub connector: MemoryConnector,
    pub peers: mpsc::UnboundedReceiver<MemoryPeer>,
    pub observer: Arc<RecordingObserver>,
}

impl Harness {
    pub fn new(config: ChannelConfig) -> Self {
        let (connector, peers) = MemoryConnector::new();
        let observer = Arc::new(RecordingObserver::default());
        let manager = ChannelManager::builder("mem://dashboard?token=secret")
            .config(config)
            .connector(Arc::new(connector.clone()))
            .observer(observer.clone())
            .spawn()
            .expect("spawn manager");

        Self {
            manager,
            connector,
            peers,
            observer,
        }
    }

    /// Connect and wait until the channel is open; returns the server side.
    pub async fn open(&mut self) -> MemoryPeer {
        self.manager.connect().await.expect("connect");
        let peer = self.next_peer().await;
        wait_until(&self.manager, |l| l.connected).await;
        peer
    }

    pub async fn next_peer(&mut self) -> MemoryPeer {
        tokio::time::timeout(Duration::from_secs(60), self.peers.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }
}

/// Channel settings with short timings.
pub fn fast_config() -> ChannelConfig {
    ChannelConfig {
        max_reconnect_attempts: 3,
        reconnect_interval_ms: 100,
        heartbeat_interval_ms: 1_000,
        heartbeat_timeout_ms: 500,
        outbound_buffer_size: 16,
    }
}

/// Wait until the published liveness satisfies `pred`.
pub async fn wait_until(manager: &ChannelManager, pred: impl FnMut(&Liveness) -> bool) -> Liveness {
    let mut rx = manager.subscribe();
    let liveness = tokio::time::timeout(Duration::from_secs(60), rx.wait_for(pred))
        .await
        .expect("timed out waiting for liveness")
        .expect("driver stopped")
        .clone();
    liveness
}

/// Let spawned tasks drain their queues.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Listener that forwards message kinds to a channel.
pub fn forwarding_listener(
    log: Arc<Mutex<Vec<String>>>,
    tag: &'static str,
    notify: Option<mpsc::UnboundedSender<String>>,
) -> impl Fn(&ApplicationMessage) -> dashlink_core::AppResult<()> + Send + Sync + 'static {
    move |message| {
        log.lock().unwrap().push(format!("{tag}:{}", message.kind));
        if let Some(tx) = &notify {
            let _ = tx.send(message.kind.clone());
        }
        Ok(())
    }
}
