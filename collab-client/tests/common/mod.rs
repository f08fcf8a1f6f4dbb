//! Shared helpers for collab-client integration tests.

#![allow(dead_code)]

mod server;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use collab_client::{ClientConfig, CollaborationClient, Timer};
use collab_core::{CollabEvent, ReconnectPolicy, ANY_EVENT};
use tokio::sync::mpsc;

pub use server::TestServer;

/// Timer that records requested delays and returns immediately.
#[derive(Default)]
pub struct RecordingTimer {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingTimer {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Timer for RecordingTimer {
    async fn sleep(&self, delay: Duration) {
        self.delays.lock().unwrap().push(delay);
        tokio::task::yield_now().await;
    }
}

/// Client pointed at `server` with a recording timer.
pub fn client_for(
    server: &TestServer,
    reconnect: ReconnectPolicy,
) -> (CollaborationClient, Arc<RecordingTimer>) {
    let config = ClientConfig::parse(&server.api_url())
        .expect("config")
        .with_reconnect(reconnect);
    let timer = Arc::new(RecordingTimer::default());
    let client = CollaborationClient::with_timer(config, timer.clone());
    (client, timer)
}

/// Every event the client dispatches, in order.
pub struct EventLog {
    rx: mpsc::UnboundedReceiver<CollabEvent>,
}

impl EventLog {
    pub fn attach(client: &CollaborationClient) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        client.add_event_listener(ANY_EVENT, move |event: &CollabEvent| {
            let _ = tx.send(event.clone());
        });
        Self { rx }
    }

    /// Next event named `name`, skipping others.
    ///
    /// # Panics
    ///
    /// Panics if none arrives within 5 seconds.
    pub async fn next_named(&mut self, name: &str) -> CollabEvent {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let event = tokio::time::timeout_at(deadline, self.rx.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {name}"))
                .expect("event channel closed");
            if event.name() == name {
                return event;
            }
        }
    }

    /// Names of the events already received, without waiting.
    pub fn drain_names(&mut self) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            names.push(event.name().to_string());
        }
        names
    }
}
