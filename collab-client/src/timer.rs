//! Reconnect delay source.
//!
//! The transport never sleeps directly; it asks a [`Timer`]. Production code
//! uses [`TokioTimer`], tests inject a timer that records the requested
//! delays and returns immediately.

use std::time::Duration;

use async_trait::async_trait;

/// Something that can wait.
#[async_trait]
pub trait Timer: Send + Sync {
    /// Resolve after `delay`.
    async fn sleep(&self, delay: Duration);
}

/// [`Timer`] backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

#[async_trait]
impl Timer for TokioTimer {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}
