//! Time source used by every waiting loop in the harness.
//!
//! Polling never calls `tokio::time::sleep` directly; it goes through a
//! [`Clock`] so tests can drive loops with a [`ManualClock`] that advances
//! instantly.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic time elapsed since the clock was created.
    fn now(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `Instant` and `tokio::time::sleep`.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock whose time only moves when someone sleeps on it or calls [`ManualClock::advance`].
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
    sleeps: Mutex<u32>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += duration;
        }
    }

    /// Number of `sleep` calls observed so far.
    pub fn sleeps(&self) -> u32 {
        self.sleeps.lock().map(|s| *s).unwrap_or(0)
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.lock().map(|n| *n).unwrap_or_default()
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            *sleeps += 1;
        }
        self.advance(duration);
    }
}
