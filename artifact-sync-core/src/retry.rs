//! Backoff strategies and the sleeper used between publish attempts.
//!
//! A strategy is a pure function of the 0-indexed attempt that just failed. Sleeping
//! is behind [`Sleeper`] so tests can record delays instead of waiting them out.

use std::time::Duration;

use async_trait::async_trait;

/// Delay to wait after attempt `attempt` (0-indexed) failed.
pub trait BackoffStrategy: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

/// `unit * (attempt + 1)`: 30s, 60s, 90s, ... with the default unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    unit: Duration,
}

impl LinearBackoff {
    pub const DEFAULT_UNIT: Duration = Duration::from_secs(30);

    pub fn new(unit: Duration) -> Self {
        Self { unit }
    }
}

impl Default for LinearBackoff {
    fn default() -> Self {
        Self::new(Self::DEFAULT_UNIT)
    }
}

impl BackoffStrategy for LinearBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        self.unit.saturating_mul(attempt.saturating_add(1))
    }
}

/// Never waits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl BackoffStrategy for NoBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
