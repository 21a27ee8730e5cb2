// ABOUTME: Fixed-interval polling against eventually consistent provider state.
// ABOUTME: Each attempt re-fetches before evaluating; the wait limit is always explicit.

use serde::{Deserialize, Deserializer};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;

use super::error::StepError;
use crate::gateway::GatewayError;

/// How long a waiting step may keep polling.
///
/// There is deliberately no default: callers pick a bound or opt into
/// waiting forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitLimit {
    Unbounded,
    Within(Duration),
}

impl FromStr for WaitLimit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "none" | "unbounded" => Ok(WaitLimit::Unbounded),
            other => humantime::parse_duration(other)
                .map(WaitLimit::Within)
                .map_err(|e| format!("invalid wait timeout {other:?}: {e}")),
        }
    }
}

impl fmt::Display for WaitLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitLimit::Unbounded => write!(f, "none"),
            WaitLimit::Within(d) => write!(f, "{}", humantime::format_duration(*d)),
        }
    }
}

impl<'de> Deserialize<'de> for WaitLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Result of evaluating one fresh snapshot.
#[derive(Debug)]
pub enum Probe<T> {
    Ready(T),
    Pending,
}

/// A satisfied wait and how many snapshots it took.
#[derive(Debug)]
pub struct Polled<T> {
    pub value: T,
    pub attempts: u32,
}

/// Repeats fetch-evaluate-sleep until a probe reports ready.
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    interval: Duration,
    limit: WaitLimit,
}

impl Poller {
    pub fn new(interval: Duration, limit: WaitLimit) -> Self {
        Self { interval, limit }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn limit(&self) -> WaitLimit {
        self.limit
    }

    /// Call `probe` until it returns [`Probe::Ready`].
    ///
    /// `probe` must fetch its own snapshot on every call. Gateway errors end
    /// the wait immediately. With a bounded limit, one last probe runs at the
    /// deadline before giving up. Dropping the returned future cancels the
    /// wait, including any sleep in progress.
    pub async fn wait_for<T, F, Fut>(&self, what: &str, mut probe: F) -> Result<Polled<T>, StepError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Probe<T>, GatewayError>>,
    {
        let started = Instant::now();
        let deadline = match self.limit {
            WaitLimit::Unbounded => None,
            WaitLimit::Within(limit) => Some(started + limit),
        };
        let mut attempts = 0;

        loop {
            attempts += 1;
            if let Probe::Ready(value) = probe().await? {
                return Ok(Polled { value, attempts });
            }

            let next = Instant::now() + self.interval;
            let wake = match deadline {
                Some(deadline) if Instant::now() >= deadline => {
                    return Err(StepError::WaitTimedOut {
                        what: what.to_string(),
                        attempts,
                        elapsed: started.elapsed(),
                    });
                }
                Some(deadline) => next.min(deadline),
                None => next,
            };

            tracing::debug!("{} not settled after attempt {}", what, attempts);
            tokio::time::sleep_until(wake).await;
        }
    }
}
