//! Bounded polling for a render target that the view may not have inserted yet.

use std::time::Duration;

use map_surface::RenderHost;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 20;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    Ready { attempts: u32 },
    GaveUp { attempts: u32 },
    Cancelled { attempts: u32 },
}

/// Probes `host` for `target` once per `policy.delay`, starting after the first delay.
///
/// At least one probe is made even when `max_attempts` is zero.
pub async fn wait_for_target(
    host: &dyn RenderHost,
    target: &str,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> BindOutcome {
    let max_attempts = policy.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return BindOutcome::Cancelled { attempts: attempt - 1 };
            }
            _ = tokio::time::sleep(policy.delay) => {}
        }

        if host.has_target(target).await {
            return BindOutcome::Ready { attempts: attempt };
        }

        debug!(
            render_target = target,
            attempt,
            max_attempts,
            "map: render target not present yet"
        );
    }

    BindOutcome::GaveUp {
        attempts: max_attempts,
    }
}

#[cfg(test)]
#[path = "tests/retry_tests.rs"]
mod tests;
