//! Outreach throttle - windowed reply limits plus a minimum gap between replies

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, sleep};

/// Limits for outgoing replies, independent of scoring calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Max replies per minute (None = unlimited)
    pub per_minute: Option<u32>,
    /// Max replies per hour (None = unlimited)
    pub per_hour: Option<u32>,
    /// Minimum time between two consecutive replies
    pub min_interval: Duration,
}

#[derive(Debug)]
pub struct OutreachThrottle {
    config: ThrottleConfig,
    state: Mutex<ThrottleState>,
}

#[derive(Debug)]
struct ThrottleState {
    minute_window_start: Instant,
    hour_window_start: Instant,
    minute_count: u32,
    hour_count: u32,
    last_acquired: Option<Instant>,
}

impl OutreachThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        let now = Instant::now();
        Self {
            config,
            state: Mutex::new(ThrottleState {
                minute_window_start: now,
                hour_window_start: now,
                minute_count: 0,
                hour_count: 0,
                last_acquired: None,
            }),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.config.per_minute.is_none()
            && self.config.per_hour.is_none()
            && self.config.min_interval.is_zero()
    }

    /// Wait until another reply is allowed, then claim the slot
    pub async fn acquire(&self) {
        if self.is_unlimited() {
            return;
        }

        loop {
            let mut state = self.state.lock().await;
            let now = Instant::now();

            if now.duration_since(state.minute_window_start) >= Duration::from_secs(60) {
                state.minute_window_start = now;
                state.minute_count = 0;
            }

            if now.duration_since(state.hour_window_start) >= Duration::from_secs(3600) {
                state.hour_window_start = now;
                state.hour_count = 0;
            }

            let mut wait_for = Duration::ZERO;
            if let Some(limit) = self.config.per_minute {
                if state.minute_count >= limit {
                    let elapsed = now.duration_since(state.minute_window_start);
                    wait_for = wait_for.max(Duration::from_secs(60).saturating_sub(elapsed));
                }
            }

            if let Some(limit) = self.config.per_hour {
                if state.hour_count >= limit {
                    let elapsed = now.duration_since(state.hour_window_start);
                    wait_for = wait_for.max(Duration::from_secs(3600).saturating_sub(elapsed));
                }
            }

            if let Some(last) = state.last_acquired {
                let elapsed = now.duration_since(last);
                wait_for = wait_for.max(self.config.min_interval.saturating_sub(elapsed));
            }

            if wait_for.is_zero() {
                state.minute_count = state.minute_count.saturating_add(1);
                state.hour_count = state.hour_count.saturating_add(1);
                state.last_acquired = Some(now);
                return;
            }

            drop(state);
            tracing::debug!(wait_ms = wait_for.as_millis() as u64, "Outreach throttled");
            sleep(wait_for).await;
        }
    }
}
