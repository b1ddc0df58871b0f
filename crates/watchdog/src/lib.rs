//! Idle watchdog for periodic inactivity checks

use std::future::Future;
use std::sync::Arc;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info};

use warden_state::SharedState;

const DEFAULT_INTERVAL_S: u64 = 30;

/// Watches shared state and fires once when the runtime goes idle
pub struct IdleWatchdog {
    state: Arc<SharedState>,
    interval: Duration,
    enabled: bool,
}

impl IdleWatchdog {
    /// Create a new watchdog
    pub fn new(state: Arc<SharedState>, interval: Option<Duration>, enabled: bool) -> Self {
        Self {
            state,
            interval: interval.unwrap_or(Duration::from_secs(DEFAULT_INTERVAL_S)),
            enabled,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check once; returns how long the state has been idle if past the timeout
    pub fn check(&self) -> Option<Duration> {
        let now = Instant::now().into_std();
        if self.state.is_idle(now) {
            Some(self.state.idle_for(now))
        } else {
            None
        }
    }

    /// Tick until the state goes idle, then call `on_idle` and return.
    ///
    /// Returns `None` immediately when disabled.
    pub async fn run<F, Fut>(&self, on_idle: F) -> Option<Duration>
    where
        F: FnOnce(Duration) -> Fut,
        Fut: Future<Output = ()>,
    {
        if !self.enabled {
            info!("Idle watchdog disabled");
            return None;
        }

        info!(
            "Idle watchdog started (every {:?}, timeout {:?})",
            self.interval,
            self.state.idle_timeout()
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match self.check() {
                Some(idle_for) => {
                    info!("Idle for {:?}, exceeding {:?}", idle_for, self.state.idle_timeout());
                    on_idle(idle_for).await;
                    return Some(idle_for);
                }
                None => debug!("Watchdog: active"),
            }
        }
    }
}
