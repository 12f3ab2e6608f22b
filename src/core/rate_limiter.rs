use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::core::config;

/// Sliding-window rate limiter keyed by user id.
///
/// Each identity keeps the instants of its admitted requests. A request is
/// admitted when fewer than `max_requests` of those fall inside the window;
/// denied requests are not recorded and are not queued.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<State>>,
    sweep_interval: Duration,
    retention: Duration,
}

struct State {
    windows: HashMap<u64, VecDeque<Instant>>,
    last_sweep: Instant,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Creates a limiter sweeping every 5 minutes and keeping one hour of history.
    pub fn new() -> Self {
        Self::with_sweep(config::rate_limit::sweep_interval(), config::rate_limit::retention())
    }

    /// Creates a limiter with a custom sweep schedule.
    pub fn with_sweep(sweep_interval: Duration, retention: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(State {
                windows: HashMap::new(),
                last_sweep: Instant::now(),
            })),
            sweep_interval,
            retention,
        }
    }

    /// Checks and records a request for `identity`.
    ///
    /// Returns `true` if the request is admitted.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use cinevault::core::rate_limiter::RateLimiter;
    /// use std::time::Duration;
    ///
    /// # async fn example() {
    /// let limiter = RateLimiter::new();
    /// if !limiter.allow(123456789, 10, Duration::from_secs(60)).await {
    ///     println!("Too many requests");
    /// }
    /// # }
    /// ```
    pub async fn allow(&self, identity: u64, max_requests: usize, window: Duration) -> bool {
        let now = Instant::now();
        let mut state = self.inner.lock().await;

        if now.duration_since(state.last_sweep) >= self.sweep_interval {
            sweep(&mut state.windows, now, self.retention);
            state.last_sweep = now;
        }

        let timestamps = state.windows.entry(identity).or_default();
        while let Some(&oldest) = timestamps.front() {
            if now.duration_since(oldest) >= window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() < max_requests {
            timestamps.push_back(now);
            true
        } else {
            log::debug!("Rate limit hit for {} ({} in {:?})", identity, timestamps.len(), window);
            false
        }
    }

    /// Time until `identity` gets a free slot, if it is currently limited.
    pub async fn remaining(&self, identity: u64, max_requests: usize, window: Duration) -> Option<Duration> {
        let state = self.inner.lock().await;
        let timestamps = state.windows.get(&identity)?;
        let now = Instant::now();
        let live: Vec<&Instant> = timestamps.iter().filter(|t| now.duration_since(**t) < window).collect();
        if live.len() < max_requests {
            return None;
        }
        live.first().map(|oldest| window.saturating_sub(now.duration_since(**oldest)))
    }

    /// Drops all history for `identity`.
    pub async fn reset(&self, identity: u64) {
        self.inner.lock().await.windows.remove(&identity);
    }

    /// Number of identities currently tracked.
    pub async fn tracked(&self) -> usize {
        self.inner.lock().await.windows.len()
    }
}

fn sweep(windows: &mut HashMap<u64, VecDeque<Instant>>, now: Instant, retention: Duration) {
    let before = windows.len();
    windows.retain(|_, timestamps| {
        timestamps.retain(|t| now.duration_since(*t) < retention);
        !timestamps.is_empty()
    });
    let dropped = before - windows.len();
    if dropped > 0 {
        log::debug!("Rate limiter sweep dropped {} idle identities", dropped);
    }
}
