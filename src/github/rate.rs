//! Shared quota accounting for the GitHub API.
//!
//! One `RateLimiter` lives inside the client and is consulted by every
//! concurrent caller. The state sits behind a narrow lock that is released
//! before any sleep.

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Quota figures reported by one API response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateInfo {
    pub remaining: u32,
    pub limit: u32,
    pub reset: DateTime<Utc>,
}

impl RateInfo {
    /// Parse the `x-ratelimit-*` response headers.
    pub fn from_headers(headers: &reqwest::header::HeaderMap) -> Option<Self> {
        let read = |name: &str| -> Option<i64> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<i64>().ok())
        };

        let remaining = read("x-ratelimit-remaining")?;
        let limit = read("x-ratelimit-limit")?;
        let reset = read("x-ratelimit-reset")?;

        Some(Self {
            remaining: remaining.max(0) as u32,
            limit: limit.max(0) as u32,
            reset: Utc.timestamp_opt(reset, 0).single()?,
        })
    }
}

/// Snapshot returned by `GithubClient::rate_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateStatus {
    pub remaining: u32,
    pub limit: u32,
    pub reset: DateTime<Utc>,
}

#[derive(Debug)]
struct RateState {
    remaining: u32,
    limit: u32,
    reset: DateTime<Utc>,
    /// Reset time of the window a low-quota warning was already emitted for.
    warned_for: Option<DateTime<Utc>>,
}

/// Default hourly quota for authenticated REST calls, used until the first
/// response reports the real figures.
const DEFAULT_LIMIT: u32 = 5000;

/// Process-wide quota governor.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<RateState>,
    low_water_mark: u32,
    safety_margin: Duration,
}

impl RateLimiter {
    pub fn new(low_water_mark: u32, safety_margin: Duration) -> Self {
        Self {
            state: Mutex::new(RateState {
                remaining: DEFAULT_LIMIT,
                limit: DEFAULT_LIMIT,
                reset: Utc::now(),
                warned_for: None,
            }),
            low_water_mark,
            safety_margin,
        }
    }

    /// Wait until the quota allows another call, then reserve it.
    ///
    /// When the quota is exhausted the calling task sleeps until the reset
    /// time plus the safety margin. Other tasks are not held up by the lock
    /// while this one sleeps; they find the same exhausted state and sleep
    /// too.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock();
                let now = Utc::now();
                if state.remaining > 0 {
                    state.remaining -= 1;
                    return;
                }
                if state.reset <= now {
                    debug!("Rate limit window rolled over; assuming quota restored");
                    state.remaining = state.limit.saturating_sub(1);
                    return;
                }
                (state.reset - now).to_std().unwrap_or_default()
            };

            let total = wait + self.safety_margin;
            warn!(
                "GitHub API quota exhausted; sleeping {:.1}s until reset",
                total.as_secs_f64()
            );
            tokio::time::sleep(total).await;

            let mut state = self.state.lock();
            if state.remaining == 0 && state.reset <= Utc::now() {
                state.remaining = state.limit;
            }
        }
    }

    /// Overwrite the accounting with figures from a response.
    pub fn update(&self, info: RateInfo) {
        let mut state = self.state.lock();
        state.remaining = info.remaining;
        state.limit = info.limit;
        state.reset = info.reset;

        if info.remaining < self.low_water_mark && state.warned_for != Some(info.reset) {
            state.warned_for = Some(info.reset);
            warn!(
                "GitHub API quota is low: {}/{} calls left, resets at {}",
                info.remaining,
                info.limit,
                info.reset.format("%H:%M:%S UTC")
            );
        }
    }

    pub fn status(&self) -> RateStatus {
        let state = self.state.lock();
        RateStatus {
            remaining: state.remaining,
            limit: state.limit,
            reset: state.reset,
        }
    }

    /// True when the last known state says no calls are left before reset.
    pub fn is_exhausted(&self) -> bool {
        let state = self.state.lock();
        state.remaining == 0 && state.reset > Utc::now()
    }
}
