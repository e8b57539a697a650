//! API rate limit tracking with empirically observed reset periods.
//!
//! At least some instances lie about the rate limit window: the
//! `X-RateLimit-Reset` header advertises a time, and when that time arrives
//! the limit does not always reset. So besides reading the headers, the
//! tracker watches for the remaining count to jump back up and keeps a
//! window of actually observed reset periods.

use chrono::DateTime;
use reqwest::header::HeaderMap;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Assumed reset period until enough resets have been observed.
pub const DEFAULT_RESET_PERIOD: f64 = 300.0;

/// Observed periods kept for the running mean.
const MAX_OBSERVED_PERIODS: usize = 10;

/// Remaining count below which every response logs a warning.
const LOW_BUDGET_THRESHOLD: u32 = 150;

pub struct RateTracker {
    /// Last known remaining call count for the current window.
    remaining: u32,
    /// When the last reset was observed.
    last_reset: Instant,
    /// Durations of observed rate limit windows, newest last.
    observed_periods: Vec<f64>,
    /// Reset time the instance last advertised, for logging only.
    advertised_reset: Option<DateTime<chrono::FixedOffset>>,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::with_seed(0.0)
    }

    /// Create a tracker seeded with a previously observed reset period,
    /// as persisted across restarts. A non-positive seed starts cold.
    pub fn with_seed(period_secs: f64) -> Self {
        let observed_periods = if period_secs > 0.0 {
            vec![period_secs; 3]
        } else {
            Vec::new()
        };
        Self {
            remaining: 300,
            last_reset: Instant::now(),
            observed_periods,
            advertised_reset: None,
        }
    }

    /// Last known remaining call count for the current window.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Mean observed reset period, or the default when fewer than three
    /// resets have been seen.
    pub fn observed_reset_period(&self) -> f64 {
        if self.observed_periods.len() > 2 {
            self.observed_periods.iter().sum::<f64>() / self.observed_periods.len() as f64
        } else {
            DEFAULT_RESET_PERIOD
        }
    }

    /// Estimated seconds until the next rate limit reset, based on
    /// observation rather than the advertised header.
    pub fn estimated_secs_to_reset(&self) -> u64 {
        let elapsed = self.last_reset.elapsed().as_secs_f64();
        (self.observed_reset_period() - elapsed).max(0.0) as u64
    }

    /// Update the tracker from one response's headers.
    pub fn observe(&mut self, headers: &HeaderMap) {
        let limit = header_str(headers, "X-RateLimit-Limit");
        let remaining = header_str(headers, "X-RateLimit-Remaining")
            .and_then(|s| s.parse::<u32>().ok());
        let reset_header = header_str(headers, "X-RateLimit-Reset");

        if let Some(reset) = reset_header {
            match DateTime::parse_from_rfc3339(reset) {
                Ok(dt) => self.advertised_reset = Some(dt),
                Err(e) => {
                    error!("error reading advertised reset time '{}': {}", reset, e);
                    self.advertised_reset = None;
                }
            }
        }

        // A zero remaining count (a 429) must not clobber the stored value,
        // or the next successful response would be mistaken for a reset.
        let Some(remain) = remaining.filter(|&r| r > 0) else {
            return;
        };

        if remain > self.remaining {
            // The count went back up: a reset happened since the last response.
            self.observed_periods.push(self.last_reset.elapsed().as_secs_f64());
            if self.observed_periods.len() > MAX_OBSERVED_PERIODS {
                self.observed_periods.remove(0);
            }
            // The first sample straddles process start and is unreliable.
            if self.observed_periods.len() == 2 {
                self.observed_periods[0] = self.observed_periods[1];
            }
            self.last_reset = Instant::now();
        }
        self.remaining = remain;

        let advertised = self
            .advertised_reset
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default();
        if remain < LOW_BUDGET_THRESHOLD {
            warn!(
                "rate limit is {}; remaining {}; advertised reset at {}",
                limit.unwrap_or("?"),
                remain,
                advertised
            );
        } else {
            debug!(
                "rate limit is {}; remaining {}; advertised reset at {} (est actual in {} sec)",
                limit.unwrap_or("?"),
                remain,
                advertised,
                self.estimated_secs_to_reset()
            );
        }
    }
}

impl Default for RateTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
