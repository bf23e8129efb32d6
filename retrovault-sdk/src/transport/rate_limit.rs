//! Sliding-window rate limiting for public endpoints.
//!
//! The limiter is process-wide but explicit: one instance is shared by every
//! pipeline of a client and passed into each transport call. It enforces at
//! most `capacity` requests inside any rolling `window`, and additionally
//! holds all requests back until `retry_after_until` whenever an endpoint
//! told us to go away.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window parameters. The defaults match the documented limits of
/// the public endpoints: 40 requests per 10 seconds.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    /// Requests allowed inside one window.
    pub capacity: usize,
    /// Window width.
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 40,
            window: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    sent: VecDeque<Instant>,
    retry_after_until: Option<Instant>,
}

/// Shared sliding-window limiter with Retry-After bookkeeping.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Mutex<State>,
}

impl RateLimiter {
    /// A limiter with the given window parameters.
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
        }
    }

    /// Block until a request may be sent, then account for it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();

                if let Some(until) = state.retry_after_until {
                    if until > now {
                        until - now
                    } else {
                        state.retry_after_until = None;
                        continue;
                    }
                } else {
                    while state
                        .sent
                        .front()
                        .is_some_and(|front| now.duration_since(*front) >= self.config.window)
                    {
                        state.sent.pop_front();
                    }
                    if state.sent.len() < self.config.capacity {
                        state.sent.push_back(now);
                        return;
                    }
                    let oldest = *state.sent.front().expect("non-empty at capacity");
                    oldest + self.config.window - now
                }
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Record a Retry-After signal; requests block until it elapses.
    pub async fn push_back(&self, retry_after: Duration) {
        let mut state = self.state.lock().await;
        let until = Instant::now() + retry_after;
        state.retry_after_until = Some(match state.retry_after_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
    }
}

/// Extract a Retry-After interval from a rate-limited response.
///
/// Checked in order: the `Retry-After` header, a JSON body carrying
/// `retryAfter` or `retry_after_seconds` (possibly nested under `error.data`),
/// then loose error text of the form `retry after N seconds`. Callers fall
/// back to 1 second when nothing parses.
#[must_use]
pub fn parse_retry_after(headers: Option<&reqwest::header::HeaderMap>, body: &str) -> Option<Duration> {
    if let Some(headers) = headers {
        if let Some(value) = headers
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            return Some(Duration::from_secs(value));
        }
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(seconds) = retry_after_in_json(&json) {
            return Some(Duration::from_secs(seconds));
        }
    }

    retry_after_in_text(body).map(Duration::from_secs)
}

fn retry_after_in_json(value: &serde_json::Value) -> Option<u64> {
    for key in ["retryAfter", "retry_after_seconds"] {
        if let Some(seconds) = value.get(key).and_then(serde_json::Value::as_u64) {
            return Some(seconds);
        }
    }
    value
        .get("error")
        .and_then(|e| e.get("data"))
        .and_then(retry_after_in_json_inner)
}

fn retry_after_in_json_inner(value: &serde_json::Value) -> Option<u64> {
    for key in ["retryAfter", "retry_after_seconds"] {
        if let Some(seconds) = value.get(key).and_then(serde_json::Value::as_u64) {
            return Some(seconds);
        }
    }
    None
}

fn retry_after_in_text(text: &str) -> Option<u64> {
    let lower = text.to_ascii_lowercase();
    let rest = &lower[lower.find("retry after")? + "retry after".len()..];
    rest.split_whitespace()
        .next()
        .and_then(|token| token.trim_matches(|c: char| !c.is_ascii_digit()).parse().ok())
}
