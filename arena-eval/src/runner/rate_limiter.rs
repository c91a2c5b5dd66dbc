//! Sliding-window rate limiter for model endpoints

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);

/// Request and token ceilings over a one-minute sliding window
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_minute: u32,
    tokens_per_minute: u32,
    last_requests: Mutex<VecDeque<Instant>>,
    token_usage: Mutex<VecDeque<(Instant, u32)>>,
}

impl RateLimiter {
    /// Create a new rate limiter; a zero limit is treated as one
    pub fn new(requests_per_minute: u32, tokens_per_minute: u32) -> Self {
        Self {
            requests_per_minute: requests_per_minute.max(1),
            tokens_per_minute: tokens_per_minute.max(1),
            last_requests: Mutex::new(VecDeque::new()),
            token_usage: Mutex::new(VecDeque::new()),
        }
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    /// Wait until a request fits in the window, then record it
    pub async fn acquire(&self) -> RateLimitGuard {
        loop {
            if let Some(wait) = self.check_request_limit().await {
                tracing::debug!("Rate limit reached, waiting {:?}", wait);
                tokio::time::sleep(wait).await;
                continue;
            }

            self.last_requests.lock().await.push_back(Instant::now());
            return RateLimitGuard { acquired_at: Instant::now() };
        }
    }

    /// Check if we can make a request, returns wait time if we need to wait
    async fn check_request_limit(&self) -> Option<Duration> {
        let mut last = self.last_requests.lock().await;
        let now = Instant::now();

        while let Some(&front) = last.front() {
            if now.duration_since(front) >= WINDOW {
                last.pop_front();
            } else {
                break;
            }
        }

        if last.len() >= self.requests_per_minute as usize {
            if let Some(&oldest) = last.front() {
                let elapsed = now.duration_since(oldest);
                return Some(WINDOW.saturating_sub(elapsed) + Duration::from_millis(10));
            }
        }

        None
    }

    /// Record token usage for rate limiting
    pub async fn record_tokens(&self, tokens: u32) {
        let mut usage = self.token_usage.lock().await;
        let now = Instant::now();
        prune(&mut usage, now);
        usage.push_back((now, tokens));
    }

    /// Tokens used in the last minute
    pub async fn current_token_usage(&self) -> u32 {
        let mut usage = self.token_usage.lock().await;
        prune(&mut usage, Instant::now());
        usage.iter().map(|(_, t)| t).sum()
    }

    pub async fn has_token_capacity(&self, needed: u32) -> bool {
        let current = self.current_token_usage().await;
        // a single oversized request may always run against an empty window
        current == 0 || current.saturating_add(needed) <= self.tokens_per_minute
    }

    /// Wait for token capacity
    pub async fn wait_for_token_capacity(&self, needed: u32) {
        while !self.has_token_capacity(needed).await {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

fn prune(usage: &mut VecDeque<(Instant, u32)>, now: Instant) {
    while let Some(&(time, _)) = usage.front() {
        if now.duration_since(time) >= WINDOW {
            usage.pop_front();
        } else {
            break;
        }
    }
}

/// Proof that a request slot was granted
#[derive(Debug)]
pub struct RateLimitGuard {
    acquired_at: Instant,
}

impl RateLimitGuard {
    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }
}
