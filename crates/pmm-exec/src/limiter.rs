//! Token-bucket rate limiting for exchange operations.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

/// How long the refill rate stays halved after an exchange-side rate-limit
/// refusal.
const PENALTY_DURATION: Duration = Duration::from_secs(10);

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    penalty_until: Option<Instant>,
}

/// Token bucket: capacity equals the per-second budget, refilled
/// continuously. Waiters hold no token while suspended.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Budget in operations per second. Zero disables limiting.
    pub fn new(ops_per_sec: u32) -> Self {
        let rate = f64::from(ops_per_sec);
        Self {
            rate,
            capacity: rate,
            state: Mutex::new(BucketState {
                tokens: rate,
                last_refill: Instant::now(),
                penalty_until: None,
            }),
        }
    }

    /// Suspend cooperatively until a token is available, then consume it.
    pub async fn acquire(&self) {
        if self.rate == 0.0 {
            return;
        }
        loop {
            let wait = {
                let mut state = self.state.lock();
                let now = Instant::now();
                let rate = self.effective_rate(&mut state, now);
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * rate).min(self.capacity);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / rate)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Halve the refill rate for the penalty window after the exchange
    /// reported a rate-limit refusal.
    pub fn penalize(&self) {
        if self.rate == 0.0 {
            return;
        }
        let mut state = self.state.lock();
        state.penalty_until = Some(Instant::now() + PENALTY_DURATION);
        warn!(
            rate = self.rate / 2.0,
            secs = PENALTY_DURATION.as_secs(),
            "exchange rate limit hit, halving token refill"
        );
    }

    /// Tokens currently available (for tests and gauges).
    pub fn available(&self) -> f64 {
        if self.rate == 0.0 {
            return f64::INFINITY;
        }
        let mut state = self.state.lock();
        let now = Instant::now();
        let rate = self.effective_rate(&mut state, now);
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * rate).min(self.capacity);
        state.last_refill = now;
        state.tokens
    }

    fn effective_rate(&self, state: &mut BucketState, now: Instant) -> f64 {
        match state.penalty_until {
            Some(until) if now < until => self.rate / 2.0,
            Some(_) => {
                state.penalty_until = None;
                self.rate
            }
            None => self.rate,
        }
    }
}
