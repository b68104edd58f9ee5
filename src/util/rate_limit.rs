//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Inbound WebSocket messages per second, per connection
pub const INBOUND_RATE_LIMIT: u32 = 60;

/// Per-connection inbound limiter; messages over the quota are dropped
pub struct ConnectionRateLimiter {
    limiter: Limiter,
}

impl ConnectionRateLimiter {
    pub fn new() -> Self {
        Self::per_second(INBOUND_RATE_LIMIT)
    }

    pub fn per_second(messages: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(messages).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    /// Check if an inbound message is allowed (returns true if allowed)
    pub fn check_inbound(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_over_quota_is_dropped() {
        let limiter = ConnectionRateLimiter::per_second(3);
        let allowed = (0..10).filter(|_| limiter.check_inbound()).count();
        assert_eq!(allowed, 3);
    }
}
