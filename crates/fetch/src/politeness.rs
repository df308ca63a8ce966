use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Token bucket refilled at the effective per-host rate.
#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(burst: f64) -> Self {
        Self {
            tokens: burst,
            last_refill: Instant::now(),
        }
    }

    fn try_take(&mut self, rate: f64, burst: f64, now: Instant) -> bool {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(burst);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Per-host politeness. The configured rate is clamped by the host's
/// robots Crawl-delay: whichever implies the longer spacing wins.
pub struct HostLimiter {
    rate: f64,
    burst: f64,
    buckets: DashMap<String, Bucket>,
}

impl HostLimiter {
    pub fn new(per_host_rps: f64, per_host_burst: f64) -> Self {
        Self {
            rate: per_host_rps.max(f64::MIN_POSITIVE),
            burst: per_host_burst.max(1.0),
            buckets: DashMap::new(),
        }
    }

    fn effective_rate(&self, crawl_delay: Option<Duration>) -> f64 {
        match crawl_delay {
            Some(delay) if delay > Duration::ZERO => {
                let delay_rate = 1.0 / delay.as_secs_f64();
                self.rate.min(delay_rate)
            }
            _ => self.rate,
        }
    }

    /// Non-blocking acquire. On `false` the caller yields the URL back to
    /// the frontier instead of waiting on a slow host.
    pub fn try_acquire(&self, host: &str, crawl_delay: Option<Duration>) -> bool {
        let rate = self.effective_rate(crawl_delay);
        // Crawl-delay hosts get no burst: one request per delay window.
        let burst = if crawl_delay.is_some() && rate < self.rate {
            1.0
        } else {
            self.burst
        };
        let mut bucket = self
            .buckets
            .entry(host.to_string())
            .or_insert_with(|| Bucket::new(burst));
        bucket.try_take(rate, burst, Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_allows_initial_requests_then_throttles() {
        let limiter = HostLimiter::new(1.0, 2.0);
        assert!(limiter.try_acquire("example.com", None));
        assert!(limiter.try_acquire("example.com", None));
        // Bucket exhausted; nothing refilled in this instant.
        assert!(!limiter.try_acquire("example.com", None));
    }

    #[test]
    fn hosts_are_independent() {
        let limiter = HostLimiter::new(1.0, 1.0);
        assert!(limiter.try_acquire("a.example.com", None));
        assert!(!limiter.try_acquire("a.example.com", None));
        assert!(limiter.try_acquire("b.example.com", None));
    }

    #[test]
    fn crawl_delay_overrides_only_when_slower() {
        let limiter = HostLimiter::new(2.0, 4.0);
        // 10s delay implies 0.1 rps, slower than config: it governs.
        assert!((limiter.effective_rate(Some(Duration::from_secs(10))) - 0.1).abs() < 1e-9);
        // 100ms delay implies 10 rps, faster than config: config governs.
        assert!((limiter.effective_rate(Some(Duration::from_millis(100))) - 2.0).abs() < 1e-9);
        assert!((limiter.effective_rate(None) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn bucket_refills_over_time() {
        let mut bucket = Bucket::new(1.0);
        let start = Instant::now();
        assert!(bucket.try_take(1.0, 1.0, start));
        assert!(!bucket.try_take(1.0, 1.0, start));
        // After 1.5 simulated seconds a token is back.
        assert!(bucket.try_take(1.0, 1.0, start + Duration::from_millis(1500)));
    }
}
