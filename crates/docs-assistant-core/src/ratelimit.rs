//! Per-identifier request quotas, tiered by operation cost.
//!
//! Two in-memory limiters implement [`RateLimiter`]:
//! - [`SlidingWindowLimiter`] keeps a log of admitted request times per
//!   identifier and admits a request while fewer than `max` fall inside the
//!   trailing window.
//! - [`FixedWindowLimiter`] counts requests per identifier in fixed windows
//!   that start at the first request.
//!
//! Rejected requests are not recorded and do not extend the wait.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;

/// Identifier used when a request carries no client address.
pub const ANONYMOUS: &str = "anonymous";

/// The outcome of one quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the oldest counted request leaves the window.
    pub reset_after: Duration,
}

/// A quota store keyed by caller identifier.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one request for `identifier` if the quota allows it.
    async fn limit(&self, identifier: &str) -> RateLimitDecision;

    /// Give back the most recent request counted for `identifier`.
    async fn release(&self, identifier: &str);
}

/// A quota of `max` requests per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Quota {
    pub max: u32,
    #[serde(rename = "window_secs", with = "duration_secs")]
    pub window: Duration,
}

impl Quota {
    pub const fn per_minute(max: u32) -> Self {
        Self {
            max,
            window: Duration::from_secs(60),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Per-identifier state. Identifiers whose window has lapsed are swept out
/// at most once per window, so the map only holds recently active callers.
struct Ledger<T> {
    entries: HashMap<String, T>,
    swept_at: Option<Instant>,
}

impl<T> Ledger<T> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            swept_at: None,
        }
    }

    fn sweep(&mut self, now: Instant, window: Duration, live: impl Fn(&T) -> bool) {
        if self
            .swept_at
            .is_some_and(|t| now.saturating_duration_since(t) < window)
        {
            return;
        }
        self.entries.retain(|_, state| live(state));
        self.swept_at = Some(now);
    }
}

pub struct SlidingWindowLimiter {
    quota: Quota,
    hits: Mutex<Ledger<VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(quota: Quota) -> Self {
        Self {
            quota,
            hits: Mutex::new(Ledger::new()),
        }
    }

    /// Number of identifiers currently tracked.
    pub fn tracked(&self) -> usize {
        self.hits.lock().unwrap_or_else(|e| e.into_inner()).entries.len()
    }

    pub fn check_at(&self, identifier: &str, now: Instant) -> RateLimitDecision {
        let window = self.quota.window;
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        hits.sweep(now, window, |log| {
            log.back()
                .is_some_and(|t| now.saturating_duration_since(*t) < window)
        });

        let log = hits.entries.entry(identifier.to_string()).or_default();
        while log
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= window)
        {
            log.pop_front();
        }

        let allowed = (log.len() as u32) < self.quota.max;
        if allowed {
            log.push_back(now);
        }
        let reset_after = log
            .front()
            .map(|t| window.saturating_sub(now.saturating_duration_since(*t)))
            .unwrap_or(Duration::ZERO);

        RateLimitDecision {
            allowed,
            limit: self.quota.max,
            remaining: self.quota.max.saturating_sub(log.len() as u32),
            reset_after,
        }
    }

    fn release_one(&self, identifier: &str) {
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(log) = hits.entries.get_mut(identifier) {
            log.pop_back();
            if log.is_empty() {
                hits.entries.remove(identifier);
            }
        }
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn limit(&self, identifier: &str) -> RateLimitDecision {
        self.check_at(identifier, Instant::now())
    }

    async fn release(&self, identifier: &str) {
        self.release_one(identifier)
    }
}

pub struct FixedWindowLimiter {
    quota: Quota,
    windows: Mutex<Ledger<(Instant, u32)>>,
}

impl FixedWindowLimiter {
    pub fn new(quota: Quota) -> Self {
        Self {
            quota,
            windows: Mutex::new(Ledger::new()),
        }
    }

    /// Number of identifiers currently tracked.
    pub fn tracked(&self) -> usize {
        self.windows.lock().unwrap_or_else(|e| e.into_inner()).entries.len()
    }

    pub fn check_at(&self, identifier: &str, now: Instant) -> RateLimitDecision {
        let window = self.quota.window;
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        windows.sweep(now, window, |(start, _)| {
            now.saturating_duration_since(*start) < window
        });

        let (start, count) = windows
            .entries
            .entry(identifier.to_string())
            .or_insert((now, 0));
        if now.saturating_duration_since(*start) >= window {
            *start = now;
            *count = 0;
        }

        let allowed = *count < self.quota.max;
        if allowed {
            *count += 1;
        }

        RateLimitDecision {
            allowed,
            limit: self.quota.max,
            remaining: self.quota.max.saturating_sub(*count),
            reset_after: window.saturating_sub(now.saturating_duration_since(*start)),
        }
    }

    fn release_one(&self, identifier: &str) {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((_, count)) = windows.entries.get_mut(identifier) {
            *count = count.saturating_sub(1);
        }
    }
}

#[async_trait]
impl RateLimiter for FixedWindowLimiter {
    async fn limit(&self, identifier: &str) -> RateLimitDecision {
        self.check_at(identifier, Instant::now())
    }

    async fn release(&self, identifier: &str) {
        self.release_one(identifier)
    }
}

/// Operation cost tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Standard search traffic.
    Api,
    /// Answer generation.
    Expensive,
    /// Cheap, mostly cached lookups such as autocomplete.
    Cached,
}

/// Quotas for every tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TierQuotas {
    pub api: Quota,
    pub expensive: Quota,
    pub cached: Quota,
    /// Applied across all callers together, in fixed windows.
    pub global: Quota,
}

impl Default for TierQuotas {
    fn default() -> Self {
        Self {
            api: Quota::per_minute(30),
            expensive: Quota::per_minute(10),
            cached: Quota::per_minute(60),
            global: Quota::per_minute(1000),
        }
    }
}

/// The set of named limiters a request is checked against.
#[derive(Clone)]
pub struct RateLimitTiers {
    pub api: Arc<dyn RateLimiter>,
    pub expensive: Arc<dyn RateLimiter>,
    pub cached: Arc<dyn RateLimiter>,
    pub global: Arc<dyn RateLimiter>,
}

/// Identifier under which the global tier counts every request.
const GLOBAL_IDENTIFIER: &str = "global";

impl RateLimitTiers {
    pub fn in_memory(quotas: &TierQuotas) -> Self {
        Self {
            api: Arc::new(SlidingWindowLimiter::new(quotas.api)),
            expensive: Arc::new(SlidingWindowLimiter::new(quotas.expensive)),
            cached: Arc::new(SlidingWindowLimiter::new(quotas.cached)),
            global: Arc::new(FixedWindowLimiter::new(quotas.global)),
        }
    }

    fn limiter(&self, tier: Tier) -> &Arc<dyn RateLimiter> {
        match tier {
            Tier::Api => &self.api,
            Tier::Expensive => &self.expensive,
            Tier::Cached => &self.cached,
        }
    }

    /// Check the tier quota for `identifier`, then the global quota.
    ///
    /// A rejected request counts against neither: a tier rejection never
    /// reaches the global quota, and a global rejection gives the tier slot
    /// back.
    pub async fn check(&self, tier: Tier, identifier: &str) -> RateLimitDecision {
        let limiter = self.limiter(tier);
        let decision = limiter.limit(identifier).await;
        if !decision.allowed {
            return decision;
        }
        let global = self.global.limit(GLOBAL_IDENTIFIER).await;
        if global.allowed {
            decision
        } else {
            limiter.release(identifier).await;
            global
        }
    }
}

/// Pick the caller identifier from proxy headers.
///
/// The first `x-forwarded-for` entry wins, then `x-real-ip`, then
/// [`ANONYMOUS`]. Blank values count as absent.
pub fn client_identifier(forwarded_for: Option<&str>, real_ip: Option<&str>) -> String {
    forwarded_for
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| real_ip.map(str::trim).filter(|v| !v.is_empty()))
        .unwrap_or(ANONYMOUS)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn test_sliding_window_admits_up_to_max() {
        let limiter = SlidingWindowLimiter::new(Quota::per_minute(3));
        let t0 = Instant::now();
        for expected_remaining in [2, 1, 0] {
            let d = limiter.check_at("1.2.3.4", t0);
            assert!(d.allowed);
            assert_eq!(d.remaining, expected_remaining);
        }
        let d = limiter.check_at("1.2.3.4", t0 + Duration::from_secs(1));
        assert!(!d.allowed);
        assert_eq!(d.limit, 3);
        assert_eq!(d.reset_after, Duration::from_secs(59));
    }

    #[test]
    fn test_sliding_window_slides() {
        let limiter = SlidingWindowLimiter::new(Quota::per_minute(2));
        let t0 = Instant::now();
        assert!(limiter.check_at("a", t0).allowed);
        assert!(limiter.check_at("a", t0 + Duration::from_secs(30)).allowed);
        assert!(!limiter.check_at("a", t0 + Duration::from_secs(59)).allowed);
        // First request has left the window; second has not.
        assert!(limiter.check_at("a", t0 + Duration::from_secs(60)).allowed);
        assert!(!limiter.check_at("a", t0 + Duration::from_secs(61)).allowed);
    }

    #[test]
    fn test_identifiers_are_independent() {
        let limiter = SlidingWindowLimiter::new(Quota::per_minute(1));
        let t0 = Instant::now();
        assert!(limiter.check_at("a", t0).allowed);
        assert!(!limiter.check_at("a", t0).allowed);
        assert!(limiter.check_at("b", t0).allowed);
    }

    #[test]
    fn test_fixed_window_resets() {
        let limiter = FixedWindowLimiter::new(Quota::per_minute(2));
        let t0 = Instant::now();
        assert!(limiter.check_at("g", t0).allowed);
        assert!(limiter.check_at("g", t0 + Duration::from_secs(10)).allowed);
        let d = limiter.check_at("g", t0 + Duration::from_secs(20));
        assert!(!d.allowed);
        assert_eq!(d.reset_after, Duration::from_secs(40));
        assert!(limiter.check_at("g", t0 + Duration::from_secs(60)).allowed);
    }

    #[test]
    fn test_tiers_apply_global_after_tier() {
        let quotas = TierQuotas {
            api: Quota::per_minute(5),
            expensive: Quota::per_minute(1),
            cached: Quota::per_minute(5),
            global: Quota::per_minute(2),
        };
        let tiers = RateLimitTiers::in_memory(&quotas);
        block_on(async {
            assert!(tiers.check(Tier::Expensive, "a").await.allowed);
            // Rejected by tier: global untouched.
            assert!(!tiers.check(Tier::Expensive, "a").await.allowed);
            assert!(tiers.check(Tier::Api, "b").await.allowed);
            // Global quota of 2 is spent.
            assert!(!tiers.check(Tier::Api, "c").await.allowed);
        });
    }

    #[test]
    fn test_global_rejection_returns_tier_slot() {
        let quotas = TierQuotas {
            api: Quota::per_minute(5),
            expensive: Quota::per_minute(1),
            cached: Quota::per_minute(5),
            global: Quota::per_minute(1),
        };
        let tiers = RateLimitTiers::in_memory(&quotas);
        block_on(async {
            assert!(tiers.check(Tier::Api, "b").await.allowed);
            let rejected = tiers.check(Tier::Expensive, "a").await;
            assert!(!rejected.allowed);
            assert_eq!(rejected.limit, 1);
            // The expensive slot for "a" is still free.
            assert!(tiers.expensive.limit("a").await.allowed);
        });
    }

    #[test]
    fn test_expired_identifiers_are_dropped() {
        let limiter = SlidingWindowLimiter::new(Quota::per_minute(5));
        let t0 = Instant::now();
        for i in 0..10_000 {
            assert!(limiter.check_at(&format!("10.0.{}.{}", i / 256, i % 256), t0).allowed);
        }
        assert_eq!(limiter.tracked(), 10_000);

        limiter.check_at("192.0.2.1", t0 + Duration::from_secs(3600));
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn test_fixed_window_drops_lapsed_identifiers() {
        let limiter = FixedWindowLimiter::new(Quota::per_minute(5));
        let t0 = Instant::now();
        for i in 0..100 {
            limiter.check_at(&format!("c{}", i), t0);
        }
        limiter.check_at("late", t0 + Duration::from_secs(61));
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn test_active_identifiers_survive_sweep() {
        let limiter = SlidingWindowLimiter::new(Quota::per_minute(2));
        let t0 = Instant::now();
        assert!(limiter.check_at("stale", t0).allowed);
        assert!(limiter.check_at("busy", t0 + Duration::from_secs(50)).allowed);
        assert!(limiter.check_at("busy", t0 + Duration::from_secs(55)).allowed);
        // Sweep at t0+70 drops "stale" but keeps "busy", whose quota is spent.
        assert!(!limiter.check_at("busy", t0 + Duration::from_secs(70)).allowed);
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn test_release_returns_slot() {
        let limiter = SlidingWindowLimiter::new(Quota::per_minute(1));
        let t0 = Instant::now();
        assert!(limiter.check_at("a", t0).allowed);
        limiter.release_one("a");
        assert_eq!(limiter.tracked(), 0);
        assert!(limiter.check_at("a", t0).allowed);
    }

    #[test]
    fn test_client_identifier_precedence() {
        assert_eq!(
            client_identifier(Some("192.168.1.1, 10.0.0.1"), Some("192.168.1.2")),
            "192.168.1.1"
        );
        assert_eq!(client_identifier(None, Some("192.168.1.2")), "192.168.1.2");
        assert_eq!(client_identifier(Some("  "), Some("10.0.0.9")), "10.0.0.9");
        assert_eq!(client_identifier(None, None), ANONYMOUS);
    }

    #[test]
    fn test_default_quotas() {
        let q = TierQuotas::default();
        assert_eq!(q.api.max, 30);
        assert_eq!(q.expensive.max, 10);
        assert_eq!(q.cached.max, 60);
        assert_eq!(q.global.max, 1000);
        assert_eq!(q.api.window, Duration::from_secs(60));
    }
}
