//! Per-principal, plan-aware rate limiting
//!
//! Fixed-window counters keyed by principal identity and plan. The key never
//! includes the connection or transport, so one caller shares one quota
//! whether it arrives over stdio, HTTP, WebSocket or SSE.

use crate::config::{PlanLimit, RateLimitConfig};
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Bucket count above which expired buckets are swept on insert
const PRUNE_THRESHOLD: usize = 10_000;

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    RateLimited { retry_after_ms: u64 },
}

/// Request counter for one `(principal, plan)` pair
#[derive(Debug, Clone)]
struct RateLimitBucket {
    window_start: Instant,
    count: u32,
    limit: u32,
    window: Duration,
}

impl RateLimitBucket {
    fn new(limit: PlanLimit, now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
            limit: limit.max_requests,
            window: Duration::from_millis(limit.window_ms),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.window_start) >= self.window
    }

    fn reset_if_needed(&mut self, now: Instant) {
        if self.is_expired(now) {
            self.count = 0;
            self.window_start = now;
        }
    }

    fn try_consume(&mut self, now: Instant) -> RateLimitDecision {
        self.reset_if_needed(now);

        if self.count < self.limit {
            self.count += 1;
            return RateLimitDecision::Allowed;
        }

        let remaining = self.window.saturating_sub(now.duration_since(self.window_start));
        RateLimitDecision::RateLimited {
            retry_after_ms: (remaining.as_millis() as u64).max(1),
        }
    }
}

/// Rate limiter shared by all transports
#[derive(Debug)]
pub struct PlanRateLimiter {
    plans: HashMap<String, PlanLimit>,
    default_limit: PlanLimit,
    buckets: DashMap<(String, String), RateLimitBucket>,
}

impl PlanRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        // Validation guarantees the default plan exists; keep a sane floor anyway
        let default_limit = config
            .plans
            .get(&config.default_plan)
            .copied()
            .unwrap_or(PlanLimit {
                max_requests: 60,
                window_ms: 60_000,
            });

        Self {
            plans: config.plans.clone(),
            default_limit,
            buckets: DashMap::new(),
        }
    }

    /// Limit applied to a plan; unknown plans fall back to the default plan
    pub fn limit_for(&self, plan: &str) -> PlanLimit {
        self.plans.get(plan).copied().unwrap_or(self.default_limit)
    }

    /// Count one request against the principal's quota
    pub fn check(&self, principal_key: &str, plan: &str) -> RateLimitDecision {
        self.check_at(principal_key, plan, Instant::now())
    }

    pub(crate) fn check_at(&self, principal_key: &str, plan: &str, now: Instant) -> RateLimitDecision {
        if self.buckets.len() > PRUNE_THRESHOLD {
            self.prune_expired(now);
        }

        let limit = self.limit_for(plan);
        let decision = self
            .buckets
            .entry((principal_key.to_string(), plan.to_string()))
            .or_insert_with(|| RateLimitBucket::new(limit, now))
            .try_consume(now);

        if let RateLimitDecision::RateLimited { retry_after_ms } = decision {
            debug!(
                principal = %principal_key,
                plan = %plan,
                retry_after_ms,
                "Request blocked by plan rate limit"
            );
        }
        decision
    }

    /// Drop buckets whose window has already elapsed
    pub fn prune_expired(&self, now: Instant) {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.is_expired(now));
        debug!("Pruned {} expired rate limit buckets", before - self.buckets.len());
    }

    /// Number of live buckets
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
