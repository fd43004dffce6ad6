//! Per-tier circuit breaker for the completion upstream

use super::client::ModelTier;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,   // Normal operation
    Open,     // Failing, reject requests
    HalfOpen, // Probing whether the tier recovered
}

#[derive(Debug, Clone)]
struct TierHealth {
    state: BreakerState,
    consecutive_failures: usize,
    opened_at: Option<Instant>,
}

impl Default for TierHealth {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Tracks consecutive failures per model tier
pub struct CircuitBreaker {
    tiers: DashMap<ModelTier, TierHealth>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            tiers: DashMap::new(),
            config,
        }
    }

    /// Whether calls to `tier` should be rejected right now.
    /// An open breaker moves to half-open once the reset timeout has elapsed.
    pub fn is_open(&self, tier: ModelTier) -> bool {
        let mut health = self.tiers.entry(tier).or_default();
        match health.state {
            BreakerState::Closed | BreakerState::HalfOpen => false,
            BreakerState::Open => {
                let cooled_down = health
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if cooled_down {
                    health.state = BreakerState::HalfOpen;
                }
                !cooled_down
            }
        }
    }

    pub fn mark_success(&self, tier: ModelTier) {
        self.tiers.insert(tier, TierHealth::default());
    }

    pub fn mark_failure(&self, tier: ModelTier) {
        let mut health = self.tiers.entry(tier).or_default();
        health.consecutive_failures += 1;
        // A failed trial call reopens immediately
        if health.state == BreakerState::HalfOpen
            || health.consecutive_failures >= self.config.failure_threshold
        {
            health.state = BreakerState::Open;
            health.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self, tier: ModelTier) -> BreakerState {
        self.tiers
            .get(&tier)
            .map(|h| h.state)
            .unwrap_or(BreakerState::Closed)
    }

    pub fn failure_count(&self, tier: ModelTier) -> usize {
        self.tiers
            .get(&tier)
            .map(|h| h.consecutive_failures)
            .unwrap_or(0)
    }
}
