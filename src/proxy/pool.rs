//! Thread-safe endpoint pool
//!
//! Selection, outcome recording, capacity eviction and sticky-domain binding
//! all run under one mutex, so every operation sees a consistent pool.

use std::cmp::Ordering;
use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::PoolConfig;
use crate::error::{Result, StealthError};
use crate::models::{Endpoint, FailureKind};

/// What `EndpointPool::add` did with a candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    /// Inserted after evicting the endpoint with this id
    Replaced { evicted: String },
    /// An endpoint with the same id is already pooled
    Duplicate,
    /// Pool is full and every pooled endpoint outscores the candidate
    Rejected,
}

impl AddOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, AddOutcome::Inserted | AddOutcome::Replaced { .. })
    }
}

#[derive(Debug, Default)]
struct PoolState {
    endpoints: HashMap<String, Endpoint>,
    /// domain -> endpoint id
    sticky: HashMap<String, String>,
}

impl PoolState {
    fn remove(&mut self, id: &str) -> Option<Endpoint> {
        let removed = self.endpoints.remove(id)?;
        self.sticky.retain(|_, bound| bound != id);
        Some(removed)
    }

    /// Lowest score first, oldest first among equals
    fn eviction_candidate(&self) -> Option<&Endpoint> {
        self.endpoints.values().min_by(|a, b| {
            a.score()
                .partial_cmp(&b.score())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.created_at().cmp(&b.created_at()))
        })
    }

    fn purge_unhealthy(&mut self, threshold: f64, min_observations: u64) -> usize {
        let doomed: Vec<String> = self
            .endpoints
            .values()
            .filter(|ep| ep.score() < threshold && ep.observations() >= min_observations)
            .map(|ep| ep.id.clone())
            .collect();

        for id in &doomed {
            self.remove(id);
        }
        doomed.len()
    }

    /// Highest score first, least recently used among equals
    fn best_available(&mut self, now: Instant, min_score: f64) -> Option<&mut Endpoint> {
        self.endpoints
            .values_mut()
            .filter(|ep| ep.is_available(now, min_score))
            .min_by(|a, b| {
                b.score()
                    .partial_cmp(&a.score())
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.last_used().cmp(&b.last_used()))
                    .then_with(|| a.id.cmp(&b.id))
            })
    }
}

/// Registry of egress endpoints shared by any number of sessions
pub struct EndpointPool {
    config: PoolConfig,
    state: Mutex<PoolState>,
}

impl EndpointPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn max_size(&self) -> usize {
        self.config.max_size
    }

    pub fn min_score(&self) -> f64 {
        self.config.min_score
    }

    /// Add an endpoint, evicting the weakest one if the pool is full
    ///
    /// The eviction victim is the lowest-scoring endpoint overall, including
    /// endpoints in cooldown, not just the lowest-scoring available one. The
    /// newcomer is rejected when it scores below that victim.
    pub fn add(&self, endpoint: Endpoint) -> AddOutcome {
        let mut state = self.state.lock();

        if state.endpoints.contains_key(&endpoint.id) {
            return AddOutcome::Duplicate;
        }

        let mut outcome = AddOutcome::Inserted;
        if state.endpoints.len() >= self.config.max_size {
            let victim = match state.eviction_candidate() {
                Some(victim) if victim.score() <= endpoint.score() => victim.id.clone(),
                _ => {
                    debug!(endpoint = %endpoint.id, "Pool full, rejecting endpoint");
                    return AddOutcome::Rejected;
                }
            };
            state.remove(&victim);
            debug!(evicted = %victim, endpoint = %endpoint.id, "Evicted endpoint to make room");
            outcome = AddOutcome::Replaced { evicted: victim };
        }

        state.endpoints.insert(endpoint.id.clone(), endpoint);
        outcome
    }

    /// Add many endpoints, returning how many were inserted
    pub fn add_many<I>(&self, endpoints: I) -> usize
    where
        I: IntoIterator<Item = Endpoint>,
    {
        endpoints
            .into_iter()
            .map(|ep| self.add(ep))
            .filter(AddOutcome::is_inserted)
            .count()
    }

    /// Pick the endpoint that should serve `domain`
    ///
    /// A sticky binding is honoured while its endpoint stays available;
    /// otherwise the healthiest available endpoint wins, least recently used
    /// first among equal scores.
    pub fn select_for_domain(&self, domain: &str, now: Instant, sticky: bool) -> Result<Endpoint> {
        let mut state = self.state.lock();
        self.purge_locked(&mut state);

        let min_score = self.config.min_score;

        if sticky {
            let bound = state.sticky.get(domain).cloned();
            if let Some(id) = bound {
                if let Some(ep) = state.endpoints.get_mut(&id) {
                    if ep.is_available(now, min_score) {
                        ep.mark_used(now);
                        return Ok(ep.clone());
                    }
                }
            }
        }

        let chosen = match state.best_available(now, min_score) {
            Some(ep) => {
                ep.mark_used(now);
                ep.clone()
            }
            None => return Err(StealthError::PoolExhausted),
        };

        if sticky {
            state.sticky.insert(domain.to_string(), chosen.id.clone());
        }

        Ok(chosen)
    }

    /// Pick the healthiest available endpoint without any domain binding
    pub fn select(&self, now: Instant) -> Result<Endpoint> {
        let mut state = self.state.lock();
        self.purge_locked(&mut state);

        match state.best_available(now, self.config.min_score) {
            Some(ep) => {
                ep.mark_used(now);
                Ok(ep.clone())
            }
            None => Err(StealthError::PoolExhausted),
        }
    }

    /// Record a successful attempt; false if the endpoint is no longer pooled
    pub fn record_success(&self, id: &str, now: Instant) -> bool {
        let mut state = self.state.lock();
        match state.endpoints.get_mut(id) {
            Some(ep) => {
                ep.record_success(&self.config.scoring, now);
                true
            }
            None => false,
        }
    }

    /// Record a failed attempt; false if the endpoint is no longer pooled
    pub fn record_failure(&self, id: &str, kind: FailureKind, now: Instant) -> bool {
        let mut state = self.state.lock();
        match state.endpoints.get_mut(id) {
            Some(ep) => {
                ep.record_failure(kind, &self.config.scoring, now);
                true
            }
            None => false,
        }
    }

    /// Remove an endpoint and any sticky bindings to it
    pub fn evict(&self, id: &str) -> Option<Endpoint> {
        self.state.lock().remove(id)
    }

    /// Drop every endpoint scoring below `threshold`, regardless of history
    pub fn purge_below(&self, threshold: f64) -> usize {
        let purged = self.state.lock().purge_unhealthy(threshold, 0);
        if purged > 0 {
            info!("Purged {} endpoints below score {}", purged, threshold);
        }
        purged
    }

    fn purge_locked(&self, state: &mut PoolState) {
        let evicted =
            state.purge_unhealthy(self.config.eviction_threshold, self.config.min_observations);
        if evicted > 0 {
            debug!("Evicted {} low-score endpoints", evicted);
        }
    }

    pub fn get(&self, id: &str) -> Option<Endpoint> {
        self.state.lock().endpoints.get(id).cloned()
    }

    /// Endpoint id currently bound to `domain`
    pub fn sticky_binding(&self, domain: &str) -> Option<String> {
        self.state.lock().sticky.get(domain).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn available_count(&self, now: Instant) -> usize {
        let min_score = self.config.min_score;
        self.state
            .lock()
            .endpoints
            .values()
            .filter(|ep| ep.is_available(now, min_score))
            .count()
    }

    /// Point-in-time copy of every endpoint, ordered by id
    pub fn snapshot(&self) -> Vec<Endpoint> {
        let mut endpoints: Vec<Endpoint> = self.state.lock().endpoints.values().cloned().collect();
        endpoints.sort_by(|a, b| a.id.cmp(&b.id));
        endpoints
    }

    /// `host:port` of the next selectable endpoint
    pub fn next_address(&self, now: Instant) -> Option<String> {
        self.select(now).ok().map(|ep| ep.address())
    }

    /// `host:port` of every pooled endpoint
    pub fn addresses(&self) -> Vec<String> {
        self.snapshot().iter().map(Endpoint::address).collect()
    }
}

impl Default for EndpointPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}
