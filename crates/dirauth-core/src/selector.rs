//! Endpoint selection and failover ordering.
//!
//! Candidates are ordered by priority, then configuration order. With
//! weighted round-robin the selector spreads requests over the eligible
//! endpoints using smooth WRR. Endpoints reported as failed are demoted
//! behind healthy ones until their cooldown expires.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::{DirectoryConfig, SelectionMode, ServerEndpoint};

#[derive(Debug, Default)]
struct SelectorState {
    current_weights: Vec<i64>,
    failed_until: HashMap<String, Instant>,
}

/// Chooses which endpoint the next attempt goes to.
#[derive(Debug)]
pub struct ServerSelector {
    endpoints: Vec<Arc<ServerEndpoint>>,
    mode: SelectionMode,
    cooldown: Duration,
    state: Mutex<SelectorState>,
}

impl ServerSelector {
    /// Creates a selector over endpoints in configuration order.
    #[must_use]
    pub fn new(
        endpoints: impl IntoIterator<Item = Arc<ServerEndpoint>>,
        mode: SelectionMode,
        cooldown: Duration,
    ) -> Self {
        let mut endpoints: Vec<_> = endpoints.into_iter().collect();
        // Stable sort keeps configuration order among equal priorities.
        endpoints.sort_by_key(|e| e.priority);

        let state = SelectorState {
            current_weights: vec![0; endpoints.len()],
            failed_until: HashMap::new(),
        };
        Self {
            endpoints,
            mode,
            cooldown,
            state: Mutex::new(state),
        }
    }

    /// Creates a selector from a directory configuration.
    #[must_use]
    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self::new(
            config.endpoints.iter().cloned().map(Arc::new),
            config.selection,
            config.retry.failure_cooldown(),
        )
    }

    /// Endpoints in failover order.
    #[must_use]
    pub fn endpoints(&self) -> &[Arc<ServerEndpoint>] {
        &self.endpoints
    }

    /// Returns the next endpoint to try, skipping `excluded` names.
    ///
    /// Returns `None` once every endpoint is excluded.
    pub fn next_candidate(&self, excluded: &HashSet<String>) -> Option<Arc<ServerEndpoint>> {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.failed_until.retain(|_, until| *until > now);

        let eligible: Vec<usize> = (0..self.endpoints.len())
            .filter(|&i| !excluded.contains(&self.endpoints[i].name))
            .collect();
        if eligible.is_empty() {
            return None;
        }

        let healthy: Vec<usize> = eligible
            .iter()
            .copied()
            .filter(|&i| !state.failed_until.contains_key(&self.endpoints[i].name))
            .collect();
        let pool = if healthy.is_empty() { eligible } else { healthy };

        let index = match self.mode {
            SelectionMode::Priority => pool[0],
            SelectionMode::WeightedRoundRobin => {
                Self::weighted_pick(&self.endpoints, &mut state.current_weights, &pool)
            }
        };
        Some(self.endpoints[index].clone())
    }

    /// Smooth weighted round-robin over `candidates`.
    ///
    /// Candidates with zero weight are only picked when every candidate
    /// has zero weight.
    fn weighted_pick(endpoints: &[Arc<ServerEndpoint>], current: &mut [i64], candidates: &[usize]) -> usize {
        let weighted: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&i| endpoints[i].weight > 0)
            .collect();
        if weighted.is_empty() {
            return candidates[0];
        }

        let mut total = 0i64;
        let mut best = weighted[0];
        for &i in &weighted {
            let weight = i64::from(endpoints[i].weight);
            current[i] += weight;
            total += weight;
            if current[i] > current[best] {
                best = i;
            }
        }
        current[best] -= total;
        best
    }

    /// Demotes an endpoint behind healthy ones for the cooldown period.
    pub fn report_failure(&self, endpoint: &str) {
        if self.cooldown.is_zero() {
            return;
        }
        let until = Instant::now() + self.cooldown;
        let newly_failed = self
            .state
            .lock()
            .failed_until
            .insert(endpoint.to_string(), until)
            .is_none();
        if newly_failed {
            info!(endpoint, cooldown_ms = self.cooldown.as_millis() as u64, "Demoting failed endpoint");
        }
    }

    /// Clears any demotion of an endpoint.
    pub fn report_success(&self, endpoint: &str) {
        if self.state.lock().failed_until.remove(endpoint).is_some() {
            debug!(endpoint, "Endpoint recovered");
        }
    }

    /// Returns true while an endpoint is demoted.
    #[must_use]
    pub fn is_cooling_down(&self, endpoint: &str) -> bool {
        self.state
            .lock()
            .failed_until
            .get(endpoint)
            .is_some_and(|until| *until > Instant::now())
    }
}
