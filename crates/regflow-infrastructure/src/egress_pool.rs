//! Shared pool of egress relays.

use rand::Rng;
use regflow_core::error::{RegflowError, Result};
use regflow_core::relay::{RelayEndpoint, SelectionPolicy};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Hands out one relay per outbound call.
///
/// The pool is shared by every concurrent flow. Round-robin keeps a single
/// atomic cursor; random selection keeps no mutable state at all. An empty
/// pool means calls go out directly.
#[derive(Debug)]
pub struct EgressPool {
    endpoints: Vec<RelayEndpoint>,
    policy: SelectionPolicy,
    cursor: AtomicUsize,
}

impl EgressPool {
    pub fn new(endpoints: Vec<RelayEndpoint>, policy: SelectionPolicy) -> Self {
        Self {
            endpoints,
            policy,
            cursor: AtomicUsize::new(0),
        }
    }

    /// A pool with no relays: every call goes out directly.
    pub fn direct() -> Self {
        Self::new(Vec::new(), SelectionPolicy::default())
    }

    /// Builds a pool, refusing an empty one when relaying is mandatory.
    ///
    /// # Returns
    ///
    /// - `Ok(EgressPool)`: pool ready (possibly empty when not required)
    /// - `Err(Configuration)`: `required` is set and no relay was supplied
    pub fn build(
        endpoints: Vec<RelayEndpoint>,
        policy: SelectionPolicy,
        required: bool,
    ) -> Result<Self> {
        if required && endpoints.is_empty() {
            return Err(RegflowError::config(
                "relaying is required but the relay pool is empty",
            ));
        }
        tracing::info!(relays = endpoints.len(), policy = ?policy, "Egress pool ready");
        Ok(Self::new(endpoints, policy))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn endpoints(&self) -> &[RelayEndpoint] {
        &self.endpoints
    }

    /// Index of the relay for the next call, or `None` when the pool is empty.
    pub fn select_index(&self) -> Option<usize> {
        let len = self.endpoints.len();
        if len == 0 {
            return None;
        }
        match self.policy {
            SelectionPolicy::RoundRobin => {
                let previous = self
                    .cursor
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % len))
                    .unwrap_or_else(|current| current);
                Some(previous % len)
            }
            SelectionPolicy::Random => Some(rand::thread_rng().gen_range(0..len)),
        }
    }

    pub fn select(&self) -> Option<&RelayEndpoint> {
        self.select_index().map(|index| &self.endpoints[index])
    }
}
