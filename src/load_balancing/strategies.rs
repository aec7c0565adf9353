//! Selection of one instance among the healthy members of a logical service.
//!
//! Discovery re-resolves on every call, so a selector only spreads load; correctness
//! never depends on which healthy instance is picked.

use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::types::ServiceInstance;

/// Configured selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Always the first instance the backend lists
    FirstHealthy,
    /// Rotate through instances, one counter per logical service
    RoundRobin,
    /// Uniformly random instance
    Random,
}

pub trait InstanceSelector: Send + Sync {
    fn select<'a>(&self, service: &str, instances: &'a [ServiceInstance]) -> Option<&'a ServiceInstance>;

    fn name(&self) -> &'static str;
}

pub fn build_selector(strategy: SelectionStrategy) -> Box<dyn InstanceSelector> {
    match strategy {
        SelectionStrategy::FirstHealthy => Box::new(FirstHealthy),
        SelectionStrategy::RoundRobin => Box::new(RoundRobin::new()),
        SelectionStrategy::Random => Box::new(RandomSelector),
    }
}

pub struct FirstHealthy;

impl InstanceSelector for FirstHealthy {
    fn select<'a>(&self, _service: &str, instances: &'a [ServiceInstance]) -> Option<&'a ServiceInstance> {
        instances.first()
    }

    fn name(&self) -> &'static str {
        "first_healthy"
    }
}

#[derive(Default)]
pub struct RoundRobin {
    counters: DashMap<String, AtomicUsize>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InstanceSelector for RoundRobin {
    fn select<'a>(&self, service: &str, instances: &'a [ServiceInstance]) -> Option<&'a ServiceInstance> {
        if instances.is_empty() {
            return None;
        }

        let counter = self
            .counters
            .entry(service.to_string())
            .or_insert_with(|| AtomicUsize::new(0));
        let index = counter.fetch_add(1, Ordering::Relaxed) % instances.len();
        instances.get(index)
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

pub struct RandomSelector;

impl InstanceSelector for RandomSelector {
    fn select<'a>(&self, _service: &str, instances: &'a [ServiceInstance]) -> Option<&'a ServiceInstance> {
        if instances.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..instances.len());
        instances.get(index)
    }

    fn name(&self) -> &'static str {
        "random"
    }
}
