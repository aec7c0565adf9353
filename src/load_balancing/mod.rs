pub mod strategies;

pub use strategies::{
    build_selector, FirstHealthy, InstanceSelector, RandomSelector, RoundRobin, SelectionStrategy,
};
