//! Node name generation for nodes registered without a name

use rand::Rng;

/// Lowest generated node number
pub const NODE_NUMBER_MIN: u32 = 10000;

/// Highest generated node number
pub const NODE_NUMBER_MAX: u32 = 99999;

/// Source of node names.
///
/// Uniqueness is not checked here; a colliding name fails at the store's
/// create.
pub trait NameGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Produces `node-<n>` with `n` drawn uniformly from 10000..=99999
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomNameGenerator;

impl NameGenerator for RandomNameGenerator {
    fn generate(&self) -> String {
        let n = rand::thread_rng().gen_range(NODE_NUMBER_MIN..=NODE_NUMBER_MAX);
        format!("node-{}", n)
    }
}
