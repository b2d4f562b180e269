//! Graph nodes. Every node is type-erased; the typed work lives in the
//! closures and [`DynOp`]s the [`PCollection`](crate::PCollection) methods
//! build.

use crate::type_token::Partition;
use anyhow::Result;
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

/// Per-bundle state handed to element-wise operations.
///
/// A bundle is one partition processed by one invocation of a node. The shard
/// counter starts at a random value for every bundle and only has to vary
/// enough within the bundle to spread one key over several shards.
#[derive(Debug)]
pub struct BundleContext {
    bundle: usize,
    shard_counter: u32,
}

impl BundleContext {
    pub fn new(bundle: usize) -> Self {
        Self::with_seed(bundle, rand::random())
    }

    pub fn with_seed(bundle: usize, seed: u32) -> Self {
        debug!(bundle, seed, "bundle started");
        Self {
            bundle,
            shard_counter: seed,
        }
    }

    pub fn bundle(&self) -> usize {
        self.bundle
    }

    /// Next shard id in `[0, fanout)`, round-robin from the bundle's seed.
    pub fn next_shard(&mut self, fanout: u32) -> u32 {
        debug_assert!(fanout > 0);
        let shard = self.shard_counter % fanout;
        self.shard_counter = self.shard_counter.wrapping_add(1);
        shard
    }
}

/// An element-wise operation over one partition.
pub trait DynOp: Send + Sync {
    fn apply(&self, input: Partition, cx: &mut BundleContext) -> Result<Partition>;
}

pub(crate) type LocalFn = Arc<dyn Fn(Partition) -> Result<Partition> + Send + Sync>;
pub(crate) type MergeFn = Arc<dyn Fn(Vec<Partition>) -> Result<Partition> + Send + Sync>;

#[derive(Clone)]
pub enum Node {
    /// In-memory `Vec<WindowedValue<T>>`.
    Source { payload: Arc<dyn Any + Send + Sync> },

    /// Element-wise ops, fused and run per bundle.
    Stateless(Vec<Arc<dyn DynOp>>),

    /// Lifted combine tree.
    /// - `local`: one bundle `Vec<WindowedValue<(K, V)>>` → partial accumulators
    /// - `merge`: several partials → one partial; applied in rounds of at most
    ///   `fanout` inputs (all at once when `None`)
    /// - `finish`: the last partial → `Vec<WindowedValue<(K, O)>>`
    Combine {
        local: LocalFn,
        merge: MergeFn,
        finish: LocalFn,
        fanout: Option<usize>,
    },

    /// Sees every partition of its input at once and produces a single
    /// partition. Grouping and default insertion are barriers.
    Barrier(MergeFn),

    /// Concatenation of all parents' partitions, in edge order.
    Flatten,
}
