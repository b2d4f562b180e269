//! Testing utilities for beamfold pipelines and triggers.
//!
//! - **Assertions**: compare pipeline outputs with expected results
//! - **[`TriggerTester`]**: drive a trigger tree by hand, one element, merge
//!   or watermark step at a time, and inspect its per-window state
//!
//! # Quick Start
//!
//! ```no_run
//! use beamfold::*;
//! use beamfold::testing::*;
//!
//! #[test]
//! fn test_simple_pipeline() -> anyhow::Result<()> {
//!     let p = TestPipeline::new();
//!
//!     let result = from_vec(&p, vec![1, 2, 3])
//!         .map(|x: &i32| x * 2)
//!         .collect_seq()?;
//!
//!     assert_collections_equal(&result, &[2, 4, 6]);
//!     Ok(())
//! }
//! ```

pub mod assertions;
pub mod trigger_tester;

pub use assertions::*;
pub use trigger_tester::TriggerTester;

use crate::Pipeline;

/// A [`Pipeline`] with graph introspection for tests.
///
/// # Example
///
/// ```
/// use beamfold::testing::TestPipeline;
/// use beamfold::from_vec;
///
/// let p = TestPipeline::new();
/// let data = from_vec(&p, vec![1, 2, 3]);
/// assert_eq!(p.node_count(), 1);
/// ```
#[derive(Clone)]
pub struct TestPipeline {
    pipeline: Pipeline,
}

impl TestPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pipeline: Pipeline::default(),
        }
    }

    /// Number of edges in the pipeline graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.pipeline.snapshot().edges.len()
    }

    /// Print nodes and edges, for debugging a failing test.
    pub fn debug_print_graph(&self) {
        let graph = self.pipeline.snapshot();
        let mut ids: Vec<_> = graph.nodes.keys().copied().collect();
        ids.sort();
        println!("Pipeline Graph:");
        println!("  Nodes: {}", ids.len());
        for id in ids {
            let elem = graph.vec_ops.get(&id).map_or("?", |ops| ops.elem_name());
            println!("    {id:?}: {elem}");
        }
        println!("  Edges: {}", graph.edges.len());
        for (from, to) in &graph.edges {
            println!("    {from:?} -> {to:?}");
        }
    }
}

impl Default for TestPipeline {
    fn default() -> Self {
        Self::new()
    }
}

// Allow TestPipeline to be used wherever Pipeline is expected
impl std::ops::Deref for TestPipeline {
    type Target = Pipeline;

    fn deref(&self) -> &Self::Target {
        &self.pipeline
    }
}

impl AsRef<Pipeline> for TestPipeline {
    fn as_ref(&self) -> &Pipeline {
        &self.pipeline
    }
}
