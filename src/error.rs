//! Typed error causes.
//!
//! Public APIs return [`anyhow::Result`]; the enums below are the concrete
//! causes wrapped inside, so callers can tell a construction-time mistake
//! from a broken trigger tree with `err.downcast_ref::<ConfigError>()`.

use thiserror::Error;

/// Fatal, pre-execution mistakes in how a pipeline stage was put together.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No coder could be inferred for a combine stage's accumulator type.
    #[error("unable to determine a coder for accumulator type `{type_name}`")]
    CannotProvideCoder { type_name: &'static str },

    /// A composite trigger was given fewer children than it needs.
    #[error("{trigger} requires at least {min} sub-triggers, got {actual}")]
    TooFewSubTriggers {
        trigger: &'static str,
        min: usize,
        actual: usize,
    },

    /// A zero-input default was requested for a collection whose windowing
    /// is not the single global window.
    #[error(
        "attempted to add a default value to a collection not windowed by GlobalWindows; \
         use without_defaults() or as_singleton_view() instead"
    )]
    DefaultOutsideGlobalWindows,

    /// A stage received partitions of a different element type than it was built for.
    #[error("{stage}: expected input of type `{expected}`")]
    BadInputShape {
        stage: &'static str,
        expected: &'static str,
    },
}

/// Internal-consistency failures while evaluating a trigger tree.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// Timers are always owned by a leaf; a composite must route them further down.
    #[error("{trigger} (node {node}) received a timer addressed to itself")]
    TimerAtComposite { trigger: &'static str, node: usize },

    /// The timer's destination is not inside the subtree it was routed into.
    #[error("no child of trigger node {node} leads to timer destination {destination}")]
    NoPathToTimer { node: usize, destination: usize },
}
