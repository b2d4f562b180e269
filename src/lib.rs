//! # beamfold
//!
//! The windowed-aggregation core of a Beam-style batch engine: user-defined
//! combine fns, the executor that runs them as lifted trees with optional
//! hot-key fanout, and the trigger state machines that decide when a window's
//! pane fires.
//!
//! ## Quick Start
//!
//! ```no_run
//! use beamfold::*;
//! use beamfold::combiners::Sum;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let p = Pipeline::default();
//! let sales = from_vec(&p, vec![
//!     ("product_a".to_string(), 100i64),
//!     ("product_b".to_string(), 200),
//!     ("product_a".to_string(), 150),
//! ]);
//!
//! let totals = sales.combine_per_key(Sum::of_longs()).apply()?;
//! let results = totals.collect_seq()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Pipeline and PCollection
//!
//! A [`Pipeline`] is a deferred graph. A [`PCollection<T>`] is a typed handle
//! onto one of its nodes plus the [`WindowingStrategy`] its elements carry.
//! Every element travels as a [`WindowedValue`]: value, event timestamp,
//! windows, and the pane that produced it. Nothing runs until a collect
//! method is called.
//!
//! ### Combine fns
//!
//! A [`CombineFn`] is an associative, commutative reduction split into
//! create / add / merge / extract. [`KeyedCombineFn`] is the same with the key
//! passed to every step. The [`combiners`] module has the standard ones: sums,
//! min/max, counts, means, and adapters for binary operators and list
//! reductions.
//!
//! ### Combining
//!
//! - [`combine_per_key`](PCollection::combine_per_key) -- one output per key and window
//! - [`combine_globally`](PCollection::combine_globally) -- one output per window
//! - [`combine_grouped_values`](PCollection::combine_grouped_values) -- after a
//!   [`group_by_key`](PCollection::group_by_key)
//!
//! With non-merging windows and the default trigger the executor lifts the
//! combine: accumulators are folded per bundle and merged in a tree, so raw
//! values never cross bundles. Hot keys can be spread over several shards
//! first with [`PerKey::with_hot_key_fanout`].
//!
//! ### Triggers
//!
//! The [`trigger`] module holds the state machines: leaves such as
//! [`AfterCount`](trigger::AfterCount) and
//! [`AfterWatermark`](trigger::AfterWatermark), and the composites
//! [`AfterFirst`](trigger::AfterFirst) and [`Repeatedly`](trigger::Repeatedly).
//!
//! ### Execution Modes
//!
//! - **Sequential** - [`collect_seq()`](PCollection::collect_seq)
//! - **Parallel** - [`collect_par()`](PCollection::collect_par), on Rayon
//!
//! Both modes produce the same results up to element order.
//!
//! ## Module Overview
//!
//! - [`collection`] - `PCollection` and element-wise transforms
//! - [`combine_fn`] - the combine fn contracts and their adapters
//! - [`combiners`] - built-in reductions
//! - [`trigger`] - trigger trees and their executable form
//! - [`panes`] - per-key window buffering driven by a trigger
//! - [`coder`] - byte encodings for values that cross a shuffle
//! - [`runner`] - sequential and parallel execution
//! - [`testing`] - assertions and a step-by-step trigger driver

pub mod coder;
pub mod collection;
pub mod combine_fn;
pub mod combiners;
pub mod error;
pub mod helpers;
pub mod node;
pub mod panes;
pub mod pipeline;
pub mod runner;
pub mod testing;
pub mod trigger;
pub mod type_token;
pub mod window;
pub mod window_fn;

pub use coder::{Coder, CoderError, CoderRegistry, SerdeCoder};
pub use collection::{PCollection, RFBound, flatten, from_timestamped, from_vec};
pub use combine_fn::{BoundKeyedFn, CombineFn, Keyed, KeyedCombineFn, bind};
pub use error::{ConfigError, TriggerError};
pub use helpers::{Globally, HotKeyFanoutFn, PerKey, SingletonView, WindowLookup};
pub use pipeline::{NodeId, Pipeline};
pub use runner::{ExecMode, Runner};
pub use type_token::Partition;
pub use window::{PaneInfo, PaneTiming, TimestampMs, Timestamped, Window, WindowedValue};
pub use window_fn::{
    AccumulationMode, FixedWindows, GlobalWindows, Sessions, WindowFn, WindowingStrategy,
};
