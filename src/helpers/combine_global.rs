//! Key-less combining.
//!
//! `combine_globally` reduces a whole collection (per window) to one value by
//! keying every element with `()` and running the per-key machinery, so it
//! shares the lifted tree and the hot-key path. A fanout of 2 or more routes
//! the single key through the intermediate sharded stage.
//!
//! In the global window an empty input still yields one element: the fn's
//! output for an empty accumulator. Other windowings have no well-defined
//! window to put that default in, so asking for it there is a construction
//! error; call [`without_defaults`](Globally::without_defaults) instead.
//!
//! ```no_run
//! use beamfold::*;
//! use beamfold::combiners::Max;
//!
//! let p = Pipeline::default();
//! let empty = from_vec(&p, Vec::<f64>::new());
//! let out = empty.combine_globally(Max::of_doubles()).apply()?.collect_seq()?;
//! assert_eq!(out, vec![f64::NEG_INFINITY]);
//! # anyhow::Result::<()>::Ok(())
//! ```

use crate::collection::downcast_rows;
use crate::combine_fn::CombineFn;
use crate::error::ConfigError;
use crate::node::Node;
use crate::type_token::Partition;
use crate::window::{PaneInfo, Window, WindowedValue};
use crate::{PCollection, RFBound};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A pending global combine. Configure, then [`apply`](Self::apply) or
/// [`as_singleton_view`](Self::as_singleton_view).
pub struct Globally<T, C> {
    input: PCollection<T>,
    f: C,
    fanout: u32,
    insert_default: bool,
}

impl<T: RFBound> PCollection<T> {
    pub fn combine_globally<C>(self, f: C) -> Globally<T, C>
    where
        C: CombineFn<Input = T>,
        C::Output: RFBound,
    {
        Globally {
            input: self,
            f,
            fanout: 0,
            insert_default: true,
        }
    }
}

impl<T, C> Globally<T, C>
where
    T: RFBound,
    C: CombineFn<Input = T>,
    C::Output: RFBound,
{
    /// Pre-combine over `fanout` intermediate shards. Values below 2 disable it.
    pub fn with_fanout(self, fanout: u32) -> Self {
        Self { fanout, ..self }
    }

    /// Produce nothing, rather than the empty-input output, for empty input.
    pub fn without_defaults(self) -> Self {
        Self {
            insert_default: false,
            ..self
        }
    }

    pub fn apply(self) -> Result<PCollection<C::Output>> {
        let default = self.default_value()?;
        let combined = self.combine_as_single_key()?;
        Ok(match default {
            Some(value) => insert_default(combined, value),
            None => combined,
        })
    }

    /// The combined value per window, for lookup from other computations.
    /// No default element is inserted, so any windowing is accepted; a kept
    /// default answers lookups of windows that saw no input.
    pub fn as_singleton_view(self) -> Result<SingletonView<C::Output>> {
        let default = self
            .insert_default
            .then(|| self.f.extract_output(self.f.create_accumulator()));
        let collection = self.combine_as_single_key()?;
        Ok(SingletonView { collection, default })
    }

    fn default_value(&self) -> Result<Option<C::Output>> {
        if !self.insert_default {
            return Ok(None);
        }
        if !self.input.strategy.window_fn.is_global() {
            return Err(ConfigError::DefaultOutsideGlobalWindows.into());
        }
        Ok(Some(self.f.extract_output(self.f.create_accumulator())))
    }

    fn combine_as_single_key(self) -> Result<PCollection<C::Output>> {
        let keyed = self.input.map(|t: &T| ((), t.clone()));
        Ok(keyed
            .combine_per_key(self.f)
            .with_hot_key_fanout(self.fanout)
            .apply()?
            .values())
    }
}

fn insert_default<O: RFBound>(combined: PCollection<O>, default: O) -> PCollection<O> {
    let strategy = combined.strategy.clone();
    let exec = Arc::new(move |parts: Vec<Partition>| -> Result<Partition> {
        let mut rows: Vec<WindowedValue<O>> = Vec::new();
        for p in parts {
            rows.extend(downcast_rows::<O>(p, "combine_globally default")?);
        }
        if rows.is_empty() {
            debug!("combine_globally: empty input, emitting default");
            rows.push(WindowedValue::of_pane(
                default.clone(),
                Window::Global,
                PaneInfo::ON_TIME_AND_ONLY,
            ));
        }
        Ok(Box::new(rows) as Partition)
    });
    combined.then(Node::Barrier(exec), strategy)
}

/// A combined-globally collection viewed as one value per window.
pub struct SingletonView<O> {
    collection: PCollection<O>,
    default: Option<O>,
}

impl<O: RFBound> SingletonView<O> {
    pub fn collection(&self) -> &PCollection<O> {
        &self.collection
    }

    /// Run the pipeline up to the view and index the result by window.
    pub fn materialize(self) -> Result<WindowLookup<O>> {
        let mut values: HashMap<Window, (u64, O)> = HashMap::new();
        for wv in self.collection.collect_windowed_seq()? {
            for w in wv.windows {
                let newer = values.get(&w).is_none_or(|(index, _)| wv.pane.index >= *index);
                if newer {
                    values.insert(w, (wv.pane.index, wv.value.clone()));
                }
            }
        }
        Ok(WindowLookup {
            values: values.into_iter().map(|(w, (_, v))| (w, v)).collect(),
            default: self.default,
        })
    }
}

/// The materialized contents of a [`SingletonView`].
#[derive(Clone, Debug)]
pub struct WindowLookup<O> {
    values: HashMap<Window, O>,
    default: Option<O>,
}

impl<O: Clone> WindowLookup<O> {
    /// The value for `window`, or the default when one was kept and the
    /// window saw no input.
    pub fn get(&self, window: &Window) -> Option<O> {
        self.values.get(window).or(self.default.as_ref()).cloned()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
