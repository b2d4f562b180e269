//! Per-key combining.
//!
//! `combine_per_key` has two execution shapes:
//!
//! - **Lifted**: when the windowing strategy has non-merging windows and the
//!   default trigger, every bundle folds its inputs into one accumulator per
//!   (key, window), partial accumulators are merged in a tree, and outputs are
//!   extracted once at the end. Nothing but accumulators crosses bundles.
//! - **Grouped**: otherwise values are grouped per pane with
//!   [`group_by_key`](crate::PCollection::group_by_key) and each group is
//!   reduced with the fn bound to its key.
//!
//! Both give the same (key, window) outputs for the default strategy.
//!
//! ```no_run
//! use beamfold::*;
//! use beamfold::combiners::Sum;
//!
//! let p = Pipeline::default();
//! let kv = from_vec(&p, vec![("k".to_string(), 1i64), ("k".to_string(), 2)]);
//! let sums = kv.combine_per_key(Sum::of_longs()).with_hot_key_fanout(4).apply()?;
//! assert_eq!(sums.collect_seq()?, vec![("k".to_string(), 3i64)]);
//! # anyhow::Result::<()>::Ok(())
//! ```

use crate::coder::{Coder, SerdeCoder};
use crate::collection::{downcast_partition, downcast_rows};
use crate::combine_fn::{CombineFn, Keyed, KeyedCombineFn, bind};
use crate::helpers::hot_key::combine_hot_keys;
use crate::node::Node;
use crate::panes::InputWatermark;
use crate::type_token::Partition;
use crate::window::{PaneInfo, Window, WindowedValue};
use crate::{PCollection, RFBound};
use anyhow::Result;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;

/// Chooses a fanout per key; `0` or `1` leaves the key unsharded.
pub type HotKeyFanoutFn<K> = Arc<dyn Fn(&K) -> u32 + Send + Sync>;

/// A pending per-key combine. Configure, then [`apply`](Self::apply).
pub struct PerKey<K, V, F> {
    input: PCollection<(K, V)>,
    f: F,
    hot_key_fanout: Option<HotKeyFanoutFn<K>>,
    merge_width: Option<usize>,
}

impl<K: RFBound + Eq + Hash, V: RFBound> PCollection<(K, V)> {
    /// Combine all values of each key (per window) with a key-agnostic fn.
    pub fn combine_per_key<C>(self, f: C) -> PerKey<K, V, Keyed<C>>
    where
        C: CombineFn<Input = V>,
        C::Output: RFBound,
    {
        self.combine_per_key_keyed(f.as_keyed())
    }

    /// Combine all values of each key (per window) with a fn that sees the key.
    pub fn combine_per_key_keyed<F>(self, f: F) -> PerKey<K, V, F>
    where
        F: KeyedCombineFn<K, Input = V>,
        F::Output: RFBound,
    {
        PerKey {
            input: self,
            f,
            hot_key_fanout: None,
            merge_width: None,
        }
    }
}

impl<K, V, F> PerKey<K, V, F>
where
    K: RFBound + Eq + Hash,
    V: RFBound,
    F: KeyedCombineFn<K, Input = V>,
    F::Output: RFBound,
{
    /// Spread every key over `fanout` intermediate shards before the final
    /// combine. A fanout of 0 or 1 disables sharding.
    pub fn with_hot_key_fanout(self, fanout: u32) -> Self {
        if fanout <= 1 {
            return Self {
                hot_key_fanout: None,
                ..self
            };
        }
        self.with_hot_key_fanout_fn(move |_: &K| fanout)
    }

    /// Like [`with_hot_key_fanout`](Self::with_hot_key_fanout), choosing the
    /// fanout per key.
    pub fn with_hot_key_fanout_fn<H>(self, fanout: H) -> Self
    where
        H: Fn(&K) -> u32 + Send + Sync + 'static,
    {
        Self {
            hot_key_fanout: Some(Arc::new(fanout)),
            ..self
        }
    }

    /// Merge partial accumulators in rounds of at most `width` (≥ 2) instead
    /// of all at once.
    pub fn with_merge_width(self, width: usize) -> Self {
        Self {
            merge_width: Some(width.max(2)),
            ..self
        }
    }

    /// Build the combine. Fails when the accumulator type has no coder.
    pub fn apply(self) -> Result<PCollection<(K, F::Output)>> {
        let f = Arc::new(self.f);
        match self.hot_key_fanout {
            Some(fanout) => combine_hot_keys(self.input, f, fanout, self.merge_width),
            None => combine_per_key_arc(self.input, f, self.merge_width, InputWatermark::ElementTime),
        }
    }
}

pub(crate) fn combine_per_key_arc<K, V, F>(
    input: PCollection<(K, V)>,
    f: Arc<F>,
    merge_width: Option<usize>,
    input_watermark: InputWatermark,
) -> Result<PCollection<(K, F::Output)>>
where
    K: RFBound + Eq + Hash,
    V: RFBound,
    F: KeyedCombineFn<K, Input = V>,
    F::Output: RFBound,
{
    let registry = input.pipeline.coder_registry();
    let input_coder: Arc<dyn Coder<V>> = Arc::new(SerdeCoder::<V>::new());
    f.accumulator_coder(&registry, input_coder)?;

    if input.strategy.allows_lifting() {
        debug!(node = input.id.raw(), "combine_per_key: lifted");
        Ok(lifted(input, f, merge_width))
    } else {
        debug!(node = input.id.raw(), "combine_per_key: grouped");
        Ok(input
            .group_by_key_with(input_watermark)
            .combine_grouped_arc(f))
    }
}

type PartialAccums<K, A> = HashMap<(K, Window), A>;

fn lifted<K, V, F>(input: PCollection<(K, V)>, f: Arc<F>, merge_width: Option<usize>) -> PCollection<(K, F::Output)>
where
    K: RFBound + Eq + Hash,
    V: RFBound,
    F: KeyedCombineFn<K, Input = V>,
    F::Output: RFBound,
{
    let local = {
        let f = Arc::clone(&f);
        Arc::new(move |p: Partition| -> Result<Partition> {
            let rows = downcast_rows::<(K, V)>(p, "combine_per_key local")?;
            let mut accs: PartialAccums<K, F::Accum> = HashMap::new();
            for wv in rows {
                let (k, v) = wv.value;
                for w in wv.windows {
                    let acc = accs
                        .entry((k.clone(), w))
                        .or_insert_with(|| f.create_accumulator(&k));
                    f.add_input(&k, acc, v.clone());
                }
            }
            Ok(Box::new(accs) as Partition)
        })
    };

    let merge = {
        let f = Arc::clone(&f);
        Arc::new(move |parts: Vec<Partition>| -> Result<Partition> {
            let mut grouped: HashMap<(K, Window), Vec<F::Accum>> = HashMap::new();
            for p in parts {
                let partial = downcast_partition::<PartialAccums<K, F::Accum>>(p, "combine_per_key merge")?;
                for (kw, acc) in partial {
                    grouped.entry(kw).or_default().push(acc);
                }
            }
            let merged: PartialAccums<K, F::Accum> = grouped
                .into_iter()
                .map(|(kw, accs)| {
                    let acc = f.merge_accumulators(&kw.0, accs);
                    (kw, acc)
                })
                .collect();
            Ok(Box::new(merged) as Partition)
        })
    };

    let finish = Arc::new(move |p: Partition| -> Result<Partition> {
        let accs = downcast_partition::<PartialAccums<K, F::Accum>>(p, "combine_per_key finish")?;
        let out: Vec<WindowedValue<(K, F::Output)>> = accs
            .into_iter()
            .map(|((k, w), acc)| {
                let o = f.extract_output(&k, acc);
                WindowedValue::of_pane((k, o), w, PaneInfo::ON_TIME_AND_ONLY)
            })
            .collect();
        Ok(Box::new(out) as Partition)
    });

    let strategy = input.strategy.clone();
    input.then(
        Node::Combine {
            local,
            merge,
            finish,
            fanout: merge_width,
        },
        strategy,
    )
}

impl<K, V> PCollection<(K, Vec<V>)>
where
    K: RFBound + Eq + Hash,
    V: RFBound,
{
    /// Reduce each already-grouped value list with a key-agnostic fn.
    pub fn combine_grouped_values<C>(self, f: C) -> PCollection<(K, C::Output)>
    where
        C: CombineFn<Input = V>,
        C::Output: RFBound,
    {
        self.combine_grouped_values_keyed(f.as_keyed())
    }

    /// Reduce each already-grouped value list with the fn bound to its key.
    pub fn combine_grouped_values_keyed<F>(self, f: F) -> PCollection<(K, F::Output)>
    where
        F: KeyedCombineFn<K, Input = V>,
        F::Output: RFBound,
    {
        self.combine_grouped_arc(Arc::new(f))
    }

    pub(crate) fn combine_grouped_arc<F>(self, f: Arc<F>) -> PCollection<(K, F::Output)>
    where
        F: KeyedCombineFn<K, Input = V>,
        F::Output: RFBound,
    {
        self.map(move |(k, vs): &(K, Vec<V>)| {
            let bound = bind(Arc::clone(&f), k.clone());
            (k.clone(), bound.apply(vs.iter().cloned()))
        })
    }
}

