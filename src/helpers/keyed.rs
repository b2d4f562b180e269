use crate::collection::downcast_rows;
use crate::node::Node;
use crate::panes::{InputWatermark, PaneGrouper};
use crate::trigger::ExecutableTrigger;
use crate::type_token::Partition;
use crate::window::WindowedValue;
use crate::{PCollection, RFBound};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;

impl<T: RFBound> PCollection<T> {
    /// Derive a key and produce (K, T)
    pub fn key_by<K, F>(self, key_fn: F) -> PCollection<(K, T)>
    where
        K: RFBound + Eq + Hash,
        F: 'static + Send + Sync + Fn(&T) -> K,
    {
        self.map(move |t| (key_fn(t), t.clone()))
    }
}

impl<K: RFBound + Eq + Hash, V: RFBound> PCollection<(K, V)> {
    /// Group values by key and window: (K, V) -> (K, Vec<V>).
    ///
    /// Each output element is one pane. When it fires, how many panes a window
    /// produces and whether later panes repeat earlier values all come from the
    /// collection's windowing strategy. With the default strategy every
    /// (key, window) yields exactly one on-time pane.
    pub fn group_by_key(self) -> PCollection<(K, Vec<V>)> {
        self.group_by_key_with(InputWatermark::ElementTime)
    }

    pub(crate) fn group_by_key_with(self, input_watermark: InputWatermark) -> PCollection<(K, Vec<V>)> {
        let strategy = self.strategy.clone();
        let exec = {
            let strategy = strategy.clone();
            let tree = Arc::new(ExecutableTrigger::new(Arc::clone(&strategy.trigger)));
            Arc::new(move |parts: Vec<Partition>| -> Result<Partition> {
                let mut by_key: HashMap<K, Vec<WindowedValue<V>>> = HashMap::new();
                for p in parts {
                    for wv in downcast_rows::<(K, V)>(p, "group_by_key")? {
                        let WindowedValue {
                            value: (k, v),
                            timestamp,
                            windows,
                            pane,
                        } = wv;
                        by_key.entry(k).or_default().push(WindowedValue {
                            value: v,
                            timestamp,
                            windows,
                            pane,
                        });
                    }
                }
                debug!(keys = by_key.len(), trigger = tree.trigger(0).name(), "grouping");

                let mut out: Vec<WindowedValue<(K, Vec<V>)>> = Vec::new();
                for (k, values) in by_key {
                    let panes = PaneGrouper::new(&strategy, &tree)
                        .with_input_watermark(input_watermark)
                        .run(values)
                        .context("group_by_key: trigger evaluation failed")?;
                    out.extend(
                        panes
                            .into_iter()
                            .map(|p| WindowedValue::of_pane((k.clone(), p.values), p.window, p.info)),
                    );
                }
                Ok(Box::new(out) as Partition)
            })
        };
        self.then(Node::Barrier(exec), strategy)
    }
}
