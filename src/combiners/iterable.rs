//! List-buffering reducer.

use crate::coder::{Coder, CoderRegistry, ListCoder};
use crate::combine_fn::CombineFn;
use std::marker::PhantomData;
use std::mem::take;
use std::sync::Arc;

/// How many buffered inputs an [`IterableCombineFn`] accumulator may hold
/// before it is collapsed.
pub const DEFAULT_BUFFER_SIZE: usize = 20;

/// Wraps a "reduce a finite list to one value" callback as a reducer.
///
/// The accumulator buffers inputs and is collapsed to a single element by
/// re-invoking the callback whenever it grows past the buffer size, and on
/// every merge. The callback therefore sees partial results as inputs and
/// must tolerate repeated partial reduction.
///
/// - Accumulator: `Vec<V>`
/// - Output: `V`
pub struct IterableCombineFn<V, F> {
    combiner: F,
    buffer_size: usize,
    _v: PhantomData<fn(V) -> V>,
}

impl<V, F> IterableCombineFn<V, F>
where
    F: Fn(Vec<V>) -> V,
{
    pub fn new(combiner: F) -> Self {
        Self {
            combiner,
            buffer_size: DEFAULT_BUFFER_SIZE,
            _v: PhantomData,
        }
    }

    pub fn with_buffer_size(self, buffer_size: usize) -> Self {
        Self {
            buffer_size,
            ..self
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn collapse(&self, values: Vec<V>) -> Vec<V> {
        if values.is_empty() {
            return values;
        }
        vec![(self.combiner)(values)]
    }
}

impl<V, F> CombineFn for IterableCombineFn<V, F>
where
    V: Send + Sync + 'static,
    F: Fn(Vec<V>) -> V + Send + Sync + 'static,
{
    type Input = V;
    type Accum = Vec<V>;
    type Output = V;

    fn create_accumulator(&self) -> Vec<V> {
        Vec::new()
    }

    fn add_input(&self, acc: &mut Vec<V>, input: V) {
        acc.push(input);
        if acc.len() > self.buffer_size {
            *acc = self.collapse(take(acc));
        }
    }

    fn merge_accumulators(&self, accs: Vec<Vec<V>>) -> Vec<V> {
        self.collapse(accs.into_iter().flatten().collect())
    }

    fn extract_output(&self, acc: Vec<V>) -> V {
        (self.combiner)(acc)
    }

    fn accumulator_coder(
        &self,
        _registry: &CoderRegistry,
        input_coder: Arc<dyn Coder<V>>,
    ) -> anyhow::Result<Arc<dyn Coder<Vec<V>>>> {
        Ok(Arc::new(ListCoder::new(input_coder)))
    }
}
