//! Reducers whose accumulator object carries the aggregation logic.

use crate::coder::{Coder, CoderRegistry, SerdeCoder};
use crate::combine_fn::CombineFn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;

/// An accumulator that knows how to fold inputs, absorb a peer, and finish.
pub trait Accumulator: Send + Sync + 'static {
    type Input;
    type Output;

    fn add_input(&mut self, input: Self::Input);

    fn merge_accumulator(&mut self, other: Self);

    fn extract_output(self) -> Self::Output;
}

/// Adapts an [`Accumulator`] type into a [`CombineFn`].
///
/// Merging creates one fresh accumulator and folds every partial into it, so
/// each accumulator type only writes pairwise merge logic once.
pub struct AccumulatingCombineFn<A, F> {
    factory: F,
    coder: Option<Arc<dyn Coder<A>>>,
}

impl<A, F> AccumulatingCombineFn<A, F>
where
    A: Accumulator,
    F: Fn() -> A,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            coder: None,
        }
    }

    /// Use `coder` for accumulators instead of asking the registry.
    pub fn with_coder(self, coder: Arc<dyn Coder<A>>) -> Self {
        Self {
            coder: Some(coder),
            ..self
        }
    }

    /// Encode accumulators with their serde representation.
    pub fn with_serde_coder(self) -> Self
    where
        A: Serialize + DeserializeOwned,
    {
        self.with_coder(Arc::new(SerdeCoder::<A>::new()))
    }
}

impl<A, F> CombineFn for AccumulatingCombineFn<A, F>
where
    A: Accumulator,
    F: Fn() -> A + Send + Sync + 'static,
{
    type Input = A::Input;
    type Accum = A;
    type Output = A::Output;

    fn create_accumulator(&self) -> A {
        (self.factory)()
    }

    fn add_input(&self, acc: &mut A, input: A::Input) {
        acc.add_input(input);
    }

    fn merge_accumulators(&self, accs: Vec<A>) -> A {
        let mut merged = (self.factory)();
        for acc in accs {
            merged.merge_accumulator(acc);
        }
        merged
    }

    fn extract_output(&self, acc: A) -> A::Output {
        acc.extract_output()
    }

    fn accumulator_coder(
        &self,
        registry: &CoderRegistry,
        _input_coder: Arc<dyn Coder<A::Input>>,
    ) -> anyhow::Result<Arc<dyn Coder<A>>> {
        match &self.coder {
            Some(c) => Ok(Arc::clone(c)),
            None => Ok(registry.coder_for::<A>()?),
        }
    }
}

/* ===================== Mean ===================== */

/// Running `(sum, count)` for [`Mean`].
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct MeanAccumulator<T> {
    sum: f64,
    count: u64,
    #[serde(skip)]
    _t: PhantomData<fn(T)>,
}

impl<T> Default for MeanAccumulator<T> {
    fn default() -> Self {
        Self {
            sum: 0.0,
            count: 0,
            _t: PhantomData,
        }
    }
}

impl<T> Accumulator for MeanAccumulator<T>
where
    T: Into<f64> + 'static,
{
    type Input = T;
    type Output = f64;

    fn add_input(&mut self, input: T) {
        self.sum += input.into();
        self.count += 1;
    }

    fn merge_accumulator(&mut self, other: Self) {
        self.sum += other.sum;
        self.count += other.count;
    }

    /// Empty groups produce `0.0`.
    #[allow(clippy::cast_precision_loss)]
    fn extract_output(self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Arithmetic mean as `f64`.
pub struct Mean;

impl Mean {
    pub fn of<T>() -> AccumulatingCombineFn<MeanAccumulator<T>, fn() -> MeanAccumulator<T>>
    where
        T: Into<f64> + 'static,
    {
        AccumulatingCombineFn::new(MeanAccumulator::<T>::default as fn() -> MeanAccumulator<T>)
            .with_serde_coder()
    }
}
