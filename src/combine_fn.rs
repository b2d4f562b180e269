//! The accumulator contract every reduction implements.
//!
//! A [`CombineFn`] describes one associative, commutative aggregation in four
//! steps: create an empty accumulator, fold inputs into it, merge several
//! accumulators into one, and extract the final output. The engine may merge
//! partial accumulators in any grouping and order, so implementations must
//! give the same output regardless; this is assumed, never checked.
//!
//! [`KeyedCombineFn`] is the same contract with the key passed to every step.
//! The two adapters convert between them:
//!
//! - [`CombineFn::as_keyed`] lifts a key-agnostic fn into a keyed one that
//!   ignores the key ([`Keyed`]).
//! - [`bind`] / [`KeyedCombineFn::for_key`] closes a keyed fn over one key,
//!   yielding a key-agnostic fn ([`BoundKeyedFn`]).
//!
//! Accumulators move: `merge_accumulators` takes ownership of every input
//! accumulator and hands back exactly one.

use crate::coder::{Coder, CoderRegistry};
use std::sync::Arc;

/// A key-agnostic reduction.
pub trait CombineFn: Send + Sync + 'static {
    type Input;
    type Accum: Send + Sync + 'static;
    type Output;

    /// The zero-input accumulator.
    fn create_accumulator(&self) -> Self::Accum;

    /// Fold one input into `acc`.
    fn add_input(&self, acc: &mut Self::Accum, input: Self::Input);

    /// Collapse several accumulators into one.
    fn merge_accumulators(&self, accs: Vec<Self::Accum>) -> Self::Accum;

    /// Produce the final output.
    fn extract_output(&self, acc: Self::Accum) -> Self::Output;

    /// Create, fold every input, extract. For direct invocation outside a
    /// pipeline; the executor never calls this.
    fn apply<I>(&self, inputs: I) -> Self::Output
    where
        I: IntoIterator<Item = Self::Input>,
        Self: Sized,
    {
        let mut acc = self.create_accumulator();
        for input in inputs {
            self.add_input(&mut acc, input);
        }
        self.extract_output(acc)
    }

    /// The coder used when accumulators cross a grouping boundary.
    ///
    /// The default asks `registry` for `Self::Accum`; combiners whose
    /// accumulator is built from the input type override this and derive it
    /// from `input_coder`.
    fn accumulator_coder(
        &self,
        registry: &CoderRegistry,
        _input_coder: Arc<dyn Coder<Self::Input>>,
    ) -> anyhow::Result<Arc<dyn Coder<Self::Accum>>> {
        Ok(registry.coder_for::<Self::Accum>()?)
    }

    /// Lift into a [`KeyedCombineFn`] that ignores its key.
    fn as_keyed(self) -> Keyed<Self>
    where
        Self: Sized,
    {
        Keyed(self)
    }
}

/// A reduction whose behavior may depend on the key being reduced.
pub trait KeyedCombineFn<K>: Send + Sync + 'static {
    type Input;
    type Accum: Send + Sync + 'static;
    type Output;

    fn create_accumulator(&self, key: &K) -> Self::Accum;

    fn add_input(&self, key: &K, acc: &mut Self::Accum, input: Self::Input);

    fn merge_accumulators(&self, key: &K, accs: Vec<Self::Accum>) -> Self::Accum;

    fn extract_output(&self, key: &K, acc: Self::Accum) -> Self::Output;

    /// Create, fold every input, extract, for one key.
    fn apply<I>(&self, key: &K, inputs: I) -> Self::Output
    where
        I: IntoIterator<Item = Self::Input>,
        Self: Sized,
    {
        let mut acc = self.create_accumulator(key);
        for input in inputs {
            self.add_input(key, &mut acc, input);
        }
        self.extract_output(key, acc)
    }

    /// See [`CombineFn::accumulator_coder`].
    fn accumulator_coder(
        &self,
        registry: &CoderRegistry,
        _input_coder: Arc<dyn Coder<Self::Input>>,
    ) -> anyhow::Result<Arc<dyn Coder<Self::Accum>>> {
        Ok(registry.coder_for::<Self::Accum>()?)
    }

    /// Close this fn over `key`.
    fn for_key(self, key: K) -> BoundKeyedFn<Self, K>
    where
        Self: Sized,
    {
        bind(Arc::new(self), key)
    }
}

/* ===================== lift ===================== */

/// A [`CombineFn`] viewed as a [`KeyedCombineFn`] that discards the key.
#[derive(Clone, Copy, Debug, Default)]
pub struct Keyed<C>(pub C);

impl<K, C> KeyedCombineFn<K> for Keyed<C>
where
    C: CombineFn,
{
    type Input = C::Input;
    type Accum = C::Accum;
    type Output = C::Output;

    fn create_accumulator(&self, _key: &K) -> C::Accum {
        self.0.create_accumulator()
    }

    fn add_input(&self, _key: &K, acc: &mut C::Accum, input: C::Input) {
        self.0.add_input(acc, input);
    }

    fn merge_accumulators(&self, _key: &K, accs: Vec<C::Accum>) -> C::Accum {
        self.0.merge_accumulators(accs)
    }

    fn extract_output(&self, _key: &K, acc: C::Accum) -> C::Output {
        self.0.extract_output(acc)
    }

    fn accumulator_coder(
        &self,
        registry: &CoderRegistry,
        input_coder: Arc<dyn Coder<C::Input>>,
    ) -> anyhow::Result<Arc<dyn Coder<C::Accum>>> {
        self.0.accumulator_coder(registry, input_coder)
    }
}

/* ===================== bind ===================== */

/// A [`KeyedCombineFn`] curried to a single key.
pub struct BoundKeyedFn<F, K> {
    inner: Arc<F>,
    key: K,
}

/// Close `f` over `key`, producing a key-agnostic [`CombineFn`].
pub fn bind<F, K>(f: Arc<F>, key: K) -> BoundKeyedFn<F, K> {
    BoundKeyedFn { inner: f, key }
}

impl<F, K> BoundKeyedFn<F, K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<F, K> CombineFn for BoundKeyedFn<F, K>
where
    F: KeyedCombineFn<K>,
    K: Send + Sync + 'static,
{
    type Input = F::Input;
    type Accum = F::Accum;
    type Output = F::Output;

    fn create_accumulator(&self) -> F::Accum {
        self.inner.create_accumulator(&self.key)
    }

    fn add_input(&self, acc: &mut F::Accum, input: F::Input) {
        self.inner.add_input(&self.key, acc, input);
    }

    fn merge_accumulators(&self, accs: Vec<F::Accum>) -> F::Accum {
        self.inner.merge_accumulators(&self.key, accs)
    }

    fn extract_output(&self, acc: F::Accum) -> F::Output {
        self.inner.extract_output(&self.key, acc)
    }

    fn accumulator_coder(
        &self,
        registry: &CoderRegistry,
        input_coder: Arc<dyn Coder<F::Input>>,
    ) -> anyhow::Result<Arc<dyn Coder<F::Accum>>> {
        self.inner.accumulator_coder(registry, input_coder)
    }
}
