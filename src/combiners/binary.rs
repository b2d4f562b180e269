//! Binary-operator reducers.
//!
//! [`BinaryCombineFn`] folds values with a closure `op(left, right)` and keeps
//! an `Option<V>` accumulator, so "no input yet" is distinguishable from any
//! real value. Without an identity it reports absence as `None`.
//!
//! [`BinaryCombinePrimitiveFn`] is the unboxed form for `i32`/`i64`/`f64`:
//! the accumulator *is* the primitive, seeded with a required identity.

use crate::coder::{Coder, CoderRegistry, HolderCoder};
use crate::combine_fn::CombineFn;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/* ===================== BinaryCombineFn<V, F> ===================== */

/// Reducer over an associative, commutative binary operator.
///
/// - Accumulator: `Option<V>`
/// - Output: `Option<V>` (the identity, if one was configured, replaces `None`)
#[derive(Clone, Debug)]
pub struct BinaryCombineFn<V, F> {
    op: F,
    identity: Option<V>,
}

impl<V, F> BinaryCombineFn<V, F>
where
    F: Fn(V, V) -> V,
{
    pub fn new(op: F) -> Self {
        Self { op, identity: None }
    }

    /// Answer `identity` instead of `None` for groups that saw no input.
    /// `op(identity, x)` must equal `x`.
    pub fn with_identity(self, identity: V) -> Self {
        Self {
            identity: Some(identity),
            ..self
        }
    }

    pub fn identity(&self) -> Option<&V> {
        self.identity.as_ref()
    }
}

impl<V, F> CombineFn for BinaryCombineFn<V, F>
where
    V: Clone + Send + Sync + 'static,
    F: Fn(V, V) -> V + Send + Sync + 'static,
{
    type Input = V;
    type Accum = Option<V>;
    type Output = Option<V>;

    fn create_accumulator(&self) -> Option<V> {
        None
    }

    fn add_input(&self, acc: &mut Option<V>, input: V) {
        *acc = Some(match acc.take() {
            None => input,
            Some(cur) => (self.op)(cur, input),
        });
    }

    fn merge_accumulators(&self, accs: Vec<Option<V>>) -> Option<V> {
        accs.into_iter().flatten().reduce(|a, b| (self.op)(a, b))
    }

    fn extract_output(&self, acc: Option<V>) -> Option<V> {
        acc.or_else(|| self.identity.clone())
    }

    fn accumulator_coder(
        &self,
        _registry: &CoderRegistry,
        input_coder: Arc<dyn Coder<V>>,
    ) -> anyhow::Result<Arc<dyn Coder<Option<V>>>> {
        Ok(Arc::new(HolderCoder::new(input_coder)))
    }
}

/* ===================== BinaryCombinePrimitiveFn<T> ===================== */

/// Unboxed numeric types with a binary-operator specialization.
pub trait Primitive: Copy + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl Primitive for i32 {}
impl Primitive for i64 {}
impl Primitive for f64 {}

/// Binary-operator reducer for a primitive, with a mandatory identity.
///
/// - Accumulator: `T`, starting at the identity
/// - Output: `T`
#[derive(Clone, Copy, Debug)]
pub struct BinaryCombinePrimitiveFn<T> {
    op: fn(T, T) -> T,
    identity: T,
}

pub type BinaryCombineIntegerFn = BinaryCombinePrimitiveFn<i32>;
pub type BinaryCombineLongFn = BinaryCombinePrimitiveFn<i64>;
pub type BinaryCombineDoubleFn = BinaryCombinePrimitiveFn<f64>;

impl<T: Primitive> BinaryCombinePrimitiveFn<T> {
    /// `op(identity, x)` must equal `x`.
    pub const fn new(op: fn(T, T) -> T, identity: T) -> Self {
        Self { op, identity }
    }

    pub fn identity(&self) -> T {
        self.identity
    }
}

impl<T: Primitive> CombineFn for BinaryCombinePrimitiveFn<T> {
    type Input = T;
    type Accum = T;
    type Output = T;

    fn create_accumulator(&self) -> T {
        self.identity
    }

    fn add_input(&self, acc: &mut T, input: T) {
        *acc = (self.op)(*acc, input);
    }

    fn merge_accumulators(&self, accs: Vec<T>) -> T {
        accs.into_iter().fold(self.identity, self.op)
    }

    fn extract_output(&self, acc: T) -> T {
        acc
    }

    fn accumulator_coder(
        &self,
        _registry: &CoderRegistry,
        input_coder: Arc<dyn Coder<T>>,
    ) -> anyhow::Result<Arc<dyn Coder<T>>> {
        Ok(input_coder)
    }
}
