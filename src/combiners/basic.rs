//! Basic arithmetic combiners: Count, Sum, Min, Max

use crate::combine_fn::CombineFn;
use crate::combiners::binary::{
    BinaryCombineDoubleFn, BinaryCombineFn, BinaryCombineIntegerFn, BinaryCombineLongFn,
};
use std::marker::PhantomData;

/* ===================== Count<T> ===================== */

/// Number of inputs.
///
/// - Accumulator: `u64`
/// - Output: `u64`
#[derive(Clone, Copy, Debug)]
pub struct Count<T>(PhantomData<fn(T)>);

impl<T> Count<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Count<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> CombineFn for Count<T> {
    type Input = T;
    type Accum = u64;
    type Output = u64;

    fn create_accumulator(&self) -> u64 {
        0
    }

    fn add_input(&self, acc: &mut u64, _input: T) {
        *acc += 1;
    }

    fn merge_accumulators(&self, accs: Vec<u64>) -> u64 {
        accs.into_iter().sum()
    }

    fn extract_output(&self, acc: u64) -> u64 {
        acc
    }
}

/* ===================== Sum ===================== */

/// Sums of primitives. Integer sums wrap on overflow.
pub struct Sum;

impl Sum {
    pub fn of_integers() -> BinaryCombineIntegerFn {
        BinaryCombineIntegerFn::new(i32::wrapping_add, 0)
    }

    pub fn of_longs() -> BinaryCombineLongFn {
        BinaryCombineLongFn::new(i64::wrapping_add, 0)
    }

    pub fn of_doubles() -> BinaryCombineDoubleFn {
        BinaryCombineDoubleFn::new(|a, b| a + b, 0.0)
    }
}

/* ===================== Max ===================== */

/// Maxima. The primitive forms answer their type's minimum for empty
/// input; [`Max::of`] answers `None`.
pub struct Max;

impl Max {
    pub fn of_integers() -> BinaryCombineIntegerFn {
        BinaryCombineIntegerFn::new(|a, b| a.max(b), i32::MIN)
    }

    pub fn of_longs() -> BinaryCombineLongFn {
        BinaryCombineLongFn::new(|a, b| a.max(b), i64::MIN)
    }

    pub fn of_doubles() -> BinaryCombineDoubleFn {
        BinaryCombineDoubleFn::new(f64::max, f64::NEG_INFINITY)
    }

    pub fn of<T: Ord>() -> BinaryCombineFn<T, fn(T, T) -> T> {
        BinaryCombineFn::new(<T as Ord>::max as fn(T, T) -> T)
    }
}

/* ===================== Min ===================== */

/// Minima. The primitive forms answer their type's maximum for empty
/// input; [`Min::of`] answers `None`.
pub struct Min;

impl Min {
    pub fn of_integers() -> BinaryCombineIntegerFn {
        BinaryCombineIntegerFn::new(|a, b| a.min(b), i32::MAX)
    }

    pub fn of_longs() -> BinaryCombineLongFn {
        BinaryCombineLongFn::new(|a, b| a.min(b), i64::MAX)
    }

    pub fn of_doubles() -> BinaryCombineDoubleFn {
        BinaryCombineDoubleFn::new(f64::min, f64::INFINITY)
    }

    pub fn of<T: Ord>() -> BinaryCombineFn<T, fn(T, T) -> T> {
        BinaryCombineFn::new(<T as Ord>::min as fn(T, T) -> T)
    }
}
