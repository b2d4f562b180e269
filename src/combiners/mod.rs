//! Built-in reducers for `combine_per_key`, `combine_globally` and
//! `combine_grouped_values`.
//!
//! - [`BinaryCombineFn`] -- fold with a binary operator, `Option` accumulator.
//! - [`BinaryCombinePrimitiveFn`] -- the same for `i32`/`i64`/`f64` with a
//!   mandatory identity; [`Sum`], [`Min`] and [`Max`] hand these out.
//! - [`IterableCombineFn`] -- buffer inputs and reduce the list with a callback.
//! - [`AccumulatingCombineFn`] -- let an [`Accumulator`] object do the work;
//!   [`Mean`] is built on it.
//! - [`Count`] -- number of inputs.
//!
//! # Examples
//! ```
//! use beamfold::CombineFn;
//! use beamfold::combiners::{IterableCombineFn, Max, Sum};
//!
//! assert_eq!(Sum::of_integers().apply(vec![1, 2, 3]), 6);
//! assert_eq!(Max::of_doubles().apply(Vec::<f64>::new()), f64::NEG_INFINITY);
//!
//! let concat = IterableCombineFn::new(|parts: Vec<String>| parts.concat()).with_buffer_size(1);
//! assert_eq!(concat.apply(vec!["a".to_string(), "b".into(), "c".into()]), "abc");
//! ```

mod accumulating;
mod basic;
mod binary;
mod iterable;

pub use accumulating::{AccumulatingCombineFn, Accumulator, Mean, MeanAccumulator};
pub use basic::{Count, Max, Min, Sum};
pub use binary::{
    BinaryCombineDoubleFn, BinaryCombineFn, BinaryCombineIntegerFn, BinaryCombineLongFn,
    BinaryCombinePrimitiveFn, Primitive,
};
pub use iterable::{DEFAULT_BUFFER_SIZE, IterableCombineFn};
