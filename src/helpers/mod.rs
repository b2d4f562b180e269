pub(crate) mod combine;
pub(crate) mod combine_global;
pub(crate) mod hot_key;
pub(crate) mod keyed;
pub(crate) mod values;

pub use combine::{HotKeyFanoutFn, PerKey};
pub use combine_global::{Globally, SingletonView, WindowLookup};
