//! Value-only transforms for keyed collections.
//!
//! ## Provided methods
//! - [`map_values`](crate::PCollection::map_values) -- apply `&V -> O`, producing `(K, O)`
//! - [`keys`](crate::PCollection::keys) / [`values`](crate::PCollection::values) -- project one side
//!
//! ## Example
//! ```no_run
//! use beamfold::*;
//!
//! let p = Pipeline::default();
//! let kv = from_vec(&p, vec![("a".to_string(), 1u32), ("b".to_string(), 5)]);
//! let doubled = kv.map_values(|v| v * 2).values();
//! assert_eq!(doubled.collect_seq()?, vec![2u32, 10]);
//! # anyhow::Result::<()>::Ok(())
//! ```

use crate::{PCollection, RFBound};

impl<K: RFBound, V: RFBound> PCollection<(K, V)> {
    /// Transform only the value of each pair, keeping its key.
    pub fn map_values<O, F>(self, f: F) -> PCollection<(K, O)>
    where
        O: RFBound,
        F: 'static + Send + Sync + Fn(&V) -> O,
    {
        self.map(move |(k, v): &(K, V)| (k.clone(), f(v)))
    }

    pub fn keys(self) -> PCollection<K> {
        self.map(|(k, _): &(K, V)| k.clone())
    }

    pub fn values(self) -> PCollection<V> {
        self.map(|(_, v): &(K, V)| v.clone())
    }
}
