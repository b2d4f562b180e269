//! Type-erased partition buffers.
//!
//! Between nodes the runner only sees [`Partition`]s: boxed `Vec<WindowedValue<T>>`
//! whose `T` is known to the closures that produced and will consume them, not to
//! the runner. [`VecOps`] lets the runner split a source into bundles and clone a
//! node's output when more than one downstream node reads it, without knowing `T`.

use std::any::{Any, type_name};
use std::marker::PhantomData;
use std::sync::Arc;

/// A partition buffer carried between nodes at runtime.
pub type Partition = Box<dyn Any + Send + Sync>;

/// Type-erased helpers for one concrete `Vec<E>`.
///
/// Every method returns `None` when `data` is not a `Vec<E>`.
pub trait VecOps: Send + Sync {
    fn len(&self, data: &dyn Any) -> Option<usize>;

    /// Split into at most `n` contiguous, order-preserving chunks. Always
    /// returns at least one chunk, even for an empty vector.
    fn split(&self, data: &dyn Any, n: usize) -> Option<Vec<Partition>>;

    fn clone_any(&self, data: &dyn Any) -> Option<Partition>;

    /// Readable element type name, for error messages.
    fn elem_name(&self) -> &'static str;
}

struct VecOpsImpl<E>(PhantomData<fn() -> E>);

impl<E: Clone + Send + Sync + 'static> VecOps for VecOpsImpl<E> {
    fn len(&self, data: &dyn Any) -> Option<usize> {
        data.downcast_ref::<Vec<E>>().map(Vec::len)
    }

    fn split(&self, data: &dyn Any, n: usize) -> Option<Vec<Partition>> {
        let v = data.downcast_ref::<Vec<E>>()?;
        let len = v.len();
        if n <= 1 || len <= 1 {
            return Some(vec![Box::new(v.clone())]);
        }
        let chunk = len.div_ceil(n);
        Some(
            v.chunks(chunk)
                .map(|c| Box::new(c.to_vec()) as Partition)
                .collect(),
        )
    }

    fn clone_any(&self, data: &dyn Any) -> Option<Partition> {
        data.downcast_ref::<Vec<E>>()
            .map(|v| Box::new(v.clone()) as Partition)
    }

    fn elem_name(&self) -> &'static str {
        type_name::<E>()
    }
}

/// [`VecOps`] for `Vec<E>`.
pub fn vec_ops_for<E: Clone + Send + Sync + 'static>() -> Arc<dyn VecOps> {
    Arc::new(VecOpsImpl::<E>(PhantomData))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_keeps_order_and_never_returns_zero_chunks() {
        let ops = vec_ops_for::<u32>();
        let empty: Vec<u32> = Vec::new();
        assert_eq!(ops.split(&empty, 4).unwrap().len(), 1);

        let data: Vec<u32> = (0..10).collect();
        let parts = ops.split(&data, 3).unwrap();
        assert_eq!(parts.len(), 3);
        let joined: Vec<u32> = parts
            .into_iter()
            .flat_map(|p| *p.downcast::<Vec<u32>>().unwrap())
            .collect();
        assert_eq!(joined, data);
        assert!(ops.len(&"not a vec").is_none());
    }
}
