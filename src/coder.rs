//! Byte encodings for values that cross a grouping boundary.
//!
//! Leaf values are encoded with [`postcard`], which is self-delimiting, so
//! composite coders can concatenate their parts without extra framing:
//!
//! - [`SerdeCoder`] -- any `Serialize + DeserializeOwned` type.
//! - [`HolderCoder`] -- `Option<V>` with an explicit presence byte.
//! - [`ListCoder`] -- a length prefix followed by each element.
//! - [`InputOrAccumCoder`] -- a discriminant byte, then a raw input or an
//!   accumulator.
//!
//! A [`CoderRegistry`] answers "how do I encode `T`?" for combine stages that
//! need an accumulator coder and don't know how to build one themselves.

use crate::error::ConfigError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

/// Failures while encoding or decoding bytes.
#[derive(Debug, Error)]
pub enum CoderError {
    #[error("postcard: {0}")]
    Postcard(#[from] postcard::Error),
    #[error("unknown variant tag {0}")]
    UnknownTag(u8),
    #[error("unexpected end of input")]
    UnexpectedEof,
}

/// Encodes and decodes values of `T`.
pub trait Coder<T>: Send + Sync {
    /// Append the encoding of `value` to `out`.
    fn encode(&self, value: &T, out: &mut Vec<u8>) -> Result<(), CoderError>;

    /// Decode one value from the front of `input`, advancing it past the
    /// consumed bytes.
    fn decode(&self, input: &mut &[u8]) -> Result<T, CoderError>;
}

/// Encode a single value into a fresh buffer.
pub fn encode_to_vec<T>(coder: &dyn Coder<T>, value: &T) -> Result<Vec<u8>, CoderError> {
    let mut out = Vec::new();
    coder.encode(value, &mut out)?;
    Ok(out)
}

/// Decode a single value from `bytes`.
pub fn decode_from_slice<T>(coder: &dyn Coder<T>, bytes: &[u8]) -> Result<T, CoderError> {
    let mut input = bytes;
    coder.decode(&mut input)
}

pub(crate) fn read_tag(input: &mut &[u8]) -> Result<u8, CoderError> {
    let (&tag, rest) = input.split_first().ok_or(CoderError::UnexpectedEof)?;
    *input = rest;
    Ok(tag)
}

/* ===================== SerdeCoder<T> ===================== */

/// Postcard-backed coder for serde types.
pub struct SerdeCoder<T>(PhantomData<fn() -> T>);

impl<T> SerdeCoder<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for SerdeCoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Coder<T> for SerdeCoder<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T, out: &mut Vec<u8>) -> Result<(), CoderError> {
        out.extend_from_slice(&postcard::to_allocvec(value)?);
        Ok(())
    }

    fn decode(&self, input: &mut &[u8]) -> Result<T, CoderError> {
        let (value, rest) = postcard::take_from_bytes::<T>(input)?;
        *input = rest;
        Ok(value)
    }
}

/* ===================== HolderCoder<V> ===================== */

/// Encodes an optional value as a presence byte (`0` absent, `1` present)
/// followed by the inner encoding.
pub struct HolderCoder<V> {
    inner: Arc<dyn Coder<V>>,
}

impl<V> HolderCoder<V> {
    pub fn new(inner: Arc<dyn Coder<V>>) -> Self {
        Self { inner }
    }
}

impl<V> Coder<Option<V>> for HolderCoder<V> {
    fn encode(&self, value: &Option<V>, out: &mut Vec<u8>) -> Result<(), CoderError> {
        match value {
            None => out.push(0),
            Some(v) => {
                out.push(1);
                self.inner.encode(v, out)?;
            }
        }
        Ok(())
    }

    fn decode(&self, input: &mut &[u8]) -> Result<Option<V>, CoderError> {
        match read_tag(input)? {
            0 => Ok(None),
            1 => Ok(Some(self.inner.decode(input)?)),
            other => Err(CoderError::UnknownTag(other)),
        }
    }
}

/* ===================== ListCoder<V> ===================== */

/// Encodes a `Vec<V>` as a varint length followed by each element.
pub struct ListCoder<V> {
    inner: Arc<dyn Coder<V>>,
}

impl<V> ListCoder<V> {
    pub fn new(inner: Arc<dyn Coder<V>>) -> Self {
        Self { inner }
    }
}

impl<V> Coder<Vec<V>> for ListCoder<V> {
    fn encode(&self, value: &Vec<V>, out: &mut Vec<u8>) -> Result<(), CoderError> {
        out.extend_from_slice(&postcard::to_allocvec(&(value.len() as u64))?);
        for v in value {
            self.inner.encode(v, out)?;
        }
        Ok(())
    }

    fn decode(&self, input: &mut &[u8]) -> Result<Vec<V>, CoderError> {
        let (len, rest) = postcard::take_from_bytes::<u64>(input)?;
        *input = rest;
        let mut out = Vec::with_capacity(len.min(1024) as usize);
        for _ in 0..len {
            out.push(self.inner.decode(input)?);
        }
        Ok(out)
    }
}

/* ===================== InputOrAccumCoder<I, A> ===================== */

/// Either a raw input that still has to be folded, or an accumulator that
/// already holds some inputs. Carried across the hot-key shuffle.
#[derive(Clone, Debug, PartialEq)]
pub enum InputOrAccum<I, A> {
    Input(I),
    Accum(A),
}

/// Tag `0` then the input's encoding, or tag `1` then the accumulator's.
pub struct InputOrAccumCoder<I, A> {
    input: Arc<dyn Coder<I>>,
    accum: Arc<dyn Coder<A>>,
}

impl<I, A> InputOrAccumCoder<I, A> {
    const INPUT: u8 = 0;
    const ACCUM: u8 = 1;

    pub fn new(input: Arc<dyn Coder<I>>, accum: Arc<dyn Coder<A>>) -> Self {
        Self { input, accum }
    }

    pub fn accum_coder(&self) -> Arc<dyn Coder<A>> {
        Arc::clone(&self.accum)
    }
}

impl<I, A> Coder<InputOrAccum<I, A>> for InputOrAccumCoder<I, A> {
    fn encode(&self, value: &InputOrAccum<I, A>, out: &mut Vec<u8>) -> Result<(), CoderError> {
        match value {
            InputOrAccum::Input(i) => {
                out.push(Self::INPUT);
                self.input.encode(i, out)
            }
            InputOrAccum::Accum(a) => {
                out.push(Self::ACCUM);
                self.accum.encode(a, out)
            }
        }
    }

    fn decode(&self, input: &mut &[u8]) -> Result<InputOrAccum<I, A>, CoderError> {
        match read_tag(input)? {
            Self::INPUT => Ok(InputOrAccum::Input(self.input.decode(input)?)),
            Self::ACCUM => Ok(InputOrAccum::Accum(self.accum.decode(input)?)),
            other => Err(CoderError::UnknownTag(other)),
        }
    }
}

/* ===================== CoderRegistry ===================== */

/// Type-indexed lookup of coders.
///
/// The default registry knows the primitive types, `String`, `bool` and
/// `()`. Anything else must be [`register`](CoderRegistry::register)ed
/// before a combine stage that needs it is constructed.
#[derive(Clone)]
pub struct CoderRegistry {
    coders: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Default for CoderRegistry {
    fn default() -> Self {
        let mut r = Self {
            coders: HashMap::new(),
        };
        r.register::<()>();
        r.register::<bool>();
        r.register::<u8>();
        r.register::<u16>();
        r.register::<u32>();
        r.register::<u64>();
        r.register::<usize>();
        r.register::<i8>();
        r.register::<i16>();
        r.register::<i32>();
        r.register::<i64>();
        r.register::<f32>();
        r.register::<f64>();
        r.register::<String>();
        r
    }
}

impl CoderRegistry {
    /// Register the postcard coder for a serde type.
    pub fn register<T>(&mut self)
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        self.register_coder::<T>(Arc::new(SerdeCoder::<T>::new()));
    }

    /// Register a hand-written coder for `T`, replacing any previous one.
    pub fn register_coder<T: 'static>(&mut self, coder: Arc<dyn Coder<T>>) {
        self.coders.insert(TypeId::of::<T>(), Arc::new(coder));
    }

    /// Look up the coder for `T`.
    ///
    /// # Errors
    /// [`ConfigError::CannotProvideCoder`] if nothing was registered for `T`.
    pub fn coder_for<T: 'static>(&self) -> Result<Arc<dyn Coder<T>>, ConfigError> {
        self.coders
            .get(&TypeId::of::<T>())
            .and_then(|c| c.downcast_ref::<Arc<dyn Coder<T>>>())
            .cloned()
            .ok_or(ConfigError::CannotProvideCoder {
                type_name: type_name::<T>(),
            })
    }
}
