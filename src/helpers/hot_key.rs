//! Two-stage combining for skewed keys.
//!
//! Every element of a key the fanout fn marks hot is tagged with a shard id in
//! `[0, fanout)`, round-robin within its bundle. Stage one combines per
//! (key, shard) and emits encoded accumulators. Cold keys skip stage one and
//! travel as encoded raw inputs. Stage two unions both streams and combines
//! per key, folding raw inputs with `add_input` and partial accumulators with
//! `merge_accumulators`.
//!
//! Stage one always discards fired panes, whatever the input strategy says;
//! accumulating there would fold the same elements into stage two twice.
//!
//! Combine fns cannot fail, so coder errors inside either stage travel as an
//! `Err` value next to the key and are raised by the envelope step that
//! follows the stage.

use crate::coder::{
    Coder, CoderError, CoderRegistry, InputOrAccum, InputOrAccumCoder, SerdeCoder,
    decode_from_slice, encode_to_vec, read_tag,
};
use crate::collection::flatten;
use crate::combine_fn::KeyedCombineFn;
use crate::helpers::combine::{HotKeyFanoutFn, combine_per_key_arc};
use crate::panes::InputWatermark;
use crate::window::WindowedValue;
use crate::window_fn::AccumulationMode;
use crate::{PCollection, RFBound};
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::marker::PhantomData;
use std::mem::replace;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Debug, Serialize, Deserialize)]
enum Shard<K, V> {
    Hot { key: K, shard: u32, value: V },
    Cold { key: K, value: V },
}

type Encoded = Vec<u8>;

/// A stage result, or the coder failure that spoiled it.
type Staged<T> = std::result::Result<T, String>;

pub(crate) fn combine_hot_keys<K, V, F>(
    input: PCollection<(K, V)>,
    f: Arc<F>,
    fanout: HotKeyFanoutFn<K>,
    merge_width: Option<usize>,
) -> Result<PCollection<(K, F::Output)>>
where
    K: RFBound + Eq + Hash,
    V: RFBound,
    F: KeyedCombineFn<K, Input = V>,
    F::Output: RFBound,
{
    let pipeline = input.pipeline.clone();
    let input_coder: Arc<dyn Coder<V>> = Arc::new(SerdeCoder::<V>::new());
    let accum_coder = f.accumulator_coder(&pipeline.coder_registry(), Arc::clone(&input_coder))?;
    let coder = Arc::new(InputOrAccumCoder::new(input_coder, accum_coder));
    let original = input.strategy.clone();
    debug!(node = input.id.raw(), "combine_per_key: hot key fanout");

    let tagged: PCollection<Shard<K, V>> =
        input.flat_map_envelopes(move |wv: WindowedValue<(K, V)>, cx, out| {
            let WindowedValue {
                value: (key, value),
                timestamp,
                windows,
                pane,
            } = wv;
            let n = fanout(&key);
            let value = if n > 1 {
                Shard::Hot {
                    shard: cx.next_shard(n),
                    key,
                    value,
                }
            } else {
                Shard::Cold { key, value }
            };
            out.push(WindowedValue {
                value,
                timestamp,
                windows,
                pane,
            });
            Ok(())
        });

    let hot = tagged
        .clone()
        .flat_map(|s: &Shard<K, V>| match s {
            Shard::Hot { key, shard, value } => vec![((key.clone(), *shard), value.clone())],
            Shard::Cold { .. } => Vec::new(),
        })
        .with_strategy(original.with_mode(AccumulationMode::Discarding));
    let pre = Arc::new(HotPreCombine {
        inner: Arc::clone(&f),
        coder: Arc::clone(&coder),
        _k: PhantomData,
    });
    let hot_accums = combine_per_key_arc(hot, pre, merge_width, InputWatermark::ElementTime)?
        .flat_map_envelopes(|wv: WindowedValue<((K, u32), Staged<Encoded>)>, _cx, out| {
            let ((key, _), staged) = &wv.value;
            let bytes = staged
                .clone()
                .map_err(|msg| anyhow!("hot key pre-combine: {msg}"))?;
            out.push(wv.with_value((key.clone(), bytes)));
            Ok(())
        })
        .with_strategy(original.clone());

    let cold = {
        let coder = Arc::clone(&coder);
        tagged.flat_map_envelopes(move |wv: WindowedValue<Shard<K, V>>, _cx, out| {
            if let Shard::Cold { key, value } = &wv.value {
                let bytes = encode_to_vec(coder.as_ref(), &InputOrAccum::Input(value.clone()))?;
                out.push(wv.with_value((key.clone(), bytes)));
            }
            Ok(())
        })
    };

    let unioned = flatten(&pipeline, &[hot_accums, cold]);
    let post = Arc::new(HotPostCombine {
        inner: f,
        coder,
        _k: PhantomData,
    });
    let staged = combine_per_key_arc(unioned, post, merge_width, InputWatermark::HeldUntilEnd)?;
    Ok(staged.flat_map_envelopes(|wv: WindowedValue<(K, Staged<F::Output>)>, _cx, out| {
        let (key, staged) = &wv.value;
        let output = staged
            .clone()
            .map_err(|msg| anyhow!("hot key post-combine: {msg}"))?;
        out.push(wv.with_value((key.clone(), output)));
        Ok(())
    }))
}

/// Stage one: the wrapped fn per (key, shard), emitting an encoded accumulator.
struct HotPreCombine<K, F: KeyedCombineFn<K>> {
    inner: Arc<F>,
    coder: Arc<InputOrAccumCoder<F::Input, F::Accum>>,
    _k: PhantomData<fn(K)>,
}

impl<K, F> KeyedCombineFn<(K, u32)> for HotPreCombine<K, F>
where
    K: 'static,
    F: KeyedCombineFn<K>,
    F::Input: 'static,
{
    type Input = F::Input;
    type Accum = F::Accum;
    type Output = Staged<Encoded>;

    fn create_accumulator(&self, key: &(K, u32)) -> F::Accum {
        self.inner.create_accumulator(&key.0)
    }

    fn add_input(&self, key: &(K, u32), acc: &mut F::Accum, input: F::Input) {
        self.inner.add_input(&key.0, acc, input);
    }

    fn merge_accumulators(&self, key: &(K, u32), accs: Vec<F::Accum>) -> F::Accum {
        self.inner.merge_accumulators(&key.0, accs)
    }

    fn extract_output(&self, _key: &(K, u32), acc: F::Accum) -> Staged<Encoded> {
        encode_to_vec(self.coder.as_ref(), &InputOrAccum::Accum(acc)).map_err(|e| e.to_string())
    }

    fn accumulator_coder(
        &self,
        _registry: &CoderRegistry,
        _input_coder: Arc<dyn Coder<F::Input>>,
    ) -> Result<Arc<dyn Coder<F::Accum>>> {
        Ok(self.coder.accum_coder())
    }
}

/// Stage two: folds raw inputs and merges stage-one accumulators per key.
/// The first undecodable value spoils the key's accumulator.
struct HotPostCombine<K, F: KeyedCombineFn<K>> {
    inner: Arc<F>,
    coder: Arc<InputOrAccumCoder<F::Input, F::Accum>>,
    _k: PhantomData<fn(K)>,
}

impl<K, F> KeyedCombineFn<K> for HotPostCombine<K, F>
where
    K: 'static,
    F: KeyedCombineFn<K>,
    F::Input: 'static,
{
    type Input = Encoded;
    type Accum = Staged<F::Accum>;
    type Output = Staged<F::Output>;

    fn create_accumulator(&self, key: &K) -> Staged<F::Accum> {
        Ok(self.inner.create_accumulator(key))
    }

    fn add_input(&self, key: &K, acc: &mut Staged<F::Accum>, input: Encoded) {
        let Ok(current) = acc else {
            return;
        };
        match decode_from_slice(self.coder.as_ref(), &input) {
            Ok(InputOrAccum::Input(value)) => self.inner.add_input(key, current, value),
            Ok(InputOrAccum::Accum(partial)) => {
                let folded = replace(current, self.inner.create_accumulator(key));
                *current = self.inner.merge_accumulators(key, vec![folded, partial]);
            }
            Err(e) => *acc = Err(e.to_string()),
        }
    }

    fn merge_accumulators(&self, key: &K, accs: Vec<Staged<F::Accum>>) -> Staged<F::Accum> {
        let accs = accs.into_iter().collect::<Staged<Vec<_>>>()?;
        Ok(self.inner.merge_accumulators(key, accs))
    }

    fn extract_output(&self, key: &K, acc: Staged<F::Accum>) -> Staged<F::Output> {
        acc.map(|acc| self.inner.extract_output(key, acc))
    }

    fn accumulator_coder(
        &self,
        _registry: &CoderRegistry,
        _input_coder: Arc<dyn Coder<Encoded>>,
    ) -> Result<Arc<dyn Coder<Staged<F::Accum>>>> {
        Ok(Arc::new(StagedCoder {
            accum: self.coder.accum_coder(),
        }))
    }
}

/// Tag `0` then the accumulator, or tag `1` then the failure message.
struct StagedCoder<A> {
    accum: Arc<dyn Coder<A>>,
}

impl<A> Coder<Staged<A>> for StagedCoder<A> {
    fn encode(&self, value: &Staged<A>, out: &mut Vec<u8>) -> std::result::Result<(), CoderError> {
        match value {
            Ok(acc) => {
                out.push(0);
                self.accum.encode(acc, out)
            }
            Err(msg) => {
                out.push(1);
                SerdeCoder::<String>::new().encode(msg, out)
            }
        }
    }

    fn decode(&self, input: &mut &[u8]) -> std::result::Result<Staged<A>, CoderError> {
        match read_tag(input)? {
            0 => Ok(Ok(self.accum.decode(input)?)),
            1 => Ok(Err(SerdeCoder::<String>::new().decode(input)?)),
            other => Err(CoderError::UnknownTag(other)),
        }
    }
}
