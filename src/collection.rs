use crate::error::ConfigError;
use crate::node::{BundleContext, DynOp, Node};
use crate::pipeline::{NodeId, Pipeline};
use crate::runner::{ExecMode, Runner};
use crate::trigger::TriggerFn;
use crate::type_token::Partition;
use crate::window::{Timestamped, TimestampMs, WindowedValue};
use crate::window_fn::{AccumulationMode, WindowFn, WindowingStrategy};
use anyhow::Result;
use serde::{Serialize, de::DeserializeOwned};
use std::any::type_name;
use std::marker::PhantomData;
use std::sync::Arc;

pub trait RFBound: 'static + Send + Sync + Clone + Serialize + DeserializeOwned {}
impl<T> RFBound for T where T: 'static + Send + Sync + Clone + Serialize + DeserializeOwned {}

/// A lazy, typed handle onto one node of a [`Pipeline`], plus the windowing
/// strategy its elements carry.
#[derive(Clone)]
pub struct PCollection<T> {
    pub(crate) pipeline: Pipeline,
    pub(crate) id: NodeId,
    pub(crate) strategy: WindowingStrategy,
    _t: PhantomData<T>,
}

/// Elements in the global window at the minimum timestamp.
pub fn from_vec<T: RFBound>(p: &Pipeline, data: Vec<T>) -> PCollection<T> {
    let rows: Vec<WindowedValue<T>> = data.into_iter().map(WindowedValue::in_global_window).collect();
    source(p, rows)
}

/// Elements in the global window at their given event times.
pub fn from_timestamped<T: RFBound>(p: &Pipeline, data: Vec<Timestamped<T>>) -> PCollection<T> {
    let rows: Vec<WindowedValue<T>> = data
        .into_iter()
        .map(|t| WindowedValue::timestamped(t.value, t.ts))
        .collect();
    source(p, rows)
}

fn source<T: RFBound>(p: &Pipeline, rows: Vec<WindowedValue<T>>) -> PCollection<T> {
    let id = p.insert_node::<T>(Node::Source {
        payload: Arc::new(rows),
    });
    PCollection::new(p.clone(), id, WindowingStrategy::default())
}

pub(crate) fn downcast_rows<T: 'static>(
    input: Partition,
    stage: &'static str,
) -> Result<Vec<WindowedValue<T>>> {
    downcast_partition::<Vec<WindowedValue<T>>>(input, stage)
}

pub(crate) fn downcast_partition<X: 'static>(input: Partition, stage: &'static str) -> Result<X> {
    input.downcast::<X>().map(|b| *b).map_err(|_| {
        ConfigError::BadInputShape {
            stage,
            expected: type_name::<X>(),
        }
        .into()
    })
}

/* ===================== Stateless DynOps ===================== */

struct MapOp<I, O, F>(F, PhantomData<fn(I) -> O>);

impl<I, O, F> DynOp for MapOp<I, O, F>
where
    I: RFBound,
    O: RFBound,
    F: Send + Sync + Fn(&I) -> O + 'static,
{
    fn apply(&self, input: Partition, _cx: &mut BundleContext) -> Result<Partition> {
        let rows = downcast_rows::<I>(input, "map")?;
        let out: Vec<WindowedValue<O>> = rows.iter().map(|wv| wv.with_value(self.0(&wv.value))).collect();
        Ok(Box::new(out))
    }
}

struct FilterOp<T, P>(P, PhantomData<fn(T)>);

impl<T, P> DynOp for FilterOp<T, P>
where
    T: RFBound,
    P: Send + Sync + Fn(&T) -> bool + 'static,
{
    fn apply(&self, input: Partition, _cx: &mut BundleContext) -> Result<Partition> {
        let mut rows = downcast_rows::<T>(input, "filter")?;
        rows.retain(|wv| self.0(&wv.value));
        Ok(Box::new(rows))
    }
}

struct FlatMapOp<I, O, F>(F, PhantomData<fn(I) -> O>);

impl<I, O, F> DynOp for FlatMapOp<I, O, F>
where
    I: RFBound,
    O: RFBound,
    F: Send + Sync + Fn(&I) -> Vec<O> + 'static,
{
    fn apply(&self, input: Partition, _cx: &mut BundleContext) -> Result<Partition> {
        let rows = downcast_rows::<I>(input, "flat_map")?;
        let mut out: Vec<WindowedValue<O>> = Vec::new();
        for wv in &rows {
            out.extend(self.0(&wv.value).into_iter().map(|o| wv.with_value(o)));
        }
        Ok(Box::new(out))
    }
}

/// Sees whole envelopes and the bundle context. Used for operations that
/// rewrite timestamps or windows, and for hot-key sharding.
struct EnvelopeOp<I, O, F>(F, PhantomData<fn(I) -> O>);

impl<I, O, F> DynOp for EnvelopeOp<I, O, F>
where
    I: RFBound,
    O: RFBound,
    F: Send
        + Sync
        + Fn(WindowedValue<I>, &mut BundleContext, &mut Vec<WindowedValue<O>>) -> Result<()>
        + 'static,
{
    fn apply(&self, input: Partition, cx: &mut BundleContext) -> Result<Partition> {
        let rows = downcast_rows::<I>(input, "envelope op")?;
        let mut out: Vec<WindowedValue<O>> = Vec::with_capacity(rows.len());
        for wv in rows {
            self.0(wv, cx, &mut out)?;
        }
        Ok(Box::new(out))
    }
}

impl<T: RFBound> PCollection<T> {
    pub(crate) fn new(pipeline: Pipeline, id: NodeId, strategy: WindowingStrategy) -> Self {
        Self {
            pipeline,
            id,
            strategy,
            _t: PhantomData,
        }
    }

    /// Append `node` downstream of this collection.
    pub(crate) fn then<O: RFBound>(&self, node: Node, strategy: WindowingStrategy) -> PCollection<O> {
        let id = self.pipeline.insert_node::<O>(node);
        self.pipeline.connect(self.id, id);
        PCollection::new(self.pipeline.clone(), id, strategy)
    }

    fn stateless<O: RFBound>(self, op: Arc<dyn DynOp>) -> PCollection<O> {
        let strategy = self.strategy.clone();
        self.then(Node::Stateless(vec![op]), strategy)
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn node_id(&self) -> NodeId {
        self.id
    }

    pub fn windowing_strategy(&self) -> &WindowingStrategy {
        &self.strategy
    }

    pub fn map<O, F>(self, f: F) -> PCollection<O>
    where
        O: RFBound,
        F: 'static + Send + Sync + Fn(&T) -> O,
    {
        self.stateless(Arc::new(MapOp::<T, O, F>(f, PhantomData)))
    }

    pub fn filter<F>(self, pred: F) -> PCollection<T>
    where
        F: 'static + Send + Sync + Fn(&T) -> bool,
    {
        self.stateless(Arc::new(FilterOp::<T, F>(pred, PhantomData)))
    }

    pub fn flat_map<O, F>(self, f: F) -> PCollection<O>
    where
        O: RFBound,
        F: 'static + Send + Sync + Fn(&T) -> Vec<O>,
    {
        self.stateless(Arc::new(FlatMapOp::<T, O, F>(f, PhantomData)))
    }

    pub(crate) fn flat_map_envelopes<O, F>(self, f: F) -> PCollection<O>
    where
        O: RFBound,
        F: 'static
            + Send
            + Sync
            + Fn(WindowedValue<T>, &mut BundleContext, &mut Vec<WindowedValue<O>>) -> Result<()>,
    {
        self.stateless(Arc::new(EnvelopeOp::<T, O, F>(f, PhantomData)))
    }

    /// Set each element's event time. Window assignment is left alone; call
    /// [`window_into`](Self::window_into) afterwards to window by the new times.
    pub fn with_timestamps<F>(self, f: F) -> PCollection<T>
    where
        F: 'static + Send + Sync + Fn(&T) -> TimestampMs,
    {
        self.flat_map_envelopes(move |mut wv: WindowedValue<T>, _cx, out| {
            wv.timestamp = f(&wv.value);
            out.push(wv);
            Ok(())
        })
    }

    /// Re-assign every element's windows with `window_fn`.
    pub fn window_into(self, window_fn: Arc<dyn WindowFn>) -> PCollection<T> {
        let strategy = self.strategy.with_window_fn(Arc::clone(&window_fn));
        let mut out = self.flat_map_envelopes(move |mut wv: WindowedValue<T>, _cx, out| {
            wv.windows = window_fn.assign(wv.timestamp);
            out.push(wv);
            Ok(())
        });
        out.strategy = strategy;
        out
    }

    /// Replace the trigger used by downstream groupings.
    pub fn triggering(self, trigger: Arc<dyn TriggerFn>) -> PCollection<T> {
        let strategy = self.strategy.with_trigger(trigger);
        self.with_strategy(strategy)
    }

    pub fn accumulating_fired_panes(self) -> PCollection<T> {
        let strategy = self.strategy.with_mode(AccumulationMode::Accumulating);
        self.with_strategy(strategy)
    }

    pub fn discarding_fired_panes(self) -> PCollection<T> {
        let strategy = self.strategy.with_mode(AccumulationMode::Discarding);
        self.with_strategy(strategy)
    }

    pub fn with_allowed_lateness(self, allowed_lateness_ms: i64) -> PCollection<T> {
        let strategy = self.strategy.with_allowed_lateness(allowed_lateness_ms);
        self.with_strategy(strategy)
    }

    /// Same node, different windowing strategy.
    pub(crate) fn with_strategy(self, strategy: WindowingStrategy) -> PCollection<T> {
        PCollection { strategy, ..self }
    }

    pub fn collect_seq(self) -> Result<Vec<T>> {
        Ok(self.collect_windowed_seq()?.into_iter().map(|wv| wv.value).collect())
    }

    pub fn collect_par(self, threads: Option<usize>, partitions: Option<usize>) -> Result<Vec<T>> {
        Ok(self
            .collect_windowed_par(threads, partitions)?
            .into_iter()
            .map(|wv| wv.value)
            .collect())
    }

    /// Like [`collect_seq`](Self::collect_seq), keeping timestamps, windows and panes.
    pub fn collect_windowed_seq(self) -> Result<Vec<WindowedValue<T>>> {
        let r = Runner {
            mode: ExecMode::Sequential,
            ..Default::default()
        };
        r.run_collect::<T>(&self.pipeline, self.id)
    }

    pub fn collect_windowed_par(
        self,
        threads: Option<usize>,
        partitions: Option<usize>,
    ) -> Result<Vec<WindowedValue<T>>> {
        let r = Runner {
            mode: ExecMode::Parallel {
                threads,
                partitions,
            },
            ..Default::default()
        };
        r.run_collect::<T>(&self.pipeline, self.id)
    }
}

/// Union of several collections of the same type. The result takes the
/// windowing strategy of the first input.
pub fn flatten<T: RFBound>(p: &Pipeline, inputs: &[PCollection<T>]) -> PCollection<T> {
    let strategy = inputs
        .first()
        .map(|c| c.strategy.clone())
        .unwrap_or_default();
    let id = p.insert_node::<T>(Node::Flatten);
    for input in inputs {
        p.connect(input.id, id);
    }
    PCollection::new(p.clone(), id, strategy)
}
