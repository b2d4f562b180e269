use super::{
    ElementEvent, MergeEvent, MergeResult, TimerEvent, TriggerFn, TriggerResult,
};
use crate::error::TriggerError;
use crate::window::{TimestampMs, Window};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::trace;

/* ===================== ExecutableTrigger ===================== */

#[derive(Debug)]
struct TriggerNode {
    trigger: Arc<dyn TriggerFn>,
    children: Vec<usize>,
    /// One past the last index of this node's subtree.
    end: usize,
}

/// A trigger tree flattened into an arena, nodes numbered in pre-order.
///
/// Node `0` is the root. Every subtree occupies a contiguous index range
/// `[i, end)`, which is what makes routing a timer to its destination and
/// resetting a subtree cheap.
#[derive(Debug)]
pub struct ExecutableTrigger {
    nodes: Vec<TriggerNode>,
}

impl ExecutableTrigger {
    pub fn new(root: Arc<dyn TriggerFn>) -> Self {
        let mut nodes = Vec::new();
        Self::push(&mut nodes, root);
        Self { nodes }
    }

    fn push(nodes: &mut Vec<TriggerNode>, trigger: Arc<dyn TriggerFn>) -> usize {
        let idx = nodes.len();
        let subs: Vec<Arc<dyn TriggerFn>> = trigger.sub_triggers().to_vec();
        nodes.push(TriggerNode {
            trigger,
            children: Vec::with_capacity(subs.len()),
            end: idx + 1,
        });
        for sub in subs {
            let child = Self::push(nodes, sub);
            nodes[idx].children.push(child);
        }
        nodes[idx].end = nodes.len();
        idx
    }

    /// Number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn trigger(&self, node: usize) -> &Arc<dyn TriggerFn> {
        &self.nodes[node].trigger
    }

    pub fn children(&self, node: usize) -> &[usize] {
        &self.nodes[node].children
    }

    /// The child of `node` whose subtree contains `destination`.
    pub fn next_step_towards(&self, node: usize, destination: usize) -> Option<usize> {
        self.nodes[node]
            .children
            .iter()
            .copied()
            .find(|&c| c <= destination && destination < self.nodes[c].end)
    }

    /// Root cutoff for `window`; see [`TriggerFn::watermark_cutoff`].
    pub fn watermark_cutoff(&self, window: &Window) -> TimestampMs {
        self.nodes[0].trigger.watermark_cutoff(window)
    }

    /// Deliver an element to the root. On error the window's state is left
    /// exactly as it was before the call.
    pub fn process_element(
        &self,
        state: &mut TriggerState,
        event: &ElementEvent,
    ) -> anyhow::Result<TriggerResult> {
        let saved = state.snapshot(&[event.window]);
        let mut cx = TriggerContext::root(self, state, event.window);
        let result = cx.invoke_element(0, event);
        if result.is_err() {
            state.restore(saved);
        }
        result
    }

    /// Merge the trigger state of `event.old_windows` into
    /// `event.new_window`. The old windows' state is consumed.
    pub fn process_merge(
        &self,
        state: &mut TriggerState,
        event: &MergeEvent,
    ) -> anyhow::Result<MergeResult> {
        let mut affected = event.old_windows.clone();
        affected.push(event.new_window);
        let saved = state.snapshot(&affected);

        let n = self.len();
        let merging: HashMap<Window, WindowTriggerState> = event
            .old_windows
            .iter()
            .map(|w| {
                let ws = state
                    .windows
                    .remove(w)
                    .unwrap_or_else(|| WindowTriggerState::new(n));
                (*w, ws)
            })
            .collect();
        state.merging = merging;

        let mut cx = TriggerContext::root(self, state, event.new_window);
        let result = cx.invoke_merge(0, event);
        state.merging.clear();
        if result.is_err() {
            state.restore(saved);
        }
        result
    }

    /// Deliver a due timer. Timers of windows that no longer exist are
    /// dropped and answer `Continue`.
    pub fn process_timer(
        &self,
        state: &mut TriggerState,
        event: &TimerEvent,
    ) -> anyhow::Result<TriggerResult> {
        if !state.windows.contains_key(&event.window) {
            trace!(window = ?event.window, "timer for destroyed window ignored");
            return Ok(TriggerResult::Continue);
        }
        let saved = state.snapshot(&[event.window]);
        let mut cx = TriggerContext::root(self, state, event.window);
        let result = cx.invoke_timer(0, event);
        if result.is_err() {
            state.restore(saved);
        }
        result
    }
}

/* ===================== TriggerState ===================== */

/// A scheduled wake-up for `node` in `window`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timer {
    pub timestamp: TimestampMs,
    pub window: Window,
    pub node: usize,
}

#[derive(Clone, Debug)]
struct WindowTriggerState {
    finished: Vec<bool>,
    counters: Vec<u64>,
    timers: BTreeSet<(TimestampMs, usize)>,
}

impl WindowTriggerState {
    fn new(nodes: usize) -> Self {
        Self {
            finished: vec![false; nodes],
            counters: vec![0; nodes],
            timers: BTreeSet::new(),
        }
    }
}

/// All mutable trigger state for one key: per window, per node.
#[derive(Clone, Debug, Default)]
pub struct TriggerState {
    windows: HashMap<Window, WindowTriggerState>,
    /// Old windows' state, only populated for the duration of a merge.
    merging: HashMap<Window, WindowTriggerState>,
}

type Snapshot = Vec<(Window, Option<WindowTriggerState>)>;

impl TriggerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `node` has finished in `window`.
    pub fn is_finished(&self, window: &Window, node: usize) -> bool {
        self.windows
            .get(window)
            .is_some_and(|ws| ws.finished.get(node).copied().unwrap_or(false))
    }

    /// Windows that currently hold trigger state.
    pub fn windows(&self) -> impl Iterator<Item = &Window> {
        self.windows.keys()
    }

    /// Forget everything about `window`, including its pending timers.
    pub fn clear_window(&mut self, window: &Window) {
        self.windows.remove(window);
    }

    /// Remove and return the earliest timer strictly before `watermark`.
    pub fn pop_due_timer(&mut self, watermark: TimestampMs) -> Option<Timer> {
        let (window, (timestamp, node)) = self
            .windows
            .iter()
            .filter_map(|(w, ws)| ws.timers.first().map(|t| (*w, *t)))
            .filter(|(_, (ts, _))| *ts < watermark)
            .min_by_key(|(w, (ts, node))| (*ts, *w, *node))?;
        if let Some(ws) = self.windows.get_mut(&window) {
            ws.timers.remove(&(timestamp, node));
        }
        Some(Timer {
            timestamp,
            window,
            node,
        })
    }

    /// Pending timers for `window`, earliest first.
    pub fn timers(&self, window: &Window) -> Vec<Timer> {
        self.windows
            .get(window)
            .map(|ws| {
                ws.timers
                    .iter()
                    .map(|&(timestamp, node)| Timer {
                        timestamp,
                        window: *window,
                        node,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn window_mut(&mut self, window: Window, nodes: usize) -> &mut WindowTriggerState {
        self.windows
            .entry(window)
            .or_insert_with(|| WindowTriggerState::new(nodes))
    }

    fn snapshot(&self, windows: &[Window]) -> Snapshot {
        windows
            .iter()
            .map(|w| (*w, self.windows.get(w).cloned()))
            .collect()
    }

    fn restore(&mut self, saved: Snapshot) {
        self.merging.clear();
        for (w, ws) in saved.into_iter().rev() {
            match ws {
                Some(ws) => {
                    self.windows.insert(w, ws);
                }
                None => {
                    self.windows.remove(&w);
                }
            }
        }
    }
}

/* ===================== TriggerContext ===================== */

/// A view of the trigger state positioned at one node and one window.
///
/// Composite triggers call the `invoke_*` methods to run a child; those
/// methods apply the finished-bit bookkeeping shared by every trigger:
/// finished children are skipped, finishing results set the bit, and a
/// merge involving a window where the child had finished answers
/// [`MergeResult::AlreadyFinished`] without consulting it.
pub struct TriggerContext<'a> {
    tree: &'a ExecutableTrigger,
    state: &'a mut TriggerState,
    node: usize,
    window: Window,
}

impl<'a> TriggerContext<'a> {
    fn root(tree: &'a ExecutableTrigger, state: &'a mut TriggerState, window: Window) -> Self {
        Self {
            tree,
            state,
            node: 0,
            window,
        }
    }

    fn at(&mut self, node: usize) -> TriggerContext<'_> {
        TriggerContext {
            tree: self.tree,
            state: &mut *self.state,
            node,
            window: self.window,
        }
    }

    /// Index of the node being invoked.
    pub fn node(&self) -> usize {
        self.node
    }

    /// The window being processed (the new window, during a merge).
    pub fn window(&self) -> Window {
        self.window
    }

    /// Indices of the current node's children.
    pub fn sub_triggers(&self) -> &'a [usize] {
        self.tree.children(self.node)
    }

    pub fn is_current(&self, destination: usize) -> bool {
        self.node == destination
    }

    /// The child of the current node that leads to `destination`.
    pub fn next_step_towards(&self, destination: usize) -> anyhow::Result<usize> {
        self.tree
            .next_step_towards(self.node, destination)
            .ok_or_else(|| {
                TriggerError::NoPathToTimer {
                    node: self.node,
                    destination,
                }
                .into()
            })
    }

    pub fn invoke_element(
        &mut self,
        child: usize,
        event: &ElementEvent,
    ) -> anyhow::Result<TriggerResult> {
        if self.is_finished(child) {
            return Ok(TriggerResult::Continue);
        }
        let trigger = Arc::clone(self.tree.trigger(child));
        let result = trigger.on_element(&mut self.at(child), event)?;
        if result.is_finish() {
            self.set_finished(child, true);
        }
        Ok(result)
    }

    pub fn invoke_merge(
        &mut self,
        child: usize,
        event: &MergeEvent,
    ) -> anyhow::Result<MergeResult> {
        let already = self
            .state
            .merging
            .values()
            .any(|ws| ws.finished[child]);
        if already {
            self.set_finished(child, true);
            return Ok(MergeResult::AlreadyFinished);
        }
        let trigger = Arc::clone(self.tree.trigger(child));
        let result = trigger.on_merge(&mut self.at(child), event)?;
        if result.is_finish() {
            self.set_finished(child, true);
        }
        Ok(result)
    }

    pub fn invoke_timer(
        &mut self,
        child: usize,
        event: &TimerEvent,
    ) -> anyhow::Result<TriggerResult> {
        if self.is_finished(child) {
            return Ok(TriggerResult::Continue);
        }
        let trigger = Arc::clone(self.tree.trigger(child));
        trace!(node = child, destination = event.destination, "routing timer");
        let result = trigger.on_timer(&mut self.at(child), event)?;
        if result.is_finish() {
            self.set_finished(child, true);
        }
        Ok(result)
    }

    /// Return `node`'s whole subtree to its initial state in the current
    /// window: finished bits, counters and timers.
    pub fn reset_tree(&mut self, node: usize) {
        let end = self.tree.nodes[node].end;
        let n = self.tree.len();
        let ws = self.state.window_mut(self.window, n);
        for i in node..end {
            ws.finished[i] = false;
            ws.counters[i] = 0;
        }
        ws.timers.retain(|&(_, owner)| owner < node || owner >= end);
    }

    pub fn is_finished(&self, node: usize) -> bool {
        self.state.is_finished(&self.window, node)
    }

    fn set_finished(&mut self, node: usize, finished: bool) {
        let n = self.tree.len();
        self.state.window_mut(self.window, n).finished[node] = finished;
    }

    /// The current node's counter in the current window.
    pub fn counter(&self) -> u64 {
        self.state
            .windows
            .get(&self.window)
            .map_or(0, |ws| ws.counters[self.node])
    }

    pub fn set_counter(&mut self, value: u64) {
        let (n, node) = (self.tree.len(), self.node);
        self.state.window_mut(self.window, n).counters[node] = value;
    }

    /// Sum of the current node's counters across the windows being merged.
    pub fn merging_counter_sum(&self) -> u64 {
        self.state
            .merging
            .values()
            .map(|ws| ws.counters[self.node])
            .sum()
    }

    /// Schedule a wake-up for the current node at `timestamp`.
    pub fn set_timer(&mut self, timestamp: TimestampMs) {
        let (n, node) = (self.tree.len(), self.node);
        self.state
            .window_mut(self.window, n)
            .timers
            .insert((timestamp, node));
    }

    pub fn delete_timer(&mut self, timestamp: TimestampMs) {
        let node = self.node;
        if let Some(ws) = self.state.windows.get_mut(&self.window) {
            ws.timers.remove(&(timestamp, node));
        }
    }
}
