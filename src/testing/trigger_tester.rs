//! Step-by-step driver for trigger trees.
//!
//! [`TriggerTester`] owns an [`ExecutableTrigger`] and its [`TriggerState`]
//! and lets a test feed elements, merges and watermark moves one at a time,
//! looking at results and finished bits between steps. No pipeline, no
//! buffering of values.

use crate::trigger::{
    ElementEvent, ExecutableTrigger, MergeEvent, MergeResult, Timer, TimerEvent, TriggerFn,
    TriggerResult, TriggerState,
};
use crate::window::{TIMESTAMP_MIN, TimestampMs, Window};
use crate::window_fn::{GlobalWindows, WindowFn};
use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct TriggerTester {
    tree: ExecutableTrigger,
    window_fn: Arc<dyn WindowFn>,
    state: TriggerState,
    active: BTreeSet<Window>,
    watermark: TimestampMs,
}

impl TriggerTester {
    /// A tester whose elements all land in the global window.
    pub fn new(trigger: Arc<dyn TriggerFn>) -> Self {
        Self::with_window_fn(trigger, Arc::new(GlobalWindows))
    }

    pub fn with_window_fn(trigger: Arc<dyn TriggerFn>, window_fn: Arc<dyn WindowFn>) -> Self {
        Self {
            tree: ExecutableTrigger::new(trigger),
            window_fn,
            state: TriggerState::new(),
            active: BTreeSet::new(),
            watermark: TIMESTAMP_MIN,
        }
    }

    pub fn tree(&self) -> &ExecutableTrigger {
        &self.tree
    }

    pub fn state(&self) -> &TriggerState {
        &self.state
    }

    pub fn watermark(&self) -> TimestampMs {
        self.watermark
    }

    /// Assign an element at `timestamp` to its windows, run any merges the
    /// window function asks for, then deliver the element to each window.
    pub fn inject_element(&mut self, timestamp: TimestampMs) -> Result<Vec<(Window, TriggerResult)>> {
        let mut out = Vec::new();
        for assigned in self.window_fn.assign(timestamp) {
            self.active.insert(assigned);
            let mut window = assigned;
            let active: Vec<Window> = self.active.iter().copied().collect();
            for (old_windows, new_window) in self.window_fn.merge(&active) {
                if old_windows.contains(&window) {
                    window = new_window;
                }
                self.merge(old_windows, new_window)?;
            }
            out.push((window, self.element_in(window, timestamp)?));
        }
        Ok(out)
    }

    /// Deliver an element directly to `window`, bypassing window assignment.
    pub fn element_in(&mut self, window: Window, timestamp: TimestampMs) -> Result<TriggerResult> {
        self.active.insert(window);
        self.tree
            .process_element(&mut self.state, &ElementEvent { window, timestamp })
    }

    /// Merge the trigger state of `old_windows` into `new_window`.
    pub fn merge(&mut self, old_windows: Vec<Window>, new_window: Window) -> Result<MergeResult> {
        for w in &old_windows {
            self.active.remove(w);
        }
        self.active.insert(new_window);
        self.tree.process_merge(
            &mut self.state,
            &MergeEvent {
                old_windows,
                new_window,
            },
        )
    }

    /// Move the watermark to `to` and deliver every timer strictly before it,
    /// earliest first.
    pub fn advance_watermark(&mut self, to: TimestampMs) -> Result<Vec<(Window, TriggerResult)>> {
        self.watermark = self.watermark.max(to);
        let mut fired = Vec::new();
        while let Some(timer) = self.state.pop_due_timer(self.watermark) {
            let event = TimerEvent {
                window: timer.window,
                destination: timer.node,
                timestamp: timer.timestamp,
            };
            fired.push((timer.window, self.tree.process_timer(&mut self.state, &event)?));
        }
        Ok(fired)
    }

    /// Whether the whole tree has finished for `window`.
    pub fn is_finished(&self, window: &Window) -> bool {
        self.state.is_finished(window, 0)
    }

    /// Whether the sub-trigger numbered `node` has finished for `window`.
    pub fn is_node_finished(&self, window: &Window, node: usize) -> bool {
        self.state.is_finished(window, node)
    }

    pub fn timers(&self, window: &Window) -> Vec<Timer> {
        self.state.timers(window)
    }

    /// Windows that are live from the window function's point of view.
    pub fn active_windows(&self) -> Vec<Window> {
        self.active.iter().copied().collect()
    }

    /// Forget everything about `window`, as garbage collection would.
    pub fn clear_window(&mut self, window: &Window) {
        self.active.remove(window);
        self.state.clear_window(window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::{AfterCount, AfterWatermark};
    use crate::window_fn::Sessions;

    #[test]
    fn session_merges_carry_counts() {
        let mut t = TriggerTester::with_window_fn(
            Arc::new(AfterCount::new(3)),
            Arc::new(Sessions::with_gap(10)),
        );
        assert_eq!(t.inject_element(0).unwrap()[0].1, TriggerResult::Continue);
        assert_eq!(t.inject_element(12).unwrap()[0].1, TriggerResult::Continue);
        // bridges the two sessions: 1 + 1 merged, then this element makes 3
        let out = t.inject_element(6).unwrap();
        assert_eq!(out, vec![(Window::interval(0, 22), TriggerResult::FireAndFinish)]);
        assert_eq!(t.active_windows(), vec![Window::interval(0, 22)]);
    }

    #[test]
    fn watermark_delivers_timers_in_order() {
        let mut t = TriggerTester::new(Arc::new(AfterWatermark::past_end_of_window()));
        let w = Window::interval(0, 10);
        assert_eq!(t.element_in(w, 3).unwrap(), TriggerResult::Continue);
        assert_eq!(t.timers(&w).len(), 1);
        assert!(t.advance_watermark(9).unwrap().is_empty());
        assert_eq!(
            t.advance_watermark(10).unwrap(),
            vec![(w, TriggerResult::FireAndFinish)]
        );
        assert!(t.is_finished(&w));
    }
}
