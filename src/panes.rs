//! Per-key window buffering driven by the trigger state machine.
//!
//! [`PaneGrouper`] is what `group_by_key` runs for each key: it replays the
//! key's elements in event-time order, keeps one buffer per window, asks the
//! trigger when to fire, and turns each firing into a [`Pane`].

use crate::trigger::{
    ElementEvent, ExecutableTrigger, MergeEvent, MergeResult, TimerEvent, TriggerResult,
    TriggerState,
};
use crate::window::{PaneInfo, PaneTiming, TIMESTAMP_MAX, TIMESTAMP_MIN, TimestampMs, Window, WindowedValue};
use crate::window_fn::{AccumulationMode, WindowingStrategy};
use anyhow::Result;
use std::collections::HashMap;
use std::mem::take;
use tracing::{debug, warn};

/// One firing of one window.
#[derive(Clone, Debug, PartialEq)]
pub struct Pane<V> {
    pub window: Window,
    pub info: PaneInfo,
    pub values: Vec<V>,
}

#[derive(Debug)]
struct WindowBuffer<V> {
    values: Vec<V>,
    /// Elements that have not been part of any emitted pane.
    unfired: usize,
    panes_fired: u64,
    on_time_fired: bool,
    closed: bool,
}

impl<V> Default for WindowBuffer<V> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            unfired: 0,
            panes_fired: 0,
            on_time_fired: false,
            closed: false,
        }
    }
}

/// How the input watermark moves while a key's elements are replayed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InputWatermark {
    /// Follows element timestamps, so windows can fire and expire mid-input.
    #[default]
    ElementTime,
    /// Stays at the minimum until the input is exhausted. Used when the
    /// elements are already-grouped partials whose windows may still merge.
    HeldUntilEnd,
}

/// Grouping state for a single key.
pub struct PaneGrouper<'a, V> {
    strategy: &'a WindowingStrategy,
    tree: &'a ExecutableTrigger,
    input_watermark: InputWatermark,
    state: TriggerState,
    windows: HashMap<Window, WindowBuffer<V>>,
    watermark: TimestampMs,
    panes: Vec<Pane<V>>,
}

impl<'a, V: Clone> PaneGrouper<'a, V> {
    pub fn new(strategy: &'a WindowingStrategy, tree: &'a ExecutableTrigger) -> Self {
        Self {
            strategy,
            tree,
            input_watermark: InputWatermark::default(),
            state: TriggerState::new(),
            windows: HashMap::new(),
            watermark: TIMESTAMP_MIN,
            panes: Vec::new(),
        }
    }

    pub fn with_input_watermark(mut self, input_watermark: InputWatermark) -> Self {
        self.input_watermark = input_watermark;
        self
    }

    /// Group every element of one key and return the panes in firing order.
    pub fn run(mut self, mut elements: Vec<WindowedValue<V>>) -> Result<Vec<Pane<V>>> {
        elements.sort_by_key(|wv| wv.timestamp);
        for wv in elements {
            if self.input_watermark == InputWatermark::ElementTime {
                self.advance_watermark(wv.timestamp)?;
            }
            for window in &wv.windows {
                self.process_element(*window, wv.timestamp, &wv.value)?;
            }
        }
        self.advance_watermark(TIMESTAMP_MAX)?;
        Ok(self.panes)
    }

    /// Garbage-collection time of `window`: past it, nothing can fire anymore.
    fn gc_time(&self, window: &Window) -> TimestampMs {
        self.tree
            .watermark_cutoff(window)
            .min(window.max_timestamp())
            .saturating_add(self.strategy.allowed_lateness_ms)
    }

    fn process_element(&mut self, assigned: Window, timestamp: TimestampMs, value: &V) -> Result<()> {
        if self.gc_time(&assigned) < self.watermark {
            debug!(window = ?assigned, timestamp, "dropping expired element");
            return Ok(());
        }
        self.windows.entry(assigned).or_default();
        let window = if self.strategy.window_fn.is_non_merging() {
            assigned
        } else {
            self.merge_windows(assigned)?
        };

        let buffer = self.windows.entry(window).or_default();
        if buffer.closed {
            warn!(window = ?window, timestamp, "element for closed window dropped");
            return Ok(());
        }
        buffer.values.push(value.clone());
        buffer.unfired += 1;

        let result = self
            .tree
            .process_element(&mut self.state, &ElementEvent { window, timestamp })?;
        self.handle(window, result);
        Ok(())
    }

    /// Run every merge the window function asks for and return the window
    /// `assigned` ended up in.
    fn merge_windows(&mut self, assigned: Window) -> Result<Window> {
        let mut active: Vec<Window> = self.windows.keys().copied().collect();
        active.sort();
        let mut target = assigned;
        for (old_windows, new_window) in self.strategy.window_fn.merge(&active) {
            debug!(old = ?old_windows, new = ?new_window, "merging windows");
            let mut merged = WindowBuffer::default();
            for old in &old_windows {
                if let Some(b) = self.windows.remove(old) {
                    merged.values.extend(b.values);
                    merged.unfired += b.unfired;
                    merged.panes_fired = merged.panes_fired.max(b.panes_fired);
                    merged.on_time_fired |= b.on_time_fired;
                }
            }
            self.windows.insert(new_window, merged);
            if old_windows.contains(&target) {
                target = new_window;
            }

            let event = MergeEvent {
                old_windows,
                new_window,
            };
            match self.tree.process_merge(&mut self.state, &event)? {
                MergeResult::AlreadyFinished => self.close(new_window),
                MergeResult::FireAndFinish => {
                    self.emit(new_window, true);
                    self.close(new_window);
                }
                MergeResult::Fire => self.emit(new_window, false),
                MergeResult::Continue => {}
            }
        }
        Ok(target)
    }

    fn handle(&mut self, window: Window, result: TriggerResult) {
        if result.is_fire() {
            self.emit(window, result.is_finish());
        }
        if result.is_finish() {
            self.close(window);
        }
    }

    /// Move the watermark forward, delivering due timers and collecting
    /// expired windows.
    fn advance_watermark(&mut self, to: TimestampMs) -> Result<()> {
        if to <= self.watermark {
            return Ok(());
        }
        self.watermark = to;

        while let Some(timer) = self.state.pop_due_timer(self.watermark) {
            let open = self.windows.get(&timer.window).is_some_and(|b| !b.closed);
            if !open {
                continue;
            }
            let event = TimerEvent {
                window: timer.window,
                destination: timer.node,
                timestamp: timer.timestamp,
            };
            let result = self.tree.process_timer(&mut self.state, &event)?;
            self.handle(timer.window, result);
        }

        // a gc time can saturate at the end of time, so the final advance
        // collects every window regardless
        let end_of_input = self.watermark == TIMESTAMP_MAX;
        let mut expired: Vec<(TimestampMs, Window)> = self
            .windows
            .keys()
            .map(|w| (self.gc_time(w), *w))
            .filter(|(gc, _)| end_of_input || *gc < self.watermark)
            .collect();
        expired.sort();
        for (_, window) in expired {
            let pending = self
                .windows
                .get(&window)
                .is_some_and(|b| !b.closed && b.unfired > 0);
            if pending {
                self.emit(window, true);
            }
            self.windows.remove(&window);
            self.state.clear_window(&window);
        }
        Ok(())
    }

    fn timing(&self, window: &Window, on_time_fired: bool) -> PaneTiming {
        if self.watermark <= window.max_timestamp() {
            PaneTiming::Early
        } else if on_time_fired {
            PaneTiming::Late
        } else {
            PaneTiming::OnTime
        }
    }

    fn emit(&mut self, window: Window, is_last: bool) {
        let Some(on_time_fired) = self.windows.get(&window).map(|b| b.on_time_fired) else {
            return;
        };
        let timing = self.timing(&window, on_time_fired);
        let mode = self.strategy.mode;
        let Some(buffer) = self.windows.get_mut(&window) else {
            return;
        };
        if buffer.unfired == 0 {
            return;
        }
        let values = match mode {
            AccumulationMode::Discarding => take(&mut buffer.values),
            AccumulationMode::Accumulating => buffer.values.clone(),
        };
        let info = PaneInfo {
            index: buffer.panes_fired,
            is_first: buffer.panes_fired == 0,
            is_last,
            timing,
        };
        buffer.unfired = 0;
        buffer.panes_fired += 1;
        buffer.on_time_fired |= timing == PaneTiming::OnTime;
        debug!(window = ?window, index = info.index, ?timing, values = values.len(), "pane fired");
        self.panes.push(Pane {
            window,
            info,
            values,
        });
    }

    fn close(&mut self, window: Window) {
        if let Some(b) = self.windows.get_mut(&window) {
            b.closed = true;
            b.values.clear();
        }
    }
}
