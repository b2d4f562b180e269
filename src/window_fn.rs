//! Window assignment policies and the windowing strategy a collection carries.
//!
//! The combine and trigger machinery only *consumes* windowing decisions. The
//! three window functions here cover the shapes that machinery has to handle:
//! the trivial global window, non-merging fixed windows, and merging sessions.

use crate::trigger::{DefaultTrigger, TriggerFn};
use crate::window::{TimestampMs, Window};
use std::fmt::Debug;
use std::sync::Arc;

/// Maps element timestamps to windows and declares which windows merge.
pub trait WindowFn: Send + Sync + Debug {
    /// Windows an element with `timestamp` belongs to.
    fn assign(&self, timestamp: TimestampMs) -> Vec<Window>;

    /// Given the currently active windows, return every merge to perform as
    /// `(windows being merged, resulting window)`. Non-merging functions
    /// return nothing.
    fn merge(&self, _active: &[Window]) -> Vec<(Vec<Window>, Window)> {
        Vec::new()
    }

    fn is_non_merging(&self) -> bool {
        true
    }

    /// Whether this function is compatible with the single global window,
    /// which is what makes a zero-input default output well-defined.
    fn is_global(&self) -> bool {
        false
    }
}

/// Every element belongs to [`Window::Global`].
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalWindows;

impl WindowFn for GlobalWindows {
    fn assign(&self, _timestamp: TimestampMs) -> Vec<Window> {
        vec![Window::Global]
    }

    fn is_global(&self) -> bool {
        true
    }
}

/// Tumbling windows of `size_ms`, shifted by `offset_ms`.
#[derive(Clone, Copy, Debug)]
pub struct FixedWindows {
    pub size_ms: i64,
    pub offset_ms: i64,
}

impl FixedWindows {
    pub fn of(size_ms: i64) -> Self {
        Self {
            size_ms,
            offset_ms: 0,
        }
    }

    pub fn with_offset(self, offset_ms: i64) -> Self {
        Self { offset_ms, ..self }
    }
}

impl WindowFn for FixedWindows {
    fn assign(&self, timestamp: TimestampMs) -> Vec<Window> {
        vec![Window::tumble(timestamp, self.size_ms, self.offset_ms)]
    }
}

/// Session windows: each element opens `[ts, ts + gap)` and overlapping
/// sessions coalesce.
#[derive(Clone, Copy, Debug)]
pub struct Sessions {
    pub gap_ms: i64,
}

impl Sessions {
    pub fn with_gap(gap_ms: i64) -> Self {
        Self { gap_ms }
    }
}

impl WindowFn for Sessions {
    fn assign(&self, timestamp: TimestampMs) -> Vec<Window> {
        vec![Window::interval(timestamp, timestamp.saturating_add(self.gap_ms))]
    }

    fn merge(&self, active: &[Window]) -> Vec<(Vec<Window>, Window)> {
        let mut sorted = active.to_vec();
        sorted.sort();

        let mut merges = Vec::new();
        let mut run: Vec<Window> = Vec::new();
        let mut union: Option<Window> = None;
        for w in sorted {
            match union {
                Some(u) if u.intersects(&w) => {
                    union = Some(u.span(&w));
                    run.push(w);
                }
                _ => {
                    if let Some(u) = union.take()
                        && run.len() > 1
                    {
                        merges.push((std::mem::take(&mut run), u));
                    }
                    run.clear();
                    run.push(w);
                    union = Some(w);
                }
            }
        }
        if let Some(u) = union
            && run.len() > 1
        {
            merges.push((run, u));
        }
        merges
    }

    fn is_non_merging(&self) -> bool {
        false
    }
}

/// Whether a window's later panes include the elements of earlier panes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AccumulationMode {
    /// Each pane only holds the elements that arrived since the previous firing.
    #[default]
    Discarding,
    /// Each pane holds every element seen for the window so far.
    Accumulating,
}

/// Everything a grouping needs to know about how a collection is windowed.
#[derive(Clone, Debug)]
pub struct WindowingStrategy {
    pub window_fn: Arc<dyn WindowFn>,
    pub trigger: Arc<dyn TriggerFn>,
    pub mode: AccumulationMode,
    pub allowed_lateness_ms: i64,
}

impl Default for WindowingStrategy {
    fn default() -> Self {
        Self {
            window_fn: Arc::new(GlobalWindows),
            trigger: Arc::new(DefaultTrigger),
            mode: AccumulationMode::Discarding,
            allowed_lateness_ms: 0,
        }
    }
}

impl WindowingStrategy {
    pub fn with_window_fn(&self, window_fn: Arc<dyn WindowFn>) -> Self {
        Self {
            window_fn,
            ..self.clone()
        }
    }

    pub fn with_trigger(&self, trigger: Arc<dyn TriggerFn>) -> Self {
        Self {
            trigger,
            ..self.clone()
        }
    }

    pub fn with_mode(&self, mode: AccumulationMode) -> Self {
        Self {
            mode,
            ..self.clone()
        }
    }

    pub fn with_allowed_lateness(&self, allowed_lateness_ms: i64) -> Self {
        Self {
            allowed_lateness_ms,
            ..self.clone()
        }
    }

    /// Combiner lifting (folding accumulators before the shuffle) is only
    /// sound when windows never merge and firing is the plain end-of-window
    /// default.
    pub(crate) fn allows_lifting(&self) -> bool {
        self.window_fn.is_non_merging() && self.trigger.is_default()
    }
}
