//! Triggers: per-window state machines deciding when a pane fires.
//!
//! A trigger is a tree of [`TriggerFn`] values. Before use it is flattened
//! into an [`ExecutableTrigger`], an arena of nodes addressed by stable
//! pre-order indices. The tree's shape never changes after that; the only
//! mutable state is kept outside the nodes in a [`TriggerState`], indexed by
//! window and then by node index (finished bits, per-node counters, timers).
//!
//! Each node of each window is either active or finished. Three kinds of
//! event drive the machine:
//!
//! - `on_element` -- data arrived for a window.
//! - `on_merge` -- several windows coalesce into a new one.
//! - `on_timer` -- a wake-up a node scheduled has come due. Timers are owned
//!   by leaves; composites only route them towards their destination.
//!
//! Leaves: [`AfterCount`], [`AfterWatermark`], [`DefaultTrigger`].
//! Composites: [`AfterFirst`], [`Repeatedly`], [`OrFinally`].
//!
//! # Example
//! ```
//! use beamfold::trigger::{AfterCount, AfterFirst, AfterWatermark, Repeatedly};
//! use std::sync::Arc;
//!
//! // Fire every 100 elements or at the end of the window, whichever first; forever.
//! let early_or_on_time = AfterFirst::of(vec![
//!     Arc::new(AfterCount::new(100)),
//!     Arc::new(AfterWatermark::past_end_of_window()),
//! ])?;
//! let trigger = Repeatedly::forever(Arc::new(early_or_on_time));
//! # anyhow::Result::<()>::Ok(())
//! ```

mod composite;
mod executable;
mod leaf;

pub use composite::{AfterFirst, OrFinally, Repeatedly};
pub use executable::{ExecutableTrigger, Timer, TriggerContext, TriggerState};
pub use leaf::{AfterCount, AfterWatermark, DefaultTrigger};

use crate::window::{TimestampMs, Window};
use std::fmt::Debug;
use std::sync::Arc;

/// Outcome of an element or timer event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerResult {
    /// No change.
    Continue,
    /// Emit a pane and stay active.
    Fire,
    /// Emit a pane and become finished.
    FireAndFinish,
}

impl TriggerResult {
    pub fn is_fire(self) -> bool {
        matches!(self, Self::Fire | Self::FireAndFinish)
    }

    pub fn is_finish(self) -> bool {
        matches!(self, Self::FireAndFinish)
    }
}

/// Outcome of a merge event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeResult {
    Continue,
    Fire,
    FireAndFinish,
    /// One of the merged windows had already finished this node, so the
    /// merged window is finished without firing.
    AlreadyFinished,
}

impl MergeResult {
    pub fn is_fire(self) -> bool {
        matches!(self, Self::Fire | Self::FireAndFinish)
    }

    pub fn is_finish(self) -> bool {
        matches!(self, Self::FireAndFinish | Self::AlreadyFinished)
    }
}

/// New data arrived for `window`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElementEvent {
    pub window: Window,
    pub timestamp: TimestampMs,
}

/// `old_windows` are coalescing into `new_window`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeEvent {
    pub old_windows: Vec<Window>,
    pub new_window: Window,
}

/// A timer scheduled by node `destination` for `window` came due.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerEvent {
    pub window: Window,
    pub destination: usize,
    pub timestamp: TimestampMs,
}

/// A firing policy. Implement this to plug in a custom trigger.
///
/// Callbacks receive a [`TriggerContext`] positioned at the node being
/// invoked; composites use it to invoke their children, leaves use it to
/// read and write their per-window state and to schedule timers.
pub trait TriggerFn: Send + Sync + Debug {
    fn on_element(
        &self,
        cx: &mut TriggerContext<'_>,
        event: &ElementEvent,
    ) -> anyhow::Result<TriggerResult>;

    fn on_merge(
        &self,
        cx: &mut TriggerContext<'_>,
        event: &MergeEvent,
    ) -> anyhow::Result<MergeResult>;

    fn on_timer(
        &self,
        cx: &mut TriggerContext<'_>,
        event: &TimerEvent,
    ) -> anyhow::Result<TriggerResult>;

    /// The latest event time at which this trigger is still guaranteed not
    /// to have fired for `window`. Used to schedule garbage collection.
    fn watermark_cutoff(&self, window: &Window) -> TimestampMs;

    /// Children, in the order their indices are assigned.
    fn sub_triggers(&self) -> &[Arc<dyn TriggerFn>] {
        &[]
    }

    fn name(&self) -> &'static str;

    /// Whether this is the plain end-of-window trigger, which lets combines
    /// fold accumulators before grouping.
    fn is_default(&self) -> bool {
        false
    }
}
