use super::{
    ElementEvent, MergeEvent, MergeResult, TimerEvent, TriggerContext, TriggerFn, TriggerResult,
};
use crate::error::{ConfigError, TriggerError};
use crate::window::{TIMESTAMP_MAX, TimestampMs, Window};
use std::sync::Arc;

/* ===================== AfterFirst ===================== */

/// Fires, and finishes, as soon as any child fires.
#[derive(Debug)]
pub struct AfterFirst {
    children: Vec<Arc<dyn TriggerFn>>,
}

impl AfterFirst {
    /// # Errors
    /// [`ConfigError::TooFewSubTriggers`] for fewer than two children.
    pub fn of(children: Vec<Arc<dyn TriggerFn>>) -> anyhow::Result<Self> {
        if children.len() < 2 {
            return Err(ConfigError::TooFewSubTriggers {
                trigger: "AfterFirst",
                min: 2,
                actual: children.len(),
            }
            .into());
        }
        Ok(Self { children })
    }
}

impl TriggerFn for AfterFirst {
    fn on_element(
        &self,
        cx: &mut TriggerContext<'_>,
        event: &ElementEvent,
    ) -> anyhow::Result<TriggerResult> {
        for &child in cx.sub_triggers() {
            if cx.invoke_element(child, event)?.is_fire() {
                return Ok(TriggerResult::FireAndFinish);
            }
        }
        Ok(TriggerResult::Continue)
    }

    fn on_merge(
        &self,
        cx: &mut TriggerContext<'_>,
        event: &MergeEvent,
    ) -> anyhow::Result<MergeResult> {
        let mut fired = false;
        for &child in cx.sub_triggers() {
            match cx.invoke_merge(child, event)? {
                MergeResult::AlreadyFinished => return Ok(MergeResult::AlreadyFinished),
                r if r.is_fire() => fired = true,
                _ => {}
            }
        }
        Ok(if fired {
            MergeResult::FireAndFinish
        } else {
            MergeResult::Continue
        })
    }

    fn on_timer(
        &self,
        cx: &mut TriggerContext<'_>,
        event: &TimerEvent,
    ) -> anyhow::Result<TriggerResult> {
        if cx.is_current(event.destination) {
            return Err(TriggerError::TimerAtComposite {
                trigger: self.name(),
                node: cx.node(),
            }
            .into());
        }
        let child = cx.next_step_towards(event.destination)?;
        Ok(if cx.invoke_timer(child, event)?.is_fire() {
            TriggerResult::FireAndFinish
        } else {
            TriggerResult::Continue
        })
    }

    /// The earliest child cutoff.
    fn watermark_cutoff(&self, window: &Window) -> TimestampMs {
        self.children
            .iter()
            .map(|c| c.watermark_cutoff(window))
            .min()
            .unwrap_or(TIMESTAMP_MAX)
    }

    fn sub_triggers(&self) -> &[Arc<dyn TriggerFn>] {
        &self.children
    }

    fn name(&self) -> &'static str {
        "AfterFirst"
    }
}

/* ===================== Repeatedly ===================== */

/// Runs its child over and over: whenever the child finishes, its subtree
/// is reset and the firing is reported as a plain `Fire`. Never finishes on
/// its own; see [`Repeatedly::until`].
#[derive(Debug)]
pub struct Repeatedly {
    repeated: [Arc<dyn TriggerFn>; 1],
}

impl Repeatedly {
    pub fn forever(repeated: Arc<dyn TriggerFn>) -> Self {
        Self {
            repeated: [repeated],
        }
    }

    /// Stop repeating (and finish) once `until` fires.
    pub fn until(self, until: Arc<dyn TriggerFn>) -> OrFinally {
        OrFinally::new(Arc::new(self), until)
    }

    fn child(cx: &TriggerContext<'_>) -> usize {
        cx.sub_triggers()[0]
    }
}

impl TriggerFn for Repeatedly {
    fn on_element(
        &self,
        cx: &mut TriggerContext<'_>,
        event: &ElementEvent,
    ) -> anyhow::Result<TriggerResult> {
        let child = Self::child(cx);
        let result = cx.invoke_element(child, event)?;
        if result.is_finish() {
            cx.reset_tree(child);
        }
        Ok(if result.is_fire() {
            TriggerResult::Fire
        } else {
            TriggerResult::Continue
        })
    }

    fn on_merge(
        &self,
        cx: &mut TriggerContext<'_>,
        event: &MergeEvent,
    ) -> anyhow::Result<MergeResult> {
        let child = Self::child(cx);
        let result = cx.invoke_merge(child, event)?;
        if result.is_finish() {
            cx.reset_tree(child);
        }
        Ok(if result.is_fire() {
            MergeResult::Fire
        } else {
            MergeResult::Continue
        })
    }

    fn on_timer(
        &self,
        cx: &mut TriggerContext<'_>,
        event: &TimerEvent,
    ) -> anyhow::Result<TriggerResult> {
        if cx.is_current(event.destination) {
            return Err(TriggerError::TimerAtComposite {
                trigger: self.name(),
                node: cx.node(),
            }
            .into());
        }
        let child = Self::child(cx);
        let result = cx.invoke_timer(child, event)?;
        if result.is_finish() {
            cx.reset_tree(child);
        }
        Ok(if result.is_fire() {
            TriggerResult::Fire
        } else {
            TriggerResult::Continue
        })
    }

    /// The first firing happens when the child's first firing does.
    fn watermark_cutoff(&self, window: &Window) -> TimestampMs {
        self.repeated[0].watermark_cutoff(window)
    }

    fn sub_triggers(&self) -> &[Arc<dyn TriggerFn>] {
        &self.repeated
    }

    fn name(&self) -> &'static str {
        "Repeatedly"
    }
}

/* ===================== OrFinally ===================== */

/// Behaves like `actual` until `until` fires, at which point it fires and
/// finishes.
#[derive(Debug)]
pub struct OrFinally {
    children: [Arc<dyn TriggerFn>; 2],
}

impl OrFinally {
    const ACTUAL: usize = 0;
    const UNTIL: usize = 1;

    pub fn new(actual: Arc<dyn TriggerFn>, until: Arc<dyn TriggerFn>) -> Self {
        Self {
            children: [actual, until],
        }
    }

    fn child(cx: &TriggerContext<'_>, which: usize) -> usize {
        cx.sub_triggers()[which]
    }
}

impl TriggerFn for OrFinally {
    fn on_element(
        &self,
        cx: &mut TriggerContext<'_>,
        event: &ElementEvent,
    ) -> anyhow::Result<TriggerResult> {
        let actual = Self::child(cx, Self::ACTUAL);
        let until = Self::child(cx, Self::UNTIL);
        let result = cx.invoke_element(actual, event)?;
        if cx.invoke_element(until, event)?.is_fire() {
            return Ok(TriggerResult::FireAndFinish);
        }
        Ok(result)
    }

    fn on_merge(
        &self,
        cx: &mut TriggerContext<'_>,
        event: &MergeEvent,
    ) -> anyhow::Result<MergeResult> {
        let actual = Self::child(cx, Self::ACTUAL);
        let until = Self::child(cx, Self::UNTIL);
        let result = cx.invoke_merge(actual, event)?;
        match cx.invoke_merge(until, event)? {
            MergeResult::AlreadyFinished => Ok(MergeResult::AlreadyFinished),
            r if r.is_fire() => Ok(MergeResult::FireAndFinish),
            _ => Ok(result),
        }
    }

    fn on_timer(
        &self,
        cx: &mut TriggerContext<'_>,
        event: &TimerEvent,
    ) -> anyhow::Result<TriggerResult> {
        if cx.is_current(event.destination) {
            return Err(TriggerError::TimerAtComposite {
                trigger: self.name(),
                node: cx.node(),
            }
            .into());
        }
        let child = cx.next_step_towards(event.destination)?;
        let result = cx.invoke_timer(child, event)?;
        if child == Self::child(cx, Self::UNTIL) && result.is_fire() {
            return Ok(TriggerResult::FireAndFinish);
        }
        Ok(result)
    }

    fn watermark_cutoff(&self, window: &Window) -> TimestampMs {
        self.children[Self::ACTUAL]
            .watermark_cutoff(window)
            .min(self.children[Self::UNTIL].watermark_cutoff(window))
    }

    fn sub_triggers(&self) -> &[Arc<dyn TriggerFn>] {
        &self.children
    }

    fn name(&self) -> &'static str {
        "OrFinally"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::{AfterCount, ExecutableTrigger};

    #[test]
    fn arena_is_numbered_in_pre_order() {
        let inner = AfterFirst::of(vec![
            Arc::new(AfterCount::new(3)),
            Arc::new(AfterCount::new(5)),
        ])
        .unwrap();
        let tree = ExecutableTrigger::new(Arc::new(
            Repeatedly::forever(Arc::new(inner)).until(Arc::new(AfterCount::new(100))),
        ));
        // OrFinally(0) -> Repeatedly(1) -> AfterFirst(2) -> [3, 4]; until = 5
        assert_eq!(tree.len(), 6);
        assert_eq!(tree.children(0), &[1, 5]);
        assert_eq!(tree.children(2), &[3, 4]);
        assert_eq!(tree.next_step_towards(0, 4), Some(1));
        assert_eq!(tree.next_step_towards(2, 4), Some(4));
        assert_eq!(tree.next_step_towards(2, 5), None);
    }
}
