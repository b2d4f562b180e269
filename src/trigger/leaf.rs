use super::{
    ElementEvent, MergeEvent, MergeResult, TimerEvent, TriggerContext, TriggerFn, TriggerResult,
};
use crate::window::{TIMESTAMP_MAX, TimestampMs, Window};

/* ===================== AfterCount ===================== */

/// Fires and finishes once the window has seen at least `count` elements.
#[derive(Clone, Copy, Debug)]
pub struct AfterCount {
    count: u64,
}

impl AfterCount {
    pub fn new(count: u64) -> Self {
        Self { count }
    }

    fn result_for(&self, seen: u64) -> TriggerResult {
        if seen >= self.count {
            TriggerResult::FireAndFinish
        } else {
            TriggerResult::Continue
        }
    }
}

impl TriggerFn for AfterCount {
    fn on_element(
        &self,
        cx: &mut TriggerContext<'_>,
        _event: &ElementEvent,
    ) -> anyhow::Result<TriggerResult> {
        let seen = cx.counter() + 1;
        cx.set_counter(seen);
        Ok(self.result_for(seen))
    }

    /// The merged window has seen everything the old windows saw.
    fn on_merge(
        &self,
        cx: &mut TriggerContext<'_>,
        _event: &MergeEvent,
    ) -> anyhow::Result<MergeResult> {
        let seen = cx.merging_counter_sum();
        cx.set_counter(seen);
        Ok(match self.result_for(seen) {
            TriggerResult::FireAndFinish => MergeResult::FireAndFinish,
            _ => MergeResult::Continue,
        })
    }

    fn on_timer(
        &self,
        _cx: &mut TriggerContext<'_>,
        _event: &TimerEvent,
    ) -> anyhow::Result<TriggerResult> {
        Ok(TriggerResult::Continue)
    }

    fn watermark_cutoff(&self, _window: &Window) -> TimestampMs {
        TIMESTAMP_MAX
    }

    fn name(&self) -> &'static str {
        "AfterCount"
    }
}

/* ===================== AfterWatermark ===================== */

/// Fires and finishes when the watermark passes the end of the window.
#[derive(Clone, Copy, Debug)]
pub struct AfterWatermark {
    _private: (),
}

impl AfterWatermark {
    pub fn past_end_of_window() -> Self {
        Self { _private: () }
    }
}

impl TriggerFn for AfterWatermark {
    fn on_element(
        &self,
        cx: &mut TriggerContext<'_>,
        event: &ElementEvent,
    ) -> anyhow::Result<TriggerResult> {
        cx.set_timer(event.window.max_timestamp());
        Ok(TriggerResult::Continue)
    }

    fn on_merge(
        &self,
        cx: &mut TriggerContext<'_>,
        event: &MergeEvent,
    ) -> anyhow::Result<MergeResult> {
        cx.set_timer(event.new_window.max_timestamp());
        Ok(MergeResult::Continue)
    }

    fn on_timer(
        &self,
        _cx: &mut TriggerContext<'_>,
        _event: &TimerEvent,
    ) -> anyhow::Result<TriggerResult> {
        Ok(TriggerResult::FireAndFinish)
    }

    fn watermark_cutoff(&self, window: &Window) -> TimestampMs {
        window.max_timestamp()
    }

    fn name(&self) -> &'static str {
        "AfterWatermark"
    }
}

/* ===================== DefaultTrigger ===================== */

/// The trigger every collection starts with: fire when the watermark passes
/// the end of the window, and again for every late element. Never finishes.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultTrigger;

impl TriggerFn for DefaultTrigger {
    fn on_element(
        &self,
        cx: &mut TriggerContext<'_>,
        event: &ElementEvent,
    ) -> anyhow::Result<TriggerResult> {
        cx.set_timer(event.window.max_timestamp());
        Ok(TriggerResult::Continue)
    }

    fn on_merge(
        &self,
        cx: &mut TriggerContext<'_>,
        event: &MergeEvent,
    ) -> anyhow::Result<MergeResult> {
        cx.set_timer(event.new_window.max_timestamp());
        Ok(MergeResult::Continue)
    }

    fn on_timer(
        &self,
        _cx: &mut TriggerContext<'_>,
        _event: &TimerEvent,
    ) -> anyhow::Result<TriggerResult> {
        Ok(TriggerResult::Fire)
    }

    fn watermark_cutoff(&self, window: &Window) -> TimestampMs {
        window.max_timestamp()
    }

    fn name(&self) -> &'static str {
        "DefaultTrigger"
    }

    fn is_default(&self) -> bool {
        true
    }
}
