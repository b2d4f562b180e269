//! Window identities, timestamps, and the windowed element envelope.
//!
//! Every element flowing through a [`Pipeline`](crate::Pipeline) is carried as a
//! [`WindowedValue`]: the user value plus its event timestamp, the windows it
//! was assigned to, and (after grouping) the [`PaneInfo`] of the firing that
//! produced it.

use serde::{Deserialize, Serialize};

/// Milliseconds since UNIX epoch (UTC).
pub type TimestampMs = i64;

/// Smallest representable event time.
pub const TIMESTAMP_MIN: TimestampMs = i64::MIN;

/// Largest representable event time. The watermark reaches this value once
/// all input has been consumed.
pub const TIMESTAMP_MAX: TimestampMs = i64::MAX;

/// The global window ends one day before the end of time, so that
/// `max_timestamp + allowed_lateness` stays representable for sane lateness
/// values.
pub const GLOBAL_WINDOW_MAX: TimestampMs = TIMESTAMP_MAX - 86_400_000;

/// An opaque grouping identity with a defined end.
///
/// `Interval` windows are closed-open: `[start, end)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Window {
    /// The single implicit window every element belongs to by default.
    Global,
    /// A closed-open time range.
    Interval {
        start: TimestampMs,
        end: TimestampMs,
    },
}

impl Window {
    #[inline]
    pub fn interval(start: TimestampMs, end: TimestampMs) -> Self {
        debug_assert!(end >= start);
        Self::Interval { start, end }
    }

    /// The last timestamp that still belongs to this window. Output produced
    /// for the window is stamped with this value.
    #[inline]
    pub fn max_timestamp(&self) -> TimestampMs {
        match self {
            Self::Global => GLOBAL_WINDOW_MAX,
            Self::Interval { end, .. } => end.saturating_sub(1),
        }
    }

    /// Compute the tumbling window `[win_start, win_start + size)` for a timestamp.
    /// `size_ms` > 0; `offset_ms` may be negative or positive.
    #[inline]
    pub fn tumble(ts: TimestampMs, size_ms: i64, offset_ms: i64) -> Self {
        debug_assert!(size_ms > 0);
        let rel = ts - offset_ms;
        let k = div_floor(rel, size_ms);
        let start = k * size_ms + offset_ms;
        Self::Interval {
            start,
            end: start + size_ms,
        }
    }

    /// Whether two interval windows overlap. The global window intersects
    /// everything.
    pub fn intersects(&self, other: &Window) -> bool {
        match (self, other) {
            (Self::Interval { start, end }, Self::Interval { start: s2, end: e2 }) => {
                start < e2 && s2 < end
            }
            _ => true,
        }
    }

    /// The smallest window covering both `self` and `other`.
    pub fn span(&self, other: &Window) -> Window {
        match (self, other) {
            (Self::Interval { start, end }, Self::Interval { start: s2, end: e2 }) => {
                Self::Interval {
                    start: *start.min(s2),
                    end: *end.max(e2),
                }
            }
            _ => Self::Global,
        }
    }
}

/// Floor division for i64 (unlike `/` which truncates toward zero).
#[inline]
fn div_floor(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if (r != 0) && ((r > 0) != (b > 0)) {
        q - 1
    } else {
        q
    }
}

/// A timestamped element (event-time semantics).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timestamped<T> {
    pub ts: TimestampMs,
    pub value: T,
}

impl<T> Timestamped<T> {
    #[inline]
    pub fn new(ts: TimestampMs, value: T) -> Self {
        Self { ts, value }
    }
}

/// When a pane fired relative to the end of its window.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaneTiming {
    /// Fired before the watermark passed the end of the window.
    Early,
    /// Fired by the watermark passing the end of the window.
    OnTime,
    /// Fired after the watermark passed the end of the window.
    Late,
    /// The element has not been through a grouping yet.
    Unknown,
}

/// Describes which firing of a window produced an element.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaneInfo {
    /// Zero-based firing index within the window.
    pub index: u64,
    pub is_first: bool,
    pub is_last: bool,
    pub timing: PaneTiming,
}

impl PaneInfo {
    /// Pane info for elements that have not been grouped.
    pub const NO_FIRING: PaneInfo = PaneInfo {
        index: 0,
        is_first: true,
        is_last: true,
        timing: PaneTiming::Unknown,
    };

    /// The only pane of a window, fired when the watermark passed its end.
    pub const ON_TIME_AND_ONLY: PaneInfo = PaneInfo {
        index: 0,
        is_first: true,
        is_last: true,
        timing: PaneTiming::OnTime,
    };
}

impl Default for PaneInfo {
    fn default() -> Self {
        Self::NO_FIRING
    }
}

/// The envelope every element travels in between pipeline nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowedValue<T> {
    pub value: T,
    pub timestamp: TimestampMs,
    pub windows: Vec<Window>,
    pub pane: PaneInfo,
}

impl<T> WindowedValue<T> {
    /// A value in the global window at the minimum timestamp.
    pub fn in_global_window(value: T) -> Self {
        Self::timestamped(value, TIMESTAMP_MIN)
    }

    /// A value in the global window at `timestamp`.
    pub fn timestamped(value: T, timestamp: TimestampMs) -> Self {
        Self {
            value,
            timestamp,
            windows: vec![Window::Global],
            pane: PaneInfo::NO_FIRING,
        }
    }

    /// A value produced by a firing of `window`, stamped at the window's end.
    pub fn of_pane(value: T, window: Window, pane: PaneInfo) -> Self {
        Self {
            value,
            timestamp: window.max_timestamp(),
            windows: vec![window],
            pane,
        }
    }

    /// Replace the value, keeping timestamp, windows and pane.
    pub fn with_value<O>(&self, value: O) -> WindowedValue<O> {
        WindowedValue {
            value,
            timestamp: self.timestamp,
            windows: self.windows.clone(),
            pane: self.pane,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tumble_handles_negative_timestamps() {
        assert_eq!(Window::tumble(-1, 10, 0), Window::interval(-10, 0));
        assert_eq!(Window::tumble(0, 10, 0), Window::interval(0, 10));
        assert_eq!(Window::tumble(19, 10, 5), Window::interval(15, 25));
    }

    #[test]
    fn max_timestamp_is_end_minus_one() {
        assert_eq!(Window::interval(0, 10).max_timestamp(), 9);
        assert_eq!(Window::Global.max_timestamp(), GLOBAL_WINDOW_MAX);
        assert_eq!(Window::interval(TIMESTAMP_MIN, TIMESTAMP_MIN).max_timestamp(), TIMESTAMP_MIN);
    }

    #[test]
    fn span_and_intersection() {
        let a = Window::interval(0, 10);
        let b = Window::interval(5, 15);
        let c = Window::interval(15, 20);
        assert!(a.intersects(&b));
        assert!(!b.intersects(&c));
        assert_eq!(a.span(&c), Window::interval(0, 20));
    }
}
