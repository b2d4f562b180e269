use beamfold::combiners::{Count, Sum};
use beamfold::window::{Timestamped, Window};
use beamfold::trigger::AfterCount;
use beamfold::*;
use std::sync::Arc;

#[test]
fn fixed_window_counts() -> anyhow::Result<()> {
    let p = Pipeline::default();

    // events at 0..30 step 5 into 10ms windows: two per window
    let events: Vec<Timestamped<String>> = (0..30)
        .step_by(5)
        .map(|t| Timestamped::new(t, "x".to_string()))
        .collect();

    let mut out = from_timestamped(&p, events)
        .window_into(Arc::new(FixedWindows::of(10)))
        .combine_globally(Count::new())
        .without_defaults()
        .apply()?
        .collect_windowed_par(None, None)?
        .into_iter()
        .map(|wv| (wv.windows[0], wv.value))
        .collect::<Vec<_>>();
    out.sort();

    let expected = vec![
        (Window::interval(0, 10), 2u64),
        (Window::interval(10, 20), 2u64),
        (Window::interval(20, 30), 2u64),
    ];
    assert_eq!(out, expected);
    Ok(())
}

#[test]
fn keyed_fixed_window_groups() -> anyhow::Result<()> {
    let p = Pipeline::default();

    let rows = vec![
        Timestamped::new(1, ("a".to_string(), 1u8)),
        Timestamped::new(3, ("a".to_string(), 2)),
        Timestamped::new(7, ("b".to_string(), 1)),
        Timestamped::new(12, ("a".to_string(), 1)),
        Timestamped::new(14, ("b".to_string(), 1)),
    ];

    let mut out: Vec<((String, Window), usize)> = from_timestamped(&p, rows)
        .window_into(Arc::new(FixedWindows::of(10)))
        .group_by_key()
        .collect_windowed_seq()?
        .into_iter()
        .map(|wv| ((wv.value.0, wv.windows[0]), wv.value.1.len()))
        .collect();
    out.sort();

    let w0 = Window::interval(0, 10);
    let w1 = Window::interval(10, 20);
    let expected = vec![
        (("a".to_string(), w0), 2),
        (("a".to_string(), w1), 1),
        (("b".to_string(), w0), 1),
        (("b".to_string(), w1), 1),
    ];
    assert_eq!(out, expected);
    Ok(())
}

#[test]
fn attach_timestamps_then_window() -> anyhow::Result<()> {
    let p = Pipeline::default();

    #[derive(Clone, serde::Serialize, serde::Deserialize)]
    struct Row {
        ts: i64,
        val: i32,
    }

    let rows: Vec<Row> = vec![
        Row { ts: 5, val: 1 },
        Row { ts: 8, val: 1 },
        Row { ts: 11, val: 1 },
        Row { ts: 15, val: 1 },
    ];

    let mut out: Vec<(Window, TimestampMs, i32)> = from_vec(&p, rows)
        .with_timestamps(|r: &Row| r.ts)
        .window_into(Arc::new(FixedWindows::of(10).with_offset(5)))
        .map(|r: &Row| ((), r.val))
        .combine_per_key(Sum::of_integers())
        .apply()?
        .collect_windowed_seq()?
        .into_iter()
        .map(|wv| (wv.windows[0], wv.timestamp, wv.value.1))
        .collect();
    out.sort();

    // offset 5 puts 5, 8 and 11 together
    let expected = vec![
        (Window::interval(5, 15), 14, 3),
        (Window::interval(15, 25), 24, 1),
    ];
    assert_eq!(out, expected);
    Ok(())
}

#[test]
fn session_gaps_split_activity() -> anyhow::Result<()> {
    let p = Pipeline::default();
    let clicks: Vec<Timestamped<(String, u32)>> = [(1, "u1"), (4, "u1"), (30, "u1"), (2, "u2")]
        .into_iter()
        .map(|(ts, user)| Timestamped::new(ts, (user.to_string(), 1)))
        .collect();

    let mut out: Vec<(String, Window, usize)> = from_timestamped(&p, clicks)
        .window_into(Arc::new(Sessions::with_gap(5)))
        .group_by_key()
        .collect_windowed_par(Some(2), Some(2))?
        .into_iter()
        .map(|wv| (wv.value.0, wv.windows[0], wv.value.1.len()))
        .collect();
    out.sort();

    assert_eq!(
        out,
        vec![
            ("u1".to_string(), Window::interval(1, 9), 2),
            ("u1".to_string(), Window::interval(30, 35), 1),
            ("u2".to_string(), Window::interval(2, 7), 1),
        ]
    );
    Ok(())
}

#[test]
fn unbounded_lateness_still_emits_at_end_of_input() -> anyhow::Result<()> {
    let p = Pipeline::default();
    let data: Vec<(String, i64)> = (1..=5).map(|v| ("k".to_string(), v)).collect();

    let out = from_vec(&p, data)
        .triggering(Arc::new(AfterCount::new(10)))
        .with_allowed_lateness(i64::MAX)
        .combine_per_key(Sum::of_longs())
        .apply()?
        .collect_seq()?;
    assert_eq!(out, vec![("k".to_string(), 15)]);
    Ok(())
}
