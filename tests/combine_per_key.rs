use anyhow::Result;
use beamfold::combiners::{Count, Mean, Sum};
use beamfold::testing::*;
use beamfold::trigger::{AfterCount, Repeatedly};
use beamfold::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn sales(p: &Pipeline) -> PCollection<(String, i64)> {
    from_vec(
        p,
        vec![
            ("a".to_string(), 1),
            ("b".to_string(), 10),
            ("a".to_string(), 2),
            ("c".to_string(), 100),
            ("b".to_string(), 20),
            ("a".to_string(), 3),
        ],
    )
}

#[test]
fn sums_per_key_seq_and_par() -> Result<()> {
    let p = TestPipeline::new();
    let expected = vec![
        ("a".to_string(), 6i64),
        ("b".to_string(), 30),
        ("c".to_string(), 100),
    ];

    let seq = sales(&p).combine_per_key(Sum::of_longs()).apply()?.collect_seq()?;
    assert_kv_collections_equal(seq, expected.clone());

    let par = sales(&p)
        .combine_per_key(Sum::of_longs())
        .apply()?
        .collect_par(Some(4), Some(5))?;
    assert_kv_collections_equal(par, expected);
    Ok(())
}

#[test]
fn narrow_merge_rounds_give_the_same_totals() -> Result<()> {
    let p = TestPipeline::new();
    let data: Vec<(u32, i64)> = (0..1000).map(|i| (i % 7, i64::from(i))).collect();
    let expected: Vec<(u32, i64)> = (0..7)
        .map(|k| (k, (0..1000).filter(|i| i % 7 == k).map(i64::from).sum()))
        .collect();

    let got = from_vec(&p, data)
        .combine_per_key(Sum::of_longs())
        .with_merge_width(2)
        .apply()?
        .collect_par(None, Some(13))?;
    assert_kv_collections_equal(got, expected);
    Ok(())
}

#[test]
fn one_on_time_pane_per_key_and_fixed_window() -> Result<()> {
    let p = TestPipeline::new();
    let events = vec![
        Timestamped::new(1, ("k".to_string(), 1i64)),
        Timestamped::new(4, ("k".to_string(), 2)),
        Timestamped::new(12, ("k".to_string(), 3)),
        Timestamped::new(15, ("j".to_string(), 4)),
    ];
    let out = from_timestamped(&p, events)
        .window_into(Arc::new(FixedWindows::of(10)))
        .combine_per_key(Sum::of_longs())
        .apply()?
        .collect_windowed_par(None, Some(3))?;

    assert_single_on_time_panes(&out);
    let mut got: Vec<(Window, TimestampMs, String, i64)> = out
        .into_iter()
        .map(|wv| (wv.windows[0], wv.timestamp, wv.value.0, wv.value.1))
        .collect();
    got.sort();
    assert_eq!(
        got,
        vec![
            (Window::interval(0, 10), 9, "k".to_string(), 3),
            (Window::interval(10, 20), 19, "j".to_string(), 4),
            (Window::interval(10, 20), 19, "k".to_string(), 3),
        ]
    );
    Ok(())
}

#[test]
fn sessions_are_combined_after_merging() -> Result<()> {
    let p = TestPipeline::new();
    let events = [0, 5, 40, 45, 52]
        .into_iter()
        .map(|ts| Timestamped::new(ts, ("user".to_string(), 1u64)))
        .collect();
    let out = from_timestamped(&p, events)
        .window_into(Arc::new(Sessions::with_gap(10)))
        .combine_per_key(Count::new())
        .apply()?
        .collect_windowed_seq()?;

    let mut got: Vec<(Window, u64)> = out.into_iter().map(|wv| (wv.windows[0], wv.value.1)).collect();
    got.sort();
    assert_eq!(
        got,
        vec![(Window::interval(0, 15), 2), (Window::interval(40, 62), 3)]
    );
    Ok(())
}

#[test]
fn early_firings_follow_the_trigger() -> Result<()> {
    let p = TestPipeline::new();
    let events = (1..=5)
        .map(|i| Timestamped::new(i, ("k".to_string(), i)))
        .collect();
    let out = from_timestamped(&p, events)
        .triggering(Arc::new(Repeatedly::forever(Arc::new(AfterCount::new(2)))))
        .accumulating_fired_panes()
        .combine_per_key(Sum::of_longs())
        .apply()?
        .collect_windowed_seq()?;

    let mut panes: Vec<(u64, i64, PaneTiming)> = out
        .into_iter()
        .map(|wv| (wv.pane.index, wv.value.1, wv.pane.timing))
        .collect();
    panes.sort_by_key(|p| p.0);
    // two early firings, then the leftover when the global window closes
    assert_eq!(
        panes,
        vec![
            (0, 3, PaneTiming::Early),
            (1, 10, PaneTiming::Early),
            (2, 15, PaneTiming::OnTime),
        ]
    );
    Ok(())
}

/// Keyed fn that tags the total with its key.
struct Labelled;

impl KeyedCombineFn<String> for Labelled {
    type Input = i64;
    type Accum = i64;
    type Output = String;

    fn create_accumulator(&self, _key: &String) -> i64 {
        0
    }

    fn add_input(&self, _key: &String, acc: &mut i64, input: i64) {
        *acc += input;
    }

    fn merge_accumulators(&self, _key: &String, accs: Vec<i64>) -> i64 {
        accs.into_iter().sum()
    }

    fn extract_output(&self, key: &String, acc: i64) -> String {
        format!("{key}={acc}")
    }
}

#[test]
fn keyed_fns_see_their_key() -> Result<()> {
    let p = TestPipeline::new();
    let mut got = sales(&p)
        .combine_per_key_keyed(Labelled)
        .apply()?
        .values()
        .collect_seq()?;
    got.sort();
    assert_eq!(got, vec!["a=6", "b=30", "c=100"]);

    let mut grouped = sales(&p)
        .group_by_key()
        .combine_grouped_values_keyed(Labelled)
        .values()
        .collect_seq()?;
    grouped.sort();
    assert_eq!(grouped, got);
    Ok(())
}

#[test]
fn grouped_values_match_lifted_combine() -> Result<()> {
    let p = TestPipeline::new();
    let lifted = sales(&p)
        .map_values(|v| *v as f64)
        .combine_per_key(Mean::of::<f64>())
        .apply()?
        .collect_seq()?;
    let grouped = sales(&p)
        .map_values(|v| *v as f64)
        .group_by_key()
        .combine_grouped_values(Mean::of::<f64>())
        .collect_seq()?;

    let mut lifted = lifted;
    let mut grouped = grouped;
    lifted.sort_by(|a, b| a.0.cmp(&b.0));
    grouped.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(lifted.len(), 3);
    for ((lk, lv), (gk, gv)) in lifted.iter().zip(&grouped) {
        assert_eq!(lk, gk);
        assert_approx_eq(*lv, *gv, 1e-9);
    }
    assert_approx_eq(lifted[0].1, 2.0, 1e-9);
    Ok(())
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Spread {
    lo: i64,
    hi: i64,
    seen: bool,
}

/// Max minus min, with an accumulator type nobody registered a coder for.
struct Range;

impl CombineFn for Range {
    type Input = i64;
    type Accum = Spread;
    type Output = i64;

    fn create_accumulator(&self) -> Spread {
        Spread::default()
    }

    fn add_input(&self, acc: &mut Spread, input: i64) {
        if acc.seen {
            acc.lo = acc.lo.min(input);
            acc.hi = acc.hi.max(input);
        } else {
            *acc = Spread {
                lo: input,
                hi: input,
                seen: true,
            };
        }
    }

    fn merge_accumulators(&self, accs: Vec<Spread>) -> Spread {
        let mut out = Spread::default();
        for a in accs.into_iter().filter(|a| a.seen) {
            self.add_input(&mut out, a.lo);
            self.add_input(&mut out, a.hi);
        }
        out
    }

    fn extract_output(&self, acc: Spread) -> i64 {
        acc.hi - acc.lo
    }
}

#[test]
fn missing_accumulator_coder_fails_at_construction() -> Result<()> {
    let p = TestPipeline::new();
    let Err(err) = sales(&p).combine_per_key(Range).apply() else {
        panic!("combine without an accumulator coder should not build");
    };
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::CannotProvideCoder { .. })
    ));

    p.register_coder::<Spread>();
    let got = sales(&p).combine_per_key(Range).apply()?.collect_seq()?;
    assert_kv_collections_equal(
        got,
        vec![("a".to_string(), 2), ("b".to_string(), 10), ("c".to_string(), 0)],
    );
    Ok(())
}

#[test]
fn empty_input_produces_no_keys() -> Result<()> {
    let p = TestPipeline::new();
    let out = from_vec(&p, Vec::<(String, i64)>::new())
        .combine_per_key(Sum::of_longs())
        .apply()?
        .collect_par(None, Some(4))?;
    assert!(out.is_empty());
    Ok(())
}
