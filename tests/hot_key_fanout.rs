use anyhow::Result;
use beamfold::combiners::{IterableCombineFn, Mean, MeanAccumulator, Sum};
use beamfold::testing::*;
use beamfold::*;
use std::sync::Arc;

fn skewed(p: &Pipeline) -> PCollection<(String, i64)> {
    let mut data: Vec<(String, i64)> = (1..=6).map(|v| ("k".to_string(), v)).collect();
    data.push(("cold".to_string(), 7));
    from_vec(p, data)
}

#[test]
fn fanout_does_not_change_totals() -> Result<()> {
    let p = TestPipeline::new();
    let expected = vec![("cold".to_string(), 7i64), ("k".to_string(), 21)];
    for fanout in [0, 1, 3, 8] {
        let seq = skewed(&p)
            .combine_per_key(Sum::of_longs())
            .with_hot_key_fanout(fanout)
            .apply()?
            .collect_seq()?;
        assert_kv_collections_equal(seq, expected.clone());

        let par = skewed(&p)
            .combine_per_key(Sum::of_longs())
            .with_hot_key_fanout(fanout)
            .apply()?
            .collect_par(Some(2), Some(3))?;
        assert_kv_collections_equal(par, expected.clone());
    }
    Ok(())
}

#[test]
fn per_key_fanout_matches_the_plain_combine() -> Result<()> {
    let p = TestPipeline::new();
    let data: Vec<(u32, i64)> = (0..500u32).map(|i| (u32::from(i % 5 == 0), i64::from(i))).collect();

    let plain = from_vec(&p, data.clone())
        .combine_per_key(Sum::of_longs())
        .apply()?
        .collect_par(None, Some(6))?;
    let fanned = from_vec(&p, data)
        .combine_per_key(Sum::of_longs())
        .with_hot_key_fanout_fn(|k: &u32| if *k == 0 { 10 } else { 1 })
        .with_merge_width(3)
        .apply()?
        .collect_par(None, Some(6))?;
    assert_kv_collections_equal(fanned, plain);
    Ok(())
}

#[test]
fn fanout_keeps_fixed_windows_apart() -> Result<()> {
    let p = TestPipeline::new();
    let events = (0..20)
        .map(|ts| Timestamped::new(ts, ("k".to_string(), 1i64)))
        .collect();
    let out = from_timestamped(&p, events)
        .window_into(Arc::new(FixedWindows::of(10)))
        .combine_per_key(Sum::of_longs())
        .with_hot_key_fanout(4)
        .apply()?
        .collect_windowed_par(None, Some(3))?;

    assert_single_on_time_panes(&out);
    let mut got: Vec<(Window, i64)> = out.into_iter().map(|wv| (wv.windows[0], wv.value.1)).collect();
    got.sort();
    assert_eq!(
        got,
        vec![(Window::interval(0, 10), 10), (Window::interval(10, 20), 10)]
    );
    Ok(())
}

#[test]
fn sharded_sessions_merge_in_the_second_stage() -> Result<()> {
    let p = TestPipeline::new();
    let events = vec![
        Timestamped::new(0, ("k".to_string(), 1i64)),
        Timestamped::new(3, ("k".to_string(), 3)),
        Timestamped::new(5, ("k".to_string(), 4)),
        Timestamped::new(40, ("k".to_string(), 4)),
    ];
    let out = from_timestamped(&p, events)
        .window_into(Arc::new(Sessions::with_gap(10)))
        .combine_per_key(Sum::of_longs())
        .with_hot_key_fanout(3)
        .apply()?
        .collect_windowed_seq()?;

    let mut got: Vec<(Window, i64)> = out.into_iter().map(|wv| (wv.windows[0], wv.value.1)).collect();
    got.sort();
    assert_eq!(
        got,
        vec![(Window::interval(0, 15), 8), (Window::interval(40, 50), 4)]
    );
    Ok(())
}

#[test]
fn fanout_works_for_composite_accumulators() -> Result<()> {
    let p = TestPipeline::new();
    let data: Vec<(String, f64)> = (1..=9).map(|v| ("k".to_string(), f64::from(v))).collect();

    let means = from_vec(&p, data.clone())
        .combine_per_key(Mean::of::<f64>())
        .with_hot_key_fanout(4)
        .apply()?
        .collect_par(None, Some(3))?;
    assert_eq!(means.len(), 1);
    assert_approx_eq(means[0].1, 5.0, 1e-9);

    let largest = IterableCombineFn::new(|v: Vec<f64>| v.into_iter().fold(f64::NEG_INFINITY, f64::max))
        .with_buffer_size(2);
    let maxes = from_vec(&p, data)
        .combine_per_key(largest)
        .with_hot_key_fanout(3)
        .apply()?
        .collect_seq()?;
    assert_eq!(maxes, vec![("k".to_string(), 9.0)]);
    Ok(())
}

/// Refuses every accumulator.
struct Unencodable;

impl Coder<MeanAccumulator<f64>> for Unencodable {
    fn encode(&self, _value: &MeanAccumulator<f64>, _out: &mut Vec<u8>) -> Result<(), CoderError> {
        Err(CoderError::UnexpectedEof)
    }

    fn decode(&self, _input: &mut &[u8]) -> Result<MeanAccumulator<f64>, CoderError> {
        Err(CoderError::UnexpectedEof)
    }
}

#[test]
fn accumulator_coder_failures_surface_as_errors() -> Result<()> {
    let p = TestPipeline::new();
    let data: Vec<(String, f64)> = (1..=9).map(|v| ("k".to_string(), f64::from(v))).collect();

    for parallel in [false, true] {
        let means = from_vec(&p, data.clone())
            .combine_per_key(Mean::of::<f64>().with_coder(Arc::new(Unencodable)))
            .with_hot_key_fanout(3)
            .apply()?;
        let outcome = if parallel {
            means.collect_par(None, Some(3))
        } else {
            means.collect_seq()
        };
        let err = outcome.expect_err("an unencodable accumulator should fail the run");
        assert!(format!("{err:#}").contains("hot key pre-combine"));
    }
    Ok(())
}
