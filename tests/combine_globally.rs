use anyhow::Result;
use beamfold::combiners::{Max, Sum};
use beamfold::testing::*;
use beamfold::*;
use std::sync::Arc;

#[test]
fn empty_input_yields_the_default() -> Result<()> {
    let p = TestPipeline::new();
    let sums = from_vec(&p, Vec::<i64>::new())
        .combine_globally(Sum::of_longs())
        .apply()?
        .collect_seq()?;
    assert_eq!(sums, vec![0]);

    let maxes = from_vec(&p, Vec::<f64>::new())
        .combine_globally(Max::of_doubles())
        .apply()?
        .collect_par(None, Some(4))?;
    assert_eq!(maxes, vec![f64::NEG_INFINITY]);

    let none = from_vec(&p, Vec::<i64>::new())
        .combine_globally(Sum::of_longs())
        .without_defaults()
        .apply()?
        .collect_seq()?;
    assert!(none.is_empty());
    Ok(())
}

#[test]
fn sums_one_to_a_hundred_every_way() -> Result<()> {
    let p = TestPipeline::new();
    let data: Vec<i64> = (1..=100).collect();

    let seq = from_vec(&p, data.clone())
        .combine_globally(Sum::of_longs())
        .apply()?
        .collect_seq()?;
    assert_eq!(seq, vec![5050]);

    let par = from_vec(&p, data.clone())
        .combine_globally(Sum::of_longs())
        .apply()?
        .collect_par(Some(4), Some(7))?;
    assert_eq!(par, vec![5050]);

    let sharded = from_vec(&p, data)
        .combine_globally(Sum::of_longs())
        .with_fanout(4)
        .apply()?
        .collect_par(None, Some(5))?;
    assert_eq!(sharded, vec![5050]);
    Ok(())
}

fn windowed(p: &Pipeline) -> PCollection<i64> {
    let events = vec![
        Timestamped::new(1, 1i64),
        Timestamped::new(7, 2),
        Timestamped::new(11, 10),
        Timestamped::new(35, 100),
    ];
    from_timestamped(p, events).window_into(Arc::new(FixedWindows::of(10)))
}

#[test]
fn defaults_require_global_windows() -> Result<()> {
    let p = TestPipeline::new();
    let Err(err) = windowed(&p).combine_globally(Sum::of_longs()).apply() else {
        panic!("a default outside the global window should not build");
    };
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::DefaultOutsideGlobalWindows)
    ));

    let out = windowed(&p)
        .combine_globally(Sum::of_longs())
        .without_defaults()
        .apply()?
        .collect_windowed_seq()?;
    let mut got: Vec<(Window, i64)> = out.into_iter().map(|wv| (wv.windows[0], wv.value)).collect();
    got.sort();
    assert_eq!(
        got,
        vec![
            (Window::interval(0, 10), 3),
            (Window::interval(10, 20), 10),
            (Window::interval(30, 40), 100),
        ]
    );
    Ok(())
}

#[test]
fn singleton_view_looks_up_by_window() -> Result<()> {
    let p = TestPipeline::new();
    let view = windowed(&p).combine_globally(Sum::of_longs()).as_singleton_view()?;
    let lookup = view.materialize()?;
    assert_eq!(lookup.len(), 3);
    assert_eq!(lookup.get(&Window::interval(10, 20)), Some(10));
    // a window with no input gets the empty-input output
    assert_eq!(lookup.get(&Window::interval(20, 30)), Some(0));

    let bare = windowed(&p)
        .combine_globally(Sum::of_longs())
        .without_defaults()
        .as_singleton_view()?
        .materialize()?;
    assert_eq!(bare.get(&Window::interval(20, 30)), None);
    Ok(())
}

#[test]
fn singleton_view_of_empty_global_input() -> Result<()> {
    let p = TestPipeline::new();
    let lookup = from_vec(&p, Vec::<i64>::new())
        .combine_globally(Max::of_longs())
        .as_singleton_view()?
        .materialize()?;
    assert!(lookup.is_empty());
    assert_eq!(lookup.get(&Window::Global), Some(i64::MIN));

    let lookup = from_vec(&p, vec![3i64, 9, 4])
        .combine_globally(Max::of_longs())
        .as_singleton_view()?
        .materialize()?;
    assert_eq!(lookup.get(&Window::Global), Some(9));
    Ok(())
}
