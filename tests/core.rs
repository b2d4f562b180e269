use beamfold::combiners::Count;
use beamfold::testing::*;
use beamfold::{PaneTiming, Window, flatten, from_vec};
use std::collections::HashMap;

#[test]
fn map_filter_flatmap_chain() -> anyhow::Result<()> {
    let p = TestPipeline::new();
    let lines = from_vec(
        &p,
        vec![
            "The quick brown fox".to_string(),
            "jumps over the lazy dog".to_string(),
        ],
    );

    let words = lines.flat_map(|s: &String| {
        s.split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
    });
    let filtered = words.filter(|w: &String| w.len() >= 4);

    let out = filtered.collect_seq()?;

    assert_collections_equal(
        &out,
        &[
            "quick".to_string(),
            "brown".to_string(),
            "jumps".to_string(),
            "over".to_string(),
            "lazy".to_string(),
        ],
    );
    assert_eq!(p.node_count(), 3);
    Ok(())
}

#[test]
fn key_by_and_group_by_key_counts_words() -> anyhow::Result<()> {
    let p = TestPipeline::new();
    let words = from_vec(
        &p,
        vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
            "c".to_string(),
            "b".to_string(),
        ],
    );
    let keyed = words.key_by(|w: &String| w.clone());
    let grouped = keyed.group_by_key();
    let out = grouped.collect_windowed_seq()?;

    let mut m: HashMap<String, usize> = HashMap::new();
    for wv in out {
        assert_eq!(wv.windows, vec![Window::Global]);
        assert_eq!(wv.pane.timing, PaneTiming::OnTime);
        m.insert(wv.value.0, wv.value.1.len());
    }
    assert_eq!(m.get("a"), Some(&2usize));
    assert_eq!(m.get("b"), Some(&2usize));
    assert_eq!(m.get("c"), Some(&1usize));
    Ok(())
}

#[test]
fn combine_per_key_counts() -> anyhow::Result<()> {
    let p = TestPipeline::new();
    let words = from_vec(
        &p,
        vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
            "c".to_string(),
            "b".to_string(),
        ],
    );

    let counts = words
        .key_by(|w: &String| w.clone())
        .combine_per_key(Count::new())
        .apply()?;

    let out = counts.collect_par(None, Some(2))?;
    assert_kv_collections_equal(
        out,
        vec![
            ("a".to_string(), 2u64),
            ("b".to_string(), 2),
            ("c".to_string(), 1),
        ],
    );
    Ok(())
}

#[test]
fn map_values_keys_and_values() -> anyhow::Result<()> {
    let p = TestPipeline::new();
    let nums = from_vec(&p, vec![1u32, 2, 3, 4, 5]);

    let kv = nums.key_by(|n: &u32| {
        if (*n).is_multiple_of(2) {
            "even"
        } else {
            "odd"
        }
        .to_string()
    });
    let doubled = kv.map_values(|v: &u32| v * 2);

    let mut values = doubled.clone().values().collect_seq()?;
    values.sort_unstable();
    assert_eq!(values, vec![2, 4, 6, 8, 10]);

    let keys = doubled.keys().collect_seq()?;
    assert_collections_unordered_equal(
        &keys,
        &["odd", "even", "odd", "even", "odd"].map(String::from),
    );
    Ok(())
}

#[test]
fn flatten_unions_inputs() -> anyhow::Result<()> {
    let p = TestPipeline::new();
    let a = from_vec(&p, vec![1i64, 2]);
    let b = from_vec(&p, vec![3i64]);
    let c = from_vec(&p, Vec::<i64>::new());

    let all = flatten(&p, &[a, b, c]);
    assert_eq!(p.edge_count(), 3);
    let out = all.collect_par(None, Some(4))?;
    assert_collections_unordered_equal(&out, &[1, 2, 3]);
    Ok(())
}

#[test]
fn stateless_seq_vs_par_equivalent() -> anyhow::Result<()> {
    let p = TestPipeline::new();
    let lines = from_vec(
        &p,
        (0..1000).map(|i| format!("w{i} w{i}")).collect::<Vec<_>>(),
    );
    let words = lines.flat_map(|s: &String| {
        s.split_whitespace()
            .map(str::to_string)
            .collect::<Vec<_>>()
    });
    let filtered = words.filter(|w: &String| w.len() >= 2);

    let a = filtered.clone().collect_seq()?;
    let b = filtered.collect_par(Some(4), Some(8))?;
    assert_collections_equal(&a, &b);
    Ok(())
}
