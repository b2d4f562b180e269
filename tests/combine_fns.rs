use anyhow::Result;
use beamfold::combiners::*;
use beamfold::testing::assert_approx_eq;
use beamfold::*;
use std::sync::Arc;

/// Fold each group into its own accumulator, then merge them all.
fn merged_in_groups<C: CombineFn>(f: &C, groups: Vec<Vec<C::Input>>) -> C::Output {
    let accs = groups
        .into_iter()
        .map(|g| {
            let mut acc = f.create_accumulator();
            for x in g {
                f.add_input(&mut acc, x);
            }
            acc
        })
        .collect();
    f.extract_output(f.merge_accumulators(accs))
}

#[test]
fn empty_inputs_yield_identities() {
    assert_eq!(Sum::of_integers().apply(Vec::<i32>::new()), 0);
    assert_eq!(Sum::of_longs().apply(Vec::<i64>::new()), 0);
    assert_eq!(Sum::of_doubles().apply(Vec::<f64>::new()), 0.0);
    assert_eq!(Max::of_integers().apply(Vec::<i32>::new()), i32::MIN);
    assert_eq!(Min::of_longs().apply(Vec::<i64>::new()), i64::MAX);
    assert_eq!(Max::of_doubles().apply(Vec::<f64>::new()), f64::NEG_INFINITY);
    assert_eq!(Min::of_doubles().apply(Vec::<f64>::new()), f64::INFINITY);
    assert_eq!(Count::<u8>::new().apply(Vec::new()), 0);
    assert_eq!(Max::of::<String>().apply(Vec::new()), None);
}

#[test]
fn regrouping_partials_does_not_change_the_result() {
    let sum = Sum::of_longs();
    let whole = sum.apply(1..=10);
    assert_eq!(whole, 55);
    assert_eq!(
        merged_in_groups(&sum, vec![vec![1, 2, 3], vec![], vec![4], (5..=10).collect()]),
        whole
    );

    // merge of merges
    let a = sum.merge_accumulators(vec![3, 4]);
    let b = sum.merge_accumulators(vec![a, 48]);
    assert_eq!(sum.extract_output(b), whole);

    // partitions visited back to front
    assert_eq!(
        merged_in_groups(&sum, vec![(5..=10).collect(), vec![4], vec![], vec![1, 2, 3]]),
        whole
    );

    let max = Max::of::<String>();
    let words = ["pear", "apple", "quince", "fig"].map(String::from);
    assert_eq!(
        merged_in_groups(&max, vec![words[..2].to_vec(), words[2..].to_vec()]),
        Some("quince".to_string())
    );
    assert_eq!(
        merged_in_groups(&max, vec![words[2..].to_vec(), words[..2].to_vec()]),
        Some("quince".to_string())
    );
}

#[test]
fn mean_over_partials() {
    let mean = Mean::of::<f64>();
    assert_approx_eq(mean.apply(vec![1.0, 2.0, 3.0, 4.0]), 2.5, 1e-12);
    assert_approx_eq(
        merged_in_groups(&mean, vec![vec![1.0], vec![], vec![2.0, 3.0, 4.0]]),
        2.5,
        1e-12,
    );
    assert_eq!(mean.apply(Vec::<f64>::new()), 0.0);
    assert_approx_eq(Mean::of::<i32>().apply(vec![1, 2]), 1.5, 1e-12);
}

#[test]
fn iterable_fn_collapses_past_its_buffer() {
    let concat = IterableCombineFn::new(|parts: Vec<String>| parts.concat()).with_buffer_size(1);
    let mut acc = concat.create_accumulator();
    for s in ["a", "b", "c"] {
        concat.add_input(&mut acc, s.to_string());
        assert!(acc.len() <= 1);
    }
    assert_eq!(concat.extract_output(acc), "abc");

    // singleton accumulators merged at once collapse to the same value
    let singles = ["a", "b", "c"].map(|s| vec![s.to_string()]).to_vec();
    let merged = concat.merge_accumulators(singles);
    assert!(merged.len() <= 1);
    assert_eq!(concat.extract_output(merged), "abc");

    // merging empty accumulators keeps them empty
    assert!(concat.merge_accumulators(vec![Vec::new(), Vec::new()]).is_empty());
    assert_eq!(concat.buffer_size(), 1);
    assert_eq!(
        IterableCombineFn::new(|v: Vec<i64>| v.into_iter().sum()).buffer_size(),
        DEFAULT_BUFFER_SIZE
    );
}

#[test]
fn binary_fn_without_identity_is_optional() {
    let longest = BinaryCombineFn::new(|a: String, b: String| if b.len() > a.len() { b } else { a });
    assert_eq!(longest.apply(Vec::new()), None);
    assert_eq!(
        longest.apply(["ab", "abcd", "abc"].map(String::from)),
        Some("abcd".to_string())
    );
}

/// Counts the inputs that start with the key.
struct PrefixCount;

impl KeyedCombineFn<String> for PrefixCount {
    type Input = String;
    type Accum = u64;
    type Output = u64;

    fn create_accumulator(&self, _key: &String) -> u64 {
        0
    }

    fn add_input(&self, key: &String, acc: &mut u64, input: String) {
        if input.starts_with(key.as_str()) {
            *acc += 1;
        }
    }

    fn merge_accumulators(&self, _key: &String, accs: Vec<u64>) -> u64 {
        accs.into_iter().sum()
    }

    fn extract_output(&self, _key: &String, acc: u64) -> u64 {
        acc
    }
}

#[test]
fn keyed_and_unkeyed_adapters() -> Result<()> {
    let inputs = ["apple", "apricot", "banana"].map(String::from);

    let bound = PrefixCount.for_key("ap".to_string());
    assert_eq!(bound.key(), "ap");
    assert_eq!(bound.apply(inputs.clone()), 2);

    let shared = Arc::new(PrefixCount);
    assert_eq!(bind(Arc::clone(&shared), "b".to_string()).apply(inputs.clone()), 1);
    assert_eq!(shared.apply(&"z".to_string(), inputs), 0);

    // lifting ignores the key entirely
    let keyed = Sum::of_integers().as_keyed();
    assert_eq!(KeyedCombineFn::<String>::apply(&keyed, &"any".to_string(), vec![1, 2]), 3);
    Ok(())
}

#[test]
fn accumulator_coders_are_derived_from_the_input_coder() -> Result<()> {
    let registry = CoderRegistry::default();

    let longs = Sum::of_longs().accumulator_coder(&registry, Arc::new(SerdeCoder::<i64>::new()))?;
    let bytes = coder::encode_to_vec(longs.as_ref(), &42)?;
    assert_eq!(coder::decode_from_slice(longs.as_ref(), &bytes)?, 42);

    // Option<String> is not registered, but the holder coder wraps the input coder
    let holder = Max::of::<String>().accumulator_coder(&registry, Arc::new(SerdeCoder::<String>::new()))?;
    let none = coder::encode_to_vec(holder.as_ref(), &None)?;
    let some = coder::encode_to_vec(holder.as_ref(), &Some("x".to_string()))?;
    assert_eq!(none, vec![0]);
    assert_eq!(some[0], 1);
    assert_eq!(coder::decode_from_slice(holder.as_ref(), &some)?, Some("x".to_string()));
    Ok(())
}
