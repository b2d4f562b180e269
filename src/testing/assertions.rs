//! Assertion functions for pipeline outputs.

use crate::window::{PaneTiming, Window, WindowedValue};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Assert that two collections are equal in order and content.
///
/// # Panics
///
/// Panics if the collections differ in length or content.
///
/// # Example
///
/// ```
/// use beamfold::testing::assert_collections_equal;
///
/// assert_collections_equal(&[1, 2, 3], &[1, 2, 3]);
/// ```
pub fn assert_collections_equal<T: Debug + PartialEq>(actual: &[T], expected: &[T]) {
    if let Some(i) = actual.iter().zip(expected).position(|(a, e)| a != e) {
        panic!(
            "Collections differ at index {i}: expected {:?}, got {:?}\n  Expected: {expected:?}\n  Actual: {actual:?}",
            expected[i], actual[i]
        );
    }
    assert_eq!(
        actual.len(),
        expected.len(),
        "Collections differ in length\n  Expected: {expected:?}\n  Actual: {actual:?}"
    );
}

/// Assert that two collections hold the same elements with the same
/// multiplicities, in any order.
///
/// # Panics
///
/// Panics if some element occurs a different number of times.
///
/// # Example
///
/// ```
/// use beamfold::testing::assert_collections_unordered_equal;
///
/// assert_collections_unordered_equal(&[3, 1, 2], &[1, 2, 3]);
/// ```
pub fn assert_collections_unordered_equal<T: Debug + Eq + Hash>(actual: &[T], expected: &[T]) {
    let mut balance: HashMap<&T, i64> = HashMap::new();
    for e in expected {
        *balance.entry(e).or_default() += 1;
    }
    for a in actual {
        *balance.entry(a).or_default() -= 1;
    }
    let missing: Vec<_> = balance.iter().filter(|(_, n)| **n > 0).collect();
    let extra: Vec<_> = balance.iter().filter(|(_, n)| **n < 0).collect();
    assert!(
        missing.is_empty() && extra.is_empty(),
        "Collections differ as multisets\n  Missing (count): {missing:?}\n  Extra (count): {extra:?}\n  Expected: {expected:?}\n  Actual: {actual:?}"
    );
}

/// Assert that two collections of key-value pairs are equal after sorting by key.
///
/// # Panics
///
/// Panics if the collections differ after sorting by key.
///
/// # Example
///
/// ```
/// use beamfold::testing::assert_kv_collections_equal;
///
/// assert_kv_collections_equal(vec![("b", 2), ("a", 1)], vec![("a", 1), ("b", 2)]);
/// ```
pub fn assert_kv_collections_equal<K, V>(mut actual: Vec<(K, V)>, mut expected: Vec<(K, V)>)
where
    K: Debug + Ord,
    V: Debug + PartialEq,
{
    actual.sort_by(|a, b| a.0.cmp(&b.0));
    expected.sort_by(|a, b| a.0.cmp(&b.0));
    assert_collections_equal(&actual, &expected);
}

/// Assert that `actual` is within `tolerance` of `expected`.
///
/// # Panics
///
/// Panics if the values are further apart, or if exactly one is NaN.
pub fn assert_approx_eq(actual: f64, expected: f64, tolerance: f64) {
    if actual.is_nan() && expected.is_nan() {
        return;
    }
    assert!(
        (actual - expected).abs() <= tolerance || actual == expected,
        "Value mismatch:\n  Expected: {expected}\n  Actual: {actual}\n  Tolerance: {tolerance}"
    );
}

/// Assert that every (key, window) produced exactly one pane, fired on time.
///
/// This is what the default trigger guarantees.
///
/// # Panics
///
/// Panics on a (key, window) with several panes, or a pane that is not on time.
pub fn assert_single_on_time_panes<K, V>(output: &[WindowedValue<(K, V)>])
where
    K: Debug + Eq + Hash,
    V: Debug,
{
    let mut seen: HashMap<(&K, Window), usize> = HashMap::new();
    for wv in output {
        assert_eq!(
            wv.pane.timing,
            PaneTiming::OnTime,
            "Pane is not on time: {wv:?}"
        );
        for w in &wv.windows {
            *seen.entry((&wv.value.0, *w)).or_default() += 1;
        }
    }
    let repeated: Vec<_> = seen.iter().filter(|(_, n)| **n > 1).collect();
    assert!(
        repeated.is_empty(),
        "Key/window pairs with several panes: {repeated:?}\n  Output: {output:?}"
    );
}
