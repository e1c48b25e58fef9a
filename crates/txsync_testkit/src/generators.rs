//! Property-based test generators using proptest.

use proptest::prelude::*;
use std::collections::BTreeSet;

/// Strategy for natural key text that fits the fixture models.
pub fn natural_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9]{0,9}").expect("Invalid regex")
}

/// Strategy for a non-empty set of distinct natural names.
pub fn distinct_names_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(natural_name_strategy(), 1..=max.max(1))
        .prop_map(|names: BTreeSet<String>| names.into_iter().collect())
}

/// Strategy for an optional short text value.
pub fn optional_text_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::string::string_regex("[ -~]{0,16}").expect("Invalid regex"))
}
