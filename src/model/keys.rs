// src/model/keys.rs

use std::{
    collections::{HashMap, HashSet},
    hash::Hash,
};

/// Deduplicate `values` keeping first-appearance order and pair each distinct
/// value with a 1-based surrogate key.
pub fn assign_keys<K, I>(values: I) -> Vec<(u32, K)>
where
    K: Eq + Hash + Clone,
    I: IntoIterator<Item = K>,
{
    let mut seen = HashSet::new();
    let mut distinct = Vec::new();
    for value in values {
        if seen.insert(value.clone()) {
            distinct.push(value);
        }
    }
    (1u32..).zip(distinct).collect()
}

/// Lookup from a natural key to whatever the dimension row carries.
/// When a natural key appears on several rows, the first row wins.
pub fn first_wins<K, V, I>(pairs: I) -> HashMap<K, V>
where
    K: Eq + Hash,
    I: IntoIterator<Item = (K, V)>,
{
    let mut map = HashMap::new();
    for (k, v) in pairs {
        map.entry(k).or_insert(v);
    }
    map
}
