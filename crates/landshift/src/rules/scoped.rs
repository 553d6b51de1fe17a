//! Temporal-scoped keyed lookup used by every configurable rule.
//!
//! Configuration records are resolved by a tuple of classification keys
//! plus (iteration, timestep). Keys and scope components may be `None`,
//! which acts as a wildcard matching any query. Resolution follows the
//! canonical **nearest-previous, wildcard-first** rule: within the
//! requested iteration the entry with the greatest timestep less than or
//! equal to the query wins, a wildcard timestep stands in when no concrete
//! one qualifies, and the wildcard iteration is consulted only when the
//! concrete iteration has no qualifying entry. The rule decides which
//! multiplier or target applies mid-run when overrides are sparse, so it
//! must not be approximated.
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Entries for one key tuple, resolved by (iteration, timestep).
///
/// `None` sorts before any concrete value in both dimensions, which is
/// exactly the order the resolution rule needs.
#[derive(Debug, Clone)]
pub struct TemporalSeries<T> {
    buckets: BTreeMap<Option<i32>, BTreeMap<Option<i32>, T>>,
}

impl<T> Default for TemporalSeries<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TemporalSeries<T> {
    pub fn new() -> Self {
        Self {
            buckets: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Adds an entry for the exact (iteration, timestep) scope. Fails with
    /// [`Error::DuplicateKey`] without mutating the series if that exact
    /// scope is already present.
    pub fn add(&mut self, iteration: Option<i32>, timestep: Option<i32>, value: T) -> Result<()> {
        let bucket = self.buckets.entry(iteration).or_default();
        if bucket.contains_key(&timestep) {
            return Err(Error::DuplicateKey(format!(
                "iteration={iteration:?}, timestep={timestep:?}"
            )));
        }
        bucket.insert(timestep, value);
        Ok(())
    }

    /// Exact-scope lookup; no fallback of any kind.
    pub fn get_exact(&self, iteration: Option<i32>, timestep: Option<i32>) -> Option<&T> {
        self.buckets.get(&iteration).and_then(|b| b.get(&timestep))
    }

    pub fn get_exact_mut(&mut self, iteration: Option<i32>, timestep: Option<i32>) -> Option<&mut T> {
        self.buckets
            .get_mut(&iteration)
            .and_then(|b| b.get_mut(&timestep))
    }

    /// Nearest-previous, wildcard-first resolution for a concrete query.
    pub fn get(&self, iteration: i32, timestep: i32) -> Option<&T> {
        for it_key in [Some(iteration), None] {
            if let Some(bucket) = self.buckets.get(&it_key) {
                if let Some((_, value)) = bucket.range(..=Some(timestep)).next_back() {
                    return Some(value);
                }
            }
        }
        None
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.buckets.values().flat_map(|b| b.values())
    }
}

/// Generic keyed lookup parameterized by key arity.
///
/// One type covers every arity the rules need; `N` is the number of
/// classification key dimensions. Key resolution tries the exact value
/// before the wildcard at each dimension, most significant dimension
/// first, then applies the temporal rule of [`TemporalSeries`].
#[derive(Debug, Clone)]
pub struct ScopedKeyMap<const N: usize, T> {
    map: BTreeMap<[Option<i32>; N], TemporalSeries<T>>,
}

impl<const N: usize, T> Default for ScopedKeyMap<N, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize, T> ScopedKeyMap<N, T> {
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Adds an entry for the exact key tuple and scope. Fails with
    /// [`Error::DuplicateKey`] without mutating the map if that exact
    /// tuple is already present.
    pub fn add(
        &mut self,
        keys: [Option<i32>; N],
        iteration: Option<i32>,
        timestep: Option<i32>,
        value: T,
    ) -> Result<()> {
        self.map
            .entry(keys)
            .or_default()
            .add(iteration, timestep, value)
            .map_err(|_| {
                Error::DuplicateKey(format!(
                    "keys={keys:?}, iteration={iteration:?}, timestep={timestep:?}"
                ))
            })
    }

    /// Exact key and scope lookup; no fallback of any kind.
    pub fn get_exact(
        &self,
        keys: [Option<i32>; N],
        iteration: Option<i32>,
        timestep: Option<i32>,
    ) -> Option<&T> {
        self.map.get(&keys).and_then(|s| s.get_exact(iteration, timestep))
    }

    pub fn get_exact_mut(
        &mut self,
        keys: [Option<i32>; N],
        iteration: Option<i32>,
        timestep: Option<i32>,
    ) -> Option<&mut T> {
        self.map
            .get_mut(&keys)
            .and_then(|s| s.get_exact_mut(iteration, timestep))
    }

    /// Returns the entry at the exact key tuple and scope, inserting a
    /// default first when absent. Collection-valued maps use this to
    /// append records instead of treating a repeat as a duplicate.
    pub fn get_or_insert_with(
        &mut self,
        keys: [Option<i32>; N],
        iteration: Option<i32>,
        timestep: Option<i32>,
        default: impl FnOnce() -> T,
    ) -> &mut T {
        let series = self.map.entry(keys).or_default();
        if series.get_exact(iteration, timestep).is_none() {
            // The scope was just checked empty, so this cannot collide.
            let _ = series.add(iteration, timestep, default());
        }
        series
            .get_exact_mut(iteration, timestep)
            .expect("entry exists after insertion")
    }

    /// Hierarchical resolution: exact key before wildcard at each
    /// dimension (most significant first), then nearest-previous,
    /// wildcard-first over (iteration, timestep).
    pub fn get(&self, keys: [Option<i32>; N], iteration: i32, timestep: i32) -> Option<&T> {
        if self.map.is_empty() {
            return None;
        }
        'candidates: for mask in 0u32..(1 << N) {
            let mut candidate = keys;
            for dim in 0..N {
                let wild = (mask >> (N - 1 - dim)) & 1 == 1;
                if wild {
                    if keys[dim].is_none() {
                        // Identical to a candidate already tried.
                        continue 'candidates;
                    }
                    candidate[dim] = None;
                }
            }
            if let Some(series) = self.map.get(&candidate) {
                if let Some(value) = series.get(iteration, timestep) {
                    return Some(value);
                }
            }
        }
        None
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.map.values().flat_map(|s| s.values())
    }
}
