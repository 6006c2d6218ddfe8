#![forbid(unsafe_code)]

//! Counters and histograms fed by the engine's instrumentation hooks.
//!
//! Both tables are shared handles (`Rc<RefCell<..>>`): the engine writes
//! through [`EngineHooks`](crate::engine::EngineHooks) while the control
//! thread reads snapshots. Neither is `Send`; they live and die on the
//! control thread.
//!
//! # Histogram layout
//!
//! A histogram over `[min, max)` with `n` buckets has one underflow bucket
//! (`< min`), `n - 2` equal-width buckets, and one overflow bucket
//! (`>= max`).
//!
//! # Invariants
//!
//! - Counter slots are stable for the lifetime of the table.
//! - `snapshot_deltas` reports each sample exactly once across calls.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Minimum number of buckets (underflow, one range, overflow).
const MIN_BUCKETS: usize = 3;

// ─────────────────────────────────────────────────────────────────────────────
// Counters
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct CounterSlots {
    slots: HashMap<String, usize>,
    values: Vec<i64>,
}

/// Named counter table.
#[derive(Debug, Clone, Default)]
pub struct StatsTable {
    inner: Rc<RefCell<CounterSlots>>,
}

impl StatsTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `name` to a slot, allocating one on first use.
    pub fn find_location(&self, name: &str) -> usize {
        let mut inner = self.inner.borrow_mut();
        if let Some(&slot) = inner.slots.get(name) {
            return slot;
        }
        let slot = inner.values.len();
        inner.values.push(0);
        inner.slots.insert(name.to_owned(), slot);
        slot
    }

    /// Add `delta` to the counter in `slot`. Unknown slots are ignored.
    pub fn add(&self, slot: usize, delta: i64) {
        let mut inner = self.inner.borrow_mut();
        debug_assert!(slot < inner.values.len(), "unknown counter slot {slot}");
        if let Some(value) = inner.values.get_mut(slot) {
            *value = value.saturating_add(delta);
        }
    }

    /// Current value of a named counter.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<i64> {
        let inner = self.inner.borrow();
        inner.slots.get(name).map(|&slot| inner.values[slot])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Histograms
// ─────────────────────────────────────────────────────────────────────────────

/// Index of a histogram inside its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HistogramId(usize);

/// Samples recorded since the previous snapshot of one histogram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramDelta {
    pub name: String,
    pub min: i64,
    pub max: i64,
    /// Per-bucket sample counts, underflow first and overflow last.
    pub counts: Vec<u64>,
    pub sum: i64,
}

impl HistogramDelta {
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.counts.iter().sum()
    }
}

#[derive(Debug)]
struct Histogram {
    name: String,
    min: i64,
    max: i64,
    counts: Vec<u64>,
    sum: i64,
    upload: bool,
    logged_counts: Vec<u64>,
    logged_sum: i64,
}

impl Histogram {
    fn new(name: &str, min: i64, max: i64, buckets: usize, upload: bool) -> Self {
        let min = min.max(1);
        let max = max.max(min + 1);
        let buckets = buckets.max(MIN_BUCKETS);
        Self {
            name: name.to_owned(),
            min,
            max,
            counts: vec![0; buckets],
            sum: 0,
            upload,
            logged_counts: vec![0; buckets],
            logged_sum: 0,
        }
    }

    fn bucket_index(&self, sample: i64) -> usize {
        let last = self.counts.len() - 1;
        if sample < self.min {
            return 0;
        }
        if sample >= self.max {
            return last;
        }
        let inner = (last - 1) as i64;
        let span = self.max - self.min;
        let offset = (sample - self.min).saturating_mul(inner) / span;
        1 + offset as usize
    }

    fn add(&mut self, sample: i64) {
        let idx = self.bucket_index(sample);
        self.counts[idx] += 1;
        self.sum = self.sum.saturating_add(sample);
    }

    fn take_delta(&mut self) -> Option<HistogramDelta> {
        let counts: Vec<u64> = self
            .counts
            .iter()
            .zip(&self.logged_counts)
            .map(|(now, logged)| now - logged)
            .collect();
        if counts.iter().all(|&c| c == 0) {
            return None;
        }
        let sum = self.sum - self.logged_sum;
        self.logged_counts.clone_from(&self.counts);
        self.logged_sum = self.sum;
        Some(HistogramDelta {
            name: self.name.clone(),
            min: self.min,
            max: self.max,
            counts,
            sum,
        })
    }
}

#[derive(Debug, Default)]
struct HistogramSet {
    by_name: HashMap<String, HistogramId>,
    histograms: Vec<Histogram>,
}

/// Registry of named histograms.
#[derive(Debug, Clone, Default)]
pub struct HistogramRegistry {
    inner: Rc<RefCell<HistogramSet>>,
}

impl HistogramRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or look up) a histogram. `upload` marks it for inclusion in
    /// [`snapshot_deltas`](Self::snapshot_deltas). A second create with the
    /// same name returns the first histogram unchanged.
    pub fn create(&self, name: &str, min: i64, max: i64, buckets: usize, upload: bool) -> HistogramId {
        let mut inner = self.inner.borrow_mut();
        if let Some(&id) = inner.by_name.get(name) {
            return id;
        }
        let id = HistogramId(inner.histograms.len());
        inner
            .histograms
            .push(Histogram::new(name, min, max, buckets, upload));
        inner.by_name.insert(name.to_owned(), id);
        id
    }

    pub fn add_sample(&self, id: HistogramId, sample: i64) {
        let mut inner = self.inner.borrow_mut();
        debug_assert!(id.0 < inner.histograms.len(), "unknown histogram {id:?}");
        if let Some(histogram) = inner.histograms.get_mut(id.0) {
            histogram.add(sample);
        }
    }

    /// Samples recorded so far (reported or not).
    #[must_use]
    pub fn total_count(&self, id: HistogramId) -> u64 {
        self.inner
            .borrow()
            .histograms
            .get(id.0)
            .map_or(0, |h| h.counts.iter().sum())
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<HistogramId> {
        self.inner.borrow().by_name.get(name).copied()
    }

    /// Deltas of every upload-flagged histogram with new samples since the
    /// previous call, in creation order.
    pub fn snapshot_deltas(&self) -> Vec<HistogramDelta> {
        self.inner
            .borrow_mut()
            .histograms
            .iter_mut()
            .filter(|h| h.upload)
            .filter_map(Histogram::take_delta)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().histograms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn counter_slots_are_stable() {
        let table = StatsTable::new();
        let a = table.find_location("a");
        let b = table.find_location("b");
        assert_ne!(a, b);
        assert_eq!(table.find_location("a"), a);
        table.add(a, 2);
        table.add(a, 3);
        assert_eq!(table.value("a"), Some(5));
        assert_eq!(table.value("b"), Some(0));
        assert_eq!(table.value("missing"), None);
    }

    #[test]
    fn samples_land_in_underflow_range_and_overflow() {
        let reg = HistogramRegistry::new();
        let id = reg.create("h", 10, 20, 4, true);
        reg.add_sample(id, 3); // underflow
        reg.add_sample(id, 10); // first range bucket
        reg.add_sample(id, 19); // last range bucket
        reg.add_sample(id, 25); // overflow
        let deltas = reg.snapshot_deltas();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].counts, vec![1, 1, 1, 1]);
        assert_eq!(deltas[0].sum, 57);
    }

    #[test]
    fn deltas_report_each_sample_once() {
        let reg = HistogramRegistry::new();
        let id = reg.create("h", 1, 100, 10, true);
        reg.add_sample(id, 5);
        assert_eq!(reg.snapshot_deltas()[0].total_count(), 1);
        assert!(reg.snapshot_deltas().is_empty());
        reg.add_sample(id, 50);
        reg.add_sample(id, 60);
        let second = reg.snapshot_deltas();
        assert_eq!(second[0].total_count(), 2);
        assert_eq!(second[0].sum, 110);
    }

    #[test]
    fn local_only_histograms_are_not_uploaded() {
        let reg = HistogramRegistry::new();
        let id = reg.create("local", 1, 10, 5, false);
        reg.add_sample(id, 2);
        assert!(reg.snapshot_deltas().is_empty());
        assert_eq!(reg.total_count(id), 1);
    }

    #[test]
    fn duplicate_create_returns_existing() {
        let reg = HistogramRegistry::new();
        let a = reg.create("same", 1, 10, 5, true);
        let b = reg.create("same", 1, 1000, 50, true);
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    proptest! {
        #[test]
        fn every_sample_is_counted(samples in proptest::collection::vec(-50i64..200, 0..64)) {
            let reg = HistogramRegistry::new();
            let id = reg.create("p", 1, 100, 12, true);
            for s in &samples {
                reg.add_sample(id, *s);
            }
            let total: u64 = reg.snapshot_deltas().iter().map(HistogramDelta::total_count).sum();
            prop_assert_eq!(total, samples.len() as u64);
        }
    }
}
