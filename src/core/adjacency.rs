//! Chronological ordering per identity key and the closeness signals the
//! cluster pass consumes.

use chrono::TimeDelta;
use std::collections::HashMap;

use crate::core::record::Record;

/// A record placed in the global `(identity_key, timestamp)` order, annotated
/// with its gaps to its same-key neighbours.
#[derive(Debug, Clone)]
pub struct AdjacentRecord<'a> {
    pub record: &'a Record,
    pub time_diff_prev: Option<TimeDelta>,
    pub time_diff_next: Option<TimeDelta>,
    pub close_to_prev: bool,
    pub close_to_next: bool,
    pub exact_duplicate: bool,
}

impl AdjacentRecord<'_> {
    pub fn in_cluster(&self) -> bool {
        self.close_to_prev || self.close_to_next || self.exact_duplicate
    }

    /// True when the preceding entry in the sorted sequence has the same key.
    pub fn has_prev(&self) -> bool {
        self.time_diff_prev.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct AdjacencyTable<'a> {
    entries: Vec<AdjacentRecord<'a>>,
}

impl<'a> AdjacencyTable<'a> {
    /// Sort `records` by identity key then timestamp (input order breaks ties)
    /// and annotate every entry. Exact keys are ignored unless `use_exact_keys`.
    pub fn build(records: &'a [Record], threshold: TimeDelta, use_exact_keys: bool) -> Self {
        let mut sorted: Vec<&Record> = records.iter().collect();
        // Stable sort keeps input order for identical timestamps
        sorted.sort_by(|a, b| {
            a.identity_key
                .cmp(&b.identity_key)
                .then(a.timestamp.cmp(&b.timestamp))
        });

        let mut exact_counts: HashMap<&str, usize> = HashMap::new();
        if use_exact_keys {
            for record in &sorted {
                if let Some(key) = record.exact_key.as_deref() {
                    *exact_counts.entry(key).or_default() += 1;
                }
            }
        }

        let gap = |a: &Record, b: &Record| {
            (a.identity_key == b.identity_key).then(|| b.timestamp - a.timestamp)
        };

        let entries = sorted
            .iter()
            .enumerate()
            .map(|(position, &record)| {
                let time_diff_prev = position
                    .checked_sub(1)
                    .and_then(|prev| gap(sorted[prev], record));
                let time_diff_next = sorted
                    .get(position + 1)
                    .and_then(|&next| gap(record, next))
                    .map(|diff| diff.abs());
                let exact_duplicate = record
                    .exact_key
                    .as_deref()
                    .and_then(|key| exact_counts.get(key))
                    .is_some_and(|&count| count > 1);

                AdjacentRecord {
                    record,
                    time_diff_prev,
                    time_diff_next,
                    close_to_prev: time_diff_prev.is_some_and(|diff| diff <= threshold),
                    close_to_next: time_diff_next.is_some_and(|diff| diff <= threshold),
                    exact_duplicate,
                }
            })
            .collect();

        Self { entries }
    }

    pub fn entries(&self) -> &[AdjacentRecord<'a>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn in_cluster_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.in_cluster()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(index: usize, key: &str, hour: u32, minute: u32) -> Record {
        let timestamp = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap();
        Record::new(index, key, timestamp)
    }

    #[test]
    fn test_gaps_are_per_key() {
        let records = vec![
            at(0, "b", 8, 0),
            at(1, "a", 8, 30),
            at(2, "a", 8, 0),
            at(3, "b", 8, 3),
        ];
        let table = AdjacencyTable::build(&records, TimeDelta::minutes(10), true);
        let order: Vec<usize> = table
            .entries()
            .iter()
            .map(|entry| entry.record.original_index)
            .collect();
        assert_eq!(order, vec![2, 1, 0, 3]);

        let first_b = &table.entries()[2];
        // The neighbour before it belongs to key "a"
        assert_eq!(first_b.time_diff_prev, None);
        assert_eq!(first_b.time_diff_next, Some(TimeDelta::minutes(3)));
        assert!(first_b.close_to_next);

        let first_a = &table.entries()[0];
        assert_eq!(first_a.time_diff_next, Some(TimeDelta::minutes(30)));
        assert!(!first_a.in_cluster());
        assert_eq!(table.in_cluster_count(), 2);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let records = vec![at(0, "k", 8, 0), at(1, "k", 8, 10), at(2, "k", 8, 21)];
        let table = AdjacencyTable::build(&records, TimeDelta::minutes(10), true);
        let entries = table.entries();
        assert!(entries[0].close_to_next);
        assert!(entries[1].close_to_prev);
        assert!(!entries[1].close_to_next);
        assert!(!entries[2].close_to_prev);
        assert!(!entries[2].in_cluster());
    }

    #[test]
    fn test_identical_timestamps_keep_input_order() {
        let records = vec![at(7, "k", 9, 0), at(3, "k", 9, 0), at(5, "k", 9, 0)];
        let table = AdjacencyTable::build(&records, TimeDelta::zero(), true);
        let order: Vec<usize> = table
            .entries()
            .iter()
            .map(|entry| entry.record.original_index)
            .collect();
        assert_eq!(order, vec![7, 3, 5]);
        assert!(table.entries().iter().all(|entry| entry.in_cluster()));
    }

    #[test]
    fn test_exact_duplicates_ignore_distance() {
        let records = vec![
            at(0, "k", 8, 0).with_exact_key("x"),
            at(1, "k", 14, 0).with_exact_key("x"),
            at(2, "k", 11, 0).with_exact_key("y"),
        ];
        let table = AdjacencyTable::build(&records, TimeDelta::minutes(10), true);
        let flags: Vec<(usize, bool)> = table
            .entries()
            .iter()
            .map(|entry| (entry.record.original_index, entry.exact_duplicate))
            .collect();
        assert_eq!(flags, vec![(0, true), (2, false), (1, true)]);

        let without = AdjacencyTable::build(&records, TimeDelta::minutes(10), false);
        assert_eq!(without.in_cluster_count(), 0);
    }
}
