// Duplicate detection over attendance records:
// - identity key + timestamp ordering (adjacency)
// - close-in-time and exact-duplicate clustering
// - keep-earliest suggestions
// - projection onto the current working table

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::config::DetectionConfig;
use crate::core::adjacency::AdjacencyTable;
use crate::core::cluster::assign_groups;
use crate::core::record::Record;
use crate::core::suggest::suggest_removals;
use crate::error::Result;

/// The caller-owned table the result is validated against.
pub trait WorkingTable {
    fn contains(&self, original_index: usize) -> bool;
}

impl WorkingTable for HashSet<usize> {
    fn contains(&self, original_index: usize) -> bool {
        HashSet::contains(self, &original_index)
    }
}

impl WorkingTable for BTreeSet<usize> {
    fn contains(&self, original_index: usize) -> bool {
        BTreeSet::contains(self, &original_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateMember {
    pub original_index: usize,
    pub group_id: usize,
    pub suggest_remove: bool,
    pub identity_key: String,
    pub timestamp: NaiveDateTime,
    pub exact_duplicate: bool,
}

/// Output of one detection run. Only valid for the table snapshot it was
/// computed from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Members of every cluster, ordered by group id then timestamp.
    pub members: Vec<DuplicateMember>,
    pub involved: Vec<usize>,
    pub suggested_removals: Vec<usize>,
}

impl DetectionResult {
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn cluster_count(&self) -> usize {
        self.members
            .iter()
            .map(|member| member.group_id)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Members grouped by group id.
    pub fn groups(&self) -> BTreeMap<usize, Vec<&DuplicateMember>> {
        let mut groups: BTreeMap<usize, Vec<&DuplicateMember>> = BTreeMap::new();
        for member in &self.members {
            groups.entry(member.group_id).or_default().push(member);
        }
        groups
    }

    pub fn member(&self, original_index: usize) -> Option<&DuplicateMember> {
        self.members
            .iter()
            .find(|member| member.original_index == original_index)
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    config: DetectionConfig,
    threshold: TimeDelta,
}

impl DuplicateDetector {
    pub fn new(config: DetectionConfig) -> Result<Self> {
        let threshold = config.threshold()?;
        Ok(Self { config, threshold })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Cluster `records` and project the result onto `table`.
    pub fn detect<T>(&self, records: &[Record], table: &T) -> DetectionResult
    where
        T: WorkingTable + ?Sized,
    {
        if records.is_empty() {
            return DetectionResult::default();
        }

        let adjacency = AdjacencyTable::build(records, self.threshold, self.config.use_exact_keys);
        if adjacency.in_cluster_count() == 0 {
            return DetectionResult::default();
        }

        let assignment = assign_groups(&adjacency);
        let suggestions = suggest_removals(&adjacency, &assignment);
        let entries = adjacency.entries();

        let mut members = Vec::new();
        for suggestion in &suggestions {
            for (rank, &position) in suggestion.members.iter().enumerate() {
                let entry = &entries[position];
                members.push(DuplicateMember {
                    original_index: entry.record.original_index,
                    group_id: suggestion.group_id,
                    suggest_remove: rank > 0,
                    identity_key: entry.record.identity_key.clone(),
                    timestamp: entry.record.timestamp,
                    exact_duplicate: entry.exact_duplicate,
                });
            }
        }

        project(members, table)
    }

    /// Cluster `records`, treating them as the whole working table.
    pub fn detect_records(&self, records: &[Record]) -> DetectionResult {
        let table: HashSet<usize> = records.iter().map(|record| record.original_index).collect();
        self.detect(records, &table)
    }
}

/// Drop members whose index is no longer in `table` and build the index lists.
pub fn project<T>(members: Vec<DuplicateMember>, table: &T) -> DetectionResult
where
    T: WorkingTable + ?Sized,
{
    let before = members.len();
    let members: Vec<DuplicateMember> = members
        .into_iter()
        .filter(|member| table.contains(member.original_index))
        .collect();
    if members.len() < before {
        log::warn!(
            "dropped {} stale record(s) no longer in the working table",
            before - members.len()
        );
    }

    let involved = members.iter().map(|member| member.original_index).collect();
    let suggested_removals = members
        .iter()
        .filter(|member| member.suggest_remove)
        .map(|member| member.original_index)
        .collect();

    DetectionResult {
        members,
        involved,
        suggested_removals,
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

    fn detector(minutes: i64) -> DuplicateDetector {
        DuplicateDetector::new(DetectionConfig::default().with_threshold_minutes(minutes)).unwrap()
    }

    #[test]
    fn test_empty_input() {
        let result = detector(10).detect_records(&[]);
        assert!(result.is_empty());
        assert!(result.involved.is_empty());
        assert!(result.suggested_removals.is_empty());
    }

    #[test]
    fn test_no_candidates() {
        let records = vec![at(0, "k", 8, 0), at(1, "k", 9, 30), at(2, "j", 8, 1)];
        assert_eq!(detector(10).detect_records(&records), DetectionResult::default());
    }

    #[test]
    fn test_members_are_ordered_by_group_then_time() {
        let records = vec![
            at(0, "zeta", 8, 1),
            at(1, "alpha", 10, 4),
            at(2, "zeta", 8, 0),
            at(3, "alpha", 10, 0),
        ];
        let result = detector(10).detect_records(&records);

        let layout: Vec<(usize, usize, bool)> = result
            .members
            .iter()
            .map(|m| (m.group_id, m.original_index, m.suggest_remove))
            .collect();
        assert_eq!(
            layout,
            vec![(1, 3, false), (1, 1, true), (2, 2, false), (2, 0, true)]
        );
        assert_eq!(result.involved, vec![3, 1, 2, 0]);
        assert_eq!(result.suggested_removals, vec![1, 0]);
        assert_eq!(result.cluster_count(), 2);
        assert_eq!(result.groups()[&2].len(), 2);
        assert!(result.member(1).is_some_and(|m| m.suggest_remove));
    }

    #[test]
    fn test_stale_indices_are_filtered() {
        let records = vec![at(0, "k", 8, 0), at(1, "k", 8, 5), at(2, "k", 8, 6)];
        let table: HashSet<usize> = [0, 2].into_iter().collect();
        let result = detector(10).detect(&records, &table);

        assert_eq!(result.involved, vec![0, 2]);
        assert_eq!(result.suggested_removals, vec![2]);
        assert!(result.member(1).is_none());
    }

    #[test]
    fn test_detect_records_projects_onto_own_indices() {
        let records: Vec<Record> = (0..500)
            .map(|i| at(1000 + i, "k", 8 + (i / 60) as u32, (i % 60) as u32))
            .collect();
        let result = detector(10).detect_records(&records);

        assert_eq!(result.involved.len(), 500);
        assert_eq!(result.suggested_removals.len(), 499);
        assert_eq!(result.involved[0], 1000);
        assert_eq!(result.cluster_count(), 1);
    }

    #[test]
    fn test_invalid_threshold() {
        let config = DetectionConfig::default().with_threshold_minutes(-10);
        assert!(DuplicateDetector::new(config).is_err());
    }

    #[test]
    fn test_repeated_runs_agree() {
        let records = vec![
            at(0, "k", 8, 0),
            at(1, "k", 8, 9),
            at(2, "k", 8, 17),
            at(3, "j", 12, 0).with_exact_key("e"),
            at(4, "j", 16, 0).with_exact_key("e"),
        ];
        let detector = detector(10);
        let first = detector.detect_records(&records);
        let second = detector.detect_records(&records);
        assert_eq!(first, second);
        assert_eq!(first.cluster_count(), 2);
    }
}
