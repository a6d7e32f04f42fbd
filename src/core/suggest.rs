use std::collections::BTreeMap;

use crate::core::adjacency::AdjacencyTable;
use crate::core::cluster::ClusterAssignment;

/// A finished cluster with its keep/drop recommendation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub group_id: usize,
    /// Sorted positions of the members, earliest first.
    pub members: Vec<usize>,
}

impl Suggestion {
    /// Sorted position of the member to keep.
    pub fn keep(&self) -> usize {
        self.members[0]
    }

    /// Sorted positions of the members suggested for removal.
    pub fn remove(&self) -> &[usize] {
        &self.members[1..]
    }
}

/// Keep the chronologically first member of every cluster and suggest
/// removing the rest. Ties on timestamp fall back to sorted position.
pub fn suggest_removals(table: &AdjacencyTable<'_>, assignment: &ClusterAssignment) -> Vec<Suggestion> {
    let entries = table.entries();
    let mut by_group: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (position, &group_id) in assignment.group_ids.iter().enumerate() {
        if group_id != 0 {
            by_group.entry(group_id).or_default().push(position);
        }
    }

    by_group
        .into_iter()
        .map(|(group_id, mut members)| {
            members.sort_by_key(|&position| (entries[position].record.timestamp, position));
            Suggestion { group_id, members }
        })
        .collect()
}
