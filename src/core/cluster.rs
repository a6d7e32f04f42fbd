//! Cluster assignment over the chronologically sorted adjacency table.
//!
//! Every entry is classified once into a [`Link`], then the links are folded
//! into a union-find. Exact duplicates sharing an identity key are united
//! before the chronological pass, so an entry that is both an exact twin and
//! close to a predecessor in another set bridges the two clusters.

use std::collections::HashMap;

use crate::core::adjacency::{AdjacencyTable, AdjacentRecord};
use crate::core::union_find::UnionFind;

/// How an entry joins the clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// Not close to either neighbour and no exact twin.
    NotInCluster,
    /// Opens a new cluster.
    StartsNew,
    /// Joins the cluster of the previous same-key entry.
    ExtendsPrevious,
    /// Already joined to an exact twin and also close to a previous entry in
    /// a different set; merges the two clusters.
    BridgesClusters,
    /// Joined to an exact twin only.
    JoinsExact,
}

impl Link {
    pub fn links_previous(self) -> bool {
        matches!(self, Link::ExtendsPrevious | Link::BridgesClusters)
    }
}

/// Classify one entry from its own signals, whether the previous entry is part
/// of a cluster, whether it has an exact twin under the same identity key, and
/// whether it already shares a set with the previous entry.
pub fn classify(
    entry: &AdjacentRecord<'_>,
    prev_in_cluster: bool,
    has_exact_twin: bool,
    joined_to_prev: bool,
) -> Link {
    if !entry.in_cluster() {
        return Link::NotInCluster;
    }

    let linked = entry.close_to_prev && prev_in_cluster;
    match (linked, has_exact_twin) {
        (true, false) => Link::ExtendsPrevious,
        (true, true) if joined_to_prev => Link::ExtendsPrevious,
        (true, true) => Link::BridgesClusters,
        (false, true) => Link::JoinsExact,
        (false, false) => Link::StartsNew,
    }
}

/// Result of the assignment pass, indexed by sorted position.
#[derive(Debug, Clone, Default)]
pub struct ClusterAssignment {
    pub links: Vec<Link>,
    /// `0` means "not in any cluster".
    pub group_ids: Vec<usize>,
    pub cluster_count: usize,
}

/// Assign group ids to every entry of `table`.
///
/// Group ids are dense, start at 1, and follow the position of each cluster's
/// first member in the sorted sequence. Sets left with a single member get 0.
pub fn assign_groups(table: &AdjacencyTable<'_>) -> ClusterAssignment {
    let entries = table.entries();
    let mut uf = UnionFind::new(entries.len());

    // Exact pass: unite twins under the same identity key
    let mut has_exact_twin = vec![false; entries.len()];
    let mut first_seen: HashMap<(&str, &str), usize> = HashMap::new();
    for (position, entry) in entries.iter().enumerate() {
        if !entry.exact_duplicate {
            continue;
        }
        let Some(exact_key) = entry.record.exact_key.as_deref() else {
            continue;
        };
        let identity = entry.record.identity_key.as_str();
        match first_seen.get(&(identity, exact_key)) {
            Some(&first) => {
                uf.union(first, position);
                has_exact_twin[first] = true;
                has_exact_twin[position] = true;
            }
            None => {
                first_seen.insert((identity, exact_key), position);
            }
        }
    }

    // Chronological pass, classifying against the sets built so far
    let mut links = Vec::with_capacity(entries.len());
    for (position, entry) in entries.iter().enumerate() {
        let prev = position.checked_sub(1).filter(|_| entry.has_prev());
        let prev_in_cluster = prev.is_some_and(|prev| entries[prev].in_cluster());
        let joined_to_prev = prev.is_some_and(|prev| uf.connected(prev, position));

        let link = classify(
            entry,
            prev_in_cluster,
            has_exact_twin[position],
            joined_to_prev,
        );
        if let (true, Some(prev)) = (link.links_previous(), prev) {
            uf.union(prev, position);
        }
        links.push(link);
    }

    let mut group_ids = vec![0; entries.len()];
    let mut root_to_group: HashMap<usize, usize> = HashMap::new();
    for (position, link) in links.iter().enumerate() {
        if *link == Link::NotInCluster || uf.set_size(position) < 2 {
            continue;
        }
        let root = uf.find(position);
        let next_id = root_to_group.len() + 1;
        group_ids[position] = *root_to_group.entry(root).or_insert(next_id);
    }

    let cluster_count = root_to_group.len();
    log::debug!(
        "assigned {} of {} records to {} clusters",
        group_ids.iter().filter(|&&id| id != 0).count(),
        entries.len(),
        cluster_count
    );

    ClusterAssignment {
        links,
        group_ids,
        cluster_count,
    }
}
