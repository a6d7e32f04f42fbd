use dialoguer::MultiSelect;

use crate::core::duplicate::{DetectionResult, DuplicateMember};
use crate::error::Result;
use crate::services::roster::Roster;

/// Decides which involved records actually get removed.
pub trait Reviewer {
    /// Return the original indices confirmed for removal.
    fn review(&mut self, result: &DetectionResult, roster: &Roster) -> Result<Vec<usize>>;
}

/// Applies the engine's suggestions unchanged.
#[derive(Debug, Default)]
pub struct AcceptSuggestions;

impl Reviewer for AcceptSuggestions {
    fn review(&mut self, result: &DetectionResult, _roster: &Roster) -> Result<Vec<usize>> {
        Ok(result.suggested_removals.clone())
    }
}

/// Asks on the terminal, one cluster at a time, with the suggestions
/// pre-selected.
#[derive(Debug, Default)]
pub struct InteractiveReview;

impl Reviewer for InteractiveReview {
    fn review(&mut self, result: &DetectionResult, roster: &Roster) -> Result<Vec<usize>> {
        let groups = result.groups();
        let total = groups.len();
        let mut confirmed = Vec::new();

        for (n, (group_id, members)) in groups.into_iter().enumerate() {
            let labels: Vec<String> = members
                .iter()
                .map(|member| member_label(member, roster))
                .collect();
            let defaults: Vec<bool> = members.iter().map(|member| member.suggest_remove).collect();

            let picked = MultiSelect::new()
                .with_prompt(format!(
                    "Cluster {} ({}/{}): select records to remove",
                    group_id,
                    n + 1,
                    total
                ))
                .items(&labels)
                .defaults(&defaults)
                .interact()?;

            if picked.len() == members.len() {
                log::warn!("cluster {} will be removed entirely", group_id);
            }
            confirmed.extend(picked.into_iter().map(|i| members[i].original_index));
        }

        Ok(confirmed)
    }
}

fn member_label(member: &DuplicateMember, roster: &Roster) -> String {
    let who = roster
        .get(member.original_index)
        .map(|entry| entry.row.label())
        .unwrap_or_else(|| member.identity_key.clone());
    let exact = if member.exact_duplicate { " [exact]" } else { "" };
    format!(
        "{}  {}  (#{}){}",
        member.timestamp.format("%Y-%m-%d %H:%M:%S"),
        who,
        member.original_index,
        exact
    )
}
