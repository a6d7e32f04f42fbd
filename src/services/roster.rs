use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::core::duplicate::WorkingTable;
use crate::core::record::{KeyStrategy, RawRecord, Record, TimeCell};
use crate::error::Result;

/// One row of a roster file. Unknown columns are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RosterRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiscal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeCell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RosterRow {
    pub fn to_raw(&self, index: usize) -> RawRecord {
        RawRecord {
            index,
            fiscal_code: self.fiscal_code.clone(),
            name: self.name.clone(),
            surname: self.surname.clone(),
            activity: self.activity.clone(),
            date: self.date.clone(),
            time: self.time.clone(),
            started_at: self.started_at.clone(),
        }
    }

    /// Short human label, e.g. for review prompts.
    pub fn label(&self) -> String {
        let who = [self.name.as_deref(), self.surname.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        let who = if who.is_empty() {
            self.fiscal_code.clone().unwrap_or_else(|| "?".to_string())
        } else {
            who
        };
        match self.activity.as_deref() {
            Some(activity) => format!("{} · {}", who, activity),
            None => who,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub original_index: usize,
    pub row: RosterRow,
}

/// The working table. Entry indices are assigned once and never reused.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Vec<RosterEntry>,
    next_index: usize,
}

impl Roster {
    pub fn from_rows(rows: Vec<RosterRow>) -> Self {
        let mut roster = Self::default();
        roster.append(rows);
        roster
    }

    /// Load a roster saved as a JSON array of rows.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let rows: Vec<RosterRow> = serde_json::from_str(&text)?;
        log::info!("loaded {} row(s) from {:?}", rows.len(), path);
        Ok(Self::from_rows(rows))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let rows: Vec<&RosterRow> = self.entries.iter().map(|entry| &entry.row).collect();
        fs::write(path, serde_json::to_string_pretty(&rows)?)?;
        log::info!("wrote {} row(s) to {:?}", rows.len(), path);
        Ok(())
    }

    /// Normalize every row; rows without a usable identity or timestamp are
    /// left out.
    pub fn records(&self, strategy: KeyStrategy) -> Vec<Record> {
        let records: Vec<Record> = self
            .entries
            .par_iter()
            .filter_map(|entry| Record::normalize(&entry.row.to_raw(entry.original_index), strategy))
            .collect();

        let excluded = self.entries.len() - records.len();
        if excluded > 0 {
            log::warn!(
                "excluded {} row(s) with missing identity or timestamp ({} key)",
                excluded,
                strategy.as_str()
            );
        }
        records
    }

    pub fn get(&self, original_index: usize) -> Option<&RosterEntry> {
        self.entries
            .binary_search_by_key(&original_index, |entry| entry.original_index)
            .ok()
            .map(|position| &self.entries[position])
    }

    /// Remove the given indices, returning the removed entries. Indices that
    /// are no longer present are ignored.
    pub fn remove(&mut self, indices: &[usize]) -> Vec<RosterEntry> {
        let wanted: HashSet<usize> = indices.iter().copied().collect();
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| wanted.contains(&entry.original_index));
        self.entries = kept;
        removed
    }

    /// Append rows, returning their newly assigned indices.
    pub fn append(&mut self, rows: Vec<RosterRow>) -> Vec<usize> {
        rows.into_iter()
            .map(|row| {
                let original_index = self.next_index;
                self.next_index += 1;
                self.entries.push(RosterEntry { original_index, row });
                original_index
            })
            .collect()
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl WorkingTable for Roster {
    fn contains(&self, original_index: usize) -> bool {
        self.get(original_index).is_some()
    }
}
