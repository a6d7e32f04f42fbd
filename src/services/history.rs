use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::config::DetectionConfig;
use crate::core::record::KeyStrategy;
use crate::error::{Error, Result};
use crate::services::roster::{Roster, RosterRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalAction {
    /// Suggestions applied as-is
    Auto,
    /// Suggestions confirmed or overridden by a reviewer
    Reviewed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovedRow {
    pub original_index: usize,
    pub group_id: usize,
    pub row: RosterRow,
}

/// One line of the history file: everything a single cull removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: String,
    pub roster: String,
    pub strategy: KeyStrategy,
    pub threshold_minutes: i64,
    pub action: RemovalAction,
    pub removed: Vec<RemovedRow>,
}

impl HistoryRecord {
    pub fn new(
        roster: &Path,
        config: &DetectionConfig,
        action: RemovalAction,
        removed: Vec<RemovedRow>,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            roster: roster.to_string_lossy().into_owned(),
            strategy: config.strategy,
            threshold_minutes: config.threshold_minutes,
            action,
            removed,
        }
    }
}

/// Which records `History::restore` brings back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreSelection {
    Latest,
    Index(usize),
    All,
}

/// Append-only JSON lines log of removals.
#[derive(Debug, Clone)]
pub struct History {
    path: PathBuf,
}

impl History {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// History file stored next to `roster`.
    pub fn beside(roster: &Path, file_name: &str) -> Self {
        let dir = roster.parent().unwrap_or_else(|| Path::new("."));
        Self::new(dir.join(file_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &HistoryRecord) -> Result<()> {
        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(out, "{}", serde_json::to_string(record)?)?;
        log::info!(
            "recorded removal of {} row(s) in {:?}",
            record.removed.len(),
            self.path
        );
        Ok(())
    }

    /// All readable records, oldest first. Malformed lines are skipped.
    pub fn list(&self) -> Result<Vec<HistoryRecord>> {
        Ok(self
            .read_lines()?
            .into_iter()
            .filter_map(|(record, _)| record)
            .collect())
    }

    /// Put removed rows back into `roster`. The history file is left untouched
    /// until [`PendingRestore::commit`], so save the roster first.
    pub fn restore(
        &self,
        roster: &mut Roster,
        selection: RestoreSelection,
    ) -> Result<PendingRestore> {
        let stored = self.read_lines()?;
        let readable = stored.iter().filter(|(record, _)| record.is_some()).count();
        if readable == 0 {
            return Err(Error::EmptyHistory);
        }

        let chosen: Vec<usize> = match selection {
            RestoreSelection::All => (0..readable).collect(),
            RestoreSelection::Latest => vec![readable - 1],
            RestoreSelection::Index(index) if index < readable => vec![index],
            RestoreSelection::Index(index) => {
                return Err(Error::HistoryIndex {
                    index,
                    len: readable,
                });
            }
        };

        let mut restored = Vec::new();
        let mut remaining = Vec::new();
        let mut n = 0;
        for (record, line) in stored {
            match record {
                Some(record) => {
                    if chosen.contains(&n) {
                        restored.push(record);
                    } else {
                        remaining.push(line);
                    }
                    n += 1;
                }
                None => remaining.push(line),
            }
        }

        for record in &restored {
            let rows = record.removed.iter().map(|removed| removed.row.clone()).collect();
            let indices = roster.append(rows);
            log::info!(
                "restored {} row(s) from {} as indices {:?}",
                indices.len(),
                record.timestamp,
                indices
            );
        }

        Ok(PendingRestore {
            path: self.path.clone(),
            restored,
            remaining,
        })
    }

    /// Every non-blank line, parsed where possible.
    fn read_lines(&self) -> Result<Vec<(Option<HistoryRecord>, String)>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);

        let mut stored = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = match serde_json::from_str::<HistoryRecord>(&line) {
                Ok(record) => Some(record),
                Err(err) => {
                    log::warn!("skipping malformed history entry {}: {}", i, err);
                    None
                }
            };
            stored.push((record, line));
        }
        Ok(stored)
    }
}

/// Records already put back into a roster whose history lines have not been
/// dropped yet.
#[derive(Debug)]
#[must_use = "the history file is only rewritten by `commit`"]
pub struct PendingRestore {
    path: PathBuf,
    restored: Vec<HistoryRecord>,
    remaining: Vec<String>,
}

impl PendingRestore {
    pub fn records(&self) -> &[HistoryRecord] {
        &self.restored
    }

    /// Rewrite the history file without the restored records. Unreadable
    /// lines are kept as they were.
    pub fn commit(self) -> Result<Vec<HistoryRecord>> {
        let new_content = if self.remaining.is_empty() {
            String::new()
        } else {
            self.remaining.join("\n") + "\n"
        };
        fs::write(&self.path, new_content)?;
        Ok(self.restored)
    }
}
