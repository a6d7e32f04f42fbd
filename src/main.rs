use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rollcall::services::{
    AcceptSuggestions, History, HistoryRecord, InteractiveReview, RemovalAction, RemovedRow,
    RestoreSelection, Reviewer, Roster,
};
use rollcall::{AppConfig, DetectionConfig, DetectionResult, DuplicateDetector, KeyStrategy};

#[derive(Parser, Debug)]
#[command(
    name = "rollcall",
    version,
    about = "CLI for cleaning duplicate clock-ins out of attendance rosters"
)]
struct Cli {
    /// Config file (default: `<config dir>/rollcall/config.json`)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Duplicate workflows
    Duplicates {
        #[command(subcommand)]
        command: Dups,
    },

    /// Work with removal history
    History {
        #[command(subcommand)]
        command: HistoryCmd,
    },
}

#[derive(Args, Debug)]
struct DetectArgs {
    /// Roster file (JSON array of rows)
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,
    /// Identity key construction
    #[arg(long, value_enum)]
    strategy: Option<KeyStrategy>,
    /// Maximum gap between duplicate clock-ins
    #[arg(long, value_name = "MINUTES")]
    threshold: Option<i64>,
    /// Ignore exact duplicates that are far apart in time
    #[arg(long)]
    no_exact: bool,
}

#[derive(Subcommand, Debug)]
enum Dups {
    /// Find and list duplicate clusters
    Scan {
        #[command(flatten)]
        detect: DetectArgs,
        /// Print the detection result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove duplicates, keeping the earliest record of each cluster
    Cull {
        #[command(flatten)]
        detect: DetectArgs,
        /// Where to write the cleaned roster (default: overwrite the input)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Only show what would be removed
        #[arg(long)]
        dry_run: bool,
        /// Review every cluster before removing anything
        #[arg(long)]
        interactive: bool,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCmd {
    /// List all removal history records
    List {
        /// Roster the history belongs to
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },

    /// Put removed rows back into the roster
    Restore {
        /// Roster the history belongs to
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
        /// Restore a specific record index
        #[arg(long, conflicts_with = "all")]
        record: Option<usize>,
        /// Restore all records
        #[arg(long, conflicts_with = "record")]
        all: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let app = AppConfig::load(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Commands::Duplicates { command } => match command {
            Dups::Scan { detect, json } => {
                let config = app.detection(detect.strategy, detect.threshold, detect.no_exact);
                let roster = load_roster(&detect.input)?;
                let result = run_detection(&roster, &config)?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                } else if result.is_empty() {
                    println!("No duplicates found.");
                } else {
                    print_clusters(&result, &roster);
                }
            }

            Dups::Cull {
                detect,
                output,
                dry_run,
                interactive,
            } => {
                let config = app.detection(detect.strategy, detect.threshold, detect.no_exact);
                println!("▶ Culling duplicates in: {}", detect.input.display());
                let mut roster = load_roster(&detect.input)?;
                let result = run_detection(&roster, &config)?;
                if result.is_empty() {
                    println!("No duplicates found.");
                    return Ok(());
                }

                let (mut reviewer, action): (Box<dyn Reviewer>, RemovalAction) = if interactive {
                    (Box::new(InteractiveReview), RemovalAction::Reviewed)
                } else {
                    (Box::new(AcceptSuggestions), RemovalAction::Auto)
                };
                let to_remove = reviewer
                    .review(&result, &roster)
                    .context("Review was interrupted")?;
                if to_remove.is_empty() {
                    println!("Nothing selected for removal.");
                    return Ok(());
                }

                if dry_run {
                    for &index in &to_remove {
                        println!("   📦 [dry-run] REMOVE {}", describe(&result, &roster, index));
                    }
                    println!("\n⚠️  Dry-run only; no files were changed.");
                    return Ok(());
                }

                let removed: Vec<RemovedRow> = roster
                    .remove(&to_remove)
                    .into_iter()
                    .map(|entry| RemovedRow {
                        original_index: entry.original_index,
                        group_id: result
                            .member(entry.original_index)
                            .map_or(0, |member| member.group_id),
                        row: entry.row,
                    })
                    .collect();
                for row in &removed {
                    println!("   🗑️  Removed #{} → {}", row.original_index, row.row.label());
                }

                let output = output.unwrap_or_else(|| detect.input.clone());
                roster
                    .save(&output)
                    .with_context(|| format!("Failed to write roster {:?}", output))?;

                let history = History::beside(&output, &app.history_file_name);
                history
                    .append(&HistoryRecord::new(&output, &config, action, removed))
                    .with_context(|| format!("Failed to open history file {:?}", history.path()))?;
                println!("\n✅ Recorded removal history in {}", history.path().display());

                // The previous result is stale once rows are gone
                let remaining = run_detection(&roster, &config)?;
                if remaining.is_empty() {
                    println!("No duplicates left.");
                } else {
                    println!(
                        "⚠️  {} cluster(s) still contain duplicates.",
                        remaining.cluster_count()
                    );
                }
            }
        },

        Commands::History { command } => match command {
            HistoryCmd::List { input } => {
                let history = History::beside(&input, &app.history_file_name);
                let records = history
                    .list()
                    .with_context(|| format!("Could not read history file {:?}", history.path()))?;

                println!("🗂️  Removal History:");
                for (i, rec) in records.iter().enumerate() {
                    let removed: Vec<String> =
                        rec.removed.iter().map(|row| row.row.label()).collect();
                    println!(
                        "[{}] {}\n     roster: {}\n     key: {} ({} min)\n     removed: {:?}\n     action: {:?}\n",
                        i,
                        rec.timestamp,
                        rec.roster,
                        rec.strategy.as_str(),
                        rec.threshold_minutes,
                        removed,
                        rec.action
                    );
                }
            }

            HistoryCmd::Restore { input, record, all } => {
                let history = History::beside(&input, &app.history_file_name);
                let mut roster = load_roster(&input)?;
                let selection = match (all, record) {
                    (true, _) => RestoreSelection::All,
                    (false, Some(index)) => RestoreSelection::Index(index),
                    (false, None) => RestoreSelection::Latest,
                };

                let pending = history
                    .restore(&mut roster, selection)
                    .with_context(|| format!("Failed to restore from {:?}", history.path()))?;
                for rec in pending.records() {
                    println!(
                        "🔄 Restored {} row(s) from record {}",
                        rec.removed.len(),
                        rec.timestamp
                    );
                }
                // History is only rewritten once the rows are safely back
                roster
                    .save(&input)
                    .with_context(|| format!("Failed to write roster {:?}", input))?;
                let restored = pending
                    .commit()
                    .with_context(|| format!("Failed to update history {:?}", history.path()))?;

                println!("🧹 Updated history, removed {} record(s)", restored.len());
            }
        },
    }

    Ok(())
}

fn load_roster(path: &Path) -> Result<Roster> {
    let spinner = spinner("Loading roster…")?;
    let roster =
        Roster::load(path).with_context(|| format!("Failed to load roster {:?}", path))?;
    spinner.finish_with_message(format!("Loaded {} row(s)", roster.len()));
    Ok(roster)
}

fn run_detection(roster: &Roster, config: &DetectionConfig) -> Result<DetectionResult> {
    let detector = DuplicateDetector::new(*config)?;
    let spinner = spinner("Detecting duplicates…")?;
    let result = benchmark("duplicate detection", || {
        let records = roster.records(config.strategy);
        detector.detect(&records, roster)
    });
    spinner.finish_and_clear();
    Ok(result)
}

fn print_clusters(result: &DetectionResult, roster: &Roster) {
    let groups = result.groups();
    println!(
        "Found {} record(s) in {} duplicate cluster(s):",
        result.involved.len(),
        groups.len()
    );
    for (group_id, members) in groups {
        println!("\n✨ Group {}:", group_id);
        for member in members {
            let marker = if member.suggest_remove {
                "🗑️  Suggest removing"
            } else {
                "🏆 Keeping"
            };
            println!(
                "   {} → {}",
                marker,
                describe(result, roster, member.original_index)
            );
        }
    }
}

fn describe(result: &DetectionResult, roster: &Roster, index: usize) -> String {
    let label = roster
        .get(index)
        .map(|entry| entry.row.label())
        .unwrap_or_else(|| "?".to_string());
    match result.member(index) {
        Some(member) => format!(
            "{} {} (#{})",
            member.timestamp.format("%Y-%m-%d %H:%M:%S"),
            label,
            index
        ),
        None => format!("{} (#{})", label, index),
    }
}

fn spinner(message: &'static str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

/// Run `f()`, log how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    log::debug!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
