pub mod history;
pub mod review;
pub mod roster;

pub use history::{
    History, HistoryRecord, PendingRestore, RemovalAction, RemovedRow, RestoreSelection,
};
pub use review::{AcceptSuggestions, InteractiveReview, Reviewer};
pub use roster::{Roster, RosterEntry, RosterRow};
