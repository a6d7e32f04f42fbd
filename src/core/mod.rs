pub mod adjacency;
pub mod cluster;
pub mod duplicate;
pub mod record;
pub mod suggest;
pub mod union_find;

pub use duplicate::{DetectionResult, DuplicateDetector, DuplicateMember, WorkingTable};
pub use record::{KeyStrategy, RawRecord, Record, TimeCell};
