//! Duplicate detection for attendance rosters.
//!
//! Clock-in records are grouped by identity key (who, what, which day), then
//! records close in time, or byte-identical on their raw fields, are clustered
//! together. Each cluster keeps its earliest record; the others are suggested
//! for removal.
//!
//! ```
//! use chrono::NaiveDate;
//! use rollcall::{DetectionConfig, DuplicateDetector, Record};
//!
//! let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
//! let records = vec![
//!     Record::new(0, "anna|bianchi|lab|2024-03-01", day.and_hms_opt(8, 0, 0).unwrap()),
//!     Record::new(1, "anna|bianchi|lab|2024-03-01", day.and_hms_opt(8, 5, 0).unwrap()),
//! ];
//!
//! let detector = DuplicateDetector::new(DetectionConfig::default().with_threshold_minutes(10)).unwrap();
//! let result = detector.detect_records(&records);
//! assert_eq!(result.suggested_removals, vec![1]);
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod services;

pub use config::{AppConfig, DetectionConfig};
pub use crate::core::{DetectionResult, DuplicateDetector, DuplicateMember, KeyStrategy, Record, WorkingTable};
pub use error::{Error, Result};
