use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

const KEY_SEPARATOR: &str = "|";
const EXACT_SEPARATOR: char = '\u{1f}';

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];
const TIME_FORMATS: [&str; 3] = ["%H:%M:%S", "%H:%M", "%H.%M"];
const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// How the identity key of a record is built.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum KeyStrategy {
    /// name + surname + activity + date
    #[default]
    Names,
    /// fiscal code + date
    FiscalCode,
}

impl KeyStrategy {
    pub fn default_threshold_minutes(self) -> i64 {
        match self {
            KeyStrategy::Names => 120,
            KeyStrategy::FiscalCode => 10,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KeyStrategy::Names => "names",
            KeyStrategy::FiscalCode => "fiscal-code",
        }
    }
}

/// A time cell as it comes out of a spreadsheet export: either text or a
/// fraction of a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeCell {
    Text(String),
    DayFraction(f64),
}

impl TimeCell {
    fn raw(&self) -> String {
        match self {
            TimeCell::Text(text) => text.clone(),
            TimeCell::DayFraction(fraction) => fraction.to_string(),
        }
    }
}

/// One row as handed over by the loader, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub index: usize,
    pub fiscal_code: Option<String>,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub activity: Option<String>,
    pub date: Option<String>,
    pub time: Option<TimeCell>,
    pub started_at: Option<String>,
}

/// One attendance event ready for clustering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub original_index: usize,
    pub identity_key: String,
    pub timestamp: NaiveDateTime,
    pub exact_key: Option<String>,
}

impl Record {
    pub fn new(original_index: usize, identity_key: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            original_index,
            identity_key: identity_key.into(),
            timestamp,
            exact_key: None,
        }
    }

    pub fn with_exact_key(mut self, exact_key: impl Into<String>) -> Self {
        self.exact_key = Some(exact_key.into());
        self
    }

    /// Build a record from a raw row, or `None` when the row lacks a usable
    /// identity or timestamp.
    pub fn normalize(raw: &RawRecord, strategy: KeyStrategy) -> Option<Self> {
        let (timestamp, raw_time) = resolve_timestamp(raw)?;

        let mut components = match strategy {
            KeyStrategy::Names => vec![
                normalize_component(raw.name.as_deref())?,
                normalize_component(raw.surname.as_deref())?,
                normalize_component(raw.activity.as_deref())?,
            ],
            KeyStrategy::FiscalCode => vec![normalize_component(raw.fiscal_code.as_deref())?],
        };
        components.push(timestamp.date().format("%Y-%m-%d").to_string());
        let identity_key = components.join(KEY_SEPARATOR);

        let exact_key = raw_time.map(|raw_time| {
            let mut material = components[..components.len() - 1].join(KEY_SEPARATOR);
            material.push(EXACT_SEPARATOR);
            material.push_str(&raw_time);
            blake3::hash(material.as_bytes()).to_hex().to_string()
        });

        Some(Self {
            original_index: raw.index,
            identity_key,
            timestamp,
            exact_key,
        })
    }
}

/// Trim, lowercase and collapse whitespace runs. Blank input counts as missing.
pub fn normalize_component(value: Option<&str>) -> Option<String> {
    let collapsed = value?
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Resolve the combined timestamp plus the raw text it came from.
fn resolve_timestamp(raw: &RawRecord) -> Option<(NaiveDateTime, Option<String>)> {
    if let Some(started_at) = raw.started_at.as_deref() {
        if let Some(timestamp) = parse_datetime(started_at) {
            return Some((timestamp, Some(started_at.to_string())));
        }
    }

    let date_text = raw.date.as_deref()?;
    let time_cell = raw.time.as_ref()?;
    let date = parse_date(date_text)?;
    let time = parse_time(time_cell)?;

    let mut raw_text = date_text.to_string();
    raw_text.push(EXACT_SEPARATOR);
    raw_text.push_str(&time_cell.raw());
    Some((date.and_time(time), Some(raw_text)))
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    // Date cells exported with a midnight time component
    let date_part = text.split([' ', 'T']).next().unwrap_or(text);
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(date_part, format).ok())
}

pub fn parse_time(cell: &TimeCell) -> Option<NaiveTime> {
    match cell {
        TimeCell::Text(text) => {
            let text = text.trim();
            TIME_FORMATS
                .iter()
                .find_map(|format| NaiveTime::parse_from_str(text, format).ok())
        }
        TimeCell::DayFraction(fraction) => {
            if !(0.0..1.0).contains(fraction) {
                return None;
            }
            // Rounding up to midnight would wrap into the next day
            let seconds = (fraction * 86_400.0).round().min(86_399.0) as u32;
            NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0)
        }
    }
}

pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_row(index: usize, time: &str) -> RawRecord {
        RawRecord {
            index,
            fiscal_code: Some("RSSMRA80A01H501U".to_string()),
            name: Some("  Mario ".to_string()),
            surname: Some("ROSSI".to_string()),
            activity: Some("Didattica   della Matematica".to_string()),
            date: Some("2024-03-01".to_string()),
            time: Some(TimeCell::Text(time.to_string())),
            started_at: None,
        }
    }

    #[test]
    fn test_identity_key_is_case_and_whitespace_insensitive() {
        let record = Record::normalize(&raw_row(0, "08:00:00"), KeyStrategy::Names).unwrap();
        assert_eq!(
            record.identity_key,
            "mario|rossi|didattica della matematica|2024-03-01"
        );

        let mut shouty = raw_row(1, "08:00:00");
        shouty.name = Some("MARIO".to_string());
        shouty.activity = Some("didattica della  MATEMATICA".to_string());
        let other = Record::normalize(&shouty, KeyStrategy::Names).unwrap();
        assert_eq!(record.identity_key, other.identity_key);
    }

    #[test]
    fn test_fiscal_code_strategy() {
        let record = Record::normalize(&raw_row(0, "08:00"), KeyStrategy::FiscalCode).unwrap();
        assert_eq!(record.identity_key, "rssmra80a01h501u|2024-03-01");
        assert_eq!(KeyStrategy::FiscalCode.default_threshold_minutes(), 10);
        assert_eq!(KeyStrategy::Names.default_threshold_minutes(), 120);
    }

    #[test]
    fn test_missing_fields_are_excluded() {
        let mut row = raw_row(0, "08:00:00");
        row.surname = Some("   ".to_string());
        assert!(Record::normalize(&row, KeyStrategy::Names).is_none());
        // The fiscal code key does not need a surname
        assert!(Record::normalize(&row, KeyStrategy::FiscalCode).is_some());

        let mut row = raw_row(0, "not a time");
        assert!(Record::normalize(&row, KeyStrategy::Names).is_none());
        row.time = None;
        assert!(Record::normalize(&row, KeyStrategy::Names).is_none());
    }

    #[test]
    fn test_started_at_takes_precedence() {
        let mut row = raw_row(0, "08:00:00");
        row.started_at = Some("2024-03-02 09:15".to_string());
        let record = Record::normalize(&row, KeyStrategy::Names).unwrap();
        assert_eq!(record.timestamp.to_string(), "2024-03-02 09:15:00");
        assert!(record.identity_key.ends_with("2024-03-02"));

        row.started_at = Some("garbage".to_string());
        let record = Record::normalize(&row, KeyStrategy::Names).unwrap();
        assert_eq!(record.timestamp.to_string(), "2024-03-01 08:00:00");
    }

    #[test]
    fn test_day_fraction_time() {
        assert_eq!(
            parse_time(&TimeCell::DayFraction(0.5)),
            NaiveTime::from_hms_opt(12, 0, 0)
        );
        assert_eq!(
            parse_time(&TimeCell::DayFraction(1.0 / 3.0)),
            NaiveTime::from_hms_opt(8, 0, 0)
        );
        assert_eq!(parse_time(&TimeCell::DayFraction(1.5)), None);
    }

    #[test]
    fn test_day_fraction_just_before_midnight() {
        assert_eq!(
            parse_time(&TimeCell::DayFraction(0.999_999)),
            NaiveTime::from_hms_opt(23, 59, 59)
        );

        let mut row = raw_row(0, "08:00:00");
        row.time = Some(TimeCell::DayFraction(0.999_999_9));
        let record = Record::normalize(&row, KeyStrategy::Names).unwrap();
        assert_eq!(record.timestamp.to_string(), "2024-03-01 23:59:59");
    }

    #[test]
    fn test_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1);
        assert_eq!(parse_date("2024-03-01"), expected);
        assert_eq!(parse_date("01/03/2024"), expected);
        assert_eq!(parse_date("2024-03-01 00:00:00"), expected);
        assert_eq!(parse_date("2024-03-01T00:00:00"), expected);
        assert_eq!(parse_date("March first"), None);
    }

    #[test]
    fn test_exact_key_tracks_raw_text() {
        let a = Record::normalize(&raw_row(0, "08:00:00"), KeyStrategy::Names).unwrap();
        let b = Record::normalize(&raw_row(1, "08:00:00"), KeyStrategy::Names).unwrap();
        let c = Record::normalize(&raw_row(2, "08:00"), KeyStrategy::Names).unwrap();

        assert_eq!(a.exact_key, b.exact_key);
        // Same instant, different raw representation
        assert_eq!(a.timestamp, c.timestamp);
        assert_ne!(a.exact_key, c.exact_key);
        assert_eq!(a.exact_key.as_ref().map(String::len), Some(64));
    }
}
