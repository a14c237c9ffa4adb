use crate::error::{BirthdaysError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Column order shared by the CSV codec and the JSON payloads.
pub const HEADER_KEYS: [&str; 5] = ["first_name", "last_name", "day", "month", "year"];

pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 3000;

const DATE_PART_YEAR_LIMIT: i64 = 9999;

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One birthday entry. Every field stays a string so that whatever the user
/// typed round-trips unchanged; integers are only derived for validation and
/// arithmetic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub day: String,
    #[serde(default)]
    pub month: String,
    #[serde(default)]
    pub year: String,
}

/// Integer view of a record's date, parsed leniently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateParts {
    pub day: u32,
    pub month: u32,
    pub year: i32,
}

impl Record {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        day: impl Into<String>,
        month: impl Into<String>,
        year: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            day: day.into(),
            month: month.into(),
            year: year.into(),
        }
    }

    /// Copy with every field trimmed.
    pub fn normalized(&self) -> Self {
        Self {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            day: self.day.trim().to_string(),
            month: self.month.trim().to_string(),
            year: self.year.trim().to_string(),
        }
    }

    /// Check the record, returning the first failing rule.
    pub fn validate(&self) -> Result<()> {
        let r = self.normalized();
        if r.first_name.is_empty() {
            return Err(invalid("first_name is required"));
        }
        if r.last_name.is_empty() {
            return Err(invalid("last_name is required"));
        }
        let (Ok(d), Ok(m), Ok(y)) = (
            r.day.parse::<i64>(),
            r.month.parse::<i64>(),
            r.year.parse::<i64>(),
        ) else {
            return Err(invalid("day/month/year must be integers"));
        };
        if !(1..=31).contains(&d) {
            return Err(invalid("day must be 1-31"));
        }
        if !(1..=12).contains(&m) {
            return Err(invalid("month must be 1-12"));
        }
        if !(i64::from(MIN_YEAR)..=i64::from(MAX_YEAR)).contains(&y) {
            return Err(invalid("year must be a realistic year (1900..3000)"));
        }
        if NaiveDate::from_ymd_opt(y as i32, m as u32, d as u32).is_none() {
            return Err(invalid("Invalid calendar date"));
        }
        Ok(())
    }

    /// Date parts for arithmetic. Unparseable day or month become 1 and an
    /// unparseable year becomes 0. Values are clamped to day 1-31, month 1-12
    /// and year -9999..=9999 so rows that never passed validation stay safe
    /// to compute with.
    pub fn date_parts(&self) -> DateParts {
        let part = |raw: &str, default: i64, lo: i64, hi: i64| {
            lenient_int(raw).unwrap_or(default).clamp(lo, hi)
        };
        DateParts {
            day: part(&self.day, 1, 1, 31) as u32,
            month: part(&self.month, 1, 1, 12) as u32,
            year: part(&self.year, 0, -DATE_PART_YEAR_LIMIT, DATE_PART_YEAR_LIMIT) as i32,
        }
    }

    /// "First Last", trimmed.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    /// Build from a JSON object. Numbers are taken as their decimal text and
    /// missing or null fields become empty strings.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| BirthdaysError::UnsupportedPayload("Invalid person payload".into()))?;
        let field = |key: &str| match obj.get(key) {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        Ok(Self::new(
            field("first_name"),
            field("last_name"),
            field("day"),
            field("month"),
            field("year"),
        )
        .normalized())
    }
}

/// Rows from a bulk JSON payload: either an array of objects or
/// `{"data": [...]}`.
pub fn records_from_json(value: &serde_json::Value) -> Result<Vec<Record>> {
    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(obj) => match obj.get("data") {
            Some(serde_json::Value::Array(items)) => items,
            _ => return Err(unsupported()),
        },
        _ => return Err(unsupported()),
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            Record::from_json(item).map_err(|_| {
                BirthdaysError::UnsupportedPayload(format!("row {}: Invalid person payload", i + 1))
            })
        })
        .collect()
}

fn unsupported() -> BirthdaysError {
    BirthdaysError::UnsupportedPayload("Unsupported payload format".into())
}

fn invalid(msg: &str) -> BirthdaysError {
    BirthdaysError::InvalidRecord(msg.to_string())
}

/// Parse a leading integer the way `parseInt(s, 10)` does: optional sign,
/// then digits, ignoring anything after. `None` if no digits lead.
pub fn lenient_int(s: &str) -> Option<i64> {
    let s = s.trim();
    let (sign, rest) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<i64>().ok().map(|v| sign * v)
}

/// Validate every row, reporting the first failure with its 1-based position.
pub fn validate_all(rows: &[Record]) -> Result<()> {
    for (i, row) in rows.iter().enumerate() {
        if let Err(BirthdaysError::InvalidRecord(msg)) = row.validate() {
            return Err(BirthdaysError::InvalidRecord(format!("row {}: {msg}", i + 1)));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Positional access
// ---------------------------------------------------------------------------

/// Row at `index`, or `IndexOutOfRange`.
pub fn get(rows: &[Record], index: usize) -> Result<&Record> {
    rows.get(index).ok_or(BirthdaysError::IndexOutOfRange {
        index,
        count: rows.len(),
    })
}

/// Replace the row at `index` with the normalized `row`.
pub fn replace(rows: &mut [Record], index: usize, row: &Record) -> Result<()> {
    let count = rows.len();
    let slot = rows
        .get_mut(index)
        .ok_or(BirthdaysError::IndexOutOfRange { index, count })?;
    *slot = row.normalized();
    Ok(())
}

/// Remove and return the row at `index`.
pub fn remove(rows: &mut Vec<Record>, index: usize) -> Result<Record> {
    if index >= rows.len() {
        return Err(BirthdaysError::IndexOutOfRange {
            index,
            count: rows.len(),
        });
    }
    Ok(rows.remove(index))
}

/// Parse a path segment into a zero-based index. Negative or non-numeric
/// input is rejected.
pub fn parse_index(raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| BirthdaysError::InvalidIndex(raw.to_string()))
}
