//! Calendar arithmetic behind the record table: period windows, age, next
//! birthday, filtering and multi-key sorting.
//!
//! Every function takes `today` explicitly; only callers at the edge read the
//! clock.

use crate::error::{BirthdaysError, Result};
use crate::record::{lenient_int, Record};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Period
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Period {
    #[default]
    All,
    Today,
    ThisWeek,
    NextWeek,
    ThisMonth,
    NextMonth,
    ThisQuarter,
    NextQuarter,
    ThisYear,
    NextYear,
}

impl Period {
    pub const ALL: [Period; 10] = [
        Period::All,
        Period::Today,
        Period::ThisWeek,
        Period::NextWeek,
        Period::ThisMonth,
        Period::NextMonth,
        Period::ThisQuarter,
        Period::NextQuarter,
        Period::ThisYear,
        Period::NextYear,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Period::All => "all",
            Period::Today => "today",
            Period::ThisWeek => "this-week",
            Period::NextWeek => "next-week",
            Period::ThisMonth => "this-month",
            Period::NextMonth => "next-month",
            Period::ThisQuarter => "this-quarter",
            Period::NextQuarter => "next-quarter",
            Period::ThisYear => "this-year",
            Period::NextYear => "next-year",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = BirthdaysError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Period::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| BirthdaysError::InvalidPeriod(s.to_string()))
    }
}

/// Inclusive date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Window covered by `period` relative to `today`. `All` has no window.
pub fn period_range(period: Period, today: NaiveDate) -> Option<DateRange> {
    let range = |start, end| Some(DateRange { start, end });
    match period {
        Period::All => None,
        Period::Today => range(today, today),
        Period::ThisWeek => {
            let to_sunday = (7 - today.weekday().num_days_from_sunday()) % 7;
            range(today, today + Duration::days(i64::from(to_sunday)))
        }
        Period::NextWeek => {
            let to_monday = match (8 - today.weekday().num_days_from_sunday()) % 7 {
                0 => 7,
                n => n,
            };
            let start = today + Duration::days(i64::from(to_monday));
            range(start, start + Duration::days(6))
        }
        Period::ThisMonth => month_window(today.year(), today.month0() as i32, 1),
        Period::NextMonth => month_window(today.year(), today.month0() as i32 + 1, 1),
        Period::ThisQuarter => {
            let q = (today.month0() / 3) as i32;
            month_window(today.year(), q * 3, 3)
        }
        Period::NextQuarter => {
            let q = (today.month0() / 3) as i32 + 1;
            month_window(today.year(), q * 3, 3)
        }
        Period::ThisYear => month_window(today.year(), 0, 12),
        Period::NextYear => month_window(today.year() + 1, 0, 12),
    }
}

/// `months` whole months starting at zero-based `month0` of `year`; `month0`
/// may overflow into following years.
fn month_window(year: i32, month0: i32, months: i32) -> Option<DateRange> {
    let start = first_of_month(year, month0)?;
    let end = first_of_month(year, month0 + months)? - Duration::days(1);
    Some(DateRange { start, end })
}

fn first_of_month(year: i32, month0: i32) -> Option<NaiveDate> {
    let total = year.checked_mul(12)?.checked_add(month0)?;
    NaiveDate::from_ymd_opt(total.div_euclid(12), total.rem_euclid(12) as u32 + 1, 1)
}

// ---------------------------------------------------------------------------
// Birthdays and ages
// ---------------------------------------------------------------------------

/// The anniversary of `month`/`day` in `year`. Days past the end of the month
/// roll forward, so Feb 29 lands on Mar 1 in common years.
pub fn birthday_in(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let month0 = i32::try_from(month).ok()?.checked_sub(1)?;
    let first = first_of_month(year, month0)?;
    first.checked_add_signed(Duration::days(i64::from(day) - 1))
}

fn anniversary(record: &Record, year: i32) -> Option<NaiveDate> {
    let p = record.date_parts();
    birthday_in(year, p.month, p.day)
}

/// Completed years on `today`.
pub fn age(record: &Record, today: NaiveDate) -> i32 {
    let born = record.date_parts().year;
    let mut age = today.year().saturating_sub(born);
    if anniversary(record, today.year()).is_some_and(|b| b > today) {
        age = age.saturating_sub(1);
    }
    age
}

/// Next birthday relative to an optional window.
///
/// If the window contains an anniversary (checked in its start year, then its
/// end year) that one wins. Otherwise it is the first anniversary on or after
/// the window's end, or on or after `today` without a window. Returns the age
/// reached on that day and the date.
pub fn next_birthday(
    record: &Record,
    range: Option<DateRange>,
    today: NaiveDate,
) -> Option<(i32, NaiveDate)> {
    let born = record.date_parts().year;

    if let Some(r) = range {
        for year in [r.start.year(), r.end.year()] {
            if let Some(date) = anniversary(record, year).filter(|d| r.contains(*d)) {
                return Some((date.year().saturating_sub(born), date));
            }
        }
    }

    let target = range.map(|r| r.end).unwrap_or(today);
    let mut date = anniversary(record, target.year())?;
    if date < target {
        date = anniversary(record, target.year() + 1)?;
    }
    Some((date.year().saturating_sub(born), date))
}

/// `"N (DD.MM.YYYY)"`.
pub fn format_next_birthday(age: i32, date: NaiveDate) -> String {
    format!("{age} ({})", date.format("%d.%m.%Y"))
}

/// True if an anniversary in the window's start or end year falls inside it.
pub fn in_period(record: &Record, range: DateRange) -> bool {
    [range.start.year(), range.end.year()]
        .into_iter()
        .filter_map(|year| anniversary(record, year))
        .any(|d| range.contains(d))
}

/// Age reached on the first anniversary on or after the window start, if
/// that anniversary is inside the window; the current age otherwise.
pub fn age_in_period(record: &Record, range: Option<DateRange>, today: NaiveDate) -> i32 {
    if let Some(r) = range {
        let year = r.start.year();
        let candidate = anniversary(record, year).and_then(|d| {
            if d < r.start {
                anniversary(record, year + 1)
            } else {
                Some(d)
            }
        });
        if let Some(d) = candidate.filter(|d| r.contains(*d)) {
            return d.year().saturating_sub(record.date_parts().year);
        }
    }
    age(record, today)
}

// ---------------------------------------------------------------------------
// Modulo filter
// ---------------------------------------------------------------------------

/// Keep only round ages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Modulo {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "10")]
    Ten,
}

impl Modulo {
    pub fn divisor(self) -> Option<i32> {
        match self {
            Modulo::None => None,
            Modulo::Five => Some(5),
            Modulo::Ten => Some(10),
        }
    }
}

impl FromStr for Modulo {
    type Err = BirthdaysError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "none" => Ok(Modulo::None),
            "5" => Ok(Modulo::Five),
            "10" => Ok(Modulo::Ten),
            other => Err(BirthdaysError::InvalidModulo(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    FirstName,
    LastName,
    Day,
    Month,
    Year,
    Age,
}

impl FromStr for SortKey {
    type Err = BirthdaysError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "first_name" => Ok(SortKey::FirstName),
            "last_name" => Ok(SortKey::LastName),
            "day" => Ok(SortKey::Day),
            "month" => Ok(SortKey::Month),
            "year" => Ok(SortKey::Year),
            "age" => Ok(SortKey::Age),
            other => Err(BirthdaysError::InvalidSortKey(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Ordered sort criteria; the first entry is the primary key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec(pub Vec<(SortKey, SortOrder)>);

impl SortSpec {
    /// Cycle `key` through none → asc → desc → none. A key that becomes asc
    /// or desc moves to the front.
    pub fn toggle(&mut self, key: SortKey) {
        match self.0.iter().position(|(k, _)| *k == key) {
            None => self.0.insert(0, (key, SortOrder::Asc)),
            Some(idx) => match self.0[idx].1 {
                SortOrder::Asc => {
                    self.0.remove(idx);
                    self.0.insert(0, (key, SortOrder::Desc));
                }
                SortOrder::Desc => {
                    self.0.remove(idx);
                }
            },
        }
    }

    /// Column header arrow for `key`.
    pub fn indicator(&self, key: SortKey) -> &'static str {
        match self.0.iter().find(|(k, _)| *k == key) {
            None => "↔",
            Some((_, SortOrder::Asc)) => "↑",
            Some((_, SortOrder::Desc)) => "↓",
        }
    }

    pub fn compare(&self, a: &Record, b: &Record, today: NaiveDate) -> Ordering {
        for (key, order) in &self.0 {
            let ord = compare_by(*key, a, b, today);
            let ord = match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for SortSpec {
    type Err = BirthdaysError;

    /// `key[:asc|desc],key[:asc|desc],...`
    fn from_str(s: &str) -> Result<Self> {
        let mut spec = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, order) = match part.split_once(':') {
                Some((k, o)) => (k, o.trim()),
                None => (part, "asc"),
            };
            let order = match order {
                "asc" => SortOrder::Asc,
                "desc" => SortOrder::Desc,
                other => return Err(BirthdaysError::InvalidSortKey(format!("{key}:{other}"))),
            };
            spec.push((key.parse()?, order));
        }
        Ok(SortSpec(spec))
    }
}

fn compare_by(key: SortKey, a: &Record, b: &Record, today: NaiveDate) -> Ordering {
    let num = |s: &str| lenient_int(s).unwrap_or(0);
    match key {
        SortKey::FirstName => compare_text(&a.first_name, &b.first_name),
        SortKey::LastName => compare_text(&a.last_name, &b.last_name),
        SortKey::Day => num(&a.day).cmp(&num(&b.day)),
        SortKey::Month => num(&a.month).cmp(&num(&b.month)),
        SortKey::Year => num(&a.year).cmp(&num(&b.year)),
        SortKey::Age => age(a, today).cmp(&age(b, today)),
    }
}

fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewQuery {
    pub period: Period,
    pub modulo: Modulo,
    pub sort: SortSpec,
}

impl ViewQuery {
    /// Build from optional query-string values.
    pub fn parse(period: Option<&str>, modulo: Option<&str>, sort: Option<&str>) -> Result<Self> {
        Ok(Self {
            period: period.map(str::parse::<Period>).transpose()?.unwrap_or_default(),
            modulo: modulo.map(str::parse::<Modulo>).transpose()?.unwrap_or_default(),
            sort: sort.map(str::parse::<SortSpec>).transpose()?.unwrap_or_default(),
        })
    }
}

/// A record as the table shows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewRow {
    /// Position in the stored list, usable with the `/people/{index}` routes.
    pub index: usize,
    #[serde(flatten)]
    pub record: Record,
    pub age: i32,
    pub next_birthday: String,
}

/// Filter by period and modulo, then sort. Rows keep their stored index.
pub fn view(rows: &[Record], query: &ViewQuery, today: NaiveDate) -> Vec<ViewRow> {
    let range = period_range(query.period, today);

    let mut selected: Vec<(usize, &Record)> = rows
        .iter()
        .enumerate()
        .filter(|(_, r)| range.map_or(true, |rg| in_period(r, rg)))
        .filter(|(_, r)| match query.modulo.divisor() {
            Some(m) => age_in_period(r, range, today) % m == 0,
            None => true,
        })
        .collect();

    if !query.sort.is_empty() {
        selected.sort_by(|(_, a), (_, b)| query.sort.compare(a, b, today));
    }

    selected
        .into_iter()
        .map(|(index, r)| ViewRow {
            index,
            record: r.clone(),
            age: age(r, today),
            next_birthday: next_birthday(r, range, today)
                .map(|(a, d)| format_next_birthday(a, d))
                .unwrap_or_default(),
        })
        .collect()
}
