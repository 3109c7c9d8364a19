//! Time periods for observations
//!
//! A period is either a calendar year or a calendar month. Periods order
//! chronologically, with a year sorting just before its own January.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Observation period
///
/// # Examples
///
/// ```
/// use gridstats::domain::period::Period;
/// use std::str::FromStr;
///
/// let month = Period::from_str("2023-07-01").unwrap();
/// assert_eq!(month.to_string(), "2023-07");
/// assert_eq!(month.annual(), Period::year(2023).unwrap());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    /// A full calendar year
    Year(i32),
    /// A single calendar month (1-12)
    Month { year: i32, month: u32 },
}

const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2200;

impl Period {
    /// Creates an annual period
    pub fn year(year: i32) -> Result<Self, String> {
        check_year(year)?;
        Ok(Period::Year(year))
    }

    /// Creates a monthly period
    pub fn month(year: i32, month: u32) -> Result<Self, String> {
        check_year(year)?;
        if !(1..=12).contains(&month) {
            return Err(format!("Invalid month {month}. Must be 1-12"));
        }
        Ok(Period::Month { year, month })
    }

    /// Calendar year this period falls in
    pub fn year_value(&self) -> i32 {
        match self {
            Period::Year(year) => *year,
            Period::Month { year, .. } => *year,
        }
    }

    /// Month number, if this is a monthly period
    pub fn month_value(&self) -> Option<u32> {
        match self {
            Period::Year(_) => None,
            Period::Month { month, .. } => Some(*month),
        }
    }

    /// Whether this is an annual period
    pub fn is_annual(&self) -> bool {
        matches!(self, Period::Year(_))
    }

    /// The annual period containing this one
    pub fn annual(&self) -> Period {
        Period::Year(self.year_value())
    }

    /// The month `months` months before this one
    ///
    /// `None` for annual periods and for results outside the supported years.
    pub fn months_earlier(&self, months: u32) -> Option<Period> {
        let Period::Month { year, month } = *self else {
            return None;
        };
        let index = year * 12 + month as i32 - 1 - months as i32;
        Period::month(index.div_euclid(12), index.rem_euclid(12) as u32 + 1).ok()
    }

    fn sort_key(&self) -> (i32, u32) {
        (self.year_value(), self.month_value().unwrap_or(0))
    }
}

fn check_year(year: i32) -> Result<(), String> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(format!(
            "Year {year} out of range ({MIN_YEAR}-{MAX_YEAR})"
        ));
    }
    Ok(())
}

impl Ord for Period {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for Period {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Year(year) => write!(f, "{year:04}"),
            Period::Month { year, month } => write!(f, "{year:04}-{month:02}"),
        }
    }
}

impl FromStr for Period {
    type Err = String;

    /// Accepts `YYYY`, `YYYY-MM` and `YYYY-MM-DD` (the day is discarded)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut parts = s.split('-');
        let year: i32 = parts
            .next()
            .filter(|p| p.len() == 4)
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| format!("Invalid period '{s}'. Expected YYYY or YYYY-MM"))?;

        match parts.next() {
            None => Period::year(year),
            Some(month) => {
                let month: u32 = month
                    .parse()
                    .map_err(|_| format!("Invalid month in period '{s}'"))?;
                if let Some(day) = parts.next() {
                    let day: u32 = day
                        .parse()
                        .map_err(|_| format!("Invalid day in period '{s}'"))?;
                    if !(1..=31).contains(&day) {
                        return Err(format!("Invalid day in period '{s}'"));
                    }
                }
                if parts.next().is_some() {
                    return Err(format!("Invalid period '{s}'"));
                }
                Period::month(year, month)
            }
        }
    }
}

impl Serialize for Period {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Period::from_str(&raw).map_err(serde::de::Error::custom)
    }
}
