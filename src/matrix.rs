//! Pivot of daily counts into a day-of-month x month grid.
//!
//! Rows are days 1 to 31, columns are the months present in the data in
//! chronological order. A cell is either a value (a play count, or after
//! [`HeatmapMatrix::log_transform`] an intensity) or [`Cell::Missing`] for days
//! the month does not have, such as April 31.

use crate::daily::DailyCounts;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Number of rows in every column.
pub const DAYS_PER_COLUMN: usize = 31;

/// A calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Number of days in the month, leap years included.
    pub fn days_in_month(&self) -> u32 {
        (28..=31)
            .rev()
            .find(|&day| NaiveDate::from_ymd_opt(self.year, self.month, day).is_some())
            .unwrap_or(28)
    }

    /// Axis label with two-digit year and month, e.g. `"24-01"`.
    pub fn label(&self) -> String {
        format!("{:02}-{:02}", self.year.rem_euclid(100), self.month)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// One matrix cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    /// The day does not exist in this month
    Missing,
    /// A play count or log intensity; zero means the day exists with no plays
    Value(f64),
}

impl Cell {
    pub fn value(&self) -> Option<f64> {
        match self {
            Cell::Missing => None,
            Cell::Value(v) => Some(*v),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }
}

/// `log10(count + 1)`
pub fn count_to_intensity(count: f64) -> f64 {
    (count + 1.0).log10()
}

/// Inverse of [`count_to_intensity`]: `10^v - 1`
pub fn intensity_to_count(intensity: f64) -> f64 {
    10f64.powf(intensity) - 1.0
}

/// Day-of-month x month grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeatmapMatrix {
    months: Vec<YearMonth>,
    columns: Vec<[Cell; DAYS_PER_COLUMN]>,
}

impl HeatmapMatrix {
    pub fn months(&self) -> &[YearMonth] {
        &self.months
    }

    pub fn columns(&self) -> impl Iterator<Item = (YearMonth, &[Cell; DAYS_PER_COLUMN])> {
        self.months.iter().copied().zip(self.columns.iter())
    }

    /// Cell for a 1-based day of month in the given column.
    pub fn get(&self, day: u32, column: usize) -> Option<Cell> {
        if !(1..=DAYS_PER_COLUMN as u32).contains(&day) {
            return None;
        }
        self.columns.get(column).map(|col| col[(day - 1) as usize])
    }

    pub fn num_rows(&self) -> usize {
        DAYS_PER_COLUMN
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// True when there are no months at all.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.columns
            .iter()
            .flat_map(|col| col.iter())
            .filter_map(Cell::value)
    }

    /// Largest real cell value, `None` if every cell is missing.
    pub fn max_value(&self) -> Option<f64> {
        self.values().reduce(f64::max)
    }

    /// Smallest real cell value, `None` if every cell is missing.
    pub fn min_value(&self) -> Option<f64> {
        self.values().reduce(f64::min)
    }

    /// Apply `log10(v + 1)` to every real cell; missing cells stay missing.
    pub fn log_transform(&self) -> HeatmapMatrix {
        self.map_values(count_to_intensity)
    }

    fn map_values<F: Fn(f64) -> f64>(&self, f: F) -> HeatmapMatrix {
        let columns = self
            .columns
            .iter()
            .map(|col| {
                col.map(|cell| match cell {
                    Cell::Missing => Cell::Missing,
                    Cell::Value(v) => Cell::Value(f(v)),
                })
            })
            .collect();
        HeatmapMatrix {
            months: self.months.clone(),
            columns,
        }
    }
}

/// Pivot daily counts into raw play counts per (day, month).
pub fn build_count_matrix(counts: &DailyCounts) -> HeatmapMatrix {
    let months: Vec<YearMonth> = counts
        .iter()
        .map(|(date, _)| YearMonth::from_date(date))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut columns: Vec<[Cell; DAYS_PER_COLUMN]> = months
        .iter()
        .map(|month| {
            let days = month.days_in_month() as usize;
            std::array::from_fn(|row| {
                if row < days {
                    Cell::Value(0.0)
                } else {
                    Cell::Missing
                }
            })
        })
        .collect();

    for (date, count) in counts.iter() {
        let month = YearMonth::from_date(date);
        if let Ok(index) = months.binary_search(&month) {
            columns[index][(date.day() - 1) as usize] = Cell::Value(f64::from(count));
        }
    }

    HeatmapMatrix { months, columns }
}

/// Pivot daily counts and apply the log intensity transform.
pub fn build_matrix(counts: &DailyCounts) -> HeatmapMatrix {
    build_count_matrix(counts).log_transform()
}
