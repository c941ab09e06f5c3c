use crate::scrobble::Scrobble;
use crate::{HeatmapError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

/// Format of `date["#text"]` in Last.fm responses, e.g. `"01 Jan 2024, 12:34"`.
pub const SCROBBLE_DATE_FORMAT: &str = "%d %b %Y, %H:%M";

/// How scrobbles with a missing or malformed timestamp are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Skip them and count the rest
    #[default]
    Tolerant,
    /// Fail the whole run on the first one
    Strict,
}

/// Play counts per calendar date, in date order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DailyCounts {
    counts: BTreeMap<NaiveDate, u32>,
}

impl DailyCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, date: NaiveDate) -> Option<u32> {
        self.counts.get(&date).copied()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, u32)> + '_ {
        self.counts.iter().map(|(date, count)| (*date, *count))
    }

    /// Total number of plays across all dates.
    pub fn total(&self) -> u64 {
        self.counts.values().map(|&count| u64::from(count)).sum()
    }

    /// Highest single-day count, `None` when empty.
    pub fn max(&self) -> Option<u32> {
        self.counts.values().copied().max()
    }

    pub fn record(&mut self, date: NaiveDate) {
        *self.counts.entry(date).or_insert(0) += 1;
    }
}

impl From<BTreeMap<NaiveDate, u32>> for DailyCounts {
    fn from(counts: BTreeMap<NaiveDate, u32>) -> Self {
        Self { counts }
    }
}

impl FromIterator<(NaiveDate, u32)> for DailyCounts {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, u32)>>(iter: I) -> Self {
        Self {
            counts: iter.into_iter().collect(),
        }
    }
}

/// Parse a Last.fm scrobble date text.
pub fn parse_scrobble_date(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), SCROBBLE_DATE_FORMAT).ok()
}

/// Count scrobbles per calendar day, ignoring the time of day.
pub fn count_daily(scrobbles: &[Scrobble], mode: ParseMode) -> Result<DailyCounts> {
    let mut counts = DailyCounts::new();
    let mut skipped = 0usize;

    for scrobble in scrobbles {
        match scrobble.date_text.as_deref().and_then(parse_scrobble_date) {
            Some(timestamp) => counts.record(timestamp.date()),
            None => match mode {
                ParseMode::Tolerant => skipped += 1,
                ParseMode::Strict => {
                    return Err(HeatmapError::Timestamp(format!(
                        "'{}' by '{}' has date {:?}",
                        scrobble.name, scrobble.artist, scrobble.date_text
                    )));
                }
            },
        }
    }

    if skipped > 0 {
        log::debug!("Skipped {skipped} scrobbles without a parseable date");
    }

    Ok(counts)
}
