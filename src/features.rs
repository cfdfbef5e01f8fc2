//! Calendar and pandemic-period features derived from the local timestamp.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::table::ReadingTable;

type CalendarDate = (i32, u32, u32);

/// Pandemic restriction periods. Both bounds are midnight of the given date,
/// so only the first hour of an end date is inside the period.
pub const PANDEMIC_PERIODS: [(CalendarDate, CalendarDate); 2] = [
    ((2020, 3, 18), (2020, 6, 6)),
    ((2021, 1, 18), (2021, 3, 4)),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalendarFeatures {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    /// Monday = 1 ... Sunday = 7.
    pub weekday: u32,
    pub corona: u8,
}

impl CalendarFeatures {
    pub fn from_timestamp(timestamp: NaiveDateTime) -> Self {
        Self {
            year: timestamp.year(),
            month: timestamp.month(),
            day: timestamp.day(),
            hour: timestamp.hour(),
            weekday: timestamp.weekday().num_days_from_monday() + 1,
            corona: u8::from(is_pandemic_period(timestamp)),
        }
    }

    /// (month, day, hour) key used for calendar-local averages.
    pub fn bucket(&self) -> (u32, u32, u32) {
        (self.month, self.day, self.hour)
    }
}

pub fn is_pandemic_period(timestamp: NaiveDateTime) -> bool {
    PANDEMIC_PERIODS.iter().any(|(start, end)| {
        match (midnight(*start), midnight(*end)) {
            (Some(start), Some(end)) => start <= timestamp && timestamp <= end,
            _ => false,
        }
    })
}

fn midnight((year, month, day): CalendarDate) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)
}

pub fn derive_features(table: &ReadingTable) -> ReadingTable {
    let mut rows = table.rows.clone();
    let mut pandemic_rows = 0usize;
    for row in &mut rows {
        let features = CalendarFeatures::from_timestamp(row.timestamp);
        pandemic_rows += usize::from(features.corona);
        row.features = Some(features);
    }

    info!(
        component = "features",
        event = "features.derived",
        rows = rows.len(),
        pandemic_rows
    );

    table.with_rows(rows)
}
