use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::filters::Filter;
use crate::models::event_type::{BaseType, EventType, TypeEntry};
use crate::models::interval::TimeInterval;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const MONTH: i64 = 30 * DAY;
const YEAR: i64 = 365 * DAY;

/// Which description string events are grouped and displayed by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptionLevel {
    Short,
    Medium,
    Full,
}

impl DescriptionLevel {
    pub const ALL: [DescriptionLevel; 3] = [
        DescriptionLevel::Short,
        DescriptionLevel::Medium,
        DescriptionLevel::Full,
    ];

    /// Events-table column holding the description at this level.
    pub fn column(self) -> &'static str {
        match self {
            DescriptionLevel::Short => "short_description",
            DescriptionLevel::Medium => "med_description",
            DescriptionLevel::Full => "full_description",
        }
    }
}

/// Whether events are grouped by base type or by sub type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeDetail {
    Base,
    Sub,
}

impl TypeDetail {
    /// Events-table column holding the type code at this detail level.
    pub fn column(self) -> &'static str {
        match self {
            TypeDetail::Base => "base_type",
            TypeDetail::Sub => "sub_type",
        }
    }

    pub fn entry(self, code: i64) -> Option<TypeEntry> {
        match self {
            TypeDetail::Base => BaseType::from_code(code).map(TypeEntry::Base),
            TypeDetail::Sub => EventType::from_code(code).map(TypeEntry::Sub),
        }
    }
}

/// Width of the time buckets events are grouped into for clustering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoomGranularity {
    Years,
    Months,
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl ZoomGranularity {
    /// Pick the bucket width for a time range: the smallest unit such that the
    /// range does not span more than three of the next-larger unit.
    pub fn for_interval(interval: &TimeInterval) -> ZoomGranularity {
        let len = interval.len_secs().max(0);
        if len > 3 * YEAR {
            ZoomGranularity::Years
        } else if len > 3 * MONTH {
            ZoomGranularity::Months
        } else if len > 3 * DAY {
            ZoomGranularity::Days
        } else if len > 3 * HOUR {
            ZoomGranularity::Hours
        } else if len > 3 * MINUTE {
            ZoomGranularity::Minutes
        } else {
            ZoomGranularity::Seconds
        }
    }

    /// SQLite strftime format that truncates a unixepoch timestamp to this
    /// bucket. Always evaluated in UTC.
    pub fn strftime_format(self) -> &'static str {
        match self {
            ZoomGranularity::Years => "%Y",
            ZoomGranularity::Months => "%Y-%m",
            ZoomGranularity::Days => "%Y-%m-%d",
            ZoomGranularity::Hours => "%Y-%m-%dT%H",
            ZoomGranularity::Minutes => "%Y-%m-%dT%H:%M",
            ZoomGranularity::Seconds => "%Y-%m-%dT%H:%M:%S",
        }
    }

    /// Length in seconds of one period of this granularity starting at the
    /// given instant. Month and year periods are calendar-aware: the period
    /// of February 2021 is 28 days, of 2020 is 366 days.
    pub fn period_secs_from(self, start: i64) -> i64 {
        match self {
            ZoomGranularity::Seconds => 1,
            ZoomGranularity::Minutes => MINUTE,
            ZoomGranularity::Hours => HOUR,
            ZoomGranularity::Days => DAY,
            ZoomGranularity::Months => match utc_date(start) {
                Some(date) => days_in_month(date.year(), date.month()) * DAY,
                None => MONTH,
            },
            ZoomGranularity::Years => match utc_date(start) {
                Some(date) => days_in_year(date.year()) * DAY,
                None => YEAR,
            },
        }
    }
}

fn utc_date(secs: i64) -> Option<NaiveDate> {
    Utc.timestamp_opt(secs, 0).single().map(|dt| dt.date_naive())
}

fn days_in_month(year: i32, month: u32) -> i64 {
    let first = NaiveDate::from_ymd_opt(year, month, 1);
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    match (first, next) {
        (Some(first), Some(next)) => (next - first).num_days(),
        _ => 30,
    }
}

fn days_in_year(year: i32) -> i64 {
    match (
        NaiveDate::from_ymd_opt(year, 1, 1),
        NaiveDate::from_ymd_opt(year + 1, 1, 1),
    ) {
        (Some(first), Some(next)) => (next - first).num_days(),
        _ => 365,
    }
}

/// Immutable query key for the zoom-level caches: time range, filter tree,
/// description detail and type detail. Equality and hashing are structural
/// over the filter tree, so two differently-shaped but semantically
/// equivalent filters occupy separate cache entries.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZoomParams {
    pub time_range: TimeInterval,
    pub filter: Filter,
    pub description_level: DescriptionLevel,
    pub type_detail: TypeDetail,
}

impl ZoomParams {
    pub fn new(
        time_range: TimeInterval,
        filter: Filter,
        description_level: DescriptionLevel,
        type_detail: TypeDetail,
    ) -> Self {
        Self {
            time_range,
            filter,
            description_level,
            type_detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granularity_for_interval() {
        let cases = [
            (4 * YEAR, ZoomGranularity::Years),
            (4 * MONTH, ZoomGranularity::Months),
            (4 * DAY, ZoomGranularity::Days),
            (4 * HOUR, ZoomGranularity::Hours),
            (4 * MINUTE, ZoomGranularity::Minutes),
            (2 * MINUTE, ZoomGranularity::Seconds),
        ];
        for (len, expected) in cases {
            let interval = TimeInterval::new(0, len);
            assert_eq!(ZoomGranularity::for_interval(&interval), expected, "len={len}");
        }
    }

    #[test]
    fn test_month_period_is_calendar_aware() {
        // 2021-02-10 falls in a 28-day February
        let feb_2021 = 1_612_915_200;
        assert_eq!(
            ZoomGranularity::Months.period_secs_from(feb_2021),
            28 * DAY
        );
        // 2020-02-10 falls in a 29-day February
        let feb_2020 = 1_581_292_800;
        assert_eq!(
            ZoomGranularity::Months.period_secs_from(feb_2020),
            29 * DAY
        );
    }

    #[test]
    fn test_year_period_handles_leap_years() {
        let mid_2020 = 1_593_561_600; // 2020-07-01
        let mid_2021 = 1_625_097_600; // 2021-07-01
        assert_eq!(ZoomGranularity::Years.period_secs_from(mid_2020), 366 * DAY);
        assert_eq!(ZoomGranularity::Years.period_secs_from(mid_2021), 365 * DAY);
    }

    #[test]
    fn test_hour_quarter_threshold() {
        assert_eq!(ZoomGranularity::Hours.period_secs_from(0) / 4, 900);
    }
}
