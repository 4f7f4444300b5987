use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::event_type::EventType;
use crate::models::zoom::DescriptionLevel;

/// Tri-state classification derived from hash-set matching. The code is
/// persisted in the `known_state` column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnownStatus {
    Unknown,
    Known,
    Notable,
}

impl KnownStatus {
    pub fn code(self) -> i64 {
        match self {
            KnownStatus::Unknown => 0,
            KnownStatus::Known => 1,
            KnownStatus::Notable => 2,
        }
    }

    /// Unrecognized codes decode as Unknown rather than failing the row.
    pub fn from_code(code: i64) -> KnownStatus {
        match code {
            1 => KnownStatus::Known,
            2 => KnownStatus::Notable,
            _ => KnownStatus::Unknown,
        }
    }
}

/// The three description strings of an event, at decreasing granularity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventDescriptions {
    pub full: String,
    pub medium: String,
    pub short: String,
}

impl EventDescriptions {
    pub fn new(
        full: impl Into<String>,
        medium: impl Into<String>,
        short: impl Into<String>,
    ) -> Self {
        Self {
            full: full.into(),
            medium: medium.into(),
            short: short.into(),
        }
    }

    pub fn level(&self, level: DescriptionLevel) -> &str {
        match level {
            DescriptionLevel::Full => &self.full,
            DescriptionLevel::Medium => &self.medium,
            DescriptionLevel::Short => &self.short,
        }
    }
}

/// One row of the events table. Immutable once inserted, except for the
/// `tagged` flag which tag mutation keeps consistent with the tags table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub event_id: i64,
    pub data_source_id: i64,
    pub file_id: i64,
    /// Present only for events derived from an artifact instead of raw
    /// file-system metadata.
    pub artifact_id: Option<i64>,
    /// Seconds since the unix epoch, UTC.
    pub time: i64,
    pub event_type: EventType,
    pub descriptions: EventDescriptions,
    pub known: KnownStatus,
    pub hash_hit: bool,
    pub tagged: bool,
}

impl TimelineEvent {
    pub fn description(&self, level: DescriptionLevel) -> &str {
        self.descriptions.level(level)
    }
}

/// Several simultaneous events that are aliases of the same file (same time,
/// same full description) collapsed into one display row, keeping the mapping
/// from each contributing sub type to its event id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedEvent {
    pub time: i64,
    pub full_description: String,
    pub file_id: i64,
    pub event_ids_by_type: BTreeMap<EventType, i64>,
}
