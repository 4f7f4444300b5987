use serde::{Deserialize, Serialize};

use crate::models::event_type::TypeEntry;
use crate::models::interval::TimeInterval;
use crate::models::zoom::DescriptionLevel;

/// Events sharing one time bucket, type and description, as produced by the
/// clustering query. `start_time`/`end_time` are the inclusive min/max
/// timestamps of the members.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCluster {
    pub event_type: TypeEntry,
    pub description: String,
    pub description_level: DescriptionLevel,
    pub start_time: i64,
    pub end_time: i64,
    pub event_ids: Vec<i64>,
    pub hash_hit_ids: Vec<i64>,
    pub tagged_ids: Vec<i64>,
}

impl EventCluster {
    pub fn span(&self) -> TimeInterval {
        TimeInterval::spanning(self.start_time, self.end_time)
    }

    /// Merge two adjacent clusters of the same type and description into one.
    pub fn merge(mut self, other: EventCluster) -> EventCluster {
        self.start_time = self.start_time.min(other.start_time);
        self.end_time = self.end_time.max(other.end_time);
        union_into(&mut self.event_ids, other.event_ids);
        union_into(&mut self.hash_hit_ids, other.hash_hit_ids);
        union_into(&mut self.tagged_ids, other.tagged_ids);
        self
    }
}

/// One or more clusters of identical type and description merged for
/// presentation. Holds the set-union of the member id lists and the earliest
/// start time for ordering.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStripe {
    pub event_type: TypeEntry,
    pub description: String,
    pub description_level: DescriptionLevel,
    pub start_time: i64,
    pub end_time: i64,
    pub clusters: Vec<EventCluster>,
    pub event_ids: Vec<i64>,
    pub hash_hit_ids: Vec<i64>,
    pub tagged_ids: Vec<i64>,
}

impl EventStripe {
    pub fn from_cluster(cluster: EventCluster) -> EventStripe {
        EventStripe {
            event_type: cluster.event_type,
            description: cluster.description.clone(),
            description_level: cluster.description_level,
            start_time: cluster.start_time,
            end_time: cluster.end_time,
            event_ids: cluster.event_ids.clone(),
            hash_hit_ids: cluster.hash_hit_ids.clone(),
            tagged_ids: cluster.tagged_ids.clone(),
            clusters: vec![cluster],
        }
    }

    /// Fold another cluster of the same type and description into this stripe.
    pub fn absorb(&mut self, cluster: EventCluster) {
        self.start_time = self.start_time.min(cluster.start_time);
        self.end_time = self.end_time.max(cluster.end_time);
        union_into(&mut self.event_ids, cluster.event_ids.clone());
        union_into(&mut self.hash_hit_ids, cluster.hash_hit_ids.clone());
        union_into(&mut self.tagged_ids, cluster.tagged_ids.clone());
        self.clusters.push(cluster);
    }

    pub fn span(&self) -> TimeInterval {
        TimeInterval::spanning(self.start_time, self.end_time)
    }
}

fn union_into(target: &mut Vec<i64>, other: Vec<i64>) {
    target.extend(other);
    target.sort_unstable();
    target.dedup();
}
