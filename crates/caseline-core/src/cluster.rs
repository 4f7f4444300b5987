//! Merges the raw clusters produced by the store's clustering query into
//! presentation stripes.
//!
//! Clusters are partitioned by (type, description). Within a partition,
//! clusters sorted by start time are merged left-to-right whenever the gap to
//! the next cluster is at most one quarter of the zoom period (the period
//! measured from the gap start, so month and year widths follow the
//! calendar). Whatever clusters remain after merging are folded into a single
//! stripe per partition. The same input therefore answers both exact
//! per-bucket counts and visually coalesced groups.

use std::collections::BTreeMap;

use crate::models::cluster::{EventCluster, EventStripe};
use crate::models::event_type::TypeEntry;
use crate::models::zoom::ZoomGranularity;

pub fn merge_clusters_to_stripes(
    clusters: Vec<EventCluster>,
    granularity: ZoomGranularity,
) -> Vec<EventStripe> {
    let mut partitions: BTreeMap<(TypeEntry, String), Vec<EventCluster>> = BTreeMap::new();
    for cluster in clusters {
        partitions
            .entry((cluster.event_type, cluster.description.clone()))
            .or_default()
            .push(cluster);
    }

    let mut stripes = Vec::new();
    for (_, mut group) in partitions {
        group.sort_by_key(|cluster| cluster.start_time);
        let mut iter = group.into_iter();
        let Some(mut current) = iter.next() else {
            continue;
        };

        let mut merged = Vec::new();
        for next in iter {
            let gap = next.start_time - current.end_time;
            if gap <= granularity.period_secs_from(current.end_time) / 4 {
                current = current.merge(next);
            } else {
                merged.push(current);
                current = next;
            }
        }
        merged.push(current);

        let mut clusters = merged.into_iter();
        let Some(first) = clusters.next() else {
            continue;
        };
        let mut stripe = EventStripe::from_cluster(first);
        for cluster in clusters {
            stripe.absorb(cluster);
        }
        stripes.push(stripe);
    }

    stripes.sort_by_key(|stripe| stripe.start_time);
    stripes
}
