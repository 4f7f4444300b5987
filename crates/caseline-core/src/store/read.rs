//! Query execution against the events schema. Every read degrades to a
//! neutral result on storage failure; a broken store dims the timeline view,
//! it never takes the case down.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{error, warn};

use crate::filters::{Filter, Predicate};
use crate::models::cluster::{EventCluster, EventStripe};
use crate::models::event::{CombinedEvent, EventDescriptions, KnownStatus, TimelineEvent};
use crate::models::event_type::{EventType, TypeEntry};
use crate::models::interval::TimeInterval;
use crate::models::zoom::{TypeDetail, ZoomGranularity, ZoomParams};
use crate::store::db::EventStore;

impl EventStore {
    /// Point lookup. Absent ids are a normal result, not an error.
    pub fn event_by_id(&self, event_id: i64) -> Option<TimelineEvent> {
        let conn = self.conn.lock();
        match conn
            .query_row(
                "SELECT * FROM events WHERE event_id = ?1",
                params![event_id],
                event_from_row,
            )
            .optional()
        {
            Ok(event) => event,
            Err(err) => {
                error!("failed to look up event {event_id}: {err}");
                None
            }
        }
    }

    /// Ids of all events inside the half-open time range that pass the
    /// filter, ascending by time. A degenerate range still returns the
    /// instant.
    pub fn event_ids(&self, range: &TimeInterval, filter: &Filter) -> Vec<i64> {
        let (start, end) = half_open(range);
        let predicate = filter.compile();
        let sql = format!(
            "SELECT DISTINCT events.event_id AS event_id, time FROM {} \
             WHERE time >= {start} AND time < {end} AND {} ORDER BY time ASC",
            from_tables(&predicate),
            predicate.where_clause
        );
        let conn = self.conn.lock();
        match collect_ids(&conn, &sql) {
            Ok(ids) => ids,
            Err(err) => {
                error!("failed to query event ids in range: {err}");
                Vec::new()
            }
        }
    }

    /// Events grouped by (time, full description, file), so simultaneous
    /// aliases of the same file render as one row. Each group keeps the
    /// mapping from contributing sub type to event id.
    pub fn combined_events(&self, range: &TimeInterval, filter: &Filter) -> Vec<CombinedEvent> {
        let (start, end) = half_open(range);
        let predicate = filter.compile();
        let sql = format!(
            "SELECT time, full_description, file_id, \
             group_concat(events.event_id) AS event_ids, \
             group_concat(sub_type) AS sub_types \
             FROM {} WHERE time >= {start} AND time < {end} AND {} \
             GROUP BY time, full_description, file_id \
             ORDER BY time ASC, full_description",
            from_tables(&predicate),
            predicate.where_clause
        );
        let conn = self.conn.lock();
        let run = || -> rusqlite::Result<Vec<CombinedEvent>> {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| {
                let event_ids = ungroup_concat(row.get::<_, Option<String>>("event_ids")?);
                let codes = ungroup_concat(row.get::<_, Option<String>>("sub_types")?);
                let mut event_ids_by_type = BTreeMap::new();
                for (&event_id, &code) in event_ids.iter().zip(codes.iter()) {
                    if let Some(event_type) = EventType::from_code(code) {
                        event_ids_by_type.insert(event_type, event_id);
                    }
                }
                Ok(CombinedEvent {
                    time: row.get("time")?,
                    full_description: row
                        .get::<_, Option<String>>("full_description")?
                        .unwrap_or_default(),
                    file_id: row.get("file_id")?,
                    event_ids_by_type,
                })
            })?;
            rows.collect()
        };
        match run() {
            Ok(events) => events,
            Err(err) => {
                error!("failed to query combined events: {err}");
                Vec::new()
            }
        }
    }

    /// Distinct event counts inside the range, grouped by base or sub type.
    pub fn count_events_by_type(
        &self,
        range: &TimeInterval,
        filter: &Filter,
        detail: TypeDetail,
    ) -> BTreeMap<TypeEntry, i64> {
        let (start, end) = half_open(range);
        let predicate = filter.compile();
        let type_column = detail.column();
        let sql = format!(
            "SELECT count(DISTINCT events.event_id) AS count, {type_column} AS type_code \
             FROM {} WHERE time >= {start} AND time < {end} AND {} \
             GROUP BY {type_column}",
            from_tables(&predicate),
            predicate.where_clause
        );
        let conn = self.conn.lock();
        let run = || -> rusqlite::Result<BTreeMap<TypeEntry, i64>> {
            let mut counts = BTreeMap::new();
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let count: i64 = row.get("count")?;
                let Some(code) = row.get::<_, Option<i64>>("type_code")? else {
                    continue;
                };
                match detail.entry(code) {
                    Some(entry) => {
                        counts.insert(entry, count);
                    }
                    None => warn!("ignoring unknown {type_column} code {code} in count query"),
                }
            }
            Ok(counts)
        };
        match run() {
            Ok(counts) => counts,
            Err(err) => {
                error!("failed to count events by type: {err}");
                BTreeMap::new()
            }
        }
    }

    /// Smallest interval containing the nearest passing event at-or-before
    /// the range start and at-or-after the range end. Falls back to the
    /// global extremes when one side has no event.
    pub fn bounding_interval(&self, range: &TimeInterval, filter: &Filter) -> Option<TimeInterval> {
        let predicate = filter.compile();
        let tables = from_tables(&predicate);
        let clause = &predicate.where_clause;
        let sql = format!(
            "SELECT (SELECT max(time) FROM {tables} WHERE time <= {start} AND {clause}) AS start, \
             (SELECT min(time) FROM {tables} WHERE time >= {end} AND {clause}) AS end",
            start = range.start,
            end = range.end,
        );
        let conn = self.conn.lock();
        let run = || -> rusqlite::Result<Option<TimeInterval>> {
            let (before, after): (Option<i64>, Option<i64>) =
                conn.query_row(&sql, [], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let end = match after {
                Some(time) => Some(time),
                None => max_time_of(&conn)?,
            };
            Ok(end.map(|end| TimeInterval::spanning(before.unwrap_or(0), end)))
        };
        match run() {
            Ok(interval) => interval,
            Err(err) => {
                error!("failed to query bounding interval: {err}");
                None
            }
        }
    }

    /// Min/max span over the given event ids, end bound bumped one tick.
    pub fn spanning_interval(&self, event_ids: &[i64]) -> Option<TimeInterval> {
        if event_ids.is_empty() {
            return None;
        }
        let id_list: Vec<String> = event_ids.iter().map(i64::to_string).collect();
        let sql = format!(
            "SELECT min(time), max(time) FROM events WHERE event_id IN ({})",
            id_list.join(", ")
        );
        let conn = self.conn.lock();
        match conn.query_row(&sql, [], |row| {
            Ok((
                row.get::<_, Option<i64>>(0)?,
                row.get::<_, Option<i64>>(1)?,
            ))
        }) {
            Ok((Some(min), Some(max))) => Some(TimeInterval::spanning(min, max)),
            Ok(_) => None,
            Err(err) => {
                error!("failed to query spanning interval: {err}");
                None
            }
        }
    }

    /// Earliest event time, or -1 when the store is empty or unreadable.
    pub fn min_time(&self) -> i64 {
        let conn = self.conn.lock();
        match conn.query_row("SELECT min(time) AS min FROM events", [], |row| {
            row.get::<_, Option<i64>>(0)
        }) {
            Ok(time) => time.unwrap_or(-1),
            Err(err) => {
                error!("failed to get min time: {err}");
                -1
            }
        }
    }

    /// Latest event time, or -1 when the store is empty or unreadable.
    pub fn max_time(&self) -> i64 {
        let conn = self.conn.lock();
        match max_time_of(&conn) {
            Ok(time) => time.unwrap_or(-1),
            Err(err) => {
                error!("failed to get max time: {err}");
                -1
            }
        }
    }

    /// Total number of events, or -1 on failure.
    pub fn count_all_events(&self) -> i64 {
        let conn = self.conn.lock();
        // count(event_id) with a where clause instead of count(*): the latter
        // degrades badly on very large tables
        match conn.query_row(
            "SELECT count(event_id) AS count FROM events WHERE event_id IS NOT NULL",
            [],
            |row| row.get(0),
        ) {
            Ok(count) => count,
            Err(err) => {
                error!("failed to count events: {err}");
                -1
            }
        }
    }

    /// The hash-set catalog, id to name.
    pub fn hash_set_names(&self) -> BTreeMap<i64, String> {
        let conn = self.conn.lock();
        let run = || -> rusqlite::Result<BTreeMap<i64, String>> {
            let mut stmt = conn.prepare("SELECT hash_set_id, hash_set_name FROM hash_sets")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        };
        match run() {
            Ok(names) => names,
            Err(err) => {
                error!("failed to get hash set names: {err}");
                BTreeMap::new()
            }
        }
    }

    /// Distinct data-source ids recorded in the events table.
    pub fn data_source_ids(&self) -> BTreeSet<i64> {
        let conn = self.conn.lock();
        let run = || -> rusqlite::Result<BTreeSet<i64>> {
            let mut stmt = conn
                .prepare("SELECT DISTINCT datasource_id FROM events WHERE datasource_id != 0")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect()
        };
        match run() {
            Ok(ids) => ids,
            Err(err) => {
                error!("failed to get data source ids: {err}");
                BTreeSet::new()
            }
        }
    }

    /// Count of tag applications per tag display name over the given events.
    pub fn tag_counts_by_tag_name(&self, event_ids: &BTreeSet<i64>) -> BTreeMap<String, i64> {
        if event_ids.is_empty() {
            return BTreeMap::new();
        }
        let id_list: Vec<String> = event_ids.iter().map(i64::to_string).collect();
        let sql = format!(
            "SELECT tag_name_display_name, count(DISTINCT tag_id) AS count FROM tags \
             WHERE event_id IN ({}) GROUP BY tag_name_id",
            id_list.join(", ")
        );
        let conn = self.conn.lock();
        let run = || -> rusqlite::Result<BTreeMap<String, i64>> {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        };
        match run() {
            Ok(counts) => counts,
            Err(err) => {
                error!("failed to count tags by name: {err}");
                BTreeMap::new()
            }
        }
    }

    /// Ids of events derived from the given file; artifact-derived events are
    /// included only on request.
    pub fn event_ids_for_file(&self, file_id: i64, include_artifact_events: bool) -> Vec<i64> {
        let sql = if include_artifact_events {
            format!("SELECT event_id, time FROM events WHERE file_id = {file_id}")
        } else {
            format!(
                "SELECT event_id, time FROM events WHERE file_id = {file_id} \
                 AND artifact_id IS NULL"
            )
        };
        let conn = self.conn.lock();
        match collect_ids(&conn, &sql) {
            Ok(ids) => ids,
            Err(err) => {
                error!("failed to get event ids for file {file_id}: {err}");
                Vec::new()
            }
        }
    }

    /// Ids of events derived from the given artifact.
    pub fn event_ids_for_artifact(&self, artifact_id: i64) -> Vec<i64> {
        let sql = format!("SELECT event_id, time FROM events WHERE artifact_id = {artifact_id}");
        let conn = self.conn.lock();
        match collect_ids(&conn, &sql) {
            Ok(ids) => ids,
            Err(err) => {
                error!("failed to get event ids for artifact {artifact_id}: {err}");
                Vec::new()
            }
        }
    }

    /// Raw clustering query: one cluster per (time bucket, type,
    /// description) with its member/hash-hit/tagged id lists and time span.
    pub fn clusters(&self, params: &ZoomParams, granularity: ZoomGranularity) -> Vec<EventCluster> {
        let (start, end) = half_open(&params.time_range);
        let predicate = params.filter.compile();
        let type_column = params.type_detail.column();
        let description_column = params.description_level.column();
        let format = granularity.strftime_format();
        let sql = format!(
            "SELECT strftime('{format}', time, 'unixepoch') AS interval, \
             group_concat(events.event_id) AS event_ids, \
             group_concat(CASE WHEN hash_hit = 1 THEN events.event_id END) AS hash_hit_ids, \
             group_concat(CASE WHEN tagged = 1 THEN events.event_id END) AS tagged_ids, \
             min(time) AS min_time, max(time) AS max_time, \
             {type_column} AS type_code, {description_column} AS description \
             FROM {} WHERE time >= {start} AND time < {end} AND {} \
             GROUP BY interval, {type_column}, {description_column} \
             ORDER BY min(time)",
            from_tables(&predicate),
            predicate.where_clause
        );
        let conn = self.conn.lock();
        let run = || -> rusqlite::Result<Vec<EventCluster>> {
            let mut clusters = Vec::new();
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let Some(code) = row.get::<_, Option<i64>>("type_code")? else {
                    continue;
                };
                let Some(entry) = params.type_detail.entry(code) else {
                    warn!("ignoring unknown {type_column} code {code} in cluster query");
                    continue;
                };
                clusters.push(EventCluster {
                    event_type: entry,
                    description: row
                        .get::<_, Option<String>>("description")?
                        .unwrap_or_default(),
                    description_level: params.description_level,
                    start_time: row.get("min_time")?,
                    end_time: row.get("max_time")?,
                    event_ids: ungroup_concat(row.get::<_, Option<String>>("event_ids")?),
                    hash_hit_ids: ungroup_concat(row.get::<_, Option<String>>("hash_hit_ids")?),
                    tagged_ids: ungroup_concat(row.get::<_, Option<String>>("tagged_ids")?),
                });
            }
            Ok(clusters)
        };
        match run() {
            Ok(clusters) => clusters,
            Err(err) => {
                error!("failed to run clustering query: {err}");
                Vec::new()
            }
        }
    }

    /// Clusters for the zoom, merged into presentation stripes. The bucket
    /// width is derived from the requested time range.
    pub fn event_stripes(&self, params: &ZoomParams) -> Vec<EventStripe> {
        let granularity = ZoomGranularity::for_interval(&params.time_range);
        let clusters = self.clusters(params, granularity);
        crate::cluster::merge_clusters_to_stripes(clusters, granularity)
    }
}

/// Bump degenerate ranges by one tick so `[t, t)` still covers the instant.
fn half_open(range: &TimeInterval) -> (i64, i64) {
    if range.start == range.end {
        (range.start, range.end + 1)
    } else {
        (range.start, range.end)
    }
}

/// FROM clause for a compiled predicate: the events table plus the join
/// tables the fragment references.
fn from_tables(predicate: &Predicate) -> String {
    let mut tables = String::from("events");
    if predicate.needs_hash_join {
        tables.push_str(" LEFT JOIN hash_set_hits ON events.event_id = hash_set_hits.event_id");
    }
    if predicate.needs_tag_join {
        tables.push_str(" LEFT JOIN tags ON events.event_id = tags.event_id");
    }
    tables
}

fn collect_ids(conn: &Connection, sql: &str) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
    rows.collect()
}

fn max_time_of(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    conn.query_row("SELECT max(time) AS max FROM events", [], |row| row.get(0))
}

/// Split a group_concat result back into ids. Join-induced duplicates are
/// dropped so membership lists stay sets.
fn ungroup_concat(value: Option<String>) -> Vec<i64> {
    let mut ids: Vec<i64> = value
        .unwrap_or_default()
        .split(',')
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.parse().ok())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<TimelineEvent> {
    let code: i64 = row.get("sub_type")?;
    let event_type = EventType::from_code(code).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Integer,
            format!("unknown sub_type code {code}").into(),
        )
    })?;
    Ok(TimelineEvent {
        event_id: row.get("event_id")?,
        data_source_id: row.get::<_, Option<i64>>("datasource_id")?.unwrap_or(0),
        file_id: row.get("file_id")?,
        artifact_id: row.get("artifact_id")?,
        time: row.get("time")?,
        event_type,
        descriptions: EventDescriptions {
            full: row
                .get::<_, Option<String>>("full_description")?
                .unwrap_or_default(),
            medium: row
                .get::<_, Option<String>>("med_description")?
                .unwrap_or_default(),
            short: row
                .get::<_, Option<String>>("short_description")?
                .unwrap_or_default(),
        },
        known: KnownStatus::from_code(row.get::<_, Option<i64>>("known_state")?.unwrap_or(0)),
        hash_hit: row.get::<_, Option<i64>>("hash_hit")?.unwrap_or(0) != 0,
        tagged: row.get::<_, Option<i64>>("tagged")?.unwrap_or(0) != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::zoom::DescriptionLevel;
    use crate::store::testing::{
        insert_described_event, insert_file_event, open_temp_store, seeded_store,
    };
    use crate::store::write::NewEvent;

    #[test]
    fn test_event_by_id_round_trip() {
        let (_dir, store) = open_temp_store();
        let event_id = store
            .in_transaction(|writer| {
                insert_file_event(writer, 7, 1000, EventType::FileAccessed)
            })
            .unwrap();
        let event = store.event_by_id(event_id).unwrap();
        assert_eq!(event.event_id, event_id);
        assert_eq!(event.file_id, 7);
        assert_eq!(event.time, 1000);
        assert_eq!(event.event_type, EventType::FileAccessed);
        assert!(store.event_by_id(event_id + 100).is_none());
    }

    #[test]
    fn test_event_ids_half_open_law() {
        let (_dir, store) = seeded_store(&[(7, 1000), (7, 1001), (8, 2000)]);
        let filter = Filter::everything();

        let degenerate = store.event_ids(&TimeInterval::new(1000, 1000), &filter);
        let unit = store.event_ids(&TimeInterval::new(1000, 1001), &filter);
        assert_eq!(degenerate, unit);
        assert_eq!(degenerate.len(), 1);

        let all = store.event_ids(&TimeInterval::new(0, 3000), &filter);
        assert_eq!(all.len(), 3);
        // exclusive end: the event at 2000 is outside [0, 2000)
        let clipped = store.event_ids(&TimeInterval::new(0, 2000), &filter);
        assert_eq!(clipped.len(), 2);
    }

    #[test]
    fn test_event_ids_are_time_ordered() {
        let (_dir, store) = seeded_store(&[(1, 3000), (2, 1000), (3, 2000)]);
        let ids = store.event_ids(&TimeInterval::new(0, 4000), &Filter::everything());
        let times: Vec<i64> = ids
            .iter()
            .map(|&id| store.event_by_id(id).unwrap().time)
            .collect();
        assert_eq!(times, vec![1000, 2000, 3000]);
    }

    #[test]
    fn test_combined_events_collapse_simultaneous_aliases() {
        let (_dir, store) = open_temp_store();
        store
            .in_transaction(|writer| {
                // three events, two sub types, same instant and file
                insert_file_event(writer, 7, 1000, EventType::FileAccessed)?;
                insert_file_event(writer, 7, 1000, EventType::FileModified)?;
                insert_file_event(writer, 7, 1000, EventType::FileAccessed)?;
                Ok(())
            })
            .unwrap();

        let combined = store.combined_events(&TimeInterval::new(0, 2000), &Filter::everything());
        assert_eq!(combined.len(), 1);
        let row = &combined[0];
        assert_eq!(row.time, 1000);
        assert_eq!(row.file_id, 7);
        assert_eq!(row.event_ids_by_type.len(), 2);
        assert!(row.event_ids_by_type.contains_key(&EventType::FileAccessed));
        assert!(row.event_ids_by_type.contains_key(&EventType::FileModified));
    }

    #[test]
    fn test_count_events_by_type_detail_levels() {
        let (_dir, store) = open_temp_store();
        store
            .in_transaction(|writer| {
                insert_file_event(writer, 1, 1000, EventType::FileAccessed)?;
                insert_file_event(writer, 2, 1100, EventType::FileModified)?;
                insert_described_event(writer, 3, 1200, EventType::WebHistory, "example.com")?;
                Ok(())
            })
            .unwrap();

        let range = TimeInterval::new(0, 2000);
        let by_sub = store.count_events_by_type(&range, &Filter::everything(), TypeDetail::Sub);
        assert_eq!(by_sub.get(&TypeEntry::Sub(EventType::FileAccessed)), Some(&1));
        assert_eq!(by_sub.get(&TypeEntry::Sub(EventType::WebHistory)), Some(&1));

        let by_base = store.count_events_by_type(&range, &Filter::everything(), TypeDetail::Base);
        assert_eq!(
            by_base.get(&TypeEntry::Base(crate::models::BaseType::FileSystem)),
            Some(&2)
        );
        assert_eq!(
            by_base.get(&TypeEntry::Base(crate::models::BaseType::WebActivity)),
            Some(&1)
        );
    }

    #[test]
    fn test_bounding_interval_snaps_to_nearest_events() {
        let (_dir, store) = seeded_store(&[(1, 100), (2, 200)]);
        let filter = Filter::everything();

        let interval = store
            .bounding_interval(&TimeInterval::new(150, 160), &filter)
            .unwrap();
        assert_eq!(interval, TimeInterval::new(100, 201));

        // nothing after the range end: fall back to global max + 1
        let interval = store
            .bounding_interval(&TimeInterval::new(250, 260), &filter)
            .unwrap();
        assert_eq!(interval, TimeInterval::new(200, 201));

        // nothing before the range start: start bound absent
        let interval = store
            .bounding_interval(&TimeInterval::new(50, 60), &filter)
            .unwrap();
        assert_eq!(interval, TimeInterval::new(0, 101));
    }

    #[test]
    fn test_spanning_interval_bumps_end() {
        let (_dir, store) = seeded_store(&[(1, 100), (2, 200), (3, 300)]);
        let interval = store.spanning_interval(&[1, 2]).unwrap();
        assert_eq!(interval, TimeInterval::new(100, 201));
        assert!(store.spanning_interval(&[]).is_none());
    }

    #[test]
    fn test_filtered_queries_use_join_tables() {
        let (_dir, store) = open_temp_store();
        let descriptions = EventDescriptions::new("/img/a", "/img", "/img/");
        let hash_sets = vec!["NSRL".to_string()];
        store
            .in_transaction(|writer| {
                writer.insert_event(&NewEvent {
                    time: 1000,
                    event_type: EventType::FileAccessed,
                    data_source_id: 1,
                    file_id: 7,
                    artifact_id: None,
                    descriptions: &descriptions,
                    known: KnownStatus::Unknown,
                    hash_set_names: &hash_sets,
                    tags: &[],
                })?;
                insert_file_event(writer, 8, 1000, EventType::FileAccessed)?;
                Ok(())
            })
            .unwrap();

        let hash_set_ids: BTreeSet<i64> = store.hash_set_names().keys().copied().collect();
        let filter = Filter::HashSets(hash_set_ids);
        let ids = store.event_ids(&TimeInterval::new(0, 2000), &filter);
        assert_eq!(ids.len(), 1);
        assert!(store.event_by_id(ids[0]).unwrap().hash_hit);
    }

    #[test]
    fn test_hide_known_filter() {
        let (_dir, store) = open_temp_store();
        let descriptions = EventDescriptions::new("/img/k", "/img", "/img/");
        store
            .in_transaction(|writer| {
                writer.insert_event(&NewEvent {
                    time: 1000,
                    event_type: EventType::FileAccessed,
                    data_source_id: 1,
                    file_id: 7,
                    artifact_id: None,
                    descriptions: &descriptions,
                    known: KnownStatus::Known,
                    hash_set_names: &[],
                    tags: &[],
                })?;
                insert_file_event(writer, 8, 1000, EventType::FileAccessed)?;
                Ok(())
            })
            .unwrap();

        let ids = store.event_ids(
            &TimeInterval::new(0, 2000),
            &Filter::Intersection(vec![Filter::HideKnown]),
        );
        assert_eq!(ids.len(), 1);
        assert_eq!(store.event_by_id(ids[0]).unwrap().file_id, 8);
    }

    #[test]
    fn test_event_stripes_group_and_merge() {
        let (_dir, store) = open_temp_store();
        store
            .in_transaction(|writer| {
                // same description, gaps of 1s and 2s: one stripe at hour zoom
                insert_described_event(writer, 1, 3600, EventType::FileAccessed, "/img/docs/")?;
                insert_described_event(writer, 2, 3601, EventType::FileAccessed, "/img/docs/")?;
                insert_described_event(writer, 3, 3603, EventType::FileAccessed, "/img/docs/")?;
                // different description: its own stripe
                insert_described_event(writer, 4, 3600, EventType::FileAccessed, "/img/pics/")?;
                Ok(())
            })
            .unwrap();

        // a four-hour window zooms to hour buckets
        let params = ZoomParams::new(
            TimeInterval::new(0, 4 * 3600),
            Filter::everything(),
            DescriptionLevel::Full,
            TypeDetail::Sub,
        );
        let stripes = store.event_stripes(&params);
        assert_eq!(stripes.len(), 2);

        let mut all_ids: Vec<i64> = stripes.iter().flat_map(|s| s.event_ids.clone()).collect();
        all_ids.sort_unstable();
        assert_eq!(all_ids, vec![1, 2, 3, 4], "no event dropped or duplicated");

        let docs = stripes
            .iter()
            .find(|s| s.description == "/img/docs/")
            .unwrap();
        assert_eq!(docs.event_ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_reads_degrade_when_schema_is_broken() {
        let (_dir, store) = seeded_store(&[(7, 1000)]);
        {
            let side = rusqlite::Connection::open(store.path()).unwrap();
            side.execute_batch("DROP TABLE events;").unwrap();
        }
        assert!(store.event_by_id(1).is_none());
        assert!(store
            .event_ids(&TimeInterval::new(0, 2000), &Filter::everything())
            .is_empty());
        assert_eq!(store.min_time(), -1);
        assert_eq!(store.max_time(), -1);
        assert_eq!(store.count_all_events(), -1);
        assert!(store
            .count_events_by_type(
                &TimeInterval::new(0, 2000),
                &Filter::everything(),
                TypeDetail::Sub
            )
            .is_empty());
    }
}
