//! Event insertion and tag mutation.

use std::collections::BTreeSet;

use rusqlite::params;
use tracing::error;

use crate::models::event::{EventDescriptions, KnownStatus};
use crate::models::event_type::EventType;
use crate::models::tag::TagRecord;
use crate::store::db::{EventStore, StoreError, StoreWriter};

/// One event to insert, as assembled by the population worker.
pub struct NewEvent<'a> {
    pub time: i64,
    pub event_type: EventType,
    pub data_source_id: i64,
    pub file_id: i64,
    pub artifact_id: Option<i64>,
    pub descriptions: &'a EventDescriptions,
    pub known: KnownStatus,
    pub hash_set_names: &'a [String],
    pub tags: &'a [TagRecord],
}

impl StoreWriter<'_> {
    /// Insert one event row, its hash-set catalog/join rows and one tag
    /// application per supplied tag. Returns the generated event id.
    /// Callable any number of times within the open transaction.
    pub fn insert_event(&self, event: &NewEvent<'_>) -> Result<i64, StoreError> {
        self.txn.execute(
            "INSERT INTO events (datasource_id, file_id, artifact_id, time, sub_type, base_type, \
             full_description, med_description, short_description, known_state, hash_hit, tagged) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                event.data_source_id,
                event.file_id,
                event.artifact_id,
                event.time,
                event.event_type.code(),
                event.event_type.base().code(),
                event.descriptions.full,
                event.descriptions.medium,
                event.descriptions.short,
                event.known.code(),
                !event.hash_set_names.is_empty(),
                !event.tags.is_empty(),
            ],
        )?;
        let event_id = self.txn.last_insert_rowid();

        for name in event.hash_set_names {
            self.txn.execute(
                "INSERT OR IGNORE INTO hash_sets (hash_set_name) VALUES (?1)",
                params![name],
            )?;
            let hash_set_id: i64 = self.txn.query_row(
                "SELECT hash_set_id FROM hash_sets WHERE hash_set_name = ?1",
                params![name],
                |row| row.get(0),
            )?;
            self.txn.execute(
                "INSERT OR IGNORE INTO hash_set_hits (hash_set_id, event_id) VALUES (?1, ?2)",
                params![hash_set_id, event_id],
            )?;
        }

        for tag in event.tags {
            self.insert_tag_row(tag, event_id)?;
        }

        Ok(event_id)
    }

    /// Apply a tag to every event derived from (file, artifact) and re-derive
    /// their `tagged` flags. `artifact_id` of `None` scopes the mutation to
    /// the file's non-artifact events. Returns the affected event ids.
    pub fn add_tag(
        &self,
        file_id: i64,
        artifact_id: Option<i64>,
        tag: &TagRecord,
    ) -> Result<BTreeSet<i64>, StoreError> {
        let event_ids = self.events_for_source(file_id, artifact_id)?;
        for &event_id in &event_ids {
            self.insert_tag_row(tag, event_id)?;
        }
        self.rederive_tagged(&event_ids)?;
        Ok(event_ids)
    }

    /// Remove one tag application and re-derive the `tagged` flags of every
    /// event derived from (file, artifact). Returns the affected event ids.
    pub fn delete_tag(
        &self,
        file_id: i64,
        artifact_id: Option<i64>,
        tag_id: i64,
    ) -> Result<BTreeSet<i64>, StoreError> {
        self.txn
            .execute("DELETE FROM tags WHERE tag_id = ?1", params![tag_id])?;
        let event_ids = self.events_for_source(file_id, artifact_id)?;
        self.rederive_tagged(&event_ids)?;
        Ok(event_ids)
    }

    fn insert_tag_row(&self, tag: &TagRecord, event_id: i64) -> Result<(), StoreError> {
        self.txn.execute(
            "INSERT OR IGNORE INTO tags (tag_id, tag_name_id, tag_name_display_name, event_id) \
             VALUES (?1, ?2, ?3, ?4)",
            params![tag.tag_id, tag.tag_name_id, tag.display_name, event_id],
        )?;
        Ok(())
    }

    fn events_for_source(
        &self,
        file_id: i64,
        artifact_id: Option<i64>,
    ) -> Result<BTreeSet<i64>, StoreError> {
        let ids = match artifact_id {
            None => {
                let mut stmt = self.txn.prepare(
                    "SELECT event_id FROM events WHERE file_id = ?1 AND artifact_id IS NULL",
                )?;
                let rows = stmt.query_map(params![file_id], |row| row.get::<_, i64>(0))?;
                rows.collect::<Result<BTreeSet<i64>, _>>()?
            }
            Some(artifact_id) => {
                let mut stmt = self.txn.prepare(
                    "SELECT event_id FROM events WHERE file_id = ?1 AND artifact_id = ?2",
                )?;
                let rows =
                    stmt.query_map(params![file_id, artifact_id], |row| row.get::<_, i64>(0))?;
                rows.collect::<Result<BTreeSet<i64>, _>>()?
            }
        };
        Ok(ids)
    }

    /// Recompute `tagged` for the given events from the tags table itself,
    /// so the flag stays consistent no matter how many applications remain.
    fn rederive_tagged(&self, event_ids: &BTreeSet<i64>) -> Result<(), StoreError> {
        if event_ids.is_empty() {
            return Ok(());
        }
        let id_list: Vec<String> = event_ids.iter().map(i64::to_string).collect();
        self.txn.execute(
            &format!(
                "UPDATE events SET tagged = EXISTS(\
                 SELECT 1 FROM tags WHERE tags.event_id = events.event_id) \
                 WHERE event_id IN ({})",
                id_list.join(", ")
            ),
            [],
        )?;
        Ok(())
    }
}

impl EventStore {
    /// One-shot tag application outside any bulk transaction. Returns the
    /// affected event ids, empty on storage failure.
    pub fn add_tag(
        &self,
        file_id: i64,
        artifact_id: Option<i64>,
        tag: &TagRecord,
    ) -> BTreeSet<i64> {
        match self.in_transaction(|writer| writer.add_tag(file_id, artifact_id, tag)) {
            Ok(event_ids) => event_ids,
            Err(err) => {
                error!("failed to add tag {} to file {file_id}: {err}", tag.tag_id);
                BTreeSet::new()
            }
        }
    }

    /// One-shot tag removal. Returns the affected event ids, empty on
    /// storage failure.
    pub fn delete_tag(
        &self,
        file_id: i64,
        artifact_id: Option<i64>,
        tag_id: i64,
    ) -> BTreeSet<i64> {
        match self.in_transaction(|writer| writer.delete_tag(file_id, artifact_id, tag_id)) {
            Ok(event_ids) => event_ids,
            Err(err) => {
                error!("failed to delete tag {tag_id} from file {file_id}: {err}");
                BTreeSet::new()
            }
        }
    }
}
