//! Background (re)population of the events database from the case.
//!
//! A population run is transactional and cooperatively cancellable: the
//! cancel flag is polled once per processed file, artifact or tag, and a
//! cancelled run rolls the transaction back instead of committing partial
//! data. The repository guarantees at most one run is in flight.

use tokio::sync::watch;
use tracing::info;

use crate::case::{CaseAccess, CaseFile};
use crate::models::event::{EventDescriptions, KnownStatus};
use crate::models::event_type::EventType;
use crate::store::{EventStore, NewEvent, StoreError, StoreWriter};

/// What a population run rebuilds: everything, or only the tag applications
/// (used when tags changed while the timeline was not listening).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebuildMode {
    Full,
    TagsOnly,
}

/// One progress update, emitted once per processed unit of work.
#[derive(Clone, Debug)]
pub struct RebuildProgress {
    pub phase: String,
    /// Label of the item being processed, e.g. the file path.
    pub item: String,
    pub completed: u64,
    pub total: u64,
}

/// Terminal result delivered through the completion callback. Cancellation
/// is an expected outcome, not a failure.
#[derive(Clone, Debug)]
pub enum RebuildOutcome {
    Completed { events: i64 },
    Cancelled,
    Failed(String),
}

pub type ProgressCallback = dyn Fn(RebuildProgress) + Send + Sync;

/// Running rebuild task: the cancel side of its watch channel plus its join
/// handle, kept so a newer rebuild can supersede it.
pub(crate) struct RebuildHandle {
    pub(crate) cancel: watch::Sender<bool>,
    pub(crate) join: tokio::task::JoinHandle<()>,
}

pub const PHASE_GATHERING: &str = "Gathering event data";
pub const PHASE_FILE_EVENTS: &str = "Populating file timestamp events";
pub const PHASE_FILE_TAGS: &str = "Refreshing file tags";
pub const PHASE_RESULT_TAGS: &str = "Refreshing result tags";
pub const PHASE_COMMIT: &str = "Committing events database";

/// Drop and repopulate the store from the case. Returns the number of events
/// inserted, or `StoreError::Cancelled` after rolling back.
pub(crate) fn run_population(
    store: &EventStore,
    case: &dyn CaseAccess,
    mode: RebuildMode,
    cancel: &watch::Receiver<bool>,
    progress: &(dyn Fn(RebuildProgress) + Send + Sync),
) -> Result<i64, StoreError> {
    let cancelled = || *cancel.borrow();

    match mode {
        RebuildMode::Full => {
            info!("beginning full population of the events database");
            store.reinitialize()?;
        }
        RebuildMode::TagsOnly => {
            info!("dropping and replaying tag applications");
            store.reinitialize_tags()?;
        }
    }

    store.in_transaction(|writer| {
        if cancelled() {
            return Err(StoreError::Cancelled);
        }
        let mut inserted: i64 = 0;

        if mode == RebuildMode::Full {
            progress(RebuildProgress {
                phase: PHASE_GATHERING.to_string(),
                item: String::new(),
                completed: 0,
                total: 1,
            });
            let files = case.files();
            let total = files.len() as u64;
            for (index, file) in files.iter().enumerate() {
                if cancelled() {
                    return Err(StoreError::Cancelled);
                }
                progress(RebuildProgress {
                    phase: PHASE_FILE_EVENTS.to_string(),
                    item: file.unique_path.clone(),
                    completed: index as u64,
                    total,
                });
                inserted += insert_file_events(writer, file)?;
            }

            for event_type in EventType::artifact_backed() {
                if cancelled() {
                    return Err(StoreError::Cancelled);
                }
                let artifacts = case.artifacts(event_type);
                let total = artifacts.len() as u64;
                let phase = format!("Populating {} events", event_type.display_name());
                for (index, artifact) in artifacts.iter().enumerate() {
                    if cancelled() {
                        return Err(StoreError::Cancelled);
                    }
                    progress(RebuildProgress {
                        phase: phase.clone(),
                        item: artifact.descriptions.full.clone(),
                        completed: index as u64,
                        total,
                    });
                    if artifact.time > 0 {
                        writer.insert_event(&NewEvent {
                            time: artifact.time,
                            event_type,
                            data_source_id: artifact.data_source_id,
                            file_id: artifact.file_id,
                            artifact_id: Some(artifact.artifact_id),
                            descriptions: &artifact.descriptions,
                            known: KnownStatus::Unknown,
                            hash_set_names: &artifact.hash_set_names,
                            tags: &artifact.tags,
                        })?;
                        inserted += 1;
                    }
                }
            }
        }

        let content_taggings = case.content_taggings();
        let total = content_taggings.len() as u64;
        for (index, tagging) in content_taggings.iter().enumerate() {
            if cancelled() {
                return Err(StoreError::Cancelled);
            }
            progress(RebuildProgress {
                phase: PHASE_FILE_TAGS.to_string(),
                item: tagging.tag.display_name.clone(),
                completed: index as u64,
                total,
            });
            writer.add_tag(tagging.file_id, None, &tagging.tag)?;
        }

        let artifact_taggings = case.artifact_taggings();
        let total = artifact_taggings.len() as u64;
        for (index, tagging) in artifact_taggings.iter().enumerate() {
            if cancelled() {
                return Err(StoreError::Cancelled);
            }
            progress(RebuildProgress {
                phase: PHASE_RESULT_TAGS.to_string(),
                item: tagging.tag.display_name.clone(),
                completed: index as u64,
                total,
            });
            writer.add_tag(tagging.file_id, Some(tagging.artifact_id), &tagging.tag)?;
        }

        progress(RebuildProgress {
            phase: PHASE_COMMIT.to_string(),
            item: String::new(),
            completed: 0,
            total: 1,
        });
        Ok(inserted)
    })
}

/// Insert one event per positive timestamp field of the file. Files with no
/// usable timestamp (logical files) contribute nothing.
fn insert_file_events(writer: &StoreWriter<'_>, file: &CaseFile) -> Result<i64, StoreError> {
    let stamps = [
        (EventType::FileCreated, file.created),
        (EventType::FileAccessed, file.accessed),
        (EventType::FileChanged, file.changed),
        (EventType::FileModified, file.modified),
    ];
    if stamps.iter().all(|&(_, time)| time <= 0) {
        return Ok(0);
    }

    let descriptions = file_descriptions(file);
    let mut inserted = 0;
    for (event_type, time) in stamps {
        if time > 0 {
            writer.insert_event(&NewEvent {
                time,
                event_type,
                data_source_id: file.data_source_id,
                file_id: file.file_id,
                artifact_id: None,
                descriptions: &descriptions,
                known: file.known,
                hash_set_names: &file.hash_set_names,
                tags: &file.tags,
            })?;
            inserted += 1;
        }
    }
    Ok(inserted)
}

/// Derive the three description strings of a file event from its paths:
/// full is the unique path, medium prefixes the parent path with the data
/// source name, short keeps only the data source and root folder.
fn file_descriptions(file: &CaseFile) -> EventDescriptions {
    let data_source_name = substring_before_last(&file.unique_path, &file.parent_path);
    let medium = format!("{data_source_name}{}", file.parent_path);
    let root_folder = substring_before(substring_after(&file.parent_path, "/"), "/");
    let mut short = format!("{data_source_name}/{root_folder}");
    if !short.ends_with('/') {
        short.push('/');
    }
    EventDescriptions::new(file.unique_path.clone(), medium, short)
}

fn substring_before_last<'a>(text: &'a str, separator: &str) -> &'a str {
    match text.rfind(separator) {
        Some(index) => &text[..index],
        None => text,
    }
}

fn substring_after<'a>(text: &'a str, separator: &str) -> &'a str {
    match text.find(separator) {
        Some(index) => &text[index + separator.len()..],
        None => "",
    }
}

fn substring_before<'a>(text: &'a str, separator: &str) -> &'a str {
    match text.find(separator) {
        Some(index) => &text[..index],
        None => text,
    }
}
