//! Contracts consumed from the case/evidence layer. The timeline core never
//! walks evidence itself; everything it persists is derived through this
//! interface and can be re-derived at any time.

use crate::models::event::{EventDescriptions, KnownStatus};
use crate::models::event_type::EventType;
use crate::models::tag::TagRecord;

/// One file of the case, with the four file-system timestamp fields. A
/// timestamp of zero or less means "not present" and produces no event.
#[derive(Clone, Debug)]
pub struct CaseFile {
    pub file_id: i64,
    pub data_source_id: i64,
    /// Full path including the data source prefix, e.g. `/image1/vol2/docs/a.txt`.
    pub unique_path: String,
    /// Path of the parent directory within the data source, e.g. `/vol2/docs/`.
    pub parent_path: String,
    pub accessed: i64,
    pub modified: i64,
    pub changed: i64,
    pub created: i64,
    pub known: KnownStatus,
    pub hash_set_names: Vec<String>,
    /// Content tags currently applied to this file.
    pub tags: Vec<TagRecord>,
}

/// One artifact instance qualifying for an artifact-backed event type, with
/// its single derived timestamp and the three description strings.
#[derive(Clone, Debug)]
pub struct CaseArtifact {
    pub artifact_id: i64,
    /// The file the artifact is attached to.
    pub file_id: i64,
    pub data_source_id: i64,
    pub time: i64,
    pub descriptions: EventDescriptions,
    pub hash_set_names: Vec<String>,
    /// Artifact tags currently applied to this artifact.
    pub tags: Vec<TagRecord>,
}

/// A content tag as enumerated for tag replay.
#[derive(Clone, Debug)]
pub struct ContentTagging {
    pub file_id: i64,
    pub tag: TagRecord,
}

/// An artifact tag as enumerated for tag replay.
#[derive(Clone, Debug)]
pub struct ArtifactTagging {
    pub file_id: i64,
    pub artifact_id: i64,
    pub tag: TagRecord,
}

/// Read access to the owning case. Implementations are expected to exclude
/// pseudo entries (`.`/`..`, slack files) from `files` themselves.
pub trait CaseAccess: Send + Sync {
    fn files(&self) -> Vec<CaseFile>;

    /// All artifact instances feeding the given artifact-backed event type.
    fn artifacts(&self, event_type: EventType) -> Vec<CaseArtifact>;

    fn content_taggings(&self) -> Vec<ContentTagging>;

    fn artifact_taggings(&self) -> Vec<ArtifactTagging>;

    /// Human-readable name of a data source id.
    fn data_source_name(&self, data_source_id: i64) -> Option<String>;

    /// Display names of the tag definitions currently in use anywhere in the
    /// case. The set can shrink as well as grow.
    fn tag_names_in_use(&self) -> Vec<String>;
}
