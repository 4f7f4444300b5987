use serde::{Deserialize, Serialize};

/// One tag application as the case layer hands it to the store. `tag_id` is
/// unique per application; `tag_name_id` identifies the tag definition and
/// `display_name` is denormalized for fast grouping in tag-count queries.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagRecord {
    pub tag_id: i64,
    pub tag_name_id: i64,
    pub display_name: String,
}

impl TagRecord {
    pub fn new(tag_id: i64, tag_name_id: i64, display_name: impl Into<String>) -> Self {
        Self {
            tag_id,
            tag_name_id,
            display_name: display_name.into(),
        }
    }
}
