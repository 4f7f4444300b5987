use std::path::{Path, PathBuf};

use crate::constants::EVENTS_DB_FILE;

/// Per-case configuration for the timeline core. One store exists per case,
/// addressed by a fixed file name under the case working directory.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub case_dir: PathBuf,
}

impl CoreConfig {
    pub fn new<P: AsRef<Path>>(case_dir: P) -> Self {
        Self {
            case_dir: case_dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the events database inside the case directory.
    pub fn events_db_path(&self) -> PathBuf {
        self.case_dir.join(EVENTS_DB_FILE)
    }
}
