use std::time::Duration;

/// File name of the events database inside a case directory.
pub const EVENTS_DB_FILE: &str = "events.db";

/// Maximum number of entries in the per-event lookup cache.
pub const EVENT_CACHE_CAPACITY: usize = 5000;

/// Maximum number of entries in each of the zoom-keyed caches
/// (stripe lists and type-count maps).
pub const ZOOM_CACHE_CAPACITY: usize = 1000;

/// Idle period after which a cache entry expires and is recomputed
/// on the next access.
pub const CACHE_IDLE_EXPIRY: Duration = Duration::from_secs(10 * 60);

/// db_info key recording the wall-clock second of the last completed
/// full or tags-only population.
pub const DB_INFO_LAST_POPULATED: &str = "last_populated";
