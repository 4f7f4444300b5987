//! Public API over the event store: bounded caches, their invalidation on
//! tag mutation and rebuild, the derived filter data (hash sets, data
//! sources, tag names), and single-flight rebuild orchestration.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::cache::BoundedCache;
use crate::case::CaseAccess;
use crate::config::CoreConfig;
use crate::constants::{
    CACHE_IDLE_EXPIRY, DB_INFO_LAST_POPULATED, EVENT_CACHE_CAPACITY, ZOOM_CACHE_CAPACITY,
};
use crate::filters::{filters_equivalent, Filter};
use crate::models::cluster::EventStripe;
use crate::models::event::{CombinedEvent, TimelineEvent};
use crate::models::event_type::TypeEntry;
use crate::models::interval::TimeInterval;
use crate::models::tag::TagRecord;
use crate::models::zoom::ZoomParams;
use crate::rebuild::{
    run_population, RebuildHandle, RebuildMode, RebuildOutcome, RebuildProgress,
};
use crate::store::{unix_now_secs, EventStore, StoreError};

/// Derived observable state refreshed after rebuilds and tag mutations.
#[derive(Clone, Debug, Default)]
struct FilterData {
    hash_set_names: BTreeMap<i64, String>,
    data_source_names: BTreeMap<i64, String>,
    tag_names_in_use: Vec<String>,
}

struct RepoInner {
    store: Arc<EventStore>,
    case: Arc<dyn CaseAccess>,
    min_time: Mutex<Option<i64>>,
    max_time: Mutex<Option<i64>>,
    stripe_cache: Mutex<BoundedCache<ZoomParams, Vec<EventStripe>>>,
    count_cache: Mutex<BoundedCache<ZoomParams, BTreeMap<TypeEntry, i64>>>,
    event_cache: Mutex<BoundedCache<i64, Option<TimelineEvent>>>,
    filter_data: Mutex<FilterData>,
    worker: Mutex<Option<RebuildHandle>>,
}

/// Cached front over the event store. Cheap to clone; all clones share the
/// same caches and rebuild slot. Safe for concurrent zoom requests: the
/// caches carry their own locks and every population callback serializes on
/// the store's lock.
#[derive(Clone)]
pub struct EventRepository {
    inner: Arc<RepoInner>,
}

impl EventRepository {
    pub fn new(store: Arc<EventStore>, case: Arc<dyn CaseAccess>) -> EventRepository {
        let inner = Arc::new(RepoInner {
            store,
            case,
            min_time: Mutex::new(None),
            max_time: Mutex::new(None),
            stripe_cache: Mutex::new(BoundedCache::new(ZOOM_CACHE_CAPACITY, CACHE_IDLE_EXPIRY)),
            count_cache: Mutex::new(BoundedCache::new(ZOOM_CACHE_CAPACITY, CACHE_IDLE_EXPIRY)),
            event_cache: Mutex::new(BoundedCache::new(EVENT_CACHE_CAPACITY, CACHE_IDLE_EXPIRY)),
            filter_data: Mutex::new(FilterData::default()),
            worker: Mutex::new(None),
        });
        inner.refresh_filter_data();
        EventRepository { inner }
    }

    /// Open (or create) the case's events database and wrap it.
    pub fn open(config: &CoreConfig, case: Arc<dyn CaseAccess>) -> anyhow::Result<EventRepository> {
        let store = EventStore::open(config).with_context(|| {
            format!(
                "opening events database under {}",
                config.case_dir.display()
            )
        })?;
        Ok(EventRepository::new(Arc::new(store), case))
    }

    // ===== cached lookups =====

    /// Earliest event time, cached until the next rebuild. -1 when empty.
    pub fn min_time(&self) -> i64 {
        let mut cached = self.inner.min_time.lock();
        match *cached {
            Some(time) => time,
            None => {
                let time = self.inner.store.min_time();
                *cached = Some(time);
                time
            }
        }
    }

    /// Latest event time, cached until the next rebuild. -1 when empty.
    pub fn max_time(&self) -> i64 {
        let mut cached = self.inner.max_time.lock();
        match *cached {
            Some(time) => time,
            None => {
                let time = self.inner.store.max_time();
                *cached = Some(time);
                time
            }
        }
    }

    pub fn event_by_id(&self, event_id: i64) -> Option<TimelineEvent> {
        let store = Arc::clone(&self.inner.store);
        self.inner
            .event_cache
            .lock()
            .get_or_insert_with(event_id, || store.event_by_id(event_id))
    }

    pub fn events_by_ids(&self, event_ids: &[i64]) -> Vec<TimelineEvent> {
        event_ids
            .iter()
            .filter_map(|&event_id| self.event_by_id(event_id))
            .collect()
    }

    /// Stripes for the zoom, cached per ZoomParams key.
    pub fn event_stripes(&self, params: &ZoomParams) -> Vec<EventStripe> {
        let store = Arc::clone(&self.inner.store);
        self.inner
            .stripe_cache
            .lock()
            .get_or_insert_with(params.clone(), || store.event_stripes(params))
    }

    /// Per-type event counts for the zoom, cached per ZoomParams key.
    pub fn count_events(&self, params: &ZoomParams) -> BTreeMap<TypeEntry, i64> {
        let store = Arc::clone(&self.inner.store);
        self.inner
            .count_cache
            .lock()
            .get_or_insert_with(params.clone(), || {
                store.count_events_by_type(&params.time_range, &params.filter, params.type_detail)
            })
    }

    // ===== uncached pass-throughs =====

    pub fn event_ids(&self, range: &TimeInterval, filter: &Filter) -> Vec<i64> {
        self.inner.store.event_ids(range, filter)
    }

    pub fn combined_events(&self, range: &TimeInterval, filter: &Filter) -> Vec<CombinedEvent> {
        self.inner.store.combined_events(range, filter)
    }

    pub fn bounding_interval(
        &self,
        range: &TimeInterval,
        filter: &Filter,
    ) -> Option<TimeInterval> {
        self.inner.store.bounding_interval(range, filter)
    }

    pub fn spanning_interval(&self, event_ids: &[i64]) -> Option<TimeInterval> {
        self.inner.store.spanning_interval(event_ids)
    }

    pub fn count_all_events(&self) -> i64 {
        self.inner.store.count_all_events()
    }

    pub fn tag_counts_by_tag_name(&self, event_ids: &BTreeSet<i64>) -> BTreeMap<String, i64> {
        self.inner.store.tag_counts_by_tag_name(event_ids)
    }

    pub fn event_ids_for_file(&self, file_id: i64, include_artifact_events: bool) -> Vec<i64> {
        self.inner
            .store
            .event_ids_for_file(file_id, include_artifact_events)
    }

    pub fn event_ids_for_artifact(&self, artifact_id: i64) -> Vec<i64> {
        self.inner.store.event_ids_for_artifact(artifact_id)
    }

    pub fn is_schema_current(&self) -> bool {
        self.inner.store.is_schema_current()
    }

    /// Wall-clock second of the last completed population, if any.
    pub fn last_populated(&self) -> Option<i64> {
        self.inner.store.db_info_value(DB_INFO_LAST_POPULATED)
    }

    /// Semantic filter equivalence: equality of compiled canonical forms.
    pub fn filters_equivalent(&self, first: &Filter, second: &Filter) -> bool {
        filters_equivalent(first, second)
    }

    // ===== derived filter data =====

    pub fn hash_set_names(&self) -> BTreeMap<i64, String> {
        self.inner.filter_data.lock().hash_set_names.clone()
    }

    pub fn data_source_names(&self) -> BTreeMap<i64, String> {
        self.inner.filter_data.lock().data_source_names.clone()
    }

    pub fn tag_names_in_use(&self) -> Vec<String> {
        self.inner.filter_data.lock().tag_names_in_use.clone()
    }

    // ===== mutation =====

    /// Apply a tag and invalidate precisely what it touched: the zoom caches
    /// wholesale (their keys are not addressable by event id) and the
    /// affected entries of the per-event cache.
    pub fn add_tag(
        &self,
        file_id: i64,
        artifact_id: Option<i64>,
        tag: &TagRecord,
    ) -> BTreeSet<i64> {
        let affected = self.inner.store.add_tag(file_id, artifact_id, tag);
        if !affected.is_empty() {
            self.inner.invalidate_for_tag_mutation(&affected);
        }
        affected
    }

    /// Remove a tag application; invalidation as for `add_tag`.
    pub fn delete_tag(&self, file_id: i64, artifact_id: Option<i64>, tag_id: i64) -> BTreeSet<i64> {
        let affected = self.inner.store.delete_tag(file_id, artifact_id, tag_id);
        if !affected.is_empty() {
            self.inner.invalidate_for_tag_mutation(&affected);
        }
        affected
    }

    // ===== rebuild orchestration =====

    /// Start a population run on a background task. A run already in flight
    /// is cancelled and awaited before the new one begins, so at most one is
    /// ever active. Progress updates arrive once per processed unit;
    /// `on_done` receives the terminal outcome. Must be called from within a
    /// tokio runtime.
    pub fn start_rebuild(
        &self,
        mode: RebuildMode,
        progress: impl Fn(RebuildProgress) + Send + Sync + 'static,
        on_done: impl FnOnce(RebuildOutcome) + Send + 'static,
    ) {
        let mut slot = self.inner.worker.lock();
        let previous = slot.take();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let progress: Arc<dyn Fn(RebuildProgress) + Send + Sync> = Arc::new(progress);

        let join = tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.cancel.send(true);
                if previous.join.await.is_err() {
                    warn!("superseded population task panicked");
                }
            }

            let store = Arc::clone(&inner.store);
            let case = Arc::clone(&inner.case);
            let worker_progress = Arc::clone(&progress);
            let cancel = cancel_rx.clone();
            let result = tokio::task::spawn_blocking(move || {
                run_population(
                    store.as_ref(),
                    case.as_ref(),
                    mode,
                    &cancel,
                    worker_progress.as_ref(),
                )
            })
            .await;

            let outcome = match result {
                Ok(Ok(events)) => {
                    inner.store.analyze();
                    inner
                        .store
                        .set_db_info(DB_INFO_LAST_POPULATED, unix_now_secs());
                    inner.refresh_filter_data();
                    inner.invalidate_all();
                    info!("population finished with {events} events");
                    RebuildOutcome::Completed { events }
                }
                Ok(Err(StoreError::Cancelled)) => {
                    info!("population cancelled before commit");
                    RebuildOutcome::Cancelled
                }
                Ok(Err(err)) => {
                    error!("population failed, rolling back: {err}");
                    RebuildOutcome::Failed(err.to_string())
                }
                Err(join_err) => {
                    error!("population task aborted: {join_err}");
                    RebuildOutcome::Failed(join_err.to_string())
                }
            };
            on_done(outcome);
        });

        *slot = Some(RebuildHandle {
            cancel: cancel_tx,
            join,
        });
    }

    /// Request cancellation of the in-flight rebuild, if any. Cooperative:
    /// the worker notices at its next unit of work and rolls back.
    pub fn cancel_rebuild(&self) {
        if let Some(handle) = self.inner.worker.lock().as_ref() {
            let _ = handle.cancel.send(true);
        }
    }
}

impl RepoInner {
    /// Re-read ground truth for the filter-side observable state: hash sets
    /// from the store catalog, data-source names through the case (add-only,
    /// sources never disappear), tag names in use from the case.
    fn refresh_filter_data(&self) {
        let hash_set_names = self.store.hash_set_names();
        let data_source_ids = self.store.data_source_ids();
        let tag_names = self.case.tag_names_in_use();

        let mut data = self.filter_data.lock();
        data.hash_set_names = hash_set_names;
        for id in data_source_ids {
            if !data.data_source_names.contains_key(&id) {
                let name = self
                    .case
                    .data_source_name(id)
                    .unwrap_or_else(|| format!("data source {id}"));
                data.data_source_names.insert(id, name);
            }
        }
        data.tag_names_in_use = tag_names;
    }

    fn invalidate_all(&self) {
        *self.min_time.lock() = None;
        *self.max_time.lock() = None;
        self.stripe_cache.lock().clear();
        self.count_cache.lock().clear();
        self.event_cache.lock().clear();
    }

    fn invalidate_for_tag_mutation(&self, event_ids: &BTreeSet<i64>) {
        self.stripe_cache.lock().clear();
        self.count_cache.lock().clear();
        {
            let mut cache = self.event_cache.lock();
            for event_id in event_ids {
                cache.remove(event_id);
            }
        }
        let tag_names = self.case.tag_names_in_use();
        self.filter_data.lock().tag_names_in_use = tag_names;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::fixtures::{plain_file, FixtureCase};
    use crate::models::event_type::EventType;
    use crate::models::zoom::{DescriptionLevel, TypeDetail};
    use crate::store::testing::{insert_file_event, open_temp_store};

    fn seeded_repository() -> (tempfile::TempDir, EventRepository) {
        let (dir, store) = open_temp_store();
        store
            .in_transaction(|writer| {
                insert_file_event(writer, 7, 1000, EventType::FileAccessed)?;
                insert_file_event(writer, 7, 1000, EventType::FileModified)?;
                insert_file_event(writer, 8, 2000, EventType::FileAccessed)?;
                Ok(())
            })
            .unwrap();
        let case = Arc::new(FixtureCase::default());
        (dir, EventRepository::new(Arc::new(store), case))
    }

    fn zoom_over_everything() -> ZoomParams {
        ZoomParams::new(
            TimeInterval::new(0, 4000),
            Filter::everything(),
            DescriptionLevel::Full,
            TypeDetail::Sub,
        )
    }

    #[test]
    fn test_tag_mutation_invalidates_affected_caches() {
        let (_dir, repository) = seeded_repository();
        let params = zoom_over_everything();

        // warm every cache
        assert!(!repository.event_by_id(1).unwrap().tagged);
        let stripes = repository.event_stripes(&params);
        assert!(stripes.iter().all(|s| s.tagged_ids.is_empty()));
        let counts = repository.count_events(&params);
        assert_eq!(counts.values().sum::<i64>(), 3);

        let affected = repository.add_tag(7, None, &TagRecord::new(1, 10, "Bookmark"));
        assert_eq!(affected, [1, 2].into_iter().collect());

        // per-event cache: exactly the affected ids were evicted
        assert!(repository.event_by_id(1).unwrap().tagged);
        assert!(repository.event_by_id(2).unwrap().tagged);
        assert!(!repository.event_by_id(3).unwrap().tagged);

        // zoom caches: recomputed wholesale, now showing the tagged members
        let stripes = repository.event_stripes(&params);
        let tagged: Vec<i64> = stripes.iter().flat_map(|s| s.tagged_ids.clone()).collect();
        assert_eq!(tagged, vec![1, 2]);

        let removed = repository.delete_tag(7, None, 1);
        assert_eq!(removed, affected, "round trip reports the same ids");
        assert!(!repository.event_by_id(1).unwrap().tagged);
    }

    #[test]
    fn test_failed_tag_mutation_leaves_caches_alone() {
        let (_dir, repository) = seeded_repository();
        assert!(!repository.event_by_id(1).unwrap().tagged);
        // no event matches this file, so nothing is affected or invalidated
        let affected = repository.add_tag(999, None, &TagRecord::new(1, 10, "Bookmark"));
        assert!(affected.is_empty());
        assert!(!repository.event_by_id(1).unwrap().tagged);
    }

    #[test]
    fn test_initial_filter_data_from_store_and_case() {
        let (_dir, repository) = seeded_repository();
        // events carry data source 1; the fixture resolves its display name
        assert_eq!(
            repository.data_source_names().get(&1).map(String::as_str),
            Some("image1")
        );
        assert!(repository.hash_set_names().is_empty());
    }

    #[test]
    fn test_min_max_time_are_cached() {
        let (_dir, repository) = seeded_repository();
        assert_eq!(repository.min_time(), 1000);
        assert_eq!(repository.max_time(), 2000);
        // direct store writes do not show through until invalidation
        repository
            .inner
            .store
            .in_transaction(|writer| {
                insert_file_event(writer, 9, 50, EventType::FileAccessed)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(repository.min_time(), 1000);
        repository.inner.invalidate_all();
        assert_eq!(repository.min_time(), 50);
    }

    fn rebuild_case() -> FixtureCase {
        let mut file = plain_file(7, "/vol2/docs/", "a.txt");
        file.accessed = 1000;
        file.modified = 2000;
        let mut case = FixtureCase::with_files(vec![file]);
        case.tag_names.push("Bookmark".to_string());
        case
    }

    #[tokio::test]
    async fn test_rebuild_refreshes_caches_and_reports_completion() {
        let (_dir, store) = open_temp_store();
        let repository = EventRepository::new(Arc::new(store), Arc::new(rebuild_case()));

        // warm the extrema caches against the empty store
        assert_eq!(repository.min_time(), -1);
        assert_eq!(repository.max_time(), -1);
        assert!(repository.last_populated().is_none());

        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        repository.start_rebuild(RebuildMode::Full, |_| {}, move |outcome| {
            let _ = done_tx.send(outcome);
        });

        let outcome = done_rx.await.unwrap();
        assert!(
            matches!(outcome, RebuildOutcome::Completed { events: 2 }),
            "unexpected outcome: {outcome:?}"
        );
        assert_eq!(repository.min_time(), 1000);
        assert_eq!(repository.max_time(), 2000);
        assert_eq!(repository.count_all_events(), 2);
        assert!(repository.last_populated().is_some());
        assert_eq!(repository.tag_names_in_use(), vec!["Bookmark".to_string()]);
        assert!(repository.is_schema_current());
    }

    #[tokio::test]
    async fn test_new_rebuild_supersedes_running_one() {
        let (_dir, store) = open_temp_store();
        let repository = EventRepository::new(Arc::new(store), Arc::new(rebuild_case()));

        let (first_tx, first_rx) = tokio::sync::oneshot::channel();
        let (second_tx, second_rx) = tokio::sync::oneshot::channel();
        repository.start_rebuild(RebuildMode::Full, |_| {}, move |outcome| {
            let _ = first_tx.send(outcome);
        });
        repository.start_rebuild(RebuildMode::Full, |_| {}, move |outcome| {
            let _ = second_tx.send(outcome);
        });

        let first = first_rx.await.unwrap();
        let second = second_rx.await.unwrap();
        assert!(
            matches!(first, RebuildOutcome::Completed { .. } | RebuildOutcome::Cancelled),
            "superseded run must complete or cancel, got {first:?}"
        );
        assert!(
            matches!(second, RebuildOutcome::Completed { events: 2 }),
            "unexpected outcome: {second:?}"
        );
        assert_eq!(repository.count_all_events(), 2);
    }

    #[tokio::test]
    async fn test_cancel_rebuild_is_cooperative() {
        let (_dir, store) = open_temp_store();
        // enough files that cancellation lands mid-run in practice, while the
        // outcome stays valid either way
        let mut case = rebuild_case();
        for file_id in 100..200 {
            let mut file = plain_file(file_id, "/vol2/docs/", "x.txt");
            file.accessed = 1000 + file_id;
            case.files.push(file);
        }
        let repository = EventRepository::new(Arc::new(store), Arc::new(case));

        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        repository.start_rebuild(RebuildMode::Full, |_| {}, move |outcome| {
            let _ = done_tx.send(outcome);
        });
        repository.cancel_rebuild();

        let outcome = done_rx.await.unwrap();
        match outcome {
            RebuildOutcome::Cancelled => {
                assert_eq!(repository.count_all_events(), 0, "cancelled run rolled back");
            }
            RebuildOutcome::Completed { .. } => {
                // the run won the race; everything must have been committed
                assert_eq!(repository.count_all_events(), 102);
            }
            RebuildOutcome::Failed(reason) => panic!("rebuild failed: {reason}"),
        }
    }
}
