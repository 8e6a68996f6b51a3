/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use crate::conflict::{entries_conflict, ConflictStrategy};
use crate::error::Result;
use event_bus::{Event, EventBus};
use local_store::{ConflictLogEntry, HistoryEntry, LocalStore};
use remote_store::{NewRemoteCommand, RemoteStore, Scope};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

const DEFAULT_BATCH_SIZE: i64 = 50;
const DEFAULT_MAX_RETRIES: i64 = 5;
const DEFAULT_CLEANUP_DAYS: i64 = 30;
const MAX_DOWNLOAD_PAGE_SIZE: i64 = 100;
const LAST_SYNC_TIME_KEY: &str = "last_sync_time";
/// Fallback watermark on a fresh install, per spec §4.6.
const FIRST_SYNC_WINDOW_DAYS: i64 = 7;

/// Tallies from one `force_sync` pass, published as a progress event when
/// anything actually moved.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub uploaded: usize,
    pub upload_failed: usize,
    pub downloaded: usize,
    pub conflicts: usize,
}

/// Bidirectional reconciler between `LocalStore` and `RemoteStore`. Upload
/// drains `sync_queue`; download pages Remote history and resolves
/// conflicts by `request_id`, the only field written identically to both
/// stores (see the module docs on [`crate`]).
pub struct SyncEngine {
    local: Arc<StdMutex<LocalStore>>,
    remote: Arc<RemoteStore>,
    events: EventBus,
    strategy: ConflictStrategy,
    is_syncing: Arc<AtomicBool>,
    batch_size: i64,
    max_retries: i64,
    cleanup_days: i64,
}

impl SyncEngine {
    pub fn new(local: Arc<StdMutex<LocalStore>>, remote: Arc<RemoteStore>, events: EventBus) -> Self {
        Self {
            local,
            remote,
            events,
            strategy: ConflictStrategy::default(),
            is_syncing: Arc::new(AtomicBool::new(false)),
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            cleanup_days: DEFAULT_CLEANUP_DAYS,
        }
    }

    pub fn with_conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn is_syncing(&self) -> bool {
        self.is_syncing.load(Ordering::SeqCst)
    }

    /// Runs one upload+download+cleanup pass. A no-op returning a default
    /// (empty) report if a sync is already in flight, per spec §4.6.
    pub async fn force_sync(&self) -> Result<SyncReport> {
        if self.is_syncing.swap(true, Ordering::SeqCst) {
            return Ok(SyncReport::default());
        }
        let result = self.run_once().await;
        self.is_syncing.store(false, Ordering::SeqCst);
        result
    }

    /// `lastSyncTime` only advances once upload, download, and cleanup all
    /// complete without throwing (spec §4.6's progress guarantee) - a
    /// partial-failure pass leaves the watermark untouched so the next run
    /// retries the same window rather than silently skipping it.
    async fn run_once(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        self.upload_phase(&mut report).await?;
        self.download_phase(&mut report).await?;
        self.cleanup_phase()?;
        let now = chrono::Utc::now().timestamp();
        let local = self.local.lock().unwrap();
        local.sync_metadata_set(LAST_SYNC_TIME_KEY, &now.to_string())?;
        Ok(report)
    }

    /// Drains `sync_queue` in priority order, routing each record to the
    /// Remote scope implied by its own `user_id`/`machine_id` rather than
    /// the caller's configured mode, since a queued item may predate a
    /// mode change.
    async fn upload_phase(&self, report: &mut SyncReport) -> Result<()> {
        let pending = {
            let local = self.local.lock().unwrap();
            local.get_pending_sync(self.batch_size, self.max_retries)?
        };
        if pending.is_empty() {
            return Ok(());
        }

        let mut synced_uuids = Vec::new();
        let mut synced_queue_ids = Vec::new();
        for item in &pending {
            let entry = {
                let local = self.local.lock().unwrap();
                local.get_by_id(&item.record_id)?
            };
            let Some(entry) = entry else {
                // Record was already cleaned up; the queue item is stale.
                synced_queue_ids.push(item.id);
                continue;
            };
            let scope = route_scope(&entry);
            let meta = NewRemoteCommand {
                request_id: entry.request_id.clone(),
                user_id: entry.user_id,
                machine_id: entry.machine_id.clone(),
                session_id: entry.session_id.clone(),
            };
            match self
                .remote
                .save(scope, &entry.command, entry.response.as_deref(), meta)
                .await
            {
                Ok(_id) => {
                    synced_uuids.push(entry.id.clone());
                    synced_queue_ids.push(item.id);
                    report.uploaded += 1;
                }
                Err(e) => {
                    log::warn!("upload of {} failed: {e}", entry.id);
                    let local = self.local.lock().unwrap();
                    local.increment_retry_count(item.id, &e.to_string())?;
                    report.upload_failed += 1;
                }
            }
        }
        if !synced_uuids.is_empty() || !synced_queue_ids.is_empty() {
            let local = self.local.lock().unwrap();
            local.finish_sync_batch(&synced_uuids, &synced_queue_ids)?;
        }
        Ok(())
    }

    /// Pages Remote's hybrid view since `lastSyncTime` (or
    /// [`FIRST_SYNC_WINDOW_DAYS`] ago on a fresh install) and reconciles
    /// each row against Local by `request_id`. Stops on a short page or
    /// once `2 * batch_size` rows have been pulled, per spec §4.6.
    async fn download_phase(&self, report: &mut SyncReport) -> Result<()> {
        let since = {
            let local = self.local.lock().unwrap();
            match local.sync_metadata_get(LAST_SYNC_TIME_KEY)? {
                Some(raw) => raw.parse().unwrap_or_else(|_| self.first_sync_since()),
                None => self.first_sync_since(),
            }
        };
        let page_size = self.batch_size.min(MAX_DOWNLOAD_PAGE_SIZE).max(1);
        let row_cap = self.batch_size * 2;

        let mut offset = 0i64;
        let mut pulled = 0i64;
        while pulled < row_cap {
            let page = self
                .remote
                .get_history(Scope::Hybrid, since, page_size, offset)
                .await?;
            let page_len = page.len() as i64;
            for remote_entry in &page {
                self.reconcile_one(remote_entry, report)?;
            }
            pulled += page_len;
            offset += page_size;
            if page_len < page_size {
                break;
            }
        }
        Ok(())
    }

    fn first_sync_since(&self) -> i64 {
        chrono::Utc::now().timestamp() - FIRST_SYNC_WINDOW_DAYS * 86_400
    }

    fn reconcile_one(&self, remote_entry: &HistoryEntry, report: &mut SyncReport) -> Result<()> {
        let Some(request_id) = remote_entry.request_id.as_deref() else {
            let local = self.local.lock().unwrap();
            local.import_history(std::slice::from_ref(remote_entry))?;
            report.downloaded += 1;
            return Ok(());
        };

        let local_entry = {
            let local = self.local.lock().unwrap();
            local.get_by_request_id(request_id)?
        };
        match local_entry {
            None => {
                let local = self.local.lock().unwrap();
                local.import_history(std::slice::from_ref(remote_entry))?;
                report.downloaded += 1;
            }
            Some(local_entry) if entries_conflict(&local_entry, remote_entry) => {
                let resolution = self.strategy.resolve(&local_entry, remote_entry);
                let local = self.local.lock().unwrap();
                local.record_conflict(&ConflictLogEntry {
                    command_uuid: request_id.to_string(),
                    local_data: serde_json::to_string(&local_entry)?,
                    remote_data: serde_json::to_string(remote_entry)?,
                    resolution: resolution.resolution.to_string(),
                    resolved_at: chrono::Utc::now().timestamp(),
                })?;
                if resolution.resolution == "kept_remote" {
                    local.update_status_by_request_id(
                        request_id,
                        resolution.winner.status,
                        resolution.winner.response.as_deref(),
                    )?;
                }
                report.conflicts += 1;
            }
            Some(_) => {}
        }
        Ok(())
    }

    fn cleanup_phase(&self) -> Result<()> {
        let local = self.local.lock().unwrap();
        let deleted = local.cleanup(self.cleanup_days)?;
        if deleted > 0 {
            log::debug!("cleanup removed {deleted} stale synced rows");
        }
        Ok(())
    }

    /// Spawns the background tick loop (spec §4.6: sync every 30s).
    /// Dropping or aborting the returned handle stops syncing.
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.force_sync().await {
                    Ok(report) if report.uploaded > 0 || report.downloaded > 0 || report.conflicts > 0 => {
                        self.events.publish(Event::Progress {
                            request_id: String::new(),
                            message: format!(
                                "sync: {} uploaded, {} downloaded, {} conflicts",
                                report.uploaded, report.downloaded, report.conflicts
                            ),
                        });
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("periodic sync failed: {e}"),
                }
            }
        })
    }
}

fn route_scope(entry: &HistoryEntry) -> Scope {
    if entry.user_id.is_some() {
        Scope::User
    } else if entry.machine_id.is_some() {
        Scope::Machine
    } else {
        Scope::Global
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use local_store::{NewCommandMeta, SyncStatus};
    use remote_store::test_utils::connect_in_memory_with_schema;

    async fn engine_with_schema() -> (Arc<StdMutex<LocalStore>>, Arc<RemoteStore>, SyncEngine) {
        let local = Arc::new(StdMutex::new(LocalStore::open_in_memory().unwrap()));
        let remote = Arc::new(connect_in_memory_with_schema().await.unwrap());
        let engine = SyncEngine::new(local.clone(), remote.clone(), EventBus::default());
        (local, remote, engine)
    }

    #[tokio::test]
    async fn upload_drains_queue_and_marks_synced() {
        let (local, remote, engine) = engine_with_schema().await;
        let id = {
            let local = local.lock().unwrap();
            local
                .save_command("list files", Some("a.txt"), NewCommandMeta::default())
                .unwrap()
        };

        let report = engine.force_sync().await.unwrap();
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.upload_failed, 0);

        let local = local.lock().unwrap();
        assert!(local.get_pending_sync(10, 5).unwrap().is_empty());
        assert_eq!(local.get_by_id(&id).unwrap().unwrap().sync_status, SyncStatus::Synced);

        let remote_history = remote.get_history(Scope::Global, 0, 10, 0).await.unwrap();
        assert_eq!(remote_history.len(), 1);
        assert_eq!(remote_history[0].command, "list files");
    }

    #[tokio::test]
    async fn upload_failure_leaves_item_queued_with_incremented_retry() {
        let local = Arc::new(StdMutex::new(LocalStore::open_in_memory().unwrap()));
        // No schema, so every `save` fails.
        let remote = Arc::new(RemoteStore::connect_in_memory().await.unwrap());
        let engine = SyncEngine::new(local.clone(), remote, EventBus::default());
        {
            let local = local.lock().unwrap();
            local
                .save_command("list files", None, NewCommandMeta::default())
                .unwrap();
        }

        let report = engine.force_sync().await.unwrap();
        assert_eq!(report.uploaded, 0);
        assert_eq!(report.upload_failed, 1);

        let local = local.lock().unwrap();
        let pending = local.get_pending_sync(10, 5).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retry_count, 1);
        assert!(pending[0].last_error.is_some());
    }

    #[tokio::test]
    async fn conflicting_rows_resolve_to_newest_and_are_logged() {
        let (local, remote, engine) = engine_with_schema().await;
        {
            let local = local.lock().unwrap();
            local
                .import_history(&[HistoryEntry {
                    id: "local-row".to_string(),
                    request_id: Some("req_shared".to_string()),
                    command: "ls".to_string(),
                    response: Some("local".to_string()),
                    status: local_store::HistoryStatus::Completed,
                    user_id: None,
                    machine_id: None,
                    session_id: None,
                    timestamp: 1,
                    updated_at: Some(1),
                    completed_at: Some(1),
                    tokens_used: None,
                    execution_time_ms: None,
                    sync_status: SyncStatus::Synced,
                    last_synced: None,
                }])
                .unwrap();
        }
        remote
            .save(
                Scope::Global,
                "ls",
                Some("remote"),
                NewRemoteCommand {
                    request_id: Some("req_shared".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let report = engine.force_sync().await.unwrap();
        assert_eq!(report.conflicts, 1);

        let local = local.lock().unwrap();
        let resolved = local.get_by_request_id("req_shared").unwrap().unwrap();
        assert_eq!(resolved.response.as_deref(), Some("remote"));
        assert_eq!(resolved.id, "local-row");
    }

    #[tokio::test]
    async fn force_sync_releases_the_in_flight_guard() {
        let (_local, _remote, engine) = engine_with_schema().await;
        assert!(!engine.is_syncing());
        engine.force_sync().await.unwrap();
        assert!(!engine.is_syncing());
    }
}
