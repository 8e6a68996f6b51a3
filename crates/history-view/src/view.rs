/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use crate::error::Result;
use local_store::{HistoryEntry, HistoryFilter, LocalStore};
use remote_store::{RemoteStore, Scope};
use std::sync::{Arc, Mutex as StdMutex};

/// Unified read facade over `LocalStore` and `RemoteStore`. Remote is
/// preferred (it's the shared source of truth); on any Remote failure
/// (offline, schema missing, timeout) reads fall back to Local, and
/// successful Remote pages are imported into Local on the way out so the
/// fallback path stays useful offline (spec §4.7).
pub struct HistoryView {
    local: Arc<StdMutex<LocalStore>>,
    remote: Arc<RemoteStore>,
}

impl HistoryView {
    pub fn new(local: Arc<StdMutex<LocalStore>>, remote: Arc<RemoteStore>) -> Self {
        Self { local, remote }
    }

    pub async fn get(
        &self,
        scope: Scope,
        filter: &HistoryFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<HistoryEntry>> {
        match self.remote.get_history(scope, RemoteStore::default_window_since(), limit, offset).await {
            Ok(entries) => {
                self.import_for_offline(&entries);
                Ok(entries)
            }
            Err(e) => {
                log::warn!("remote history read failed, falling back to local: {e}");
                let local = self.local.lock().unwrap();
                Ok(local.get_history(filter, limit, offset)?)
            }
        }
    }

    pub async fn search(
        &self,
        scope: Scope,
        query: &str,
        filter: &HistoryFilter,
        limit: i64,
    ) -> Result<Vec<HistoryEntry>> {
        match self.remote.search(scope, query, limit, 0).await {
            Ok(entries) => {
                self.import_for_offline(&entries);
                Ok(entries)
            }
            Err(e) => {
                log::warn!("remote history search failed, falling back to local: {e}");
                let local = self.local.lock().unwrap();
                Ok(local.search(query, filter, limit)?)
            }
        }
    }

    fn import_for_offline(&self, entries: &[HistoryEntry]) {
        if entries.is_empty() {
            return;
        }
        let local = self.local.lock().unwrap();
        if let Err(e) = local.import_history(entries) {
            log::warn!("failed to cache remote history page locally: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use local_store::NewCommandMeta;
    use remote_store::{test_utils::connect_in_memory_with_schema, NewRemoteCommand};

    #[tokio::test]
    async fn prefers_remote_and_caches_it_locally() {
        let local = Arc::new(StdMutex::new(LocalStore::open_in_memory().unwrap()));
        let remote = Arc::new(connect_in_memory_with_schema().await.unwrap());
        remote
            .save(Scope::Global, "ls", Some("files"), NewRemoteCommand::default())
            .await
            .unwrap();
        let view = HistoryView::new(local.clone(), remote);

        let entries = view
            .get(Scope::Global, &HistoryFilter::default(), 10, 0)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);

        let cached = local.lock().unwrap().get_history(&HistoryFilter::default(), 10, 0).unwrap();
        assert_eq!(cached.len(), 1);
    }

    #[tokio::test]
    async fn falls_back_to_local_when_remote_is_unreachable() {
        let local = Arc::new(StdMutex::new(LocalStore::open_in_memory().unwrap()));
        {
            let local = local.lock().unwrap();
            local
                .save_command("echo hi", Some("hi"), NewCommandMeta::default())
                .unwrap();
        }
        // No schema: every remote call fails, forcing the fallback path.
        let remote = Arc::new(RemoteStore::connect_in_memory().await.unwrap());
        let view = HistoryView::new(local, remote);

        let entries = view
            .get(Scope::Global, &HistoryFilter::default(), 10, 0)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].command, "echo hi");
    }

    #[tokio::test]
    async fn search_falls_back_to_local() {
        let local = Arc::new(StdMutex::new(LocalStore::open_in_memory().unwrap()));
        {
            let local = local.lock().unwrap();
            local
                .save_command("grep TODO src/", None, NewCommandMeta::default())
                .unwrap();
        }
        let remote = Arc::new(RemoteStore::connect_in_memory().await.unwrap());
        let view = HistoryView::new(local, remote);

        let entries = view
            .search(Scope::Global, "TODO", &HistoryFilter::default(), 10)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
    }
}
