use std::future::Future;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use pathway_protocol::{ChatModel, ResearchResult};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::route::ClientKey;

pub const DEFAULT_CACHE_CAPACITY: usize = 64;

type ClientCell = Arc<OnceCell<Arc<dyn ChatModel>>>;

/// Bounded LRU of constructed clients.
///
/// Each key owns a `OnceCell`, so concurrent first-time requests share one
/// construction. Entries are ordered least- to most-recently used; inserting
/// past `capacity` evicts the oldest built entry. Cells still under
/// construction are never evicted, so the map may exceed `capacity` until
/// they finish. A failed construction leaves no entry behind.
pub struct ClientCache {
    capacity: usize,
    entries: Mutex<IndexMap<ClientKey, ClientCell>>,
}

impl ClientCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(IndexMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &ClientKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    fn cell_for(&self, key: &ClientKey) -> ClientCell {
        let mut entries = self.entries.lock();
        if let Some(index) = entries.get_index_of(key) {
            let last = entries.len() - 1;
            entries.move_index(index, last);
            return entries[last].clone();
        }

        let cell: ClientCell = Arc::new(OnceCell::new());
        entries.insert(key.clone(), cell.clone());
        while entries.len() > self.capacity {
            let Some(oldest_built) = entries.values().position(|cell| cell.initialized()) else {
                debug!(len = entries.len(), "cache over capacity while clients are being built");
                break;
            };
            if let Some((evicted, _)) = entries.shift_remove_index(oldest_built) {
                debug!(model = %evicted.model, "evicted cached model client");
            }
        }
        cell
    }

    pub async fn get_or_try_build<F, Fut>(
        &self,
        key: &ClientKey,
        build: F,
    ) -> ResearchResult<Arc<dyn ChatModel>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ResearchResult<Arc<dyn ChatModel>>>,
    {
        let cell = self.cell_for(key);
        let result = cell.get_or_try_init(build).await.cloned();

        if result.is_err() {
            let mut entries = self.entries.lock();
            let stale = entries
                .get(key)
                .is_some_and(|existing| Arc::ptr_eq(existing, &cell) && !existing.initialized());
            if stale {
                entries.shift_remove(key);
            }
        }
        result
    }
}
