//! Named response caches, one per deployed version tag.

use std::collections::HashMap;

use parking_lot::RwLock;
use url::Url;

use super::fetch::CachedResponse;

type Store = HashMap<String, CachedResponse>;

/// In-memory equivalent of the platform's cache storage.
///
/// Every operation takes the lock once, so reads and writes are atomic per
/// key across concurrent fetch interceptions.
#[derive(Debug, Default)]
pub struct CacheStorage {
    stores: RwLock<HashMap<String, Store>>,
}

impl CacheStorage {
    /// Create the named store if it does not exist yet.
    pub fn open(&self, name: &str) {
        self.stores.write().entry(name.to_owned()).or_default();
    }

    /// Store `response` under `url`, replacing any previous entry.
    pub fn put(&self, name: &str, url: &Url, response: CachedResponse) {
        self.stores
            .write()
            .entry(name.to_owned())
            .or_default()
            .insert(cache_key(url), response);
    }

    #[must_use]
    pub fn get(&self, name: &str, url: &Url) -> Option<CachedResponse> {
        self.stores.read().get(name)?.get(&cache_key(url)).cloned()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.stores.read().keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.stores.read().contains_key(name)
    }

    /// Returns whether the store existed.
    pub fn delete(&self, name: &str) -> bool {
        self.stores.write().remove(name).is_some()
    }

    /// Delete every store except `keep`. Returns the deleted names.
    pub fn retain_only(&self, keep: &str) -> Vec<String> {
        let mut stores = self.stores.write();
        let mut deleted: Vec<_> = stores.keys().filter(|n| *n != keep).cloned().collect();
        for name in &deleted {
            stores.remove(name);
        }
        deleted.sort();
        deleted
    }

    /// Drop all stores. Returns how many there were.
    pub fn clear(&self) -> usize {
        let mut stores = self.stores.write();
        let count = stores.len();
        stores.clear();
        count
    }

    #[must_use]
    pub fn len(&self, name: &str) -> usize {
        self.stores.read().get(name).map_or(0, HashMap::len)
    }
}

fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}
