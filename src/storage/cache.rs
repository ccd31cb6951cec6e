use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::core::{keys, StringSet};
use crate::error::Result;
use crate::storage::IndexCache;

/// 进程内索引缓存（DashMap 实现）
///
/// key 为 `itemType:tenantCtx:ruleKey`；引擎只调用 `remove`，
/// `get` / `set` 给读路径（CLI dump）做 read-through。
#[derive(Default)]
pub struct MemoryCache {
    inner: DashMap<String, StringSet>,
    invalidations: AtomicU64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry_key(item_type: &str, key: &str) -> String {
        keys::concat(&[item_type, key])
    }

    pub fn get(&self, item_type: &str, key: &str) -> Option<StringSet> {
        self.inner
            .get(&Self::entry_key(item_type, key))
            .map(|e| e.value().clone())
    }

    pub fn set(&self, item_type: &str, key: &str, set: StringSet) {
        self.inner.insert(Self::entry_key(item_type, key), set);
    }

    pub fn contains(&self, item_type: &str, key: &str) -> bool {
        self.inner.contains_key(&Self::entry_key(item_type, key))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }
}

impl IndexCache for MemoryCache {
    fn remove(&self, item_type: &str, key: &str) -> Result<()> {
        self.inner.remove(&Self::entry_key(item_type, key));
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
