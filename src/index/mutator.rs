use std::collections::HashMap;

use crate::core::{keys, ItemType, StringSet};
use crate::error::Result;
use crate::index::FilterIndexer;
use crate::storage::BucketUpdate;

impl FilterIndexer {
    /// 把 item 加入其 filterIDs 对应的全部正向桶
    pub fn add_item_to_filter_index(
        &self,
        item_type: ItemType,
        tenant: &str,
        context: &str,
        item_id: &str,
        filter_ids: &[String],
    ) -> Result<()> {
        let tnt_ctx = keys::scope_key(tenant, context);
        let _guard = self.lock_scope(item_type.name, &tnt_ctx)?;

        let indexes = self.new_filter_index(item_type, tenant, context, item_id, filter_ids)?;
        // 过滤器全是不可索引规则（如只有 *gt）
        if indexes.is_empty() {
            return Ok(());
        }
        let updates = indexes
            .into_iter()
            .map(|(idx_key, mut ids)| {
                ids.add(item_id);
                (idx_key, BucketUpdate::Keep(ids))
            })
            .collect();
        self.apply_buckets(item_type.name, &tnt_ctx, updates)
    }

    /// 从 filterIDs 对应的正向桶中移除 item；桶变空则显式清除
    pub fn remove_item_from_filter_index(
        &self,
        item_type: ItemType,
        tenant: &str,
        context: &str,
        item_id: &str,
        filter_ids: &[String],
    ) -> Result<()> {
        self.remove_item_retaining(item_type, tenant, context, item_id, filter_ids, &StringSet::new())
    }

    /// 同 `remove_item_from_filter_index`，但跳过 `retain` 中的 rule key
    /// （item 仍保留的其他过滤器也会产出这些 key）。
    pub(crate) fn remove_item_retaining(
        &self,
        item_type: ItemType,
        tenant: &str,
        context: &str,
        item_id: &str,
        filter_ids: &[String],
        retain: &StringSet,
    ) -> Result<()> {
        let tnt_ctx = keys::scope_key(tenant, context);
        let _guard = self.lock_scope(item_type.name, &tnt_ctx)?;

        let indexes = self.new_filter_index(item_type, tenant, context, item_id, filter_ids)?;
        let updates: HashMap<String, BucketUpdate> = indexes
            .into_iter()
            .filter(|(idx_key, _)| !retain.has(idx_key))
            .map(|(idx_key, mut ids)| {
                ids.remove(item_id);
                (idx_key, BucketUpdate::from_set(ids))
            })
            .collect();
        self.apply_buckets(item_type.name, &tnt_ctx, updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Rule;
    use crate::index::testutil::*;
    use crate::storage::{GuardLocks, LockManager};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn add_places_item_in_rule_bucket_and_invalidates_cache() {
        let fx = fixture();
        fx.string_filter("F1", "Account", &["1001"]);
        fx.cache.set(
            ItemType::THRESHOLD.name,
            "cgrates.org:*string:Account:1001",
            set(&["stale"]),
        );

        fx.indexer
            .add_item_to_filter_index(ItemType::THRESHOLD, TNT, "", "P1", &ids(&["F1"]))
            .unwrap();

        assert_eq!(fx.bucket(ItemType::THRESHOLD, TNT, "*string:Account:1001"), vec!["P1"]);
        assert!(!fx
            .cache
            .contains(ItemType::THRESHOLD.name, "cgrates.org:*string:Account:1001"));
        assert_eq!(fx.indexer.stats().report().cache_invalidations, 1);
    }

    #[test]
    fn add_is_idempotent() {
        let fx = fixture();
        fx.string_filter("F1", "Account", &["1001", "1002"]);
        let fids = ids(&["F1"]);
        fx.indexer
            .add_item_to_filter_index(ItemType::RESOURCE, TNT, "", "R1", &fids)
            .unwrap();
        let once = fx.scope(ItemType::RESOURCE, TNT);
        fx.indexer
            .add_item_to_filter_index(ItemType::RESOURCE, TNT, "", "R1", &fids)
            .unwrap();
        assert_eq!(fx.scope(ItemType::RESOURCE, TNT), once);
    }

    #[test]
    fn non_indexable_only_filters_touch_nothing() {
        let fx = fixture();
        fx.filter("GT", vec![Rule::new("*gt", "Usage", &["10s"])]);
        fx.indexer
            .add_item_to_filter_index(ItemType::ROUTE, TNT, "", "RT1", &ids(&["GT"]))
            .unwrap();
        assert!(fx.scope(ItemType::ROUTE, TNT).is_empty());
        assert_eq!(fx.store.index_writes(), 0);
    }

    #[test]
    fn remove_clears_emptied_bucket_but_keeps_others() {
        let fx = fixture();
        fx.string_filter("F1", "Account", &["1001"]);
        fx.indexer
            .add_item_to_filter_index(ItemType::STAT, TNT, "", "S1", &ids(&["F1"]))
            .unwrap();
        fx.indexer
            .add_item_to_filter_index(ItemType::STAT, TNT, "", "S2", &ids(&["F1"]))
            .unwrap();

        fx.indexer
            .remove_item_from_filter_index(ItemType::STAT, TNT, "", "S1", &ids(&["F1"]))
            .unwrap();
        assert_eq!(fx.bucket(ItemType::STAT, TNT, "*string:Account:1001"), vec!["S2"]);

        fx.indexer
            .remove_item_from_filter_index(ItemType::STAT, TNT, "", "S2", &ids(&["F1"]))
            .unwrap();
        assert!(fx.store.bucket(ItemType::STAT.name, TNT, "*string:Account:1001").is_none());
        assert_eq!(fx.indexer.stats().report().buckets_cleared, 1);
    }

    #[test]
    fn concurrent_writers_lose_no_updates() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 25;

        let fx = fixture();
        fx.string_filter("F1", "Account", &["1001"]);
        let f1 = ids(&["F1"]);

        std::thread::scope(|s| {
            for t in 0..THREADS {
                let indexer = &fx.indexer;
                let f1 = &f1;
                s.spawn(move || {
                    for i in 0..PER_THREAD {
                        let id = format!("TH{t}_{i}");
                        indexer
                            .updated_indexes(ItemType::THRESHOLD, TNT, "", &id, None, f1)
                            .unwrap();
                    }
                });
            }
        });

        let total = THREADS * PER_THREAD;
        assert_eq!(fx.bucket(ItemType::THRESHOLD, TNT, "*string:Account:1001").len(), total);
        assert_eq!(fx.reverse("F1", ItemType::THRESHOLD).len(), total);
    }

    #[test]
    fn lock_timeout_aborts_and_lock_is_released_after_errors() {
        let store = Arc::new(crate::storage::MemoryStore::new());
        let locks = Arc::new(GuardLocks::new());
        let cfg = crate::config::IndexerConfig {
            locking_timeout_ms: 20,
            ..Default::default()
        };
        let indexer = FilterIndexer::new(
            store.clone(),
            Arc::new(crate::storage::MemoryCache::new()),
            locks.clone(),
            cfg,
        );

        let scope = keys::concat(&[ItemType::CHARGER.name, TNT]);
        let held = locks.acquire(Duration::ZERO, &[scope.clone()]).unwrap();
        let err = indexer
            .add_item_to_filter_index(ItemType::CHARGER, TNT, "", "C1", &[])
            .unwrap_err();
        assert!(matches!(err, crate::Error::LockTimeout { .. }));
        locks.release(held);

        // 构建失败（断链）后锁也必须释放
        assert!(indexer
            .add_item_to_filter_index(ItemType::CHARGER, TNT, "", "C1", &ids(&["MISSING"]))
            .is_err());
        assert!(!locks.is_held(&scope));
    }
}
