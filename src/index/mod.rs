//! 过滤器索引维护引擎。
//!
//! - builder：按 item 的 filterIDs 推导需要触达的正向桶
//! - mutator：正向桶增删（加锁 → 读改写 → 落盘 → 缓存失效）
//! - reverse：反向索引 filterID -> itemType -> IDs
//! - diff：profile 变更时只更新增删部分
//! - compute：全量 / 指定 ID 重建
//! - propagate：过滤器自身规则变化时的级联重建
//! - lifecycle：profile / filter CRUD 调用的入口

mod builder;
mod compute;
mod diff;
mod lifecycle;
mod mutator;
mod propagate;
mod reverse;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::IndexerConfig;
use crate::core::{keys, Filter, ItemType};
use crate::error::Result;
use crate::stats::IndexStats;
use crate::storage::{
    BucketUpdate, DataStore, GuardLocks, IndexCache, LockManager, MemoryCache, MemoryStore,
    ProfileSource, ScopedLock,
};

pub use diff::FilterDiff;

/// 引擎入口：所有协作者显式注入，不依赖进程级单例
pub struct FilterIndexer {
    store: Arc<dyn DataStore>,
    cache: Arc<dyn IndexCache>,
    locks: Arc<dyn LockManager>,
    sources: HashMap<&'static str, (ItemType, Arc<dyn ProfileSource>)>,
    cfg: IndexerConfig,
    stats: IndexStats,
}

impl FilterIndexer {
    pub fn new(
        store: Arc<dyn DataStore>,
        cache: Arc<dyn IndexCache>,
        locks: Arc<dyn LockManager>,
        cfg: IndexerConfig,
    ) -> Self {
        Self {
            store,
            cache,
            locks,
            sources: HashMap::new(),
            cfg,
            stats: IndexStats::default(),
        }
    }

    /// 全内存装配：MemoryStore 兼任全部 item type 的 profile 来源
    pub fn in_memory(store: Arc<MemoryStore>, cache: Arc<MemoryCache>, cfg: IndexerConfig) -> Self {
        let mut indexer = Self::new(store.clone(), cache, Arc::new(GuardLocks::new()), cfg);
        for item_type in ItemType::ALL {
            indexer = indexer.with_profiles(item_type, store.profiles(item_type));
        }
        indexer
    }

    /// 注册某一 item type 的 profile 读取口（过滤器级联重建需要）
    pub fn with_profiles(mut self, item_type: ItemType, source: Arc<dyn ProfileSource>) -> Self {
        self.sources.insert(item_type.name, (item_type, source));
        self
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.cfg
    }

    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    pub(crate) fn source(&self, item_type: &str) -> Option<&(ItemType, Arc<dyn ProfileSource>)> {
        self.sources.get(item_type)
    }

    /// inline ID 现场解析，其余走存储
    pub(crate) fn get_filter(&self, tenant: &str, id: &str) -> Result<Filter> {
        if keys::is_inline(id) {
            return Filter::from_inline(tenant, id);
        }
        self.store.get_filter(tenant, id)
    }

    /// 同一 (itemType, tenantCtx) 桶族的写入互斥
    pub(crate) fn lock_scope(&self, item_type: &str, tnt_ctx: &str) -> Result<ScopedLock<'_>> {
        ScopedLock::acquire(
            self.locks.as_ref(),
            self.cfg.locking_timeout(),
            keys::concat(&[item_type, tnt_ctx]),
        )
    }

    /// 唯一的桶写入口：落盘，然后逐个失效缓存。
    ///
    /// 调用方必须已持有该作用域的锁。多桶写入不是事务性的：
    /// 中途失败时已写入的桶保持新状态。
    pub(crate) fn apply_buckets(
        &self,
        item_type: &str,
        tnt_ctx: &str,
        updates: HashMap<String, BucketUpdate>,
    ) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let cleared = updates
            .values()
            .filter(|u| matches!(u, BucketUpdate::Clear))
            .count();
        let touched: Vec<String> = updates.keys().cloned().collect();
        self.store.set_indexes(item_type, tnt_ctx, updates)?;
        self.stats.record_buckets(touched.len() - cleared, cleared);

        for rule_key in &touched {
            self.cache
                .remove(item_type, &keys::concat(&[tnt_ctx, rule_key.as_str()]))?;
            self.stats.record_invalidation();
        }
        tracing::debug!(
            "{} {}: wrote {} buckets ({} cleared)",
            item_type,
            tnt_ctx,
            touched.len(),
            cleared
        );
        Ok(())
    }
}
