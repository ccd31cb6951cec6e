pub mod cache;
pub mod guard;
pub mod memory;
pub mod snapshot;

use std::collections::HashMap;
use std::time::Duration;

use crate::core::{Filter, IndexedProfile, StringSet};
use crate::error::Result;

/// 桶写入意图：显式区分“写入集合”与“清除”，而不是用空值暗示删除
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BucketUpdate {
    Keep(StringSet),
    Clear,
}

impl BucketUpdate {
    /// 空集合一律转为 Clear
    pub fn from_set(set: StringSet) -> Self {
        if set.is_empty() {
            BucketUpdate::Clear
        } else {
            BucketUpdate::Keep(set)
        }
    }
}

/// 后端存储（正向 / 反向桶 + 过滤器）。
///
/// ## 契约
/// - `get_indexes` 在桶不存在时返回 `Error::NotFound`；`rule_key = None` 表示读取该作用域下全部桶。
/// - `set_indexes` 对 `Clear` 执行删除，对 `Keep` 整体覆盖。
pub trait DataStore: Send + Sync {
    fn get_indexes(
        &self,
        item_type: &str,
        tnt_ctx: &str,
        rule_key: Option<&str>,
    ) -> Result<HashMap<String, StringSet>>;

    fn set_indexes(
        &self,
        item_type: &str,
        tnt_ctx: &str,
        indexes: HashMap<String, BucketUpdate>,
    ) -> Result<()>;

    fn get_keys_for_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    fn get_filter(&self, tenant: &str, id: &str) -> Result<Filter>;
}

/// 索引缓存：本引擎只做失效，不走读路径
pub trait IndexCache: Send + Sync {
    fn remove(&self, item_type: &str, key: &str) -> Result<()>;
}

/// 分布式命名锁
pub trait LockManager: Send + Sync {
    fn acquire(&self, timeout: Duration, keys: &[String]) -> Result<LockRef>;
    fn release(&self, lock: LockRef);
}

#[derive(Debug)]
pub struct LockRef {
    pub id: u64,
    pub keys: Vec<String>,
}

/// 单一 item type 的 profile 读取口（每种 profile 存储各自提供）
pub trait ProfileSource: Send + Sync {
    fn get_profile(&self, tenant: &str, id: &str) -> Result<IndexedProfile>;
}

pub use cache::MemoryCache;
pub use guard::{GuardLocks, ScopedLock};
pub use memory::MemoryStore;
pub use snapshot::Snapshot;
