use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::core::{keys, Filter, IndexedProfile, ItemType, StringSet};
use crate::error::{Error, Result};
use crate::storage::{BucketUpdate, DataStore, ProfileSource};

pub const FILTER_PREFIX: &str = "ftr_";

/// 内存后端：过滤器、profile 投影与全部索引桶。
///
/// 桶按 (itemType, tenantCtx) 分组，组内 ruleKey -> IDs。
#[derive(Default)]
pub struct MemoryStore {
    filters: DashMap<String, Filter>,
    profiles: DashMap<String, IndexedProfile>,
    indexes: DashMap<(String, String), HashMap<String, StringSet>>,
    writes: AtomicU64,
}

/// 可序列化的整库内容（snapshot 使用）
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoreDump {
    pub filters: Vec<Filter>,
    pub profiles: Vec<(String, IndexedProfile)>,
    pub indexes: Vec<BucketRecord>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BucketRecord {
    pub item_type: String,
    pub tnt_ctx: String,
    pub rule_key: String,
    pub ids: StringSet,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_filter(&self, filter: Filter) {
        self.filters.insert(filter.tenant_id(), filter);
    }

    pub fn remove_filter(&self, tenant: &str, id: &str) -> Option<Filter> {
        self.filters
            .remove(&keys::concat(&[tenant, id]))
            .map(|(_, f)| f)
    }

    pub fn set_profile(&self, item_type: ItemType, profile: IndexedProfile) {
        self.profiles
            .insert(item_type.profile_key(&profile.tenant, &profile.id), profile);
    }

    pub fn remove_profile(&self, item_type: ItemType, tenant: &str, id: &str) -> Option<IndexedProfile> {
        self.profiles
            .remove(&item_type.profile_key(tenant, id))
            .map(|(_, p)| p)
    }

    pub fn get_profile(&self, item_type: ItemType, tenant: &str, id: &str) -> Result<IndexedProfile> {
        self.profiles
            .get(&item_type.profile_key(tenant, id))
            .map(|p| p.value().clone())
            .ok_or(Error::NotFound)
    }

    /// 某一 item type 的 profile 读取口
    pub fn profiles(self: &Arc<Self>, item_type: ItemType) -> Arc<dyn ProfileSource> {
        Arc::new(ProfileView {
            store: self.clone(),
            item_type,
        })
    }

    /// 直接读取单个桶（测试 / CLI 使用）
    pub fn bucket(&self, item_type: &str, tnt_ctx: &str, rule_key: &str) -> Option<StringSet> {
        self.indexes
            .get(&(item_type.to_string(), tnt_ctx.to_string()))
            .and_then(|m| m.value().get(rule_key).cloned())
    }

    /// 累计 set_indexes 调用次数
    pub fn index_writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn bucket_count(&self) -> usize {
        self.indexes.iter().map(|e| e.value().len()).sum()
    }

    pub fn dump(&self) -> StoreDump {
        let mut indexes = Vec::new();
        for e in self.indexes.iter() {
            let (item_type, tnt_ctx) = e.key();
            for (rule_key, ids) in e.value() {
                indexes.push(BucketRecord {
                    item_type: item_type.clone(),
                    tnt_ctx: tnt_ctx.clone(),
                    rule_key: rule_key.clone(),
                    ids: ids.clone(),
                });
            }
        }
        StoreDump {
            filters: self.filters.iter().map(|e| e.value().clone()).collect(),
            profiles: self
                .profiles
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            indexes,
        }
    }

    pub fn restore(dump: StoreDump) -> Self {
        let store = Self::new();
        for f in dump.filters {
            store.set_filter(f);
        }
        for (key, p) in dump.profiles {
            store.profiles.insert(key, p);
        }
        for rec in dump.indexes {
            store
                .indexes
                .entry((rec.item_type, rec.tnt_ctx))
                .or_default()
                .insert(rec.rule_key, rec.ids);
        }
        store
    }
}

impl DataStore for MemoryStore {
    fn get_indexes(
        &self,
        item_type: &str,
        tnt_ctx: &str,
        rule_key: Option<&str>,
    ) -> Result<HashMap<String, StringSet>> {
        let Some(group) = self
            .indexes
            .get(&(item_type.to_string(), tnt_ctx.to_string()))
        else {
            return Err(Error::NotFound);
        };
        let out: HashMap<String, StringSet> = match rule_key {
            Some(k) => group
                .value()
                .get(k)
                .map(|ids| HashMap::from([(k.to_string(), ids.clone())]))
                .unwrap_or_default(),
            None => group.value().clone(),
        };
        if out.is_empty() {
            return Err(Error::NotFound);
        }
        Ok(out)
    }

    fn set_indexes(
        &self,
        item_type: &str,
        tnt_ctx: &str,
        indexes: HashMap<String, BucketUpdate>,
    ) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut group = self
            .indexes
            .entry((item_type.to_string(), tnt_ctx.to_string()))
            .or_default();
        for (rule_key, update) in indexes {
            match update {
                BucketUpdate::Keep(ids) => {
                    group.insert(rule_key, ids);
                }
                BucketUpdate::Clear => {
                    group.remove(&rule_key);
                }
            }
        }
        Ok(())
    }

    fn get_keys_for_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut out: Vec<String> = self
            .profiles
            .iter()
            .map(|e| e.key().clone())
            .chain(
                self.filters
                    .iter()
                    .map(|e| format!("{}{}", FILTER_PREFIX, e.key())),
            )
            .filter(|k| k.starts_with(prefix))
            .collect();
        out.sort_unstable();
        Ok(out)
    }

    fn get_filter(&self, tenant: &str, id: &str) -> Result<Filter> {
        self.filters
            .get(&keys::concat(&[tenant, id]))
            .map(|f| f.value().clone())
            .ok_or(Error::NotFound)
    }
}

struct ProfileView {
    store: Arc<MemoryStore>,
    item_type: ItemType,
}

impl ProfileSource for ProfileView {
    fn get_profile(&self, tenant: &str, id: &str) -> Result<IndexedProfile> {
        self.store.get_profile(self.item_type, tenant, id)
    }
}
