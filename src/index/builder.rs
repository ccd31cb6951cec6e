use std::collections::HashMap;

use crate::core::{keys, Filter, ItemType, StringSet};
use crate::error::{Error, Result};
use crate::index::FilterIndexer;

impl FilterIndexer {
    /// 推导 item 需要所在的正向桶（ruleKey -> 现有 IDs），结果中尚未包含 item 自身。
    ///
    /// - filterIDs 为空：只产出 `*none:*any:*any` 哨兵桶
    /// - 否则逐个加载过滤器，仅 `*string` / `*prefix` 规则的每个 value 产出一个桶
    /// - 桶不存在时以空集合占位，稍后由调用方写入
    pub fn new_filter_index(
        &self,
        item_type: ItemType,
        tenant: &str,
        context: &str,
        item_id: &str,
        filter_ids: &[String],
    ) -> Result<HashMap<String, StringSet>> {
        let tnt_ctx = keys::scope_key(tenant, context);
        let mut indexes = HashMap::new();

        if filter_ids.is_empty() {
            let idx_key = keys::none_rule_key();
            let bucket = self.fetch_bucket(item_type, &tnt_ctx, &idx_key)?;
            indexes.insert(idx_key, bucket);
            return Ok(indexes);
        }

        for fltr_id in filter_ids {
            let fltr = self.referenced_filter(item_type, tenant, item_id, fltr_id)?;
            for idx_key in fltr.index_keys() {
                if indexes.contains_key(&idx_key) {
                    continue;
                }
                let bucket = self.fetch_bucket(item_type, &tnt_ctx, &idx_key)?;
                indexes.insert(idx_key, bucket);
            }
        }
        Ok(indexes)
    }

    /// 过滤器集合产出的 rule key（不读桶）
    pub(crate) fn rule_keys_of(
        &self,
        item_type: ItemType,
        tenant: &str,
        item_id: &str,
        filter_ids: &[String],
    ) -> Result<StringSet> {
        let mut out = StringSet::new();
        for fltr_id in filter_ids {
            for key in self.referenced_filter(item_type, tenant, item_id, fltr_id)?.index_keys() {
                out.add(key);
            }
        }
        Ok(out)
    }

    /// item 引用的过滤器；不存在即断链
    fn referenced_filter(
        &self,
        item_type: ItemType,
        tenant: &str,
        item_id: &str,
        fltr_id: &str,
    ) -> Result<Filter> {
        self.get_filter(tenant, fltr_id).map_err(|e| {
            if e.is_not_found() {
                Error::BrokenReference {
                    filter_id: fltr_id.to_string(),
                    item_type: item_type.name.to_string(),
                    item_id: item_id.to_string(),
                }
            } else {
                e
            }
        })
    }

    fn fetch_bucket(&self, item_type: ItemType, tnt_ctx: &str, idx_key: &str) -> Result<StringSet> {
        match self.store.get_indexes(item_type.name, tnt_ctx, Some(idx_key)) {
            Ok(mut found) => Ok(found.remove(idx_key).unwrap_or_default()),
            Err(e) if e.is_not_found() => Ok(StringSet::new()),
            Err(e) => Err(e),
        }
    }
}
