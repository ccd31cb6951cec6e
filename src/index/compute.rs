use crate::core::{keys, ItemType};
use crate::error::Result;
use crate::index::FilterIndexer;
use crate::storage::BucketUpdate;

/// 注入的 filterIDs 读取口：`(tenant, id, context) -> Some(filterIDs)`，
/// `None` 表示该 profile 已不需要索引（跳过）。
pub type FilterIdsFn<'a> = dyn Fn(&str, &str, &str) -> Result<Option<Vec<String>>> + 'a;

impl FilterIndexer {
    /// 重建一组（或全部）item 的正向索引。
    ///
    /// `ids = None` 时枚举该 item type 在存储中的全部 profile key（仅本 tenant）。
    /// 返回是否处理过任何 item，调用方借此区分“没有匹配”和“什么都不存在”。
    pub fn compute_indexes(
        &self,
        item_type: ItemType,
        tenant: &str,
        context: &str,
        ids: Option<&[String]>,
        get_filter_ids: &FilterIdsFn<'_>,
    ) -> Result<bool> {
        let profile_ids = match ids {
            Some(ids) => ids.to_vec(),
            None => self.profile_ids(item_type, tenant)?,
        };
        let tnt_ctx = keys::scope_key(tenant, context);

        let mut processed = false;
        for id in &profile_ids {
            let Some(filter_ids) = get_filter_ids(tenant, id, context)? else {
                continue;
            };
            let _guard = self.lock_scope(item_type.name, &tnt_ctx)?;
            let indexes = self.new_filter_index(item_type, tenant, context, id, &filter_ids)?;
            let updates = indexes
                .into_iter()
                .map(|(idx_key, mut set)| {
                    set.add(id.as_str());
                    (idx_key, BucketUpdate::Keep(set))
                })
                .collect();
            self.apply_buckets(item_type.name, &tnt_ctx, updates)?;
            self.stats.record_recompute();
            processed = true;
        }

        tracing::info!(
            "compute_indexes {} {}: {} candidates, processed={}",
            item_type.name,
            tnt_ctx,
            profile_ids.len(),
            processed
        );
        Ok(processed)
    }

    /// 存储中 `prefix + tenant:id` 形式的 profile key -> id
    fn profile_ids(&self, item_type: ItemType, tenant: &str) -> Result<Vec<String>> {
        let found = self.store.get_keys_for_prefix(item_type.profile_prefix)?;
        Ok(found
            .iter()
            .filter_map(|k| k.strip_prefix(item_type.profile_prefix))
            .filter_map(|tnt_id| tnt_id.split_once(keys::SEP))
            .filter(|(tnt, _)| *tnt == tenant)
            .map(|(_, id)| id.to_string())
            .collect())
    }

    /// 以 `ProfileSource` 为读取口的 compute（注册过的 item type 使用）。
    ///
    /// 并发删除导致的 NotFound 跳过，其余错误中止；
    /// 带 context 的类型只处理 contexts 中含 `context` 的 profile。
    pub fn compute_registered(
        &self,
        item_type: ItemType,
        tenant: &str,
        context: &str,
        ids: Option<&[String]>,
    ) -> Result<bool> {
        let Some((_, source)) = self.source(item_type.name) else {
            return Err(crate::Error::UnknownItemType(item_type.name.to_string()));
        };
        let source = source.clone();
        self.compute_indexes(item_type, tenant, context, ids, &|tnt, id, ctx| {
            match source.get_profile(tnt, id) {
                Ok(p) if item_type.contextual && !p.contexts.iter().any(|c| c == ctx) => Ok(None),
                Ok(p) => Ok(Some(p.filter_ids)),
                Err(e) if e.is_not_found() => {
                    tracing::warn!("{} {}:{} vanished during recompute, skipping", item_type.name, tnt, id);
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
    }
}
