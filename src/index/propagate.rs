use std::collections::HashMap;

use crate::core::{keys, Filter, ItemType, StringSet, REVERSE_FILTER_INDEXES};
use crate::error::Result;
use crate::index::FilterIndexer;
use crate::storage::BucketUpdate;

impl FilterIndexer {
    /// 过滤器规则变化后的级联更新。
    ///
    /// 只有可索引 rule key 集合发生净变化（有删或有增）才会重建；
    /// 仅调整规则顺序不会产生任何写入。
    pub fn update_filter_index(&self, old_flt: Option<&Filter>, new_flt: &Filter) -> Result<()> {
        let Some(old_flt) = old_flt else {
            return Ok(());
        };

        let new_keys = new_flt.index_keys();
        let old_keys = old_flt.index_keys();
        let removed = old_keys.difference(&new_keys);
        let needs_rebuild = !removed.is_empty() || !new_keys.difference(&old_keys).is_empty();
        self.stats.record_filter_change(needs_rebuild);
        if !needs_rebuild {
            tracing::debug!("filter {} index surface unchanged", new_flt.tenant_id());
            return Ok(());
        }

        let dependents =
            match self
                .store
                .get_indexes(REVERSE_FILTER_INDEXES, &new_flt.tenant_id(), None)
            {
                Ok(d) => d,
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(e),
            };
        let remove_keys = removed.as_slice();

        let rebuilt = self.rebuild_dependents(new_flt, &remove_keys, &dependents)?;
        tracing::info!(
            "filter {} changed: {} stale keys removed, {} dependent item types rebuilt",
            new_flt.tenant_id(),
            remove_keys.len(),
            rebuilt
        );
        Ok(())
    }

    /// 按 item type（有序）重建反向桶中的全部依赖；返回实际处理的类型数，
    /// 未注册 ProfileSource 的类型跳过且不计数。
    pub(crate) fn rebuild_dependents(
        &self,
        flt: &Filter,
        remove_keys: &[String],
        dependents: &HashMap<String, StringSet>,
    ) -> Result<usize> {
        let mut item_types: Vec<&String> = dependents.keys().collect();
        item_types.sort();
        let mut rebuilt = 0;
        for type_name in item_types {
            let item_ids = &dependents[type_name];
            let Some((item_type, _)) = self.source(type_name) else {
                tracing::warn!(
                    "filter {} referenced by unregistered item type {}, skipping",
                    flt.tenant_id(),
                    type_name
                );
                continue;
            };
            if item_type.contextual {
                self.rebuild_contextual(*item_type, &flt.tenant, remove_keys, item_ids)?;
            } else {
                self.remove_filter_indexes_for_filter(*item_type, &flt.tenant, remove_keys, item_ids)?;
                let id_list = item_ids.as_slice();
                self.compute_registered(*item_type, &flt.tenant, "", Some(&id_list))?;
            }
            rebuilt += 1;
        }
        Ok(rebuilt)
    }

    /// attribute / dispatcher：每个 item 的每个 context 单独清理并重建
    fn rebuild_contextual(
        &self,
        item_type: ItemType,
        tenant: &str,
        remove_keys: &[String],
        item_ids: &StringSet,
    ) -> Result<()> {
        let Some((_, source)) = self.source(item_type.name) else {
            return Err(crate::Error::UnknownItemType(item_type.name.to_string()));
        };
        for item_id in item_ids.as_slice() {
            let profile = match source.get_profile(tenant, &item_id) {
                Ok(p) => p,
                Err(e) if e.is_not_found() => {
                    tracing::warn!("{} {}:{} vanished during rebuild, skipping", item_type.name, tenant, item_id);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let one = [item_id.clone()];
            let one_set: StringSet = one.iter().cloned().collect();
            for ctx in &profile.contexts {
                let tnt_ctx = keys::scope_key(tenant, ctx);
                self.remove_filter_indexes_for_filter(item_type, &tnt_ctx, remove_keys, &one_set)?;
                self.compute_indexes(item_type, tenant, ctx, Some(&one), &|_, _, _| {
                    Ok(Some(profile.filter_ids.clone()))
                })?;
            }
        }
        Ok(())
    }

    /// 从指定 rule key 的正向桶中摘除一组 item（重建之前的“外科手术”步骤）。
    ///
    /// `tnt_ctx` 为 tenant 或 tenant:context；桶不存在则跳过。
    pub fn remove_filter_indexes_for_filter(
        &self,
        item_type: ItemType,
        tnt_ctx: &str,
        remove_keys: &[String],
        item_ids: &StringSet,
    ) -> Result<()> {
        if remove_keys.is_empty() {
            return Ok(());
        }
        let _guard = self.lock_scope(item_type.name, tnt_ctx)?;
        for idx_key in remove_keys {
            let mut bucket = match self.store.get_indexes(item_type.name, tnt_ctx, Some(idx_key)) {
                Ok(mut found) => found.remove(idx_key).unwrap_or_default(),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            for id in item_ids {
                bucket.remove(id);
            }
            self.apply_buckets(
                item_type.name,
                tnt_ctx,
                HashMap::from([(idx_key.clone(), BucketUpdate::from_set(bucket))]),
            )?;
        }
        Ok(())
    }
}
