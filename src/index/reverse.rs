use std::collections::HashMap;

use crate::core::{keys, ItemType, StringSet, REVERSE_FILTER_INDEXES};
use crate::error::Result;
use crate::index::FilterIndexer;
use crate::storage::BucketUpdate;

impl FilterIndexer {
    /// 在反向索引中登记 item 对各过滤器的引用（inline 过滤器跳过）
    pub fn add_index_filters_item(
        &self,
        item_type: ItemType,
        tenant: &str,
        item_id: &str,
        filter_ids: &[String],
    ) -> Result<()> {
        for fltr_id in filter_ids.iter().filter(|id| !keys::is_inline(id)) {
            let tnt_fltr = keys::concat(&[tenant, fltr_id.as_str()]);
            let _guard = self.lock_scope(REVERSE_FILTER_INDEXES, &tnt_fltr)?;

            let mut ids = self.fetch_reverse(item_type, &tnt_fltr)?.unwrap_or_default();
            ids.add(item_id);
            self.apply_buckets(
                REVERSE_FILTER_INDEXES,
                &tnt_fltr,
                HashMap::from([(item_type.name.to_string(), BucketUpdate::Keep(ids))]),
            )?;
            self.stats.record_reverse_write();
        }
        Ok(())
    }

    /// 撤销引用；反向桶不存在视为已一致
    pub fn remove_index_filters_item(
        &self,
        item_type: ItemType,
        tenant: &str,
        item_id: &str,
        filter_ids: &[String],
    ) -> Result<()> {
        for fltr_id in filter_ids.iter().filter(|id| !keys::is_inline(id)) {
            let tnt_fltr = keys::concat(&[tenant, fltr_id.as_str()]);
            let _guard = self.lock_scope(REVERSE_FILTER_INDEXES, &tnt_fltr)?;

            let Some(mut ids) = self.fetch_reverse(item_type, &tnt_fltr)? else {
                continue;
            };
            ids.remove(item_id);
            self.apply_buckets(
                REVERSE_FILTER_INDEXES,
                &tnt_fltr,
                HashMap::from([(item_type.name.to_string(), BucketUpdate::from_set(ids))]),
            )?;
            self.stats.record_reverse_write();
        }
        Ok(())
    }

    fn fetch_reverse(&self, item_type: ItemType, tnt_fltr: &str) -> Result<Option<StringSet>> {
        match self
            .store
            .get_indexes(REVERSE_FILTER_INDEXES, tnt_fltr, Some(item_type.name))
        {
            Ok(mut found) => Ok(found.remove(item_type.name)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
