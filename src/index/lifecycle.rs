use crate::core::{keys, IndexedProfile, ItemType, REVERSE_FILTER_INDEXES};
use crate::error::{Error, Result};
use crate::index::FilterIndexer;

impl FilterIndexer {
    /// profile 写入后的索引维护（`old = None` 表示新建）
    pub fn index_profile(
        &self,
        item_type: ItemType,
        old: Option<&IndexedProfile>,
        new: &IndexedProfile,
    ) -> Result<()> {
        if item_type.contextual {
            self.updated_indexes_with_contexts(
                item_type,
                &new.tenant,
                &new.id,
                old.map(|o| o.contexts.as_slice()),
                old.map(|o| o.filter_ids.as_slice()),
                &new.contexts,
                &new.filter_ids,
            )
        } else {
            self.updated_indexes(
                item_type,
                &new.tenant,
                "",
                &new.id,
                old.map(|o| o.filter_ids.as_slice()),
                &new.filter_ids,
            )
        }
    }

    /// profile 删除前撤销其全部正向 / 反向索引
    pub fn remove_profile_indexes(&self, item_type: ItemType, profile: &IndexedProfile) -> Result<()> {
        self.remove_index_filters_item(item_type, &profile.tenant, &profile.id, &profile.filter_ids)?;
        if item_type.contextual {
            for ctx in &profile.contexts {
                self.remove_item_from_filter_index(
                    item_type,
                    &profile.tenant,
                    ctx,
                    &profile.id,
                    &profile.filter_ids,
                )?;
            }
        } else {
            self.remove_item_from_filter_index(item_type, &profile.tenant, "", &profile.id, &profile.filter_ids)?;
        }
        tracing::debug!("{} {}:{} indexes removed", item_type.name, profile.tenant, profile.id);
        Ok(())
    }

    /// 删除过滤器前检查：仍被任何 item 引用则拒绝
    pub fn ensure_filter_unused(&self, tenant: &str, filter_id: &str) -> Result<()> {
        let tnt_fltr = keys::concat(&[tenant, filter_id]);
        let found = match self.store.get_indexes(REVERSE_FILTER_INDEXES, &tnt_fltr, None) {
            Ok(found) => found,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        let mut references: Vec<String> = found
            .iter()
            .flat_map(|(type_name, ids)| {
                let label = ItemType::by_name(type_name)
                    .map(|t| t.short_name())
                    .unwrap_or(type_name.as_str());
                ids.iter().map(move |id| keys::concat(&[label, id.as_str()]))
            })
            .collect();
        if references.is_empty() {
            return Ok(());
        }
        references.sort();
        Err(Error::FilterInUse {
            filter_id: tnt_fltr,
            references,
        })
    }
}
