use crate::core::{ItemType, StringSet};
use crate::error::Result;
use crate::index::FilterIndexer;

/// 新旧 filterIDs 的集合差（按 ID，不按位置）
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterDiff {
    pub removed: Vec<String>,
    pub added: Vec<String>,
    /// 两边都保留的过滤器
    pub kept: Vec<String>,
    pub old_empty: bool,
    pub new_empty: bool,
}

impl FilterDiff {
    pub fn new(old: &[String], new: &[String]) -> Self {
        let old_set: StringSet = old.iter().cloned().collect();
        let new_set: StringSet = new.iter().cloned().collect();
        Self {
            removed: old_set.difference(&new_set).as_slice(),
            added: new_set.difference(&old_set).as_slice(),
            kept: old_set.intersection(&new_set).as_slice(),
            old_empty: old_set.is_empty(),
            new_empty: new_set.is_empty(),
        }
    }

    /// 旧集合为空时 item 原本在 `*none` 桶里，同样需要移除
    pub fn needs_remove(&self) -> bool {
        !self.removed.is_empty() || self.old_empty
    }

    /// 新集合为空时 item 需要进入 `*none` 桶
    pub fn needs_add(&self) -> bool {
        !self.added.is_empty() || self.new_empty
    }
}

/// 按声明顺序去重后的 context 划分
struct ContextSplit {
    removed: Vec<String>,
    kept: Vec<String>,
    added: Vec<String>,
}

impl ContextSplit {
    fn new(old: &[String], new: &[String]) -> Self {
        let old_set: StringSet = old.iter().cloned().collect();
        let new_set: StringSet = new.iter().cloned().collect();
        let mut seen = StringSet::new();
        let mut split = Self {
            removed: Vec::new(),
            kept: Vec::new(),
            added: Vec::new(),
        };
        for ctx in old {
            if !seen.add(ctx.as_str()) {
                continue;
            }
            if new_set.has(ctx) {
                split.kept.push(ctx.clone());
            } else {
                split.removed.push(ctx.clone());
            }
        }
        for ctx in new {
            if !old_set.has(ctx) && seen.add(ctx.as_str()) {
                split.added.push(ctx.clone());
            }
        }
        split
    }
}

impl FilterIndexer {
    /// 对比新旧 filterIDs，只更新增删部分的正向 / 反向索引。
    ///
    /// `old_filter_ids = None` 表示新建 item。
    pub fn updated_indexes(
        &self,
        item_type: ItemType,
        tenant: &str,
        context: &str,
        item_id: &str,
        old_filter_ids: Option<&[String]>,
        new_filter_ids: &[String],
    ) -> Result<()> {
        let Some(old_filter_ids) = old_filter_ids else {
            self.add_index_filters_item(item_type, tenant, item_id, new_filter_ids)?;
            return self.add_item_to_filter_index(item_type, tenant, context, item_id, new_filter_ids);
        };
        if old_filter_ids.is_empty() && new_filter_ids.is_empty() {
            return Ok(());
        }

        let diff = FilterDiff::new(old_filter_ids, new_filter_ids);
        let contexts = [context.to_string()];
        self.apply_filter_diff(item_type, tenant, item_id, &diff, &contexts)
    }

    /// 带 context 的 profile（attribute / dispatcher）：
    /// - 被移除的 context：按旧 filterIDs 整体撤销
    /// - 新增的 context：按新 filterIDs 整体建立
    /// - 保留的 context：filterIDs 差分只计算一次，再逐个 context 应用
    ///
    /// 反向索引与 context 无关，即使没有保留的 context 也要按新集合更新一次。
    #[allow(clippy::too_many_arguments)]
    pub fn updated_indexes_with_contexts(
        &self,
        item_type: ItemType,
        tenant: &str,
        item_id: &str,
        old_contexts: Option<&[String]>,
        old_filter_ids: Option<&[String]>,
        new_contexts: &[String],
        new_filter_ids: &[String],
    ) -> Result<()> {
        let Some(old_contexts) = old_contexts else {
            self.add_index_filters_item(item_type, tenant, item_id, new_filter_ids)?;
            for ctx in new_contexts {
                self.add_item_to_filter_index(item_type, tenant, ctx, item_id, new_filter_ids)?;
            }
            return Ok(());
        };

        let split = ContextSplit::new(old_contexts, new_contexts);

        if let Some(old_filter_ids) = old_filter_ids {
            if split.kept.is_empty() {
                self.remove_index_filters_item(item_type, tenant, item_id, old_filter_ids)?;
            }
            for ctx in &split.removed {
                self.remove_item_from_filter_index(item_type, tenant, ctx, item_id, old_filter_ids)?;
            }
        }

        if split.kept.is_empty() {
            self.add_index_filters_item(item_type, tenant, item_id, new_filter_ids)?;
        } else {
            match old_filter_ids {
                None => {
                    self.add_index_filters_item(item_type, tenant, item_id, new_filter_ids)?;
                    for ctx in &split.kept {
                        self.add_item_to_filter_index(item_type, tenant, ctx, item_id, new_filter_ids)?;
                    }
                }
                Some(old) if !(old.is_empty() && new_filter_ids.is_empty()) => {
                    let diff = FilterDiff::new(old, new_filter_ids);
                    self.apply_filter_diff(item_type, tenant, item_id, &diff, &split.kept)?;
                }
                Some(_) => {}
            }
        }

        for ctx in &split.added {
            self.add_item_to_filter_index(item_type, tenant, ctx, item_id, new_filter_ids)?;
        }
        Ok(())
    }

    /// 反向索引更新一次，正向索引按每个 context 各更新一次
    fn apply_filter_diff(
        &self,
        item_type: ItemType,
        tenant: &str,
        item_id: &str,
        diff: &FilterDiff,
        contexts: &[String],
    ) -> Result<()> {
        if diff.needs_remove() {
            // 保留的过滤器仍会产出的 key 不能被移除
            let retain = if diff.kept.is_empty() || diff.removed.is_empty() {
                StringSet::new()
            } else {
                self.rule_keys_of(item_type, tenant, item_id, &diff.kept)?
            };
            self.remove_index_filters_item(item_type, tenant, item_id, &diff.removed)?;
            for ctx in contexts {
                self.remove_item_retaining(item_type, tenant, ctx, item_id, &diff.removed, &retain)?;
            }
        }
        if diff.needs_add() {
            self.add_index_filters_item(item_type, tenant, item_id, &diff.added)?;
            for ctx in contexts {
                self.add_item_to_filter_index(item_type, tenant, ctx, item_id, &diff.added)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::keys;
    use crate::index::testutil::*;

    const NONE: &str = "*none:*any:*any";

    #[test]
    fn filter_diff_is_by_id_not_position() {
        let d = FilterDiff::new(&ids(&["F1", "F2"]), &ids(&["F2", "F1"]));
        assert!(d.removed.is_empty() && d.added.is_empty());
        assert!(!d.needs_remove() && !d.needs_add());

        let d = FilterDiff::new(&ids(&["F1", "F2"]), &ids(&["F2", "F3"]));
        assert_eq!(d.removed, vec!["F1"]);
        assert_eq!(d.added, vec!["F3"]);
        assert_eq!(d.kept, vec!["F2"]);

        let d = FilterDiff::new(&[], &ids(&["F1"]));
        assert!(d.needs_remove());
    }

    #[test]
    fn scenario_dropping_all_filters_moves_item_to_none_bucket() {
        let fx = fixture();
        fx.string_filter("F1", "Account", &["1001"]);
        let f1 = ids(&["F1"]);

        fx.indexer
            .updated_indexes(ItemType::THRESHOLD, TNT, "", "P1", None, &f1)
            .unwrap();
        assert_eq!(fx.bucket(ItemType::THRESHOLD, TNT, "*string:Account:1001"), vec!["P1"]);
        assert_eq!(fx.reverse("F1", ItemType::THRESHOLD), vec!["P1"]);

        fx.indexer
            .updated_indexes(ItemType::THRESHOLD, TNT, "", "P1", Some(&f1), &[])
            .unwrap();
        assert!(fx.bucket(ItemType::THRESHOLD, TNT, "*string:Account:1001").is_empty());
        assert_eq!(fx.bucket(ItemType::THRESHOLD, TNT, NONE), vec!["P1"]);
        assert!(fx.reverse("F1", ItemType::THRESHOLD).is_empty());
    }

    #[test]
    fn none_bucket_is_exclusive() {
        let fx = fixture();
        fx.string_filter("F1", "Account", &["1001"]);

        fx.indexer
            .updated_indexes(ItemType::STAT, TNT, "", "S1", None, &[])
            .unwrap();
        assert_eq!(fx.scope(ItemType::STAT, TNT), vec![(NONE.to_string(), ids(&["S1"]))]);

        fx.indexer
            .updated_indexes(ItemType::STAT, TNT, "", "S1", Some(&[]), &ids(&["F1"]))
            .unwrap();
        assert_eq!(
            fx.scope(ItemType::STAT, TNT),
            vec![("*string:Account:1001".to_string(), ids(&["S1"]))]
        );
    }

    #[test]
    fn unchanged_empty_filters_write_nothing() {
        let fx = fixture();
        fx.indexer
            .updated_indexes(ItemType::CHARGER, TNT, "", "C1", Some(&[]), &[])
            .unwrap();
        assert_eq!(fx.store.index_writes(), 0);
    }

    #[test]
    fn round_trip_restores_forward_and_reverse_state() {
        let fx = fixture();
        fx.string_filter("F1", "Account", &["1001"]);
        fx.string_filter("F2", "Account", &["1002"]);
        fx.string_filter("F3", "Subject", &["1001"]);
        fx.indexer
            .updated_indexes(ItemType::RESOURCE, TNT, "", "OTHER", None, &ids(&["F2"]))
            .unwrap();

        let old = ids(&["F1", "F2"]);
        let new = ids(&["F2", "F3"]);
        fx.indexer
            .updated_indexes(ItemType::RESOURCE, TNT, "", "R1", None, &old)
            .unwrap();
        let before = fx.store.dump();
        let before_fwd = fx.scope(ItemType::RESOURCE, TNT);

        fx.indexer
            .updated_indexes(ItemType::RESOURCE, TNT, "", "R1", Some(&old), &new)
            .unwrap();
        assert_eq!(fx.bucket(ItemType::RESOURCE, TNT, "*string:Subject:1001"), vec!["R1"]);
        assert!(fx.bucket(ItemType::RESOURCE, TNT, "*string:Account:1001").is_empty());

        fx.indexer
            .updated_indexes(ItemType::RESOURCE, TNT, "", "R1", Some(&new), &old)
            .unwrap();
        assert_eq!(fx.scope(ItemType::RESOURCE, TNT), before_fwd);
        for f in ["F1", "F2", "F3"] {
            let was: Vec<String> = before
                .indexes
                .iter()
                .find(|r| r.tnt_ctx == keys::concat(&[TNT, f]) && r.rule_key == ItemType::RESOURCE.name)
                .map(|r| r.ids.as_slice())
                .unwrap_or_default();
            assert_eq!(fx.reverse(f, ItemType::RESOURCE), was, "reverse for {f}");
        }
    }

    #[test]
    fn removing_one_filter_keeps_rule_key_shared_with_kept_filter() {
        let fx = fixture();
        fx.string_filter("F1", "Account", &["1001"]);
        fx.string_filter("F2", "Account", &["1001", "1002"]);
        let old = ids(&["F1", "F2"]);
        fx.indexer
            .updated_indexes(ItemType::ROUTE, TNT, "", "RT1", None, &old)
            .unwrap();

        fx.indexer
            .updated_indexes(ItemType::ROUTE, TNT, "", "RT1", Some(&old), &ids(&["F1"]))
            .unwrap();
        assert_eq!(fx.bucket(ItemType::ROUTE, TNT, "*string:Account:1001"), vec!["RT1"]);
        assert!(fx.bucket(ItemType::ROUTE, TNT, "*string:Account:1002").is_empty());
    }

    #[test]
    fn deleted_kept_filter_is_broken_reference() {
        let fx = fixture();
        fx.string_filter("F1", "Account", &["1001"]);
        fx.string_filter("F2", "Account", &["1002"]);
        let old = ids(&["F1", "F2"]);
        fx.indexer
            .updated_indexes(ItemType::ROUTE, TNT, "", "RT1", None, &old)
            .unwrap();
        fx.store.remove_filter(TNT, "F2");

        let err = fx
            .indexer
            .updated_indexes(ItemType::ROUTE, TNT, "", "RT1", Some(&old), &ids(&["F2"]))
            .unwrap_err();
        match err {
            crate::Error::BrokenReference {
                filter_id,
                item_type,
                item_id,
            } => {
                assert_eq!(filter_id, "F2");
                assert_eq!(item_type, ItemType::ROUTE.name);
                assert_eq!(item_id, "RT1");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn scenario_removed_context_is_dropped_kept_context_untouched() {
        let fx = fixture();
        fx.string_filter("F1", "Account", &["1001"]);
        let f1 = ids(&["F1"]);
        let both = ids(&["ctxA", "ctxB"]);

        fx.indexer
            .updated_indexes_with_contexts(ItemType::ATTRIBUTE, TNT, "A1", None, None, &both, &f1)
            .unwrap();
        let ctx_a = keys::scope_key(TNT, "ctxA");
        let ctx_b = keys::scope_key(TNT, "ctxB");
        assert_eq!(fx.bucket(ItemType::ATTRIBUTE, &ctx_b, "*string:Account:1001"), vec!["A1"]);
        let a_before = fx.scope(ItemType::ATTRIBUTE, &ctx_a);

        let writes = fx.store.index_writes();
        fx.indexer
            .updated_indexes_with_contexts(
                ItemType::ATTRIBUTE,
                TNT,
                "A1",
                Some(&both),
                Some(&f1),
                &ids(&["ctxA"]),
                &f1,
            )
            .unwrap();
        assert!(fx.scope(ItemType::ATTRIBUTE, &ctx_b).is_empty());
        assert_eq!(fx.scope(ItemType::ATTRIBUTE, &ctx_a), a_before);
        assert_eq!(fx.reverse("F1", ItemType::ATTRIBUTE), vec!["A1"]);
        // 只写了 ctxB 一次
        assert_eq!(fx.store.index_writes(), writes + 1);
    }

    #[test]
    fn replacing_all_contexts_still_updates_reverse_index() {
        let fx = fixture();
        fx.string_filter("F1", "Account", &["1001"]);
        fx.string_filter("F2", "Account", &["1002"]);
        let old_ctx = ids(&["*sessions"]);
        let new_ctx = ids(&["*cdrs"]);

        fx.indexer
            .updated_indexes_with_contexts(
                ItemType::DISPATCHER,
                TNT,
                "D1",
                None,
                None,
                &old_ctx,
                &ids(&["F1"]),
            )
            .unwrap();
        fx.indexer
            .updated_indexes_with_contexts(
                ItemType::DISPATCHER,
                TNT,
                "D1",
                Some(&old_ctx),
                Some(&ids(&["F1"])),
                &new_ctx,
                &ids(&["F2"]),
            )
            .unwrap();

        assert!(fx.reverse("F1", ItemType::DISPATCHER).is_empty());
        assert_eq!(fx.reverse("F2", ItemType::DISPATCHER), vec!["D1"]);
        assert!(fx.scope(ItemType::DISPATCHER, &keys::scope_key(TNT, "*sessions")).is_empty());
        assert_eq!(
            fx.bucket(ItemType::DISPATCHER, &keys::scope_key(TNT, "*cdrs"), "*string:Account:1002"),
            vec!["D1"]
        );
    }

    #[test]
    fn kept_contexts_apply_filter_diff_each() {
        let fx = fixture();
        fx.string_filter("F1", "Account", &["1001"]);
        let ctxs = ids(&["c1", "c2"]);
        fx.indexer
            .updated_indexes_with_contexts(ItemType::ATTRIBUTE, TNT, "A1", None, None, &ctxs, &ids(&["F1"]))
            .unwrap();
        fx.indexer
            .updated_indexes_with_contexts(
                ItemType::ATTRIBUTE,
                TNT,
                "A1",
                Some(&ctxs),
                Some(&ids(&["F1"])),
                &ctxs,
                &[],
            )
            .unwrap();
        for c in ["c1", "c2"] {
            let scope = keys::scope_key(TNT, c);
            assert_eq!(
                fx.scope(ItemType::ATTRIBUTE, &scope),
                vec![(NONE.to_string(), ids(&["A1"]))]
            );
        }
        assert!(fx.reverse("F1", ItemType::ATTRIBUTE).is_empty());
    }
}
