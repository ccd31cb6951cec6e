//! 复合 key 编解码。
//!
//! 持久化 / 缓存层使用的 key 格式必须保持稳定：
//! - 正向桶：`tenant[:context]:type:element:value`
//! - 无过滤器的 item：`tenant[:context]:*none:*any:*any`
//! - 反向桶：`tenant:filterID`，桶内按 item type 分组
//!
//! 分隔符不得出现在 tenant / context / element / value 内部，
//! 否则 `split_filter_index` 无法区分前缀与 rule key。

use crate::error::{Error, Result};

pub const SEP: char = ':';

pub const META_NONE: &str = "*none";
pub const META_ANY: &str = "*any";
pub const META_STRING: &str = "*string";
pub const META_PREFIX: &str = "*prefix";

/// inline 过滤器 ID 的保留前缀（不是独立存储的 Filter）
pub const META: &str = "*";

pub fn concat<S: AsRef<str>>(parts: &[S]) -> String {
    let mut out = String::new();
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            out.push(SEP);
        }
        out.push_str(p.as_ref());
    }
    out
}

pub fn split(key: &str) -> Vec<&str> {
    key.split(SEP).collect()
}

/// tenant 或 tenant:context（正向桶的作用域）
pub fn scope_key(tenant: &str, context: &str) -> String {
    if context.is_empty() {
        tenant.to_string()
    } else {
        concat(&[tenant, context])
    }
}

pub fn rule_key(rule_type: &str, element: &str, value: &str) -> String {
    concat(&[rule_type, element, value])
}

/// 无可索引规则 item 的哨兵桶
pub fn none_rule_key() -> String {
    rule_key(META_NONE, META_ANY, META_ANY)
}

pub fn is_inline(filter_id: &str) -> bool {
    filter_id.starts_with(META)
}

/// 把缓存 key 拆回 (tenantCtx, ruleKey)。
///
/// 末尾固定 3 段为 rule key，其余前缀（可能含 context）为 tenantCtx。
pub fn split_filter_index(tnt_ctx_idx_key: &str) -> Result<(String, String)> {
    let parts = split(tnt_ctx_idx_key);
    let n = parts.len();
    if n < 4 {
        return Err(Error::KeyFormat(tnt_ctx_idx_key.to_string()));
    }
    Ok((concat(&parts[..n - 3]), concat(&parts[n - 3..])))
}
