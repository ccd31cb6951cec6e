use serde::{Deserialize, Serialize};

use crate::core::keys::{self, META_PREFIX, META_STRING};
use crate::core::set::StringSet;
use crate::error::{Error, Result};

/// 过滤规则：仅 `*string` / `*prefix` 可索引，其他类型（如 `*gt`）只能逐条求值
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(rename = "type")]
    pub rule_type: String,
    pub element: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl Rule {
    pub fn new(rule_type: &str, element: &str, values: &[&str]) -> Self {
        Self {
            rule_type: rule_type.to_string(),
            element: element.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn is_indexable(&self) -> bool {
        self.rule_type == META_STRING || self.rule_type == META_PREFIX
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub tenant: String,
    pub id: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Filter {
    pub fn tenant_id(&self) -> String {
        keys::concat(&[self.tenant.as_str(), self.id.as_str()])
    }

    /// 解析 inline 过滤器：`*type:element:v1|v2|...`
    pub fn from_inline(tenant: &str, id: &str) -> Result<Self> {
        let mut parts = id.splitn(3, keys::SEP);
        let (Some(rule_type), Some(element), Some(values)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::InlineFilter(id.to_string()));
        };
        if !keys::is_inline(rule_type) || element.is_empty() || values.is_empty() {
            return Err(Error::InlineFilter(id.to_string()));
        }
        Ok(Self {
            tenant: tenant.to_string(),
            id: id.to_string(),
            rules: vec![Rule {
                rule_type: rule_type.to_string(),
                element: element.to_string(),
                values: values.split('|').map(str::to_string).collect(),
            }],
        })
    }

    /// 可索引的 rule key 集合（`type:element:value`）
    pub fn index_keys(&self) -> StringSet {
        self.rules
            .iter()
            .filter(|r| r.is_indexable())
            .flat_map(|r| {
                r.values
                    .iter()
                    .map(move |v| keys::rule_key(&r.rule_type, &r.element, v))
            })
            .collect()
    }
}

/// 可被过滤器索引的 item 类型。
///
/// 新增类型只需增加一个常量并注册对应的 `ProfileSource`，引擎本身不需要改动。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ItemType {
    /// 索引命名空间（同时作为缓存分区与反向桶内的分组 key）
    pub name: &'static str,
    /// profile 在存储中的 key 前缀（`prefix + tenant:id`）
    pub profile_prefix: &'static str,
    /// 是否按 context / subsystem 分别建立正向索引
    pub contextual: bool,
}

impl ItemType {
    pub const ATTRIBUTE: ItemType = ItemType::contextual("*attribute_filter_indexes", "alp_");
    pub const THRESHOLD: ItemType = ItemType::flat("*threshold_filter_indexes", "thp_");
    pub const STAT: ItemType = ItemType::flat("*stat_filter_indexes", "sqp_");
    pub const RESOURCE: ItemType = ItemType::flat("*resource_filter_indexes", "rsp_");
    pub const ROUTE: ItemType = ItemType::flat("*route_filter_indexes", "rpp_");
    pub const CHARGER: ItemType = ItemType::flat("*charger_filter_indexes", "cpp_");
    pub const DISPATCHER: ItemType = ItemType::contextual("*dispatcher_filter_indexes", "dpp_");

    pub const ALL: [ItemType; 7] = [
        ItemType::ATTRIBUTE,
        ItemType::THRESHOLD,
        ItemType::STAT,
        ItemType::RESOURCE,
        ItemType::ROUTE,
        ItemType::CHARGER,
        ItemType::DISPATCHER,
    ];

    pub const fn flat(name: &'static str, profile_prefix: &'static str) -> Self {
        Self {
            name,
            profile_prefix,
            contextual: false,
        }
    }

    pub const fn contextual(name: &'static str, profile_prefix: &'static str) -> Self {
        Self {
            name,
            profile_prefix,
            contextual: true,
        }
    }

    pub fn by_name(name: &str) -> Option<ItemType> {
        Self::ALL.iter().copied().find(|t| t.name == name)
    }

    /// CLI 友好的短名（attribute / threshold / ...）
    pub fn by_short_name(short: &str) -> Option<ItemType> {
        Self::ALL.iter().copied().find(|t| t.short_name() == short)
    }

    pub fn short_name(&self) -> &'static str {
        self.name
            .trim_start_matches('*')
            .trim_end_matches("_filter_indexes")
    }

    pub fn profile_key(&self, tenant: &str, id: &str) -> String {
        format!("{}{}", self.profile_prefix, keys::concat(&[tenant, id]))
    }
}

/// 反向索引命名空间：filterID -> itemType -> item IDs
pub const REVERSE_FILTER_INDEXES: &str = "*reverse_filter_indexes";

/// 本引擎读取的 profile 投影
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedProfile {
    pub tenant: String,
    pub id: String,
    #[serde(default)]
    pub filter_ids: Vec<String>,
    /// attribute 的 Contexts / dispatcher 的 Subsystems，其他类型为空
    #[serde(default)]
    pub contexts: Vec<String>,
}

impl IndexedProfile {
    pub fn new(tenant: &str, id: &str, filter_ids: &[&str]) -> Self {
        Self {
            tenant: tenant.to_string(),
            id: id.to_string(),
            filter_ids: filter_ids.iter().map(|f| f.to_string()).collect(),
            contexts: Vec::new(),
        }
    }

    pub fn with_contexts(mut self, contexts: &[&str]) -> Self {
        self.contexts = contexts.iter().map(|c| c.to_string()).collect();
        self
    }
}
