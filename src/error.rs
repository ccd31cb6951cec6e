use std::time::Duration;

use thiserror::Error;

/// 索引维护引擎的统一错误类型。
///
/// NotFound 在桶读取路径上不算错误（调用方替换为空集合），
/// 其余变体一律原样向上传播，本 crate 内不做重试。
#[derive(Debug, Error)]
pub enum Error {
    #[error("NOT_FOUND")]
    NotFound,

    #[error("broken reference to filter: {filter_id} for itemType: {item_type} and ID: {item_id}")]
    BrokenReference {
        filter_id: String,
        item_type: String,
        item_id: String,
    },

    #[error("WRONG_IDX_KEY_FORMAT: {0}")]
    KeyFormat(String),

    #[error("invalid inline filter: {0}")]
    InlineFilter(String),

    #[error("failed to acquire lock on {keys:?} within {timeout:?}")]
    LockTimeout { keys: Vec<String>, timeout: Duration },

    #[error("filter {filter_id} is still referenced by: {}", references.join(", "))]
    FilterInUse {
        filter_id: String,
        references: Vec<String>,
    },

    #[error("unknown item type: {0}")]
    UnknownItemType(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("snapshot codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
