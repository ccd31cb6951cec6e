//! 过滤器索引维护引擎：正向索引 ruleKey -> item IDs，
//! 反向索引 filterID -> itemType -> item IDs，以及它们的增量维护。

pub mod config;
pub mod core;
pub mod error;
pub mod index;
pub mod stats;
pub mod storage;

pub use config::IndexerConfig;
pub use error::{Error, Result};
pub use index::FilterIndexer;
