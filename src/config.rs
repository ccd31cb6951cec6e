use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// 引擎与 CLI 配置（TOML）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// 命名锁等待上限（毫秒），0 表示无限等待
    pub locking_timeout_ms: u64,
    pub snapshot_path: PathBuf,
    /// tracing EnvFilter 语法；RUST_LOG 优先
    pub log_filter: String,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            locking_timeout_ms: 0,
            snapshot_path: data_dir.join("filter-index").join("store.bin"),
            log_filter: "info".to_string(),
        }
    }
}

impl IndexerConfig {
    pub fn locking_timeout(&self) -> Duration {
        Duration::from_millis(self.locking_timeout_ms)
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("filter-index")
            .join("config.toml")
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// 文件不存在时使用默认值
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("config {:?} not found, using defaults", path);
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}
