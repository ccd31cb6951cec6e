use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{Error, Result};
use crate::storage::memory::{MemoryStore, StoreDump};

const MAGIC: u32 = 0xF17E_0001;
const HEADER_SIZE: usize = 4 + 4; // magic + data_len

/// MemoryStore 的磁盘快照（atomic replacement）
///
/// 落盘流程：
/// 1) 写 `<path>.tmp`（header + bincode body）
/// 2) rename(tmp, target)，旧快照要么完整保留要么被完整替换
///
/// 加载时校验 magic 与 data_len，不一致视为损坏。
pub struct Snapshot {
    path: PathBuf,
}

impl Snapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self, store: &MemoryStore) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let body = bincode::serialize(&store.dump())?;
        let len: u32 = body
            .len()
            .try_into()
            .map_err(|_| Error::Store(format!("snapshot too large ({} bytes)", body.len())))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + body.len());
        data.extend_from_slice(&MAGIC.to_le_bytes());
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&body);

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, &self.path).await?;
        tracing::info!(
            "Snapshot written: {} buckets -> {:?}",
            store.bucket_count(),
            self.path
        );
        Ok(())
    }

    /// 读取快照；文件不存在时返回空库
    pub async fn load_or_empty(&self) -> Result<MemoryStore> {
        let data = match fs::read(&self.path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No snapshot at {:?}, starting with empty store", self.path);
                return Ok(MemoryStore::new());
            }
            Err(e) => return Err(e.into()),
        };
        if data.len() < HEADER_SIZE {
            return Err(Error::Store("snapshot too small".into()));
        }
        let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        if magic != MAGIC {
            return Err(Error::Store(format!(
                "snapshot magic mismatch: {:#x} != {:#x}",
                magic, MAGIC
            )));
        }
        let len = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
        if data.len() - HEADER_SIZE != len {
            return Err(Error::Store("snapshot data length mismatch".into()));
        }
        let dump: StoreDump = bincode::deserialize(&data[HEADER_SIZE..])?;
        Ok(MemoryStore::restore(dump))
    }
}
