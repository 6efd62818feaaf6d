//! 同步缓存
//!
//! 记录上次成功同步结束时远程端每个文件的哈希和时间戳，
//! 用于三方比较时判断是哪一端发生了变化。每个（本地库，远程）对应一个缓存文件。

use crate::error::{Result, SyncError};
use crate::storage::FileRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 缓存条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub md5: String,
    /// ISO 8601 格式（毫秒精度，Z 结尾）
    pub utc_timestamp: String,
}

/// 持久化格式
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheFile {
    last_sync: Option<String>,
    #[serde(default)]
    file_cache: BTreeMap<String, CacheEntry>,
}

/// 同步缓存
#[derive(Debug)]
pub struct SyncCache {
    path: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
    last_sync: Option<DateTime<Utc>>,
}

/// 格式化为缓存使用的时间戳
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

impl SyncCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
            last_sync: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取缓存；文件不存在或损坏时重置为空，从不失败
    pub fn load(&mut self) {
        self.entries.clear();
        self.last_sync = None;

        let data = match std::fs::read(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("缓存文件不存在: {:?}", self.path);
                return;
            }
            Err(e) => {
                warn!("读取缓存失败，按空缓存处理: {:?}: {}", self.path, e);
                return;
            }
        };

        match serde_json::from_slice::<CacheFile>(&data) {
            Ok(file) => {
                self.last_sync = file.last_sync.as_deref().and_then(parse_timestamp);
                self.entries = file.file_cache;
                debug!("缓存已加载: {} 个条目 ({:?})", self.entries.len(), self.path);
            }
            Err(e) => {
                warn!("缓存文件损坏，按空缓存处理: {:?}: {}", self.path, e);
            }
        }
    }

    /// 用给定文件列表整体替换缓存，并原子写入磁盘
    pub fn snapshot(&mut self, files: &[FileRecord]) -> Result<()> {
        let entries: BTreeMap<String, CacheEntry> = files
            .iter()
            .filter(|f| !f.is_dir)
            .map(|f| {
                (
                    f.name.clone(),
                    CacheEntry {
                        md5: f.md5.clone(),
                        utc_timestamp: format_timestamp(&f.last_modified),
                    },
                )
            })
            .collect();
        let last_sync = Utc::now();

        let file = CacheFile {
            last_sync: Some(format_timestamp(&last_sync)),
            file_cache: entries,
        };
        let data = serde_json::to_vec_pretty(&file)?;
        self.persist(&data)?;

        info!("缓存已更新: {} 个条目 ({:?})", file.file_cache.len(), self.path);
        self.entries = file.file_cache;
        self.last_sync = Some(last_sync);
        Ok(())
    }

    /// 先写临时文件再重命名，避免留下写了一半的缓存
    fn persist(&self, data: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, data).map_err(|e| SyncError::io(&temp_path, e))?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            SyncError::io(&self.path, e)
        })
    }

    pub fn get(&self, name: &str) -> Option<&CacheEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn md5(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|e| e.md5.as_str())
    }

    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        self.entries
            .get(name)
            .and_then(|e| parse_timestamp(&e.utc_timestamp))
    }

    /// 哈希和时间戳都与缓存一致
    pub fn is_unchanged(&self, name: &str, md5: &str, timestamp: &DateTime<Utc>) -> bool {
        self.entries
            .get(name)
            .map(|e| e.md5 == md5 && e.utc_timestamp == format_timestamp(timestamp))
            .unwrap_or(false)
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 删除缓存文件并清空内存状态
    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.last_sync = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::io(&self.path, e)),
        }
    }
}
