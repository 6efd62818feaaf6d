use super::{md5_hex, normalize_name, truncate_millis, ConnectivityReport, FileRecord, Storage};
use crate::core::cache::SyncCache;
use crate::core::scanner::{IgnoreRules, TEMP_SUFFIX};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// 每批并发处理的文件数
const MAX_CONCURRENT: usize = 50;

pub struct LocalStorage {
    base_path: PathBuf,
    name: String,
    ignore: IgnoreRules,
    /// 本地哈希缓存：修改时间没变的文件直接复用上次的 MD5
    hash_cache: Option<Mutex<SyncCache>>,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, ignore: IgnoreRules) -> Result<Self> {
        let base_path = root.into();
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path).map_err(|e| SyncError::io(&base_path, e))?;
        }
        let name = format!("local:{}", base_path.display());
        Ok(Self {
            base_path,
            name,
            ignore,
            hash_cache: None,
        })
    }

    /// 启用本地哈希缓存
    pub fn with_hash_cache(mut self, path: impl Into<PathBuf>) -> Self {
        let mut cache = SyncCache::new(path);
        cache.load();
        self.hash_cache = Some(Mutex::new(cache));
        self
    }

    fn resolve_path(&self, file: &FileRecord) -> PathBuf {
        if file.local_name.is_empty() {
            self.base_path.join(&file.name)
        } else {
            PathBuf::from(&file.local_name)
        }
    }

    fn relative_name(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        Some(normalize_name(&relative.to_string_lossy()))
    }

    /// 扫描一层目录：先分批处理文件，再逐个递归子目录。
    /// 单个文件失败只跳过该文件，目录读取失败向上返回
    fn scan_dir<'a>(
        &'a self,
        dir: PathBuf,
        cache: Option<&'a SyncCache>,
        out: &'a mut Vec<FileRecord>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut reader = fs::read_dir(&dir).await.map_err(|e| SyncError::io(&dir, e))?;
            let mut entries = Vec::new();
            while let Some(entry) = reader.next_entry().await.map_err(|e| SyncError::io(&dir, e))? {
                entries.push(entry.path());
            }
            entries.sort();

            let mut files = Vec::new();
            let mut dirs = Vec::new();
            for path in entries {
                let Some(name) = self.relative_name(&path) else {
                    continue;
                };
                if name.is_empty() || self.ignore.is_ignored(&name) {
                    continue;
                }
                match fs::metadata(&path).await {
                    Ok(meta) if meta.is_dir() => dirs.push(path),
                    Ok(_) => files.push((path, name)),
                    Err(e) => warn!("无法读取文件信息，已跳过: {:?}: {}", path, e),
                }
            }

            for chunk in files.chunks(MAX_CONCURRENT) {
                let results = join_all(
                    chunk
                        .iter()
                        .map(|(path, name)| self.describe(path, name, cache)),
                )
                .await;

                for (result, (path, _)) in results.into_iter().zip(chunk) {
                    match result {
                        Ok(record) => out.push(record),
                        Err(e) => warn!("处理文件失败，已跳过: {:?}: {}", path, e),
                    }
                }
            }

            // 目录读不了必须让整次扫描失败，否则其下的文件会被当成本地已删除
            for sub in dirs {
                self.scan_dir(sub, cache, out).await?;
            }
            Ok(())
        })
    }

    async fn describe(
        &self,
        path: &Path,
        name: &str,
        cache: Option<&SyncCache>,
    ) -> Result<FileRecord> {
        let meta = fs::metadata(path).await.map_err(|e| SyncError::io(path, e))?;
        let modified = meta
            .modified()
            .map(|t| truncate_millis(DateTime::<Utc>::from(t)))
            .map_err(|e| SyncError::io(path, e))?;

        let cached = cache.and_then(|c| {
            c.md5(name)
                .filter(|md5| c.is_unchanged(name, md5, &modified))
                .map(str::to_string)
        });

        let md5 = match cached {
            Some(md5) => md5,
            None => {
                let data = fs::read(path).await.map_err(|e| SyncError::io(path, e))?;
                md5_hex(&data)
            }
        };

        let mut record = FileRecord::new(name, &md5, meta.len(), modified);
        record.local_name = path.to_string_lossy().to_string();
        Ok(record)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn list_files(&self) -> Result<Vec<FileRecord>> {
        let mut files = Vec::new();

        match &self.hash_cache {
            Some(lock) => {
                let mut cache = lock.lock().await;
                self.scan_dir(self.base_path.clone(), Some(&*cache), &mut files)
                    .await?;
                if !files.is_empty() {
                    if let Err(e) = cache.snapshot(&files) {
                        warn!("写入本地哈希缓存失败: {}", e);
                    }
                }
            }
            None => {
                self.scan_dir(self.base_path.clone(), None, &mut files)
                    .await?;
            }
        }

        debug!("{} 扫描完成: {} 个文件", self.name, files.len());
        Ok(files)
    }

    async fn read(&self, file: &FileRecord) -> Result<Vec<u8>> {
        let path = self.resolve_path(file);
        fs::read(&path).await.map_err(|e| SyncError::io(path, e))
    }

    async fn write(&self, file: &FileRecord, data: Vec<u8>) -> Result<()> {
        let full_path = self.resolve_path(file);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::io(parent, e))?;
        }

        // 使用临时文件写入，然后原子重命名
        let file_name = full_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let temp_path = full_path.with_file_name(format!(".{}{}", file_name, TEMP_SUFFIX));
        fs::write(&temp_path, data)
            .await
            .map_err(|e| SyncError::io(&temp_path, e))?;
        if let Err(e) = fs::rename(&temp_path, &full_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(SyncError::io(full_path, e));
        }

        Ok(())
    }

    async fn delete(&self, file: &FileRecord) -> Result<()> {
        let path = self.resolve_path(file);
        fs::remove_file(&path)
            .await
            .map_err(|e| SyncError::io(path, e))
    }

    async fn authenticate(&self) -> Result<()> {
        match fs::metadata(&self.base_path).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(SyncError::configuration(
                "Local",
                format!("{} is not a directory", self.base_path.display()),
            )),
            Err(e) => Err(SyncError::io(&self.base_path, e)),
        }
    }

    async fn test_connectivity(&self) -> ConnectivityReport {
        if let Err(e) = self.authenticate().await {
            return ConnectivityReport::failed(e.to_string());
        }

        let probe = self
            .base_path
            .join(format!(".cloudsync-probe-{}{}", uuid::Uuid::new_v4(), TEMP_SUFFIX));
        let result = async {
            fs::write(&probe, b"probe").await?;
            fs::remove_file(&probe).await
        }
        .await;

        match result {
            Ok(()) => ConnectivityReport::ok(format!(
                "Local vault is writable: {}",
                self.base_path.display()
            )),
            Err(e) => {
                let _ = fs::remove_file(&probe).await;
                ConnectivityReport::failed(format!(
                    "Cannot write to {}: {}",
                    self.base_path.display(),
                    e
                ))
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn base_path(&self) -> Option<&Path> {
        Some(&self.base_path)
    }
}
