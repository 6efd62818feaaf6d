//! 基于 opendal Operator 的远程对象存储（S3 / Azure Blob / GCS 共用）

use super::{
    base64_md5_to_hex, is_md5_hex, md5_hex, normalize_name, AzureContainer, ConnectivityReport,
    ContainerStatus, FileRecord, Storage, IO_TIMEOUT_SECS, MAX_RETRIES, OP_TIMEOUT_SECS,
};
use crate::core::scanner::IgnoreRules;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use opendal::layers::{RetryLayer, TimeoutLayer};
use opendal::{Builder, ErrorKind, Metakey, Operator};
use std::time::Duration;
use tracing::{debug, info};

/// 列表元数据里 MD5 的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashSource {
    /// 单段上传的 ETag 就是内容 MD5
    ETag,
    /// base64 编码的 Content-MD5 / md5Hash
    ContentMd5,
}

pub struct ObjectStore {
    operator: Operator,
    name: String,
    provider: &'static str,
    hash_source: HashSource,
    ignore: IgnoreRules,
    container: Option<AzureContainer>,
}

/// 构建带超时和重试的 Operator
pub(crate) fn build_operator<B: Builder>(builder: B) -> opendal::Result<Operator> {
    Ok(Operator::new(builder)?
        .layer(
            TimeoutLayer::default()
                .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
        )
        .layer(RetryLayer::new().with_max_times(MAX_RETRIES).with_jitter())
        .finish())
}

impl ObjectStore {
    pub fn new(
        operator: Operator,
        name: String,
        provider: &'static str,
        hash_source: HashSource,
        ignore: IgnoreRules,
    ) -> Self {
        Self {
            operator,
            name,
            provider,
            hash_source,
            ignore,
            container: None,
        }
    }

    pub fn with_container(mut self, container: AzureContainer) -> Self {
        self.container = Some(container);
        self
    }

    /// 确保容器存在；没有容器概念的后端总是返回 Exists
    pub async fn ensure_container(&self) -> Result<ContainerStatus> {
        let Some(container) = &self.container else {
            return Ok(ContainerStatus::Exists);
        };

        match self.operator.check().await {
            Ok(()) => Ok(ContainerStatus::Exists),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("容器 {} 不存在，尝试创建", container.name());
                container.create().await
            }
            Err(e) => Err(self.connect_error(e)),
        }
    }

    fn storage_error(&self, path: &str, e: opendal::Error) -> SyncError {
        match e.kind() {
            ErrorKind::PermissionDenied => SyncError::authentication(self.provider, e.to_string()),
            ErrorKind::ConfigInvalid => SyncError::configuration(self.provider, e.to_string()),
            _ => SyncError::storage(self.provider, path, e),
        }
    }

    fn connect_error(&self, e: opendal::Error) -> SyncError {
        match e.kind() {
            ErrorKind::PermissionDenied => SyncError::authentication(self.provider, e.to_string()),
            ErrorKind::ConfigInvalid => SyncError::configuration(self.provider, e.to_string()),
            _ => SyncError::connectivity(self.provider, e.to_string()),
        }
    }

    fn listed_md5(&self, meta: &opendal::Metadata) -> Option<String> {
        match self.hash_source {
            HashSource::ETag => meta
                .etag()
                .map(|s| s.trim_matches('"').to_lowercase())
                .filter(|s| is_md5_hex(s)),
            HashSource::ContentMd5 => meta.content_md5().and_then(base64_md5_to_hex),
        }
    }
}

#[async_trait]
impl Storage for ObjectStore {
    async fn list_files(&self) -> Result<Vec<FileRecord>> {
        let mut files = Vec::new();

        let mut lister = self
            .operator
            .lister_with("")
            .recursive(true)
            .metakey(
                Metakey::ContentLength
                    | Metakey::LastModified
                    | Metakey::Mode
                    | Metakey::Etag
                    | Metakey::ContentMd5
                    | Metakey::ContentType,
            )
            .await
            .map_err(|e| self.storage_error("/", e))?;

        while let Some(entry) = lister
            .try_next()
            .await
            .map_err(|e| self.storage_error("/", e))?
        {
            let meta = entry.metadata();
            if meta.is_dir() {
                continue;
            }

            let key = entry.path().trim_start_matches('/').to_string();
            let name = normalize_name(&key);
            if name.is_empty() || self.ignore.is_ignored(&name) {
                continue;
            }

            let md5 = match self.listed_md5(meta) {
                Some(md5) => md5,
                None => {
                    debug!("{} 没有可用的 MD5 元数据，读取内容计算: {}", self.name, key);
                    let data = self
                        .operator
                        .read(&key)
                        .await
                        .map_err(|e| self.storage_error(&key, e))?;
                    md5_hex(&data.to_vec())
                }
            };

            let mut record = FileRecord::new(
                &name,
                &md5,
                meta.content_length(),
                meta.last_modified().unwrap_or_else(Utc::now),
            );
            record.remote_name = key;
            if let Some(content_type) = meta.content_type() {
                record.mime_type = content_type.to_string();
            }
            files.push(record);
        }

        debug!("{} 列出 {} 个文件", self.name, files.len());
        Ok(files)
    }

    async fn read(&self, file: &FileRecord) -> Result<Vec<u8>> {
        let key = file.remote_key();
        let data = self
            .operator
            .read(key)
            .await
            .map_err(|e| self.storage_error(key, e))?;
        Ok(data.to_vec())
    }

    async fn write(&self, file: &FileRecord, data: Vec<u8>) -> Result<()> {
        let key = file.remote_key();
        self.operator
            .write_with(key, data)
            .content_type(&file.mime_type)
            .await
            .map(|_| ())
            .map_err(|e| self.storage_error(key, e))
    }

    async fn delete(&self, file: &FileRecord) -> Result<()> {
        // 删除不存在的对象不会报错
        let key = file.remote_key();
        self.operator
            .delete(key)
            .await
            .map_err(|e| self.storage_error(key, e))
    }

    async fn authenticate(&self) -> Result<()> {
        match self.operator.check().await {
            Ok(()) => Ok(()),
            // 凭证有效，只是容器还没建
            Err(e) if e.kind() == ErrorKind::NotFound && self.container.is_some() => Ok(()),
            Err(e) => Err(self.connect_error(e)),
        }
    }

    async fn test_connectivity(&self) -> ConnectivityReport {
        match self.operator.check().await {
            Ok(()) => ConnectivityReport::ok(format!("Connected to {}", self.name)),
            Err(e) if e.kind() == ErrorKind::NotFound && self.container.is_some() => {
                ConnectivityReport::ok(format!(
                    "Connected to {} (container will be created during sync)",
                    self.provider
                ))
            }
            Err(e) => ConnectivityReport::failed(self.connect_error(e).to_string()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
