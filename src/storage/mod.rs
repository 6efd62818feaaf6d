pub mod azure;
pub mod gcs;
pub mod local;
pub mod object;
pub mod s3;

use crate::config::Settings;
use crate::core::scanner::IgnoreRules;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use azure::{AzureContainer, ContainerStatus};
pub use local::LocalStorage;
pub use object::{HashSource, ObjectStore};

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- stat, delete 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read, write 等
pub const IO_TIMEOUT_SECS: u64 = 300;
/// 远程操作最大重试次数
pub const MAX_RETRIES: usize = 3;

/// 文件记录：两端共用的文件描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// 规范化后的路径，两端匹配用的键
    pub name: String,
    /// 本地绝对路径（来自远程的记录为空）
    pub local_name: String,
    /// 远程对象键（相对于远程根目录）
    pub remote_name: String,
    /// MD5 十六进制摘要
    pub md5: String,
    pub size: u64,
    pub mime_type: String,
    pub last_modified: DateTime<Utc>,
    pub is_dir: bool,
}

impl FileRecord {
    pub fn new(name: &str, md5: &str, size: u64, last_modified: DateTime<Utc>) -> Self {
        let name = normalize_name(name);
        Self {
            mime_type: guess_mime(&name),
            remote_name: name.clone(),
            name,
            local_name: String::new(),
            md5: md5.to_string(),
            size,
            last_modified: truncate_millis(last_modified),
            is_dir: false,
        }
    }

    /// 远程对象键，未设置时退回到规范名
    pub fn remote_key(&self) -> &str {
        if self.remote_name.is_empty() {
            &self.name
        } else {
            &self.remote_name
        }
    }
}

/// 连通性测试结果（从不失败）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectivityReport {
    pub success: bool,
    pub message: String,
}

impl ConnectivityReport {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// 存储抽象接口
#[async_trait]
pub trait Storage: Send + Sync {
    /// 递归列出所有文件（已应用忽略规则，不含目录）
    async fn list_files(&self) -> Result<Vec<FileRecord>>;

    /// 读取整个文件
    async fn read(&self, file: &FileRecord) -> Result<Vec<u8>>;

    /// 写入整个文件（创建或覆盖）
    async fn write(&self, file: &FileRecord, data: Vec<u8>) -> Result<()>;

    /// 删除文件
    async fn delete(&self, file: &FileRecord) -> Result<()>;

    /// 校验凭证
    async fn authenticate(&self) -> Result<()>;

    /// 测试连接，总是返回结果
    async fn test_connectivity(&self) -> ConnectivityReport;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;

    /// 本地存储的根目录
    fn base_path(&self) -> Option<&Path> {
        None
    }
}

/// 远程存储类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Azure,
    Aws,
    Gcp,
}

impl ProviderKind {
    /// 按执行顺序排列
    pub const ALL: [ProviderKind; 3] = [ProviderKind::Azure, ProviderKind::Aws, ProviderKind::Gcp];

    /// 用于缓存文件名
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Azure => "azure",
            ProviderKind::Aws => "aws",
            ProviderKind::Gcp => "gcp",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Azure => "Azure",
            ProviderKind::Aws => "S3",
            ProviderKind::Gcp => "GCP",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// 根据配置创建远程存储实例（先校验配置，不做任何 IO）
pub async fn create_remote(
    kind: ProviderKind,
    settings: &Settings,
    vault_name: &str,
    ignore: IgnoreRules,
) -> Result<ObjectStore> {
    settings.validate(kind)?;
    match kind {
        ProviderKind::Aws => s3::build(&settings.aws, vault_name, ignore).await,
        ProviderKind::Azure => azure::build(&settings.azure, vault_name, ignore),
        ProviderKind::Gcp => gcs::build(&settings.gcp, vault_name, ignore),
    }
}

// ============ 路径与哈希工具 ============

/// 规范化路径：统一使用 /，去掉空段和 . 段以及首尾分隔符
pub fn normalize_name(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// 计算 MD5 十六进制摘要
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// 是否是 32 位十六进制 MD5（分片上传的 ETag 不是）
pub fn is_md5_hex(value: &str) -> bool {
    value.len() == 32 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// base64 编码的 MD5（Content-MD5 / md5Hash）转十六进制
pub fn base64_md5_to_hex(value: &str) -> Option<String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(value.trim())
        .ok()?;
    (bytes.len() == 16).then(|| hex::encode(bytes))
}

pub fn guess_mime(name: &str) -> String {
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// 截断到毫秒，保证与缓存中的 ISO 时间戳往返一致
pub fn truncate_millis(time: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(time.timestamp_millis()).unwrap_or(time)
}

pub(crate) fn missing(provider: &str, what: &str) -> SyncError {
    SyncError::configuration(provider, format!("Missing required setting: {}", what))
}
