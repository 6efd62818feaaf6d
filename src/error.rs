//! 错误类型

use crate::core::analyzer::SyncRule;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// 缺少必需配置（在任何 IO 之前发现）
    #[error("{provider} configuration error: {message}")]
    Configuration { provider: String, message: String },

    /// 凭证被后端拒绝
    #[error("{provider} authentication failed: {message}")]
    Authentication { provider: String, message: String },

    /// 后端不可达或返回了意外状态
    #[error("{provider} connectivity error: {message}")]
    Connectivity { provider: String, message: String },

    /// 远程存储的读写删列失败
    #[error("{provider} storage error at '{path}': {source}")]
    Storage {
        provider: String,
        path: String,
        #[source]
        source: opendal::Error,
    },

    /// 本地文件系统错误
    #[error("IO error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 合并引擎收到无法解析的文本
    #[error("cannot merge '{name}': {message}")]
    Merge { name: String, message: String },

    /// 场景缺少规则所需的一侧文件记录
    #[error("{rule} scenario for '{name}' has no {side} file record")]
    MissingRecord {
        rule: SyncRule,
        name: String,
        side: &'static str,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 执行器附加的上下文：哪条规则、哪个文件失败
    #[error("{rule} failed for '{name}': {source}")]
    Scenario {
        rule: SyncRule,
        name: String,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn storage(provider: &str, path: &str, source: opendal::Error) -> Self {
        SyncError::Storage {
            provider: provider.to_string(),
            path: path.to_string(),
            source,
        }
    }

    pub fn configuration(provider: &str, message: impl Into<String>) -> Self {
        SyncError::Configuration {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn authentication(provider: &str, message: impl Into<String>) -> Self {
        SyncError::Authentication {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn connectivity(provider: &str, message: impl Into<String>) -> Self {
        SyncError::Connectivity {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    /// 目标文件不存在（删除时视为已收敛）
    pub fn is_not_found(&self) -> bool {
        match self {
            SyncError::Storage { source, .. } => source.kind() == opendal::ErrorKind::NotFound,
            SyncError::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            SyncError::Scenario { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// IoError 家族：存储、本地 IO 以及合并错误
    pub fn is_io(&self) -> bool {
        match self {
            SyncError::Storage { .. } | SyncError::Io { .. } | SyncError::Merge { .. } => true,
            SyncError::Scenario { source, .. } => source.is_io(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let err = SyncError::io(
            "/tmp/missing",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_not_found());
        assert!(err.is_io());

        let wrapped = SyncError::Scenario {
            rule: SyncRule::DeleteLocal,
            name: "notes/a.md".to_string(),
            source: Box::new(err),
        };
        assert!(wrapped.is_not_found());
        assert!(wrapped.to_string().contains("DELETE_LOCAL"));
        assert!(wrapped.to_string().contains("notes/a.md"));
    }

    #[test]
    fn test_merge_is_io_subtype() {
        let err = SyncError::Merge {
            name: "a.md".to_string(),
            message: "invalid utf-8".to_string(),
        };
        assert!(err.is_io());
        assert!(!err.is_not_found());

        let err = SyncError::MissingRecord {
            rule: SyncRule::LocalToRemote,
            name: "a.md".to_string(),
            side: "local",
        };
        assert!(!err.is_io());
        assert_eq!(
            err.to_string(),
            "LOCAL_TO_REMOTE scenario for 'a.md' has no local file record"
        );

        let err = SyncError::configuration("S3", "missing bucket");
        assert!(!err.is_io());
        assert_eq!(err.to_string(), "S3 configuration error: missing bucket");
    }
}
