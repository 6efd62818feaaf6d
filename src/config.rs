//! 应用配置模块

use crate::core::scanner::DATA_DIR_NAME;
use crate::error::{Result, SyncError};
use crate::logging::LogConfig;
use crate::storage::ProviderKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// 隐藏敏感字段
fn mask(value: &str) -> &'static str {
    if value.is_empty() {
        ""
    } else {
        "****"
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Azure Blob 配置
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AzureSettings {
    pub account: String,
    pub access_key: String,
    /// 容器名，默认使用库名
    pub container: Option<String>,
    /// 创建容器时使用的 SAS token
    pub sas_token: Option<String>,
    pub endpoint: Option<String>,
}

impl fmt::Debug for AzureSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureSettings")
            .field("account", &self.account)
            .field("access_key", &mask(&self.access_key))
            .field("container", &self.container)
            .field("sas_token", &self.sas_token.as_deref().map(mask))
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// S3 配置
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AwsSettings {
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    /// 为空时自动探测
    pub region: String,
    pub endpoint: Option<String>,
}

impl fmt::Debug for AwsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSettings")
            .field("access_key", &self.access_key)
            .field("secret_key", &mask(&self.secret_key))
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// GCS 配置
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GcpSettings {
    pub private_key: String,
    pub client_email: String,
    pub bucket: String,
    pub endpoint: Option<String>,
}

impl fmt::Debug for GcpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcpSettings")
            .field("private_key", &mask(&self.private_key))
            .field("client_email", &self.client_email)
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// 完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub vault_path: PathBuf,
    /// 远程前缀 / 容器名，默认取库目录名
    pub vault_name: Option<String>,
    /// 缓存与日志目录，默认 `<vault>/.cloudsync`
    pub data_dir: Option<PathBuf>,
    pub azure_enabled: bool,
    pub aws_enabled: bool,
    pub gcp_enabled: bool,
    pub azure: AzureSettings,
    pub aws: AwsSettings,
    pub gcp: GcpSettings,
    /// 逗号分隔的额外忽略规则
    pub sync_ignore: String,
    /// 自动同步间隔（分钟），0 表示关闭
    pub auto_sync_delay: u64,
    pub log: LogConfig,
}

impl Settings {
    /// 加载配置：文件不存在时使用默认值，格式错误时报错
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("配置文件不存在，使用默认配置: {:?}", path);
                return Ok(Self::default());
            }
            Err(e) => return Err(SyncError::io(path, e)),
        };
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| SyncError::io(path, e))
    }

    pub fn is_enabled(&self, kind: ProviderKind) -> bool {
        match kind {
            ProviderKind::Azure => self.azure_enabled,
            ProviderKind::Aws => self.aws_enabled,
            ProviderKind::Gcp => self.gcp_enabled,
        }
    }

    pub fn enabled_providers(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|k| self.is_enabled(*k))
            .collect()
    }

    /// 检查必需字段，缺失时列出所有缺失项
    pub fn validate(&self, kind: ProviderKind) -> Result<()> {
        let required: Vec<(&str, &str)> = match kind {
            ProviderKind::Azure => vec![
                ("account", self.azure.account.as_str()),
                ("accessKey", self.azure.access_key.as_str()),
            ],
            ProviderKind::Aws => vec![
                ("accessKey", self.aws.access_key.as_str()),
                ("secretKey", self.aws.secret_key.as_str()),
                ("bucket", self.aws.bucket.as_str()),
            ],
            ProviderKind::Gcp => vec![
                ("privateKey", self.gcp.private_key.as_str()),
                ("clientEmail", self.gcp.client_email.as_str()),
                ("bucket", self.gcp.bucket.as_str()),
            ],
        };

        let missing: Vec<&str> = required
            .into_iter()
            .filter(|(_, value)| is_blank(value))
            .map(|(field, _)| field)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(crate::storage::missing(
                kind.display_name(),
                &missing.join(", "),
            ))
        }
    }

    /// 库名：显式配置优先，否则取库目录名
    pub fn vault_name(&self) -> String {
        self.vault_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .or_else(|| {
                self.vault_path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
            })
            .unwrap_or_else(|| "vault".to_string())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| self.vault_path.join(DATA_DIR_NAME))
    }

    /// 远程同步缓存文件
    pub fn cache_path(&self, kind: ProviderKind) -> PathBuf {
        self.data_dir()
            .join(format!("cloudsync-{}.json", kind.as_str()))
    }

    /// 本地哈希缓存文件
    pub fn local_cache_path(&self) -> PathBuf {
        self.data_dir().join("cloudsync-local.json")
    }
}

/// 默认配置文件位置
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join("cloudsync"))
        .unwrap_or_else(|| PathBuf::from(".cloudsync"))
        .join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("config.json")).unwrap();
        assert!(settings.enabled_providers().is_empty());
        assert_eq!(settings.auto_sync_delay, 0);
        assert!(settings.log.enabled);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ nope").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(SyncError::Serialization(_))
        ));
    }

    #[test]
    fn test_camel_case_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.json");

        let json = r#"{
            "vaultPath": "/data/My Notes",
            "awsEnabled": true,
            "aws": { "accessKey": "AK", "secretKey": "SK", "bucket": "b", "region": "" },
            "syncIgnore": "drafts, *.pdf",
            "autoSyncDelay": 5,
            "log": { "level": "debug" }
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.enabled_providers(), vec![ProviderKind::Aws]);
        assert_eq!(settings.vault_name(), "My Notes");
        assert_eq!(settings.log.level, "debug");
        assert_eq!(
            settings.cache_path(ProviderKind::Aws),
            PathBuf::from("/data/My Notes/.cloudsync/cloudsync-aws.json")
        );

        settings.save(&path).unwrap();
        let reloaded = Settings::load(&path).unwrap();
        assert_eq!(reloaded.aws.bucket, "b");
        assert_eq!(reloaded.auto_sync_delay, 5);
    }

    #[test]
    fn test_validate_lists_missing_fields() {
        let mut settings = Settings::default();
        settings.aws.access_key = "AK".into();
        settings.aws.bucket = "   ".into();

        let err = settings.validate(ProviderKind::Aws).unwrap_err();
        assert!(matches!(err, SyncError::Configuration { .. }));
        let message = err.to_string();
        assert!(message.contains("secretKey"));
        assert!(message.contains("bucket"));
        assert!(!message.contains("accessKey"));

        settings.gcp = GcpSettings {
            private_key: "k".into(),
            client_email: "e".into(),
            bucket: "b".into(),
            endpoint: None,
        };
        assert!(settings.validate(ProviderKind::Gcp).is_ok());
        assert!(settings.validate(ProviderKind::Azure).is_err());
    }

    #[test]
    fn test_debug_masks_secrets() {
        let mut settings = Settings::default();
        settings.aws.secret_key = "super-secret".into();
        settings.azure.access_key = "azure-secret".into();
        settings.gcp.private_key = "-----BEGIN KEY".into();

        let output = format!("{:?}", settings);
        assert!(!output.contains("super-secret"));
        assert!(!output.contains("azure-secret"));
        assert!(!output.contains("BEGIN KEY"));
        assert!(output.contains("****"));
    }

    #[test]
    fn test_explicit_vault_name_and_data_dir() {
        let settings = Settings {
            vault_path: PathBuf::from("/v/notes"),
            vault_name: Some("shared".into()),
            data_dir: Some(PathBuf::from("/var/cloudsync")),
            ..Default::default()
        };
        assert_eq!(settings.vault_name(), "shared");
        assert_eq!(settings.local_cache_path(), PathBuf::from("/var/cloudsync/cloudsync-local.json"));
    }
}
