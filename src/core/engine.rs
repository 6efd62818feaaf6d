use crate::config::Settings;
use crate::core::analyzer::{RuleSummary, Scenario, SyncAnalyzer};
use crate::core::cache::SyncCache;
use crate::core::executor::{ExecutionReport, SyncExecutor};
use crate::core::scanner::IgnoreRules;
use crate::error::{Result, SyncError};
use crate::storage::{
    create_remote, ConnectivityReport, ContainerStatus, FileRecord, LocalStorage, ProviderKind,
    Storage,
};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// 单个远程本轮的结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RemoteStatus {
    Completed,
    /// 未启用或配置不完整
    Skipped,
    Failed,
}

/// 单个远程的同步报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteReport {
    pub provider: ProviderKind,
    pub status: RemoteStatus,
    pub summary: RuleSummary,
    pub execution: Option<ExecutionReport>,
    pub duration_ms: u64,
    pub errors: Vec<String>,
}

impl RemoteReport {
    fn new(provider: ProviderKind, status: RemoteStatus) -> Self {
        Self {
            provider,
            status,
            summary: RuleSummary::default(),
            execution: None,
            duration_ms: 0,
            errors: Vec::new(),
        }
    }

    fn failed(provider: ProviderKind, error: &SyncError) -> Self {
        let mut report = Self::new(provider, RemoteStatus::Failed);
        report.errors.push(error.to_string());
        report
    }
}

/// 一次完整同步（分析 + 执行）的结果
#[derive(Debug, Clone)]
pub struct PassOutcome {
    pub summary: RuleSummary,
    pub execution: ExecutionReport,
}

/// 分析结果（不执行）
#[derive(Debug, Clone)]
pub struct PlanReport {
    pub provider: ProviderKind,
    pub scenarios: Vec<Scenario>,
    pub error: Option<String>,
}

/// 对一对存储执行一次同步：并发列出两端，分析，执行
pub async fn sync_pair(
    local: &dyn Storage,
    remote: &dyn Storage,
    cache: &mut SyncCache,
) -> Result<PassOutcome> {
    cache.load();

    let (local_files, remote_files) = list_both(local, remote).await?;
    let scenarios = SyncAnalyzer::analyze(&local_files, &remote_files, cache);
    let summary = RuleSummary::from_scenarios(&scenarios);
    info!("{}: {}", remote.name(), summary);

    let execution = SyncExecutor::new(local, remote, cache)
        .execute(&scenarios)
        .await?;

    Ok(PassOutcome { summary, execution })
}

/// 只做分析，不写任何东西
pub async fn plan_pair(
    local: &dyn Storage,
    remote: &dyn Storage,
    cache: &mut SyncCache,
) -> Result<Vec<Scenario>> {
    cache.load();
    let (local_files, remote_files) = list_both(local, remote).await?;
    Ok(SyncAnalyzer::analyze(&local_files, &remote_files, cache))
}

/// 先认证远程再同步；认证失败时不列出也不改动任何一端
async fn pass_report(
    kind: ProviderKind,
    local: &dyn Storage,
    remote: &dyn Storage,
    cache: &mut SyncCache,
) -> RemoteReport {
    if let Err(e) = remote.authenticate().await {
        error!("{} 认证失败: {}", kind, e);
        return RemoteReport::failed(kind, &e);
    }

    match sync_pair(local, remote, cache).await {
        Ok(outcome) => {
            let mut report = RemoteReport::new(kind, RemoteStatus::Completed);
            report.summary = outcome.summary;
            report.execution = Some(outcome.execution);
            report
        }
        Err(e) => {
            error!("{} 同步失败: {}", kind, e);
            RemoteReport::failed(kind, &e)
        }
    }
}

async fn list_both(
    local: &dyn Storage,
    remote: &dyn Storage,
) -> Result<(Vec<FileRecord>, Vec<FileRecord>)> {
    let (local_files, remote_files) = tokio::try_join!(local.list_files(), remote.list_files())?;
    debug!(
        "本地 {} 个文件, {} 上 {} 个文件",
        local_files.len(),
        remote.name(),
        remote_files.len()
    );
    Ok((local_files, remote_files))
}

/// 同步引擎
pub struct SyncEngine {
    settings: Settings,
    vault_name: String,
    ignore: IgnoreRules,
    local: LocalStorage,
}

impl SyncEngine {
    pub fn new(settings: Settings) -> Result<Self> {
        let ignore = IgnoreRules::new(&settings.sync_ignore);
        let local = LocalStorage::new(&settings.vault_path, ignore.clone())?
            .with_hash_cache(settings.local_cache_path());
        let vault_name = settings.vault_name();

        Ok(Self {
            settings,
            vault_name,
            ignore,
            local,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn local(&self) -> &LocalStorage {
        &self.local
    }

    /// 运行一轮：检查本地，然后依次同步每个远程。单个远程失败不影响其他远程
    pub async fn run_round(&self) -> Vec<RemoteReport> {
        info!("开始同步: {:?}", self.settings.vault_path);

        // 写探测文件，只读的库在动手之前就失败
        let check = self.local.test_connectivity().await;
        if !check.success {
            let e = SyncError::connectivity("Local", check.message);
            error!("本地库不可用: {}", e);
            return self
                .settings
                .enabled_providers()
                .into_iter()
                .map(|kind| RemoteReport::failed(kind, &e))
                .collect();
        }

        let mut reports = Vec::new();
        for kind in ProviderKind::ALL {
            reports.push(self.run_pass(kind).await);
        }
        reports
    }

    /// 对一个远程执行一次同步
    pub async fn run_pass(&self, kind: ProviderKind) -> RemoteReport {
        if !self.settings.is_enabled(kind) {
            return RemoteReport::new(kind, RemoteStatus::Skipped);
        }

        let start = Instant::now();
        let remote = match create_remote(kind, &self.settings, &self.vault_name, self.ignore.clone()).await {
            Ok(r) => r,
            Err(e @ SyncError::Configuration { .. }) => {
                warn!("{} 配置无效，跳过: {}", kind, e);
                let mut report = RemoteReport::new(kind, RemoteStatus::Skipped);
                report.errors.push(e.to_string());
                return report;
            }
            Err(e) => {
                error!("{} 创建失败: {}", kind, e);
                return RemoteReport::failed(kind, &e);
            }
        };

        let mut cache = SyncCache::new(self.settings.cache_path(kind));

        match remote.ensure_container().await {
            Ok(ContainerStatus::Exists) => {}
            Ok(ContainerStatus::Created) => {
                // 新容器是空的，旧缓存会把本地文件误判为远程已删除
                info!("{} 容器为新建，清除同步缓存", kind);
                if let Err(e) = cache.clear() {
                    return RemoteReport::failed(kind, &e);
                }
            }
            Err(e) => {
                error!("{} 容器检查失败: {}", kind, e);
                return RemoteReport::failed(kind, &e);
            }
        }

        let mut report = pass_report(kind, &self.local, &remote, &mut cache).await;
        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }

    /// 对每个启用的远程做分析
    pub async fn plan(&self) -> Vec<PlanReport> {
        let mut plans = Vec::new();
        for kind in self.settings.enabled_providers() {
            let result = async {
                let remote =
                    create_remote(kind, &self.settings, &self.vault_name, self.ignore.clone()).await?;
                remote.authenticate().await?;
                let mut cache = SyncCache::new(self.settings.cache_path(kind));
                plan_pair(&self.local, &remote, &mut cache).await
            }
            .await;

            plans.push(match result {
                Ok(scenarios) => PlanReport {
                    provider: kind,
                    scenarios,
                    error: None,
                },
                Err(e) => PlanReport {
                    provider: kind,
                    scenarios: Vec::new(),
                    error: Some(e.to_string()),
                },
            });
        }
        plans
    }

    /// 测试本地和每个启用的远程
    pub async fn test_connectivity(&self) -> Vec<(String, ConnectivityReport)> {
        let mut results = vec![(
            "Local".to_string(),
            self.local.test_connectivity().await,
        )];

        for kind in self.settings.enabled_providers() {
            let report =
                match create_remote(kind, &self.settings, &self.vault_name, self.ignore.clone()).await {
                    Ok(remote) => remote.test_connectivity().await,
                    Err(e) => ConnectivityReport::failed(e.to_string()),
                };
            results.push((kind.to_string(), report));
        }
        results
    }

    /// 删除所有远程的同步缓存文件，返回删除的数量
    pub fn clear_caches(&self) -> Result<usize> {
        let mut cleared = 0;
        for kind in ProviderKind::ALL {
            let path = self.settings.cache_path(kind);
            if path.exists() {
                SyncCache::new(&path).clear()?;
                info!("已清除缓存: {:?}", path);
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// 拒绝凭证的远程，记录是否被列出过
    #[derive(Default)]
    struct RejectingRemote {
        listed: AtomicBool,
    }

    #[async_trait]
    impl Storage for RejectingRemote {
        async fn list_files(&self) -> Result<Vec<FileRecord>> {
            self.listed.store(true, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn read(&self, file: &FileRecord) -> Result<Vec<u8>> {
            Err(SyncError::io(
                file.remote_key(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "empty"),
            ))
        }

        async fn write(&self, _file: &FileRecord, _data: Vec<u8>) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, _file: &FileRecord) -> Result<()> {
            Ok(())
        }

        async fn authenticate(&self) -> Result<()> {
            Err(SyncError::authentication("S3", "invalid access key"))
        }

        async fn test_connectivity(&self) -> ConnectivityReport {
            ConnectivityReport::failed("invalid access key")
        }

        fn name(&self) -> &str {
            "rejecting"
        }
    }

    fn settings(vault: PathBuf) -> Settings {
        Settings {
            vault_path: vault,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_disabled_remotes_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SyncEngine::new(settings(dir.path().to_path_buf())).unwrap();

        let reports = engine.run_round().await;
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.status == RemoteStatus::Skipped));
        assert!(engine.plan().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_is_skipped_with_message() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path().to_path_buf());
        s.aws_enabled = true;
        s.aws.bucket = "bucket".into();
        let engine = SyncEngine::new(s).unwrap();

        let report = engine.run_pass(ProviderKind::Aws).await;
        assert_eq!(report.status, RemoteStatus::Skipped);
        assert!(report.errors[0].contains("accessKey"));

        let results = engine.test_connectivity().await;
        assert!(results[0].1.success);
        assert_eq!(results[1].0, "S3");
        assert!(!results[1].1.success);
    }

    #[tokio::test]
    async fn test_rejected_credentials_fail_before_listing() {
        let dir = tempfile::tempdir().unwrap();
        let vault = dir.path().join("vault");
        std::fs::create_dir_all(&vault).unwrap();
        std::fs::write(vault.join("a.md"), "a").unwrap();

        let local = LocalStorage::new(&vault, IgnoreRules::default()).unwrap();
        let remote = RejectingRemote::default();
        let cache_path = dir.path().join("cloudsync-aws.json");
        let mut cache = SyncCache::new(&cache_path);

        let report = pass_report(ProviderKind::Aws, &local, &remote, &mut cache).await;
        assert_eq!(report.status, RemoteStatus::Failed);
        assert!(report.errors[0].contains("authentication failed"));
        assert!(report.execution.is_none());
        assert!(!remote.listed.load(Ordering::SeqCst));
        assert!(!cache_path.exists());
    }

    #[tokio::test]
    async fn test_unusable_vault_fails_enabled_remotes() {
        let dir = tempfile::tempdir().unwrap();
        let vault = dir.path().join("vault.md");
        std::fs::write(&vault, "not a directory").unwrap();

        let mut s = settings(vault);
        s.data_dir = Some(dir.path().join("data"));
        s.aws_enabled = true;
        let engine = SyncEngine::new(s).unwrap();

        let reports = engine.run_round().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].provider, ProviderKind::Aws);
        assert_eq!(reports[0].status, RemoteStatus::Failed);
        assert!(reports[0].errors[0].contains("Local"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_only_vault_fails_the_round() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let vault = dir.path().join("vault");
        std::fs::create_dir_all(&vault).unwrap();

        let mut s = settings(vault.clone());
        s.data_dir = Some(dir.path().join("data"));
        s.gcp_enabled = true;
        let engine = SyncEngine::new(s).unwrap();

        std::fs::set_permissions(&vault, std::fs::Permissions::from_mode(0o555)).unwrap();
        let writable = std::fs::write(vault.join("w"), "w").is_ok();
        let reports = engine.run_round().await;
        std::fs::set_permissions(&vault, std::fs::Permissions::from_mode(0o755)).unwrap();
        if writable {
            // root 不受目录权限限制
            return;
        }

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, RemoteStatus::Failed);
        assert!(reports[0].errors[0].contains("Cannot write"));
    }

    #[test]
    fn test_clear_caches() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path().to_path_buf());
        let path = s.cache_path(ProviderKind::Gcp);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{}").unwrap();

        let engine = SyncEngine::new(s).unwrap();
        assert_eq!(engine.clear_caches().unwrap(), 1);
        assert!(!path.exists());
        assert_eq!(engine.clear_caches().unwrap(), 0);
    }
}
