//! 场景执行器
//!
//! 按分析器给出的顺序依次执行场景，遇到第一个错误立即停止且不更新缓存；
//! 全部成功后重新列出远程文件并以此重写缓存。

use crate::core::analyzer::{Scenario, SyncRule};
use crate::core::cache::SyncCache;
use crate::core::merge;
use crate::error::{Result, SyncError};
use crate::storage::{FileRecord, Storage};
use serde::Serialize;
use tracing::{debug, info, warn};

/// 执行报告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub uploaded: usize,
    pub downloaded: usize,
    pub deleted_local: usize,
    pub deleted_remote: usize,
    pub merged: usize,
    /// 合并时插入的行数合计
    pub inserted_lines: usize,
    /// 写入缓存的条目数
    pub cache_entries: usize,
}

pub struct SyncExecutor<'a> {
    local: &'a dyn Storage,
    remote: &'a dyn Storage,
    cache: &'a mut SyncCache,
}

impl<'a> SyncExecutor<'a> {
    pub fn new(local: &'a dyn Storage, remote: &'a dyn Storage, cache: &'a mut SyncCache) -> Self {
        Self {
            local,
            remote,
            cache,
        }
    }

    pub async fn execute(self, scenarios: &[Scenario]) -> Result<ExecutionReport> {
        let mut report = ExecutionReport::default();

        for scenario in scenarios {
            self.run(scenario, &mut report)
                .await
                .map_err(|e| SyncError::Scenario {
                    rule: scenario.rule,
                    name: scenario.name().to_string(),
                    source: Box::new(e),
                })?;
        }

        let listing = self.remote.list_files().await?;
        let cache = self.cache;
        cache.snapshot(&listing)?;
        report.cache_entries = cache.len();

        info!(
            "{} 同步完成: 上传 {}, 下载 {}, 删除本地 {}, 删除远程 {}, 合并 {}",
            self.remote.name(),
            report.uploaded,
            report.downloaded,
            report.deleted_local,
            report.deleted_remote,
            report.merged
        );
        Ok(report)
    }

    async fn run(&self, scenario: &Scenario, report: &mut ExecutionReport) -> Result<()> {
        debug!("{} {}", scenario.rule, scenario.name());

        match scenario.rule {
            SyncRule::LocalToRemote => {
                let file = side(scenario.local.as_ref(), scenario, "local")?;
                let data = self.local.read(file).await?;
                let target = scenario.remote.as_ref().unwrap_or(file);
                self.remote.write(target, data).await?;
                report.uploaded += 1;
            }
            SyncRule::RemoteToLocal => {
                let file = side(scenario.remote.as_ref(), scenario, "remote")?;
                let data = self.remote.read(file).await?;
                let target = self.local_target(scenario.local.as_ref(), file);
                self.local.write(&target, data).await?;
                report.downloaded += 1;
            }
            SyncRule::DeleteLocal => {
                let file = side(scenario.local.as_ref(), scenario, "local")?;
                if tolerate_missing(self.local.delete(file).await, self.local.name(), file)? {
                    report.deleted_local += 1;
                }
            }
            SyncRule::DeleteRemote => {
                let file = side(scenario.remote.as_ref(), scenario, "remote")?;
                if tolerate_missing(self.remote.delete(file).await, self.remote.name(), file)? {
                    report.deleted_remote += 1;
                }
            }
            SyncRule::DiffMerge => {
                let local = side(scenario.local.as_ref(), scenario, "local")?;
                let remote = side(scenario.remote.as_ref(), scenario, "remote")?;

                let (local_bytes, remote_bytes) =
                    tokio::try_join!(self.local.read(local), self.remote.read(remote))?;
                let outcome = merge::merge(&local.name, &local_bytes, &remote_bytes)?;

                tokio::try_join!(
                    self.local.write(local, outcome.bytes.clone()),
                    self.remote.write(remote, outcome.bytes)
                )?;
                report.merged += 1;
                report.inserted_lines += outcome.insertions;
            }
        }
        Ok(())
    }

    /// 下载目标：本地存储有根目录时按规范名重新拼出本地路径
    fn local_target(&self, existing: Option<&FileRecord>, remote: &FileRecord) -> FileRecord {
        let mut target = existing.cloned().unwrap_or_else(|| remote.clone());
        if let Some(base) = self.local.base_path() {
            target.local_name = base.join(&remote.name).to_string_lossy().to_string();
        }
        target
    }
}

fn side<'s>(
    file: Option<&'s FileRecord>,
    scenario: &Scenario,
    side: &'static str,
) -> Result<&'s FileRecord> {
    file.ok_or_else(|| SyncError::MissingRecord {
        rule: scenario.rule,
        name: scenario.name().to_string(),
        side,
    })
}

/// 删除不存在的文件视为已收敛；返回是否真的删除了
fn tolerate_missing(result: Result<()>, provider: &str, file: &FileRecord) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => {
            warn!("{} 上已不存在，跳过删除: {}", provider, file.name);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
