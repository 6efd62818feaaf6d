//! 三方比较：本地、远程与上次同步缓存
//!
//! 只根据哈希判断哪一端发生了变化，不做任何 IO。

use crate::core::cache::SyncCache;
use crate::storage::FileRecord;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// 同步规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncRule {
    /// 上传到远程
    LocalToRemote,
    /// 下载到本地
    RemoteToLocal,
    /// 两边都改了，合并后写回两边
    DiffMerge,
    /// 远程已删除，删除本地副本
    DeleteLocal,
    /// 本地已删除，删除远程副本
    DeleteRemote,
}

impl SyncRule {
    pub const ALL: [SyncRule; 5] = [
        SyncRule::LocalToRemote,
        SyncRule::RemoteToLocal,
        SyncRule::DiffMerge,
        SyncRule::DeleteLocal,
        SyncRule::DeleteRemote,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncRule::LocalToRemote => "LOCAL_TO_REMOTE",
            SyncRule::RemoteToLocal => "REMOTE_TO_LOCAL",
            SyncRule::DiffMerge => "DIFF_MERGE",
            SyncRule::DeleteLocal => "DELETE_LOCAL",
            SyncRule::DeleteRemote => "DELETE_REMOTE",
        }
    }
}

impl fmt::Display for SyncRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// 一个文件在本轮要执行的动作
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scenario {
    pub local: Option<FileRecord>,
    pub remote: Option<FileRecord>,
    pub rule: SyncRule,
}

impl Scenario {
    /// 规范文件名（优先取本地记录）
    pub fn name(&self) -> &str {
        self.local
            .as_ref()
            .or(self.remote.as_ref())
            .map(|f| f.name.as_str())
            .unwrap_or_default()
    }
}

/// 同步分析器
pub struct SyncAnalyzer;

impl SyncAnalyzer {
    /// 生成场景列表：先本地派生的，再远程派生的，各自保持列表顺序
    pub fn analyze(
        local_files: &[FileRecord],
        remote_files: &[FileRecord],
        cache: &SyncCache,
    ) -> Vec<Scenario> {
        let remote_map: HashMap<&str, &FileRecord> = remote_files
            .iter()
            .filter(|f| !f.is_dir)
            .map(|f| (f.name.as_str(), f))
            .collect();
        let local_names: HashSet<&str> = local_files
            .iter()
            .filter(|f| !f.is_dir)
            .map(|f| f.name.as_str())
            .collect();

        let mut scenarios = Vec::new();

        for local in local_files.iter().filter(|f| !f.is_dir) {
            match remote_map.get(local.name.as_str()) {
                None => {
                    let rule = if cache.contains(&local.name) {
                        SyncRule::DeleteLocal
                    } else {
                        SyncRule::LocalToRemote
                    };
                    scenarios.push(Scenario {
                        local: Some(local.clone()),
                        remote: None,
                        rule,
                    });
                }
                Some(remote) if remote.md5 != local.md5 => {
                    let cached = cache.md5(&local.name);
                    let rule = if cached == Some(remote.md5.as_str()) {
                        SyncRule::LocalToRemote
                    } else if cached == Some(local.md5.as_str()) {
                        SyncRule::RemoteToLocal
                    } else {
                        SyncRule::DiffMerge
                    };
                    scenarios.push(Scenario {
                        local: Some(local.clone()),
                        remote: Some((*remote).clone()),
                        rule,
                    });
                }
                Some(_) => {}
            }
        }

        for remote in remote_files.iter().filter(|f| !f.is_dir) {
            if local_names.contains(remote.name.as_str()) {
                continue;
            }
            let rule = if cache.contains(&remote.name) {
                SyncRule::DeleteRemote
            } else {
                SyncRule::RemoteToLocal
            };
            scenarios.push(Scenario {
                local: None,
                remote: Some(remote.clone()),
                rule,
            });
        }

        scenarios
    }
}

/// 按规则统计的场景数量
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSummary {
    pub local_to_remote: usize,
    pub remote_to_local: usize,
    pub diff_merge: usize,
    pub delete_local: usize,
    pub delete_remote: usize,
}

impl RuleSummary {
    pub fn from_scenarios(scenarios: &[Scenario]) -> Self {
        let mut summary = Self::default();
        for scenario in scenarios {
            match scenario.rule {
                SyncRule::LocalToRemote => summary.local_to_remote += 1,
                SyncRule::RemoteToLocal => summary.remote_to_local += 1,
                SyncRule::DiffMerge => summary.diff_merge += 1,
                SyncRule::DeleteLocal => summary.delete_local += 1,
                SyncRule::DeleteRemote => summary.delete_remote += 1,
            }
        }
        summary
    }

    pub fn count(&self, rule: SyncRule) -> usize {
        match rule {
            SyncRule::LocalToRemote => self.local_to_remote,
            SyncRule::RemoteToLocal => self.remote_to_local,
            SyncRule::DiffMerge => self.diff_merge,
            SyncRule::DeleteLocal => self.delete_local,
            SyncRule::DeleteRemote => self.delete_remote,
        }
    }

    pub fn total(&self) -> usize {
        self.local_to_remote
            + self.remote_to_local
            + self.diff_merge
            + self.delete_local
            + self.delete_remote
    }
}

impl fmt::Display for RuleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = SyncRule::ALL
            .iter()
            .filter(|rule| self.count(**rule) > 0)
            .map(|rule| format!("{}={}", rule, self.count(*rule)))
            .collect();
        if parts.is_empty() {
            f.write_str("nothing to do")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn file(name: &str, md5: &str) -> FileRecord {
        FileRecord::new(name, md5, 1, Utc::now())
    }

    /// 缓存里放入给定的 (name, md5)
    fn cache_with(entries: &[(&str, &str)]) -> (tempfile::TempDir, SyncCache) {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = SyncCache::new(dir.path().join("cloudsync-aws.json"));
        let files: Vec<FileRecord> = entries.iter().map(|(n, h)| file(n, h)).collect();
        cache.snapshot(&files).unwrap();
        (dir, cache)
    }

    fn rules(scenarios: &[Scenario]) -> Vec<(String, SyncRule)> {
        scenarios
            .iter()
            .map(|s| (s.name().to_string(), s.rule))
            .collect()
    }

    #[test]
    fn test_local_only_file() {
        let local = [file("a.md", "h1")];

        let (_d, empty) = cache_with(&[]);
        let scenarios = SyncAnalyzer::analyze(&local, &[], &empty);
        assert_eq!(rules(&scenarios), vec![("a.md".into(), SyncRule::LocalToRemote)]);
        assert!(scenarios[0].remote.is_none());

        let (_d, cached) = cache_with(&[("a.md", "h1")]);
        let scenarios = SyncAnalyzer::analyze(&local, &[], &cached);
        assert_eq!(rules(&scenarios), vec![("a.md".into(), SyncRule::DeleteLocal)]);
    }

    #[test]
    fn test_remote_only_file() {
        let remote = [file("a.md", "h1")];

        let (_d, empty) = cache_with(&[]);
        let scenarios = SyncAnalyzer::analyze(&[], &remote, &empty);
        assert_eq!(rules(&scenarios), vec![("a.md".into(), SyncRule::RemoteToLocal)]);
        assert!(scenarios[0].local.is_none());

        let (_d, cached) = cache_with(&[("a.md", "h1")]);
        let scenarios = SyncAnalyzer::analyze(&[], &remote, &cached);
        assert_eq!(rules(&scenarios), vec![("a.md".into(), SyncRule::DeleteRemote)]);
    }

    #[test]
    fn test_conflict_detection() {
        let local = [file("a.md", "h1")];
        let remote = [file("a.md", "h2")];

        let (_d, cache) = cache_with(&[("a.md", "h3")]);
        let scenarios = SyncAnalyzer::analyze(&local, &remote, &cache);
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].rule, SyncRule::DiffMerge);
        assert!(scenarios[0].local.is_some() && scenarios[0].remote.is_some());

        let (_d, empty) = cache_with(&[]);
        let scenarios = SyncAnalyzer::analyze(&local, &remote, &empty);
        assert_eq!(scenarios[0].rule, SyncRule::DiffMerge);
    }

    #[test]
    fn test_convergent_classification() {
        let local = [file("a.md", "h1")];
        let remote = [file("a.md", "h2")];

        let (_d, local_unchanged) = cache_with(&[("a.md", "h1")]);
        let scenarios = SyncAnalyzer::analyze(&local, &remote, &local_unchanged);
        assert_eq!(scenarios[0].rule, SyncRule::RemoteToLocal);

        let (_d, remote_unchanged) = cache_with(&[("a.md", "h2")]);
        let scenarios = SyncAnalyzer::analyze(&local, &remote, &remote_unchanged);
        assert_eq!(scenarios[0].rule, SyncRule::LocalToRemote);
    }

    #[test]
    fn test_equal_hashes_are_noop() {
        let local = [file("a.md", "h1"), file("b.md", "h2")];
        let remote = [file("b.md", "h2"), file("a.md", "h1")];

        for entries in [vec![], vec![("a.md", "zz")], vec![("a.md", "h1"), ("b.md", "h9")]] {
            let (_d, cache) = cache_with(&entries);
            assert!(SyncAnalyzer::analyze(&local, &remote, &cache).is_empty());
        }
    }

    #[test]
    fn test_output_order_and_idempotence() {
        let local = [file("z.md", "1"), file("m.md", "2"), file("a.md", "3")];
        let remote = [file("y.md", "4"), file("m.md", "5"), file("b.md", "6")];
        let (_d, cache) = cache_with(&[("m.md", "5"), ("b.md", "6")]);

        let first = SyncAnalyzer::analyze(&local, &remote, &cache);
        assert_eq!(
            rules(&first),
            vec![
                ("z.md".into(), SyncRule::LocalToRemote),
                ("m.md".into(), SyncRule::LocalToRemote),
                ("a.md".into(), SyncRule::LocalToRemote),
                ("y.md".into(), SyncRule::RemoteToLocal),
                ("b.md".into(), SyncRule::DeleteRemote),
            ]
        );

        let second = SyncAnalyzer::analyze(&local, &remote, &cache);
        assert_eq!(first, second);
    }

    #[test]
    fn test_directories_are_skipped() {
        let mut dir = file("notes", "");
        dir.is_dir = true;
        let (_d, cache) = cache_with(&[]);
        assert!(SyncAnalyzer::analyze(&[dir.clone()], &[dir], &cache).is_empty());
    }

    #[test]
    fn test_rule_summary() {
        let local = [file("a.md", "1"), file("b.md", "2")];
        let remote = [file("b.md", "3"), file("c.md", "4")];
        let (_d, cache) = cache_with(&[]);

        let summary = RuleSummary::from_scenarios(&SyncAnalyzer::analyze(&local, &remote, &cache));
        assert_eq!(summary.local_to_remote, 1);
        assert_eq!(summary.diff_merge, 1);
        assert_eq!(summary.remote_to_local, 1);
        assert_eq!(summary.total(), 3);
        assert_eq!(
            summary.to_string(),
            "LOCAL_TO_REMOTE=1, REMOTE_TO_LOCAL=1, DIFF_MERGE=1"
        );
        assert_eq!(RuleSummary::default().to_string(), "nothing to do");
    }
}
