//! 忽略规则：列出文件时排除的路径

use regex::Regex;
use tracing::{debug, warn};

/// 默认数据目录名（缓存、日志所在目录）
pub const DATA_DIR_NAME: &str = ".cloudsync";
/// 本地原子写入使用的临时文件后缀
pub const TEMP_SUFFIX: &str = ".cloudsync-tmp";

/// 默认排除项
const DEFAULT_IGNORES: &[&str] = &[
    DATA_DIR_NAME,
    ".git",
    ".gitignore",
    ".trash",
    ".hotreload",
    ".DS_Store",
    "*.cloudsync-tmp",
];

#[derive(Debug, Clone)]
enum Pattern {
    /// 路径、目录前缀或任意一段完全相同
    Literal(String),
    /// 含 * 或 ? 的通配符
    Glob(Regex),
}

/// 忽略规则集合
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    patterns: Vec<Pattern>,
    sources: Vec<String>,
}

impl IgnoreRules {
    /// 默认规则 + 用户逗号分隔的规则
    pub fn new(user_ignore: &str) -> Self {
        let mut sources: Vec<String> = DEFAULT_IGNORES.iter().map(|s| s.to_string()).collect();

        for item in user_ignore.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let item = item.replace('\\', "/").trim_matches('/').to_string();
            if !item.is_empty() && !sources.contains(&item) {
                sources.push(item);
            }
        }

        let patterns = sources
            .iter()
            .filter_map(|source| Self::compile(source))
            .collect();

        debug!("忽略规则: {:?}", sources);

        Self { patterns, sources }
    }

    /// 不含任何规则
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            sources: Vec::new(),
        }
    }

    fn compile(source: &str) -> Option<Pattern> {
        let lowered = source.to_lowercase();
        if !lowered.contains('*') && !lowered.contains('?') {
            return Some(Pattern::Literal(lowered));
        }

        let regex_pattern = regex::escape(&lowered)
            .replace(r"\*\*", ".*")
            .replace(r"\*", "[^/]*")
            .replace(r"\?", "[^/]");

        match Regex::new(&format!("^{}$", regex_pattern)) {
            Ok(re) => Some(Pattern::Glob(re)),
            Err(e) => {
                warn!("无效的忽略规则 '{}': {}", source, e);
                None
            }
        }
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// 检查规范化路径是否应该被排除
    pub fn is_ignored(&self, path: &str) -> bool {
        let path = path.to_lowercase();
        let basename = path.rsplit('/').next().unwrap_or(&path);

        self.patterns.iter().any(|pattern| match pattern {
            Pattern::Literal(lit) => {
                path == *lit
                    || path.starts_with(&format!("{}/", lit))
                    || (!lit.contains('/') && path.split('/').any(|seg| seg == lit))
            }
            Pattern::Glob(re) => re.is_match(&path) || re.is_match(basename),
        })
    }
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self::new("")
    }
}
