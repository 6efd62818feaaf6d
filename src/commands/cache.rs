//! 缓存相关命令

use crate::core::SyncEngine;
use anyhow::{Context, Result};

/// 清除所有远程的同步缓存；下一轮会把所有文件当作新文件处理
pub fn clear_cache(engine: &SyncEngine) -> Result<()> {
    let cleared = engine
        .clear_caches()
        .context("failed to clear sync caches")?;
    println!("Cleared {} cache file(s)", cleared);
    Ok(())
}
