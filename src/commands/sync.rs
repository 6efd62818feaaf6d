//! 同步命令：单轮同步与定时同步

use crate::core::{RemoteReport, RemoteStatus, SyncEngine};
use anyhow::{bail, Result};
use std::time::Duration;
use tracing::{info, warn};

fn print_report(report: &RemoteReport) {
    match report.status {
        RemoteStatus::Completed => {
            println!(
                "✅ {}: {} ({} ms)",
                report.provider, report.summary, report.duration_ms
            );
            if let Some(execution) = &report.execution {
                if execution.merged > 0 {
                    println!(
                        "   merged {} file(s), {} line(s) inserted",
                        execution.merged, execution.inserted_lines
                    );
                }
            }
        }
        RemoteStatus::Skipped if report.errors.is_empty() => {}
        RemoteStatus::Skipped => {
            for e in &report.errors {
                println!("⚠️  {} skipped: {}", report.provider, e);
            }
        }
        RemoteStatus::Failed => {
            for e in &report.errors {
                println!("❌ {} failed: {}", report.provider, e);
            }
        }
    }
}

/// 运行一轮同步，返回是否所有远程都没有失败
pub async fn sync(engine: &SyncEngine) -> Result<bool> {
    let reports = engine.run_round().await;

    if reports.iter().all(|r| r.status == RemoteStatus::Skipped && r.errors.is_empty()) {
        println!("No remote is enabled; nothing to do");
    }
    for report in &reports {
        print_report(report);
    }

    Ok(reports.iter().all(|r| r.status != RemoteStatus::Failed))
}

/// 按配置的间隔重复同步，Ctrl-C 在两轮之间退出
pub async fn watch(engine: &SyncEngine) -> Result<()> {
    let minutes = engine.settings().auto_sync_delay;
    if minutes == 0 {
        bail!("autoSyncDelay must be greater than 0 to use watch mode");
    }
    let interval = Duration::from_secs(minutes * 60);
    info!("定时同步已启动，间隔 {} 分钟", minutes);

    loop {
        if !sync(engine).await? {
            warn!("本轮同步有失败的远程，将在下一轮重试");
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("收到退出信号，停止定时同步");
                return Ok(());
            }
        }
    }
}
