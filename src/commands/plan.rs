//! 差异分析命令（不执行同步）

use crate::core::{RuleSummary, SyncEngine};
use anyhow::Result;

pub async fn plan(engine: &SyncEngine) -> Result<bool> {
    let plans = engine.plan().await;
    if plans.is_empty() {
        println!("No remote is enabled; nothing to plan");
        return Ok(true);
    }

    let mut ok = true;
    for plan in &plans {
        if let Some(error) = &plan.error {
            println!("❌ {}: {}", plan.provider, error);
            ok = false;
            continue;
        }

        println!(
            "{}: {}",
            plan.provider,
            RuleSummary::from_scenarios(&plan.scenarios)
        );
        for scenario in &plan.scenarios {
            println!("  {:<16} {}", scenario.rule, scenario.name());
        }
    }
    Ok(ok)
}
