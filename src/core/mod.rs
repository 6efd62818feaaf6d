pub mod analyzer;
pub mod cache;
pub mod engine;
pub mod executor;
pub mod merge;
pub mod scanner;

pub use analyzer::{RuleSummary, Scenario, SyncAnalyzer, SyncRule};
pub use cache::{CacheEntry, SyncCache};
pub use engine::{plan_pair, sync_pair, PassOutcome, PlanReport, RemoteReport, RemoteStatus, SyncEngine};
pub use executor::{ExecutionReport, SyncExecutor};
pub use merge::{merge, MergeOutcome};
pub use scanner::IgnoreRules;
