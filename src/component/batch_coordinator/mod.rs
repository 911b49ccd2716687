//! 批次協調：反覆執行 {清理 → 探索 → 分派 → 彙整}，直到沒有工作或收到中斷信號

mod failure_log;
mod main;
mod statistics;

pub use failure_log::{FailureLog, format_failure_line, format_failure_lines};
pub use main::BatchCoordinator;
pub use statistics::{BatchStatistics, RoundSummary, print_round_summary};
