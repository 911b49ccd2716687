//! 啟動前檢查：任何一項失敗都拒絕開始處理

mod main;

pub use main::{CheckResult, HealthReport, run_health_check};
