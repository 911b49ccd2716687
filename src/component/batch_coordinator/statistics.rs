use crate::component::scene_processor::{BatchOutcome, FailureKind};
use console::style;
use log::info;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// 一輪的彙整結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundSummary {
    pub discovered: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures_by_kind: HashMap<FailureKind, usize>,
    pub warnings: usize,
    pub unit_time: Duration,
    pub wall_time: Duration,
}

impl RoundSummary {
    #[must_use]
    pub fn timeouts(&self) -> usize {
        self.failures_by_kind
            .get(&FailureKind::Timeout)
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn average_unit_time(&self) -> Duration {
        u32::try_from(self.processed)
            .ok()
            .filter(|n| *n > 0)
            .map_or(Duration::ZERO, |n| self.unit_time / n)
    }

    /// 合併另一輪的結果（跨輪累計）
    pub fn merge(&mut self, other: &Self) {
        self.discovered += other.discovered;
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.warnings += other.warnings;
        self.unit_time += other.unit_time;
        self.wall_time += other.wall_time;
        for (kind, count) in &other.failures_by_kind {
            *self.failures_by_kind.entry(*kind).or_insert(0) += count;
        }
    }
}

/// 多個工作者同時回報結果的累加器；結果順序不影響彙整值
#[derive(Debug, Default)]
pub struct BatchStatistics {
    inner: Mutex<RoundSummary>,
}

impl BatchStatistics {
    #[must_use]
    pub fn new(discovered: usize) -> Self {
        Self {
            inner: Mutex::new(RoundSummary {
                discovered,
                ..RoundSummary::default()
            }),
        }
    }

    pub fn record(&self, outcome: &BatchOutcome) {
        let mut summary = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        summary.processed += 1;
        summary.unit_time += outcome.elapsed;
        summary.warnings += outcome.warnings.len();

        if outcome.is_success() {
            summary.succeeded += 1;
        } else if outcome.is_skipped() {
            summary.skipped += 1;
        } else if let Some(kind) = outcome.failure_kind() {
            summary.failed += 1;
            *summary.failures_by_kind.entry(kind).or_insert(0) += 1;
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> RoundSummary {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

pub fn print_round_summary(title: &str, summary: &RoundSummary) {
    println!();
    println!("{}", style(format!("=== {title} ===")).cyan().bold());
    println!("  探索: {} 個單元", summary.discovered);
    println!("  處理: {} 個", summary.processed);
    println!("  成功: {} 個", style(summary.succeeded).green());

    if summary.skipped > 0 {
        println!("  跳過: {} 個", style(summary.skipped).yellow());
    }

    if summary.failed > 0 {
        println!("  失敗: {} 個", style(summary.failed).red());
        let mut kinds: Vec<_> = summary.failures_by_kind.iter().collect();
        kinds.sort_by_key(|(kind, _)| kind.to_string());
        for (kind, count) in kinds {
            println!("    {kind}: {count}");
        }
    }

    if summary.warnings > 0 {
        println!("  警告: {} 則", style(summary.warnings).yellow());
    }

    println!(
        "  平均每單元: {:.1}s，總耗時: {:.1}s",
        summary.average_unit_time().as_secs_f64(),
        summary.wall_time.as_secs_f64()
    );

    info!(
        "{title} - 成功: {}, 跳過: {}, 失敗: {} (逾時 {})",
        summary.succeeded,
        summary.skipped,
        summary.failed,
        summary.timeouts()
    );
}
