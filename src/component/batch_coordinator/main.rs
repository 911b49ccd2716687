use super::failure_log::FailureLog;
use super::statistics::{BatchStatistics, RoundSummary, print_round_summary};
use crate::catalog::{Catalog, Unit};
use crate::component::claim_manager::ClaimStore;
use crate::component::scene_processor::{BatchOutcome, SceneProcessor};
use crate::component::work_discovery::WorkDiscovery;
use crate::config::Config;
use crate::tools::{CapabilityRecord, ToolRunner, sweep_temp_root};
use anyhow::{Context, Result};
use console::style;
use crossbeam_channel::Receiver;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// 等待下一輪時檢查中斷信號的間隔
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

pub struct BatchCoordinator {
    config: Arc<Config>,
    claims: Arc<dyn ClaimStore>,
    discovery: WorkDiscovery,
    processor: SceneProcessor,
    failure_log: FailureLog,
    shutdown: Arc<AtomicBool>,
    show_progress: bool,
}

impl BatchCoordinator {
    /// 能力紀錄在這之前已偵測完成，之後只會被傳遞，不會重新偵測
    pub fn new(
        config: Arc<Config>,
        catalog: Arc<dyn Catalog>,
        claims: Arc<dyn ClaimStore>,
        runner: Arc<dyn ToolRunner>,
        capability: &CapabilityRecord,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        let discovery = WorkDiscovery::new(Arc::clone(&catalog), &config)?;
        let processor = SceneProcessor::new(
            Arc::clone(&config),
            catalog,
            Arc::clone(&claims),
            runner,
            capability,
        );
        let failure_log = FailureLog::new(&config.output.failure_log);

        Ok(Self {
            config,
            claims,
            discovery,
            processor,
            failure_log,
            shutdown,
            show_progress: false,
        })
    }

    #[must_use]
    pub const fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// 持續執行直到沒有工作、單輪模式結束或收到中斷信號，回傳所有輪次的累計結果
    pub fn run(&self) -> Result<RoundSummary> {
        let mut total = RoundSummary::default();
        let mut round = 0usize;

        let result = loop {
            if self.is_shutdown() {
                warn!("收到中斷信號，不再開始新的一輪");
                break Ok(());
            }

            round += 1;
            println!("\n{}", style(format!("--- 第 {round} 輪 ---")).cyan());

            match self.run_round() {
                Ok(summary) => {
                    total.merge(&summary);
                    if summary.discovered == 0 {
                        info!("沒有待處理的單元，結束");
                        break Ok(());
                    }
                }
                Err(e) if self.config.batch.once => break Err(e),
                Err(e) => error!("第 {round} 輪失敗: {e:#}"),
            }

            // 重試模式只跑一輪，否則再次失敗的單元會被不斷重試
            if self.config.batch.once || self.config.retry_errors {
                break Ok(());
            }
            self.wait_between_rounds();
        };

        if let Err(e) = sweep_temp_root(&self.config.output.temp_root) {
            warn!("結束時清理暫存目錄失敗: {e:#}");
        }
        if round > 1 {
            print_round_summary("累計摘要", &total);
        }

        result.map(|()| total)
    }

    /// 執行一輪：清理暫存 → 探索 → 平行處理 → 彙整
    pub fn run_round(&self) -> Result<RoundSummary> {
        let started = Instant::now();

        let swept = sweep_temp_root(&self.config.output.temp_root)
            .context("無法清理暫存目錄")?;
        if swept > 0 {
            info!("已清除 {swept} 個上次遺留的暫存目錄");
        }

        let units = self.discovery.discover().context("無法查詢待處理單元")?;
        if units.is_empty() {
            return Ok(RoundSummary {
                wall_time: started.elapsed(),
                ..RoundSummary::default()
            });
        }

        if self.config.retry_errors {
            for unit in &units {
                if let Err(e) = self.claims.clear_errors(&unit.id) {
                    warn!("unit {}: 無法清除錯誤標籤: {e}", unit.id);
                }
            }
        }

        let stats = self.execute_units(units);
        let mut summary = stats.snapshot();
        summary.wall_time = started.elapsed();
        print_round_summary("本輪摘要", &summary);

        Ok(summary)
    }

    /// 以有界工作者池處理單元
    ///
    /// 工作者從同一個通道取出單元；收到中斷信號後不再取出新單元，
    /// 執行中的單元會處理完畢。
    pub fn execute_units(&self, units: Vec<Unit>) -> BatchStatistics {
        let stats = BatchStatistics::new(units.len());
        let width = self.config.batch.max_workers.clamp(1, units.len().max(1));
        let progress = self.progress_bar(units.len());

        let (sender, receiver) = crossbeam_channel::unbounded();
        for unit in units {
            // 接收端在此之前不會被丟棄
            let _ = sender.send(unit);
        }
        drop(sender);

        debug!("啟動 {width} 個工作者");
        thread::scope(|scope| {
            for _ in 0..width {
                let receiver = receiver.clone();
                let stats = &stats;
                let progress = progress.as_ref();
                scope.spawn(move || self.worker_loop(&receiver, stats, progress));
            }
        });

        if let Some(progress) = progress {
            if self.is_shutdown() {
                progress.abandon_with_message("已中斷");
            } else {
                progress.finish_with_message("完成");
            }
        }

        stats
    }

    fn worker_loop(
        &self,
        receiver: &Receiver<Unit>,
        stats: &BatchStatistics,
        progress: Option<&ProgressBar>,
    ) {
        while !self.is_shutdown() {
            let Ok(unit) = receiver.recv() else {
                break;
            };

            if let Some(progress) = progress {
                progress.set_message(unit.display_name());
            }
            let outcome = self.processor.process(&unit);
            self.report(&outcome, stats);
            if let Some(progress) = progress {
                progress.inc(1);
            }
        }
    }

    fn report(&self, outcome: &BatchOutcome, stats: &BatchStatistics) {
        stats.record(outcome);

        for warning in &outcome.warnings {
            warn!("unit {}: {warning}", outcome.unit_id);
        }

        match outcome.failure() {
            Some(failure) => error!(
                "unit {} 失敗 [{}] {}: {}",
                outcome.unit_id, failure.kind, failure.phase, failure.message
            ),
            None if outcome.is_skipped() => debug!("unit {} 跳過", outcome.unit_id),
            None => info!(
                "unit {} 完成 ({:.1}s)",
                outcome.unit_id,
                outcome.elapsed.as_secs_f64()
            ),
        }

        if let Err(e) = self.failure_log.append(outcome) {
            error!(
                "無法寫入失敗紀錄 {}: {e}",
                self.failure_log.path().display()
            );
        }
    }

    /// 逐頁移除所有錯誤標籤，回傳處理的單元數量
    pub fn clear_all_error_tags(&self) -> Result<usize> {
        let mut cleared = 0;
        loop {
            if self.is_shutdown() {
                break;
            }

            let page = self
                .discovery
                .error_tagged_page()
                .context("無法查詢帶有錯誤標籤的單元")?;
            if page.units.is_empty() {
                break;
            }

            let mut progressed = false;
            for unit in &page.units {
                match self.claims.clear_errors(&unit.id) {
                    Ok(()) => {
                        cleared += 1;
                        progressed = true;
                    }
                    Err(e) => warn!("unit {}: 無法清除錯誤標籤: {e}", unit.id),
                }
            }

            // 模擬模式或全部失敗時目錄不會改變，繼續查詢只會得到同一頁
            if !progressed || self.config.dry_run {
                break;
            }
        }

        info!("已清除 {cleared} 個單元的錯誤標籤");
        Ok(cleared)
    }

    fn progress_bar(&self, len: usize) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }

        let progress_bar = ProgressBar::new(len as u64);
        if let Ok(progress_style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        {
            progress_bar.set_style(progress_style.progress_chars("#>-"));
        }
        Some(progress_bar)
    }

    fn wait_between_rounds(&self) {
        let delay = self.config.batch.round_delay();
        debug!("等待 {:.1}s 後開始下一輪", delay.as_secs_f64());

        let deadline = Instant::now() + delay;
        while !self.is_shutdown() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(SHUTDOWN_POLL.min(deadline - now));
        }
    }
}
