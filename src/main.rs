use anyhow::{Context, Result};
use clap::Parser;
use console::{Term, style};
use log::{error, info};
use scene_derivatives::catalog::{Catalog, StashClient};
use scene_derivatives::component::{
    BatchCoordinator, CatalogClaims, ClaimStore, run_health_check,
};
use scene_derivatives::config::{AccelerationMode, Config};
use scene_derivatives::init;
use scene_derivatives::signal::setup_shutdown_signal;
use scene_derivatives::tools::{SystemRunner, ToolRunner, resolve};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// 分散式影片衍生檔產生工作者
#[derive(Debug, Parser)]
#[command(name = "scene-derivatives", version, about)]
struct Cli {
    /// 設定檔路徑（預設為目前目錄的 settings.json）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 產生馬賽克預覽圖與 WebVTT 索引
    #[arg(long)]
    generate_mosaic: bool,

    /// 產生預覽短片
    #[arg(long)]
    generate_preview: bool,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    max_workers: Option<usize>,

    /// 只記錄將執行的動作，不修改目錄也不呼叫外部工具
    #[arg(long)]
    dry_run: bool,

    #[arg(short, long)]
    verbose: bool,

    #[arg(long)]
    debug: bool,

    /// 只執行一輪
    #[arg(long)]
    once: bool,

    #[arg(long, value_enum)]
    acceleration: Option<AccelerationMode>,

    /// 檔名過濾條件，例如 'Foo*'
    #[arg(long)]
    filemask: Option<String>,

    /// 只執行健康檢查
    #[arg(long)]
    health_check: bool,

    /// 重新處理帶有錯誤標籤的單元
    #[arg(long)]
    retry_errors: bool,

    /// 移除所有錯誤標籤後結束
    #[arg(long)]
    clear_error_tags: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if self.generate_mosaic {
            config.generation.mosaic = true;
        }
        if self.generate_preview {
            config.generation.preview = true;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch.batch_size = batch_size.max(1);
        }
        if let Some(max_workers) = self.max_workers {
            config.batch.max_workers = max_workers.max(1);
        }
        if let Some(mode) = self.acceleration {
            config.acceleration.mode = mode;
        }
        if self.filemask.is_some() {
            config.filemask.clone_from(&self.filemask);
        }
        config.dry_run |= self.dry_run;
        config.batch.once |= self.once;
        config.retry_errors |= self.retry_errors;
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init::init_logger(init::log_level(cli.verbose, cli.debug));

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("{} {e:#}", style("錯誤:").red().bold());
            ExitCode::FAILURE
        }
    };

    let _ = Term::stdout().show_cursor();
    code
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let shutdown = setup_shutdown_signal()?;

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    let config = Arc::new(config);

    let runner: Arc<dyn ToolRunner> = Arc::new(SystemRunner);
    let catalog: Arc<dyn Catalog> =
        Arc::new(StashClient::new(&config.catalog).context("無法建立目錄客戶端")?);

    // 每次執行只偵測一次
    let capability = resolve(runner.as_ref(), &config.tools.vainfo, &config.acceleration);
    println!(
        "{} {} (mode: {})",
        style("硬體加速:").bold(),
        style(&capability).cyan(),
        config.acceleration.mode
    );
    if cli.verbose || cli.debug {
        println!(
            "{} {} 工作者 x {} 子工作 = 最多 {} 個同時執行的外部程序",
            style("資源壓力:").bold(),
            config.batch.max_workers,
            config.batch.inner_workers,
            config.resource_pressure()
        );
    }

    if cli.health_check {
        let report = run_health_check(&config, catalog.as_ref(), runner.as_ref(), &capability);
        report.print();
        return Ok(if report.is_healthy() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let claims: Arc<dyn ClaimStore> = Arc::new(CatalogClaims::new(
        Arc::clone(&catalog),
        config.tags.clone(),
        &config.catalog,
        config.dry_run,
    ));
    let coordinator = BatchCoordinator::new(
        Arc::clone(&config),
        Arc::clone(&catalog),
        claims,
        Arc::clone(&runner),
        &capability,
        shutdown,
    )?
    .with_progress(cli.verbose);

    if cli.clear_error_tags {
        let cleared = coordinator.clear_all_error_tags()?;
        println!("{} {cleared}", style("已清除錯誤標籤的單元:").green());
        return Ok(ExitCode::SUCCESS);
    }

    if config.dry_run {
        info!("模擬模式：不修改目錄、不呼叫外部工具");
    } else {
        let report = run_health_check(&config, catalog.as_ref(), runner.as_ref(), &capability);
        if !report.is_healthy() {
            report.print();
            report.ensure_healthy()?;
        }
    }

    coordinator.run()?;
    Ok(ExitCode::SUCCESS)
}
