use super::outcome::{BatchOutcome, Failure, FailureKind, Phase, UnitStatus};
use crate::catalog::{Catalog, Unit, UnitFile};
use crate::component::claim_manager::{ClaimGuard, ClaimStore, ErrorTag};
use crate::component::derivative::GenerationError;
use crate::component::mosaic_generator::MosaicGenerator;
use crate::component::preview_generator::{PreviewGenerator, PreviewSettings};
use crate::config::Config;
use crate::tools::{
    ArtifactPaths, CancelToken, CapabilityRecord, ToolRunner, Workspace, artifact_key,
    compute_fingerprint, cover_frame_invocation,
};
use log::{debug, error, info, warn};
use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// 封面擷取時間點，第一個沒有產生檔案時改用下一個
const COVER_OFFSETS: [&str; 2] = ["30", "5"];

/// 單元處理器，所有工作者共用同一個實例
pub struct SceneProcessor {
    config: Arc<Config>,
    catalog: Arc<dyn Catalog>,
    claims: Arc<dyn ClaimStore>,
    runner: Arc<dyn ToolRunner>,
    mosaic: Option<MosaicGenerator>,
    preview: Option<PreviewGenerator>,
}

/// 一次處理過程中在各步驟間傳遞的狀態
struct UnitRun<'a> {
    unit: &'a Unit,
    file: &'a UnitFile,
    video: &'a Path,
    paths: &'a ArtifactPaths,
    cancel: CancelToken,
    warnings: Vec<String>,
    cover_failure: Option<Failure>,
}

/// 不影響單元狀態、但需要回報的問題
#[derive(Default)]
struct Notes {
    warnings: Vec<String>,
    cover_failure: Option<Failure>,
}

impl SceneProcessor {
    /// 依設定建立啟用中的產生器，兩者都使用同一份能力紀錄
    pub fn new(
        config: Arc<Config>,
        catalog: Arc<dyn Catalog>,
        claims: Arc<dyn ClaimStore>,
        runner: Arc<dyn ToolRunner>,
        capability: &CapabilityRecord,
    ) -> Self {
        let inner = config.batch.inner_workers;
        let mosaic = config.generation.mosaic.then(|| {
            MosaicGenerator::new(
                Arc::clone(&runner),
                &config.tools,
                capability.clone(),
                inner,
            )
        });
        let preview = config.generation.preview.then(|| {
            PreviewGenerator::new(
                Arc::clone(&runner),
                &config.tools,
                capability.clone(),
                inner,
                PreviewSettings::from(&config.generation),
            )
        });

        Self {
            config,
            catalog,
            claims,
            runner,
            mosaic,
            preview,
        }
    }

    /// 處理單一單元；不會 panic，也不會回傳錯誤
    pub fn process(&self, unit: &Unit) -> BatchOutcome {
        let started = Instant::now();
        let file = unit
            .primary_file()
            .map(|f| self.config.translate_path(&f.path).display().to_string())
            .unwrap_or_default();
        let mut notes = Notes::default();

        let status = panic::catch_unwind(AssertUnwindSafe(|| self.run(unit, &mut notes)))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                error!("unit {}: 內部錯誤: {message}", unit.id);
                UnitStatus::Failed(Failure::new(FailureKind::Internal, Phase::Setup, message))
            });

        BatchOutcome {
            unit_id: unit.id.clone(),
            file,
            status,
            elapsed: started.elapsed(),
            warnings: notes.warnings,
            cover_failure: notes.cover_failure,
        }
    }

    fn run(&self, unit: &Unit, notes: &mut Notes) -> UnitStatus {
        let Some(file) = unit.primary_file() else {
            return self.missing_file(unit, "單元沒有任何檔案".to_string());
        };

        // 檔案檢查
        let video = self.config.translate_path(&file.path);
        if !video.is_file() {
            return self.missing_file(unit, format!("找不到檔案: {}", video.display()));
        }

        let paths = ArtifactPaths::new(
            &artifact_key(file),
            &self.config.output.mosaic_dir,
            &self.config.output.preview_dir,
        );

        // 已完成的單元不做任何修改；帶錯誤標籤的單元（重試模式）一律重跑，封面可能仍待補
        if unit.phash().is_some() && !self.has_error_tag(unit) && !self.derivatives_pending(&paths) {
            debug!("unit {}: 已有指紋且無待產生衍生檔，跳過", unit.id);
            return UnitStatus::Skipped;
        }

        // 認領
        let mut guard = match ClaimGuard::acquire(self.claims.as_ref(), &unit.id) {
            Ok(guard) => guard,
            Err(e) => {
                warn!("unit {}: 認領失敗: {e}", unit.id);
                return UnitStatus::Failed(Failure::new(
                    FailureKind::Claim,
                    Phase::Claim,
                    e.to_string(),
                ));
            }
        };

        // 探索結果可能已過期，認領後重新讀取單元狀態
        let fresh = match self.catalog.find_unit(&unit.id) {
            Ok(found) => found,
            Err(e) => {
                debug!("unit {}: 無法重新讀取狀態，沿用探索結果: {e}", unit.id);
                None
            }
        };
        let current = fresh.as_ref().unwrap_or(unit);

        let mut run = UnitRun {
            unit: current,
            file,
            video: &video,
            paths: &paths,
            cancel: CancelToken::with_timeout(self.config.batch.unit_timeout()),
            warnings: Vec::new(),
            cover_failure: None,
        };
        let result = self.run_steps(&mut run);
        notes.warnings.append(&mut run.warnings);
        notes.cover_failure = run.cover_failure.take();

        let status = match result {
            Ok(()) => {
                guard.succeed();
                UnitStatus::Success
            }
            Err(failure) => {
                warn!(
                    "unit {}: {} 失敗 ({}): {}",
                    unit.id, failure.phase, failure.kind, failure.message
                );
                guard.fail(ErrorTag::Fingerprint);
                UnitStatus::Failed(failure)
            }
        };

        if let Err(e) = guard.release() {
            notes.warnings.push(format!("釋放失敗: {e}"));
        }
        status
    }

    fn missing_file(&self, unit: &Unit, message: String) -> UnitStatus {
        warn!("unit {}: {message}", unit.id);
        if let Err(e) = self.claims.flag_error(&unit.id, ErrorTag::Fingerprint) {
            warn!("unit {}: 無法加上錯誤標籤: {e}", unit.id);
        }
        UnitStatus::Failed(Failure::new(FailureKind::MissingFile, Phase::FileCheck, message))
    }

    fn has_error_tag(&self, unit: &Unit) -> bool {
        self.config.tags.errors().iter().any(|tag| unit.has_tag(tag))
    }

    fn derivatives_pending(&self, paths: &ArtifactPaths) -> bool {
        (self.mosaic.is_some() && !paths.mosaic_exists())
            || (self.preview.is_some() && !paths.preview_exists())
    }

    fn run_steps(&self, run: &mut UnitRun<'_>) -> Result<(), Failure> {
        let workspace = if self.config.dry_run {
            None
        } else {
            Some(
                Workspace::create(&self.config.output.temp_root, &run.unit.id)
                    .map_err(|e| Failure::new(FailureKind::Internal, Phase::Setup, format!("{e:#}")))?,
            )
        };

        checkpoint(run, Phase::Fingerprint)?;
        self.fingerprint_step(run)?;

        checkpoint(run, Phase::Cover)?;
        self.cover_step(run, workspace.as_ref())?;

        if let Some(generator) = &self.mosaic {
            checkpoint(run, Phase::Mosaic)?;
            debug!("unit {}: 產生馬賽克 ({})", run.unit.id, generator.capability());
            if self.config.dry_run {
                info!("[dry-run] 將產生馬賽克: {}", run.paths.sprite.display());
            } else if let Some(ws) = &workspace {
                generator
                    .generate(run.video, ws.path(), run.paths, &run.cancel)
                    .map_err(|e| generation_failure(&*run, &e, FailureKind::Mosaic, Phase::Mosaic))?;
            }
        }

        if let Some(generator) = &self.preview {
            checkpoint(run, Phase::Preview)?;
            debug!("unit {}: 產生預覽 ({})", run.unit.id, generator.capability());
            if self.config.dry_run {
                info!("[dry-run] 將產生預覽: {}", run.paths.preview.display());
            } else if let Some(ws) = &workspace {
                generator
                    .generate(run.video, ws.path(), run.paths, &run.cancel)
                    .map_err(|e| generation_failure(&*run, &e, FailureKind::Preview, Phase::Preview))?;
            }
        }

        Ok(())
    }

    fn fingerprint_step(&self, run: &UnitRun<'_>) -> Result<(), Failure> {
        if run.unit.phash().is_some() {
            debug!("unit {}: 已有指紋，跳過", run.unit.id);
            return Ok(());
        }
        if self.config.dry_run {
            info!("[dry-run] 將計算指紋: {}", run.video.display());
            return Ok(());
        }

        debug!("unit {}: 計算指紋", run.unit.id);
        let value = compute_fingerprint(
            self.runner.as_ref(),
            &self.config.tools.fingerprint_binary,
            run.video,
            &run.cancel,
        )
        .map_err(|e| critical(run, FailureKind::Fingerprint, Phase::Fingerprint, e.to_string()))?;

        self.catalog
            .set_fingerprint(&run.file.id, &value)
            .map_err(|e| critical(run, FailureKind::Fingerprint, Phase::Fingerprint, e.to_string()))?;

        info!("unit {}: 指紋 {value}", run.unit.id);
        Ok(())
    }

    /// 封面失敗不中斷流程，只加上 cover-error 標籤；逾時仍視為關鍵失敗
    fn cover_step(&self, run: &mut UnitRun<'_>, workspace: Option<&Workspace>) -> Result<(), Failure> {
        let needs_cover = match self.catalog.needs_cover(run.unit) {
            Ok(needs) => needs,
            Err(e) => {
                run.warnings.push(format!("無法確認封面狀態: {e}"));
                return Ok(());
            }
        };
        if !needs_cover {
            return Ok(());
        }
        if self.config.dry_run {
            info!("[dry-run] 將擷取封面: {}", run.video.display());
            return Ok(());
        }
        let Some(workspace) = workspace else {
            return Ok(());
        };

        match self.extract_cover(run, workspace) {
            Ok(bytes) => match self.catalog.set_cover_image(&run.unit.id, &bytes) {
                Ok(()) => {
                    info!("unit {}: 封面已更新", run.unit.id);
                    Ok(())
                }
                Err(e) => {
                    self.cover_failed(run, format!("封面上傳失敗: {e}"));
                    Ok(())
                }
            },
            Err(message) => {
                if run.cancel.is_expired() {
                    return Err(timeout(run, Phase::Cover));
                }
                self.cover_failed(run, message);
                Ok(())
            }
        }
    }

    fn extract_cover(&self, run: &UnitRun<'_>, workspace: &Workspace) -> Result<Vec<u8>, String> {
        let output = workspace.join("cover.jpg");
        let mut last_error = String::from("未產生封面");

        for offset in COVER_OFFSETS {
            let invocation =
                cover_frame_invocation(&self.config.tools.ffmpeg, run.video, offset, &output);
            match self.runner.run(&invocation, &run.cancel) {
                Ok(_) if output.is_file() => {
                    return fs::read(&output).map_err(|e| format!("無法讀取封面: {e}"));
                }
                Ok(_) => debug!("unit {}: {offset}s 沒有產生封面", run.unit.id),
                Err(e) => last_error = e.to_string(),
            }
        }

        Err(last_error)
    }

    fn cover_failed(&self, run: &mut UnitRun<'_>, message: String) {
        warn!("unit {}: {message}", run.unit.id);
        if let Err(e) = self.claims.flag_error(&run.unit.id, ErrorTag::Cover) {
            warn!("unit {}: 無法加上 cover-error 標籤: {e}", run.unit.id);
        }
        run.cover_failure = Some(Failure::new(FailureKind::Cover, Phase::Cover, message.clone()));
        run.warnings.push(message);
    }
}

/// 步驟之間檢查是否已超過單元時間上限
fn checkpoint(run: &UnitRun<'_>, next: Phase) -> Result<(), Failure> {
    if run.cancel.is_expired() {
        return Err(timeout(run, next));
    }
    debug!("unit {}: -> {next}", run.unit.id);
    Ok(())
}

fn timeout(run: &UnitRun<'_>, phase: Phase) -> Failure {
    Failure::new(
        FailureKind::Timeout,
        phase,
        format!("超過單元時間上限 ({})", run.video.display()),
    )
}

/// 逾時造成的失敗一律歸類為 timeout
fn critical(run: &UnitRun<'_>, kind: FailureKind, phase: Phase, message: String) -> Failure {
    if run.cancel.is_expired() {
        timeout(run, phase)
    } else {
        Failure::new(kind, phase, message)
    }
}

fn generation_failure(
    run: &UnitRun<'_>,
    error: &GenerationError,
    kind: FailureKind,
    phase: Phase,
) -> Failure {
    if error.is_cancelled() {
        timeout(run, phase)
    } else {
        critical(run, kind, phase, error.to_string())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
