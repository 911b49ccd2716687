use super::frame_extractor::{create_frame_tasks, extract_frames_parallel};
use super::mosaic_merger::{build_cells, merge_mosaic};
use super::vtt_writer::write_sidecar;
use crate::component::derivative::{GenerationError, GenerationReport};
use crate::config::ToolPaths;
use crate::tools::{
    ArtifactPaths, CancelToken, CapabilityRecord, FfmpegCommand, FrameSize, ToolRunner,
    get_video_info,
};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const GRID_COLS: usize = 9;
pub const GRID_ROWS: usize = 9;
pub const FRAME_COUNT: usize = GRID_COLS * GRID_ROWS;
pub const MOSAIC_CELL: FrameSize = FrameSize::new(160, 90);

/// 馬賽克預覽圖產生器
///
/// 持有自己的 [`CapabilityRecord`]；擷取與合成都只依據這一份紀錄。
pub struct MosaicGenerator {
    runner: Arc<dyn ToolRunner>,
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    capability: CapabilityRecord,
    inner_workers: usize,
}

impl MosaicGenerator {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        tools: &ToolPaths,
        capability: CapabilityRecord,
        inner_workers: usize,
    ) -> Self {
        Self {
            runner,
            ffmpeg: tools.ffmpeg.clone(),
            ffprobe: tools.ffprobe.clone(),
            capability,
            inner_workers,
        }
    }

    #[must_use]
    pub const fn capability(&self) -> &CapabilityRecord {
        &self.capability
    }

    pub fn generate(
        &self,
        video: &Path,
        workspace: &Path,
        paths: &ArtifactPaths,
        cancel: &CancelToken,
    ) -> Result<GenerationReport, GenerationError> {
        if paths.mosaic_exists() {
            debug!("馬賽克圖已存在，跳過: {}", paths.sprite.display());
            return Ok(GenerationReport::reused(paths.sprite.clone()));
        }

        // A. 影片長度
        let info = get_video_info(self.runner.as_ref(), &self.ffprobe, video, cancel)?;

        // B. 時間點
        let tasks = create_frame_tasks(info.duration_seconds, FRAME_COUNT, workspace);

        // C. 平行擷取
        let command = FfmpegCommand::new(&self.ffmpeg, &self.capability);
        let results = extract_frames_parallel(
            self.runner.as_ref(),
            &command,
            video,
            &tasks,
            MOSAIC_CELL,
            self.inner_workers,
            cancel,
        )
        .map_err(|e| GenerationError::Io(format!("{e:#}")))?;

        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        if succeeded == 0 {
            return Err(GenerationError::AllSubTasksFailed { total: FRAME_COUNT });
        }
        if succeeded < FRAME_COUNT {
            warn!(
                "{} 張縮圖擷取失敗，以佔位色塊填補: {}",
                FRAME_COUNT - succeeded,
                video.display()
            );
        }

        // D. 合成
        if let Some(parent) = paths.sprite.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let cells = build_cells(&results, FRAME_COUNT);
        merge_mosaic(
            self.runner.as_ref(),
            &command,
            &cells,
            GRID_COLS,
            MOSAIC_CELL,
            &paths.sprite,
            cancel,
        )?;

        // E. 索引檔
        let sprite_name = paths
            .sprite
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        write_sidecar(
            &paths.sidecar,
            &sprite_name,
            info.duration_seconds,
            FRAME_COUNT,
            GRID_COLS,
            MOSAIC_CELL,
        )?;

        info!(
            "馬賽克圖完成 ({succeeded}/{FRAME_COUNT}, {}): {}",
            self.capability,
            paths.sprite.display()
        );

        Ok(GenerationReport {
            artifact: paths.sprite.clone(),
            succeeded,
            total: FRAME_COUNT,
            reused: false,
        })
    }
}
