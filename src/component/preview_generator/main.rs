use super::clip_concatenator::{concat_clips, write_concat_list};
use super::clip_extractor::{clip_start_times, create_clip_tasks, extract_clips_parallel};
use crate::component::derivative::{GenerationError, GenerationReport};
use crate::config::{GenerationSettings, ToolPaths};
use crate::tools::{
    ArtifactPaths, CancelToken, CapabilityRecord, FfmpegCommand, FrameSize, ToolRunner,
    get_video_info,
};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const PREVIEW_SIZE: FrameSize = FrameSize::new(640, 360);

/// 預覽短片參數
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewSettings {
    pub clips: usize,
    pub clip_length: f64,
    pub skip_seconds: f64,
    pub include_audio: bool,
}

impl From<&GenerationSettings> for PreviewSettings {
    fn from(settings: &GenerationSettings) -> Self {
        Self {
            clips: settings.preview_clips,
            clip_length: settings.preview_clip_length,
            skip_seconds: settings.preview_skip_seconds,
            include_audio: settings.preview_audio,
        }
    }
}

pub struct PreviewGenerator {
    runner: Arc<dyn ToolRunner>,
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    capability: CapabilityRecord,
    inner_workers: usize,
    settings: PreviewSettings,
}

impl PreviewGenerator {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        tools: &ToolPaths,
        capability: CapabilityRecord,
        inner_workers: usize,
        settings: PreviewSettings,
    ) -> Self {
        Self {
            runner,
            ffmpeg: tools.ffmpeg.clone(),
            ffprobe: tools.ffprobe.clone(),
            capability,
            inner_workers,
            settings,
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
        if paths.preview_exists() {
            debug!("預覽影片已存在，跳過: {}", paths.preview.display());
            return Ok(GenerationReport::reused(paths.preview.clone()));
        }

        let info = get_video_info(self.runner.as_ref(), &self.ffprobe, video, cancel)?;
        let starts = clip_start_times(
            info.duration_seconds,
            self.settings.clips,
            self.settings.clip_length,
            self.settings.skip_seconds,
        )?;
        let tasks = create_clip_tasks(&starts, workspace);
        let total = tasks.len();

        let command = FfmpegCommand::new(&self.ffmpeg, &self.capability);
        let results = extract_clips_parallel(
            self.runner.as_ref(),
            &command,
            video,
            &tasks,
            &self.settings,
            self.inner_workers,
            cancel,
        )
        .map_err(|e| GenerationError::Io(format!("{e:#}")))?;

        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }

        let clips: Vec<PathBuf> = results
            .iter()
            .filter_map(|r| r.path().cloned())
            .collect();
        if clips.is_empty() {
            return Err(GenerationError::AllSubTasksFailed { total });
        }
        let failed = total - clips.len();
        if failed * 2 > total {
            warn!(
                "多數短片擷取失敗 ({failed}/{total})，預覽將較短: {}",
                video.display()
            );
        } else if failed > 0 {
            debug!("{failed}/{total} 段短片擷取失敗: {}", video.display());
        }

        if let Some(parent) = paths.preview.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let list_path = workspace.join("clips.txt");
        write_concat_list(&list_path, &clips)?;
        concat_clips(
            self.runner.as_ref(),
            &command,
            &list_path,
            PREVIEW_SIZE,
            self.settings.include_audio,
            &paths.preview,
            cancel,
        )?;

        info!(
            "預覽影片完成 ({}/{total}, {}): {}",
            clips.len(),
            self.capability,
            paths.preview.display()
        );

        Ok(GenerationReport {
            artifact: paths.preview.clone(),
            succeeded: clips.len(),
            total,
            reused: false,
        })
    }
}
