use super::main::{PREVIEW_SIZE, PreviewSettings};
use crate::component::derivative::{GenerationError, SubTaskResult, collect_results, run_to_file};
use crate::tools::{CancelToken, FfmpegCommand, ToolRunner, run_bounded};
use anyhow::Result;
use log::{debug, warn};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ClipTask {
    pub index: usize,
    pub start: f64,
    pub output_path: PathBuf,
}

/// 計算每段短片的起始時間
///
/// 片頭先略過 `skip` 秒，其餘長度平均分成 `clips + 1` 段；
/// 影片不夠長時改為不略過片頭，仍不足則回傳 [`GenerationError::TooShort`]。
pub fn clip_start_times(
    duration: f64,
    clips: usize,
    clip_length: f64,
    skip: f64,
) -> Result<Vec<f64>, GenerationError> {
    let slots = (clips + 1) as f64;
    let mut offset = skip;
    let mut interval = (duration - offset - clip_length) / slots;

    if interval <= 0.0 {
        offset = 0.0;
        interval = (duration - clip_length) / slots;
    }
    if interval <= 0.0 || clips == 0 {
        return Err(GenerationError::TooShort { duration });
    }

    Ok((1..=clips).map(|i| offset + interval * i as f64).collect())
}

#[must_use]
pub fn create_clip_tasks(starts: &[f64], output_dir: &Path) -> Vec<ClipTask> {
    starts
        .iter()
        .enumerate()
        .map(|(index, &start)| ClipTask {
            index,
            start,
            output_path: output_dir.join(format!("clip_{index:03}.mp4")),
        })
        .collect()
}

pub fn extract_clips_parallel(
    runner: &dyn ToolRunner,
    command: &FfmpegCommand<'_>,
    video: &Path,
    tasks: &[ClipTask],
    settings: &PreviewSettings,
    inner_workers: usize,
    cancel: &CancelToken,
) -> Result<Vec<SubTaskResult>> {
    let results = run_bounded(inner_workers, tasks, cancel, |_, task| {
        let invocation = command.extract_clip(
            video,
            task.start,
            settings.clip_length,
            PREVIEW_SIZE,
            settings.include_audio,
            &task.output_path,
        );
        let artifact = run_to_file(runner, &invocation, &task.output_path, cancel);
        match &artifact {
            Ok(_) => debug!("短片 [{}] @ {:.2}s 完成", task.index, task.start),
            Err(e) => warn!("短片 [{}] @ {:.2}s 失敗: {e}", task.index, task.start),
        }
        SubTaskResult {
            index: task.index,
            artifact,
        }
    })?;

    Ok(collect_results(results))
}
