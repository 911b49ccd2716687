use crate::component::derivative::{SubTaskResult, collect_results, run_to_file};
use crate::tools::{CancelToken, FfmpegCommand, FrameSize, ToolRunner, run_bounded};
use anyhow::Result;
use log::{debug, warn};
use std::path::{Path, PathBuf};

/// 單張縮圖的擷取工作
#[derive(Debug, Clone)]
pub struct FrameTask {
    pub index: usize,
    pub timestamp: f64,
    pub output_path: PathBuf,
}

/// 在影片全長上以 `duration / count` 的間隔建立擷取工作
#[must_use]
pub fn create_frame_tasks(duration: f64, count: usize, output_dir: &Path) -> Vec<FrameTask> {
    if count == 0 {
        return Vec::new();
    }
    let interval = duration / count as f64;
    (0..count)
        .map(|index| FrameTask {
            index,
            timestamp: index as f64 * interval,
            output_path: output_dir.join(format!("frame_{index:03}.jpg")),
        })
        .collect()
}

/// 以有界執行緒池平行擷取所有縮圖
///
/// 每個結果對應同索引的工作；取消後未執行的工作記為失敗。
pub fn extract_frames_parallel(
    runner: &dyn ToolRunner,
    command: &FfmpegCommand<'_>,
    video: &Path,
    tasks: &[FrameTask],
    cell: FrameSize,
    inner_workers: usize,
    cancel: &CancelToken,
) -> Result<Vec<SubTaskResult>> {
    let results = run_bounded(inner_workers, tasks, cancel, |_, task| {
        let invocation = command.extract_frame(video, task.timestamp, cell, &task.output_path);
        let artifact = run_to_file(runner, &invocation, &task.output_path, cancel);
        match &artifact {
            Ok(_) => debug!("縮圖 [{}] @ {:.2}s 完成", task.index, task.timestamp),
            Err(e) => warn!("縮圖 [{}] @ {:.2}s 失敗: {e}", task.index, task.timestamp),
        }
        SubTaskResult {
            index: task.index,
            artifact,
        }
    })?;

    Ok(collect_results(results))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_frame_tasks_spacing() {
        let tasks = create_frame_tasks(81.0, 81, Path::new("/tmp/ws"));
        assert_eq!(tasks.len(), 81);
        assert!((tasks[0].timestamp - 0.0).abs() < f64::EPSILON);
        assert!((tasks[1].timestamp - 1.0).abs() < 1e-9);
        assert!((tasks[80].timestamp - 80.0).abs() < 1e-9);
        assert_eq!(tasks[5].output_path, Path::new("/tmp/ws/frame_005.jpg"));
    }

    #[test]
    fn test_create_frame_tasks_stay_inside_duration() {
        let tasks = create_frame_tasks(10.0, 81, Path::new("."));
        assert!(tasks.iter().all(|t| t.timestamp < 10.0));
    }

    #[test]
    fn test_zero_count() {
        assert!(create_frame_tasks(100.0, 0, Path::new(".")).is_empty());
    }
}
