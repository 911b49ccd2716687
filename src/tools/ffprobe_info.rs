use crate::tools::process::{CancelToken, ToolError, ToolInvocation, ToolRunner};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("無法解析 ffprobe 輸出: {0}")]
    Parse(String),

    #[error("找不到視訊串流: {0}")]
    NoVideoStream(String),

    #[error("無法取得影片長度: {0}")]
    NoDuration(String),
}

#[derive(Deserialize)]
struct FfprobeOutput {
    format: Option<FormatInfo>,
    streams: Option<Vec<StreamInfo>>,
}

#[derive(Deserialize)]
struct FormatInfo {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct StreamInfo {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[must_use]
pub fn probe_invocation(ffprobe: &Path, video: &Path) -> ToolInvocation {
    ToolInvocation::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(video.as_os_str())
}

/// 使用 ffprobe 取得影片資訊
pub fn get_video_info(
    runner: &dyn ToolRunner,
    ffprobe: &Path,
    video: &Path,
    cancel: &CancelToken,
) -> Result<VideoInfo, ProbeError> {
    let output = runner.run(&probe_invocation(ffprobe, video), cancel)?;
    parse_probe_output(&output.stdout_text(), video)
}

fn parse_probe_output(stdout: &str, video: &Path) -> Result<VideoInfo, ProbeError> {
    let probe: FfprobeOutput =
        serde_json::from_str(stdout).map_err(|e| ProbeError::Parse(e.to_string()))?;

    let video_stream = probe
        .streams
        .as_ref()
        .and_then(|streams| {
            streams
                .iter()
                .find(|s| s.codec_type.as_deref() == Some("video"))
        })
        .ok_or_else(|| ProbeError::NoVideoStream(video.display().to_string()))?;

    // 優先從 format 取得長度，其次從 stream
    let duration_seconds = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .or(video_stream.duration.as_ref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| ProbeError::NoDuration(video.display().to_string()))?;

    Ok(VideoInfo {
        duration_seconds,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
    })
}
