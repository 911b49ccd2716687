//! ffmpeg 命令建構
//!
//! 每個會解碼或編碼影像的命令都由 [`FfmpegCommand`] 產生，而它只依據建構時
//! 傳入的 [`CapabilityRecord`] 決定走硬體加速或軟體路徑。

use crate::tools::capability::CapabilityRecord;
use crate::tools::process::ToolInvocation;
use std::path::Path;

/// 兩段式 seek 的前置緩衝時間（秒）
const SEEK_MARGIN: f64 = 2.0;

/// 預覽影片的品質參數
const PREVIEW_QUALITY: &str = "18";

/// 馬賽克中的一格
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MosaicCell<'a> {
    Frame(&'a Path),
    /// 擷取失敗的格子以黑色色塊填補
    Placeholder,
}

/// 輸出畫面尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

pub struct FfmpegCommand<'a> {
    ffmpeg: &'a Path,
    capability: &'a CapabilityRecord,
}

impl<'a> FfmpegCommand<'a> {
    #[must_use]
    pub const fn new(ffmpeg: &'a Path, capability: &'a CapabilityRecord) -> Self {
        Self { ffmpeg, capability }
    }

    #[must_use]
    pub const fn capability(&self) -> &CapabilityRecord {
        self.capability
    }

    fn base(&self) -> ToolInvocation {
        ToolInvocation::new(self.ffmpeg).args(["-hide_banner", "-nostdin", "-loglevel", "error"])
    }

    /// 擷取單一畫面並縮放成固定大小
    #[must_use]
    pub fn extract_frame(
        &self,
        video: &Path,
        timestamp: f64,
        size: FrameSize,
        output: &Path,
    ) -> ToolInvocation {
        let FrameSize { width, height } = size;
        let mut invocation = self.base();

        if let Some(device) = self.capability.device() {
            invocation = invocation
                .args(["-hwaccel", "vaapi", "-hwaccel_output_format", "vaapi"])
                .arg("-vaapi_device")
                .arg(device.as_os_str())
                .arg("-ss")
                .arg(format!("{timestamp:.3}"))
                .arg("-i")
                .arg(video.as_os_str())
                .args(["-frames:v", "1", "-an", "-sn", "-dn", "-vf"])
                .arg(format!(
                    "scale_vaapi=w={width}:h={height}:force_original_aspect_ratio=decrease,hwdownload,format=nv12,{}",
                    letterbox(size)
                ));
        } else {
            // 兩段式 seek：-i 前快速跳到關鍵幀，-i 後精準解碼到目標時間
            let t0 = (timestamp - SEEK_MARGIN).max(0.0);
            let delta = timestamp - t0;
            if t0 > 0.0 {
                invocation = invocation.arg("-ss").arg(format!("{t0:.3}"));
            }
            invocation = invocation.arg("-i").arg(video.as_os_str());
            if delta > 0.0 {
                invocation = invocation.arg("-ss").arg(format!("{delta:.3}"));
            }
            invocation = invocation
                .args(["-frames:v", "1", "-an", "-sn", "-dn", "-threads", "1", "-vf"])
                .arg(format!(
                    "scale={width}:{height}:force_original_aspect_ratio=decrease,{}",
                    letterbox(size)
                ))
                .args(["-q:v", "2"]);
        }

        invocation.arg("-y").arg(output.as_os_str())
    }

    /// 以 xstack 將所有格子合成為一張馬賽克圖
    #[must_use]
    pub fn assemble_mosaic(
        &self,
        cells: &[MosaicCell<'_>],
        cols: usize,
        cell: FrameSize,
        output: &Path,
    ) -> ToolInvocation {
        let mut invocation = self.base();
        if let Some(device) = self.capability.device() {
            invocation = invocation.arg("-vaapi_device").arg(device.as_os_str());
        }

        for c in cells {
            invocation = match c {
                MosaicCell::Frame(path) => invocation.arg("-i").arg(path.as_os_str()),
                MosaicCell::Placeholder => invocation.args(["-f", "lavfi", "-i"]).arg(format!(
                    "color=c=black:s={}x{}:d=1",
                    cell.width, cell.height
                )),
            };
        }

        invocation = invocation
            .arg("-filter_complex")
            .arg(build_mosaic_filter(
                cells.len(),
                cols,
                cell,
                self.capability.is_accelerated(),
            ))
            .args(["-map", "[out]", "-frames:v", "1"]);

        invocation = if self.capability.is_accelerated() {
            invocation.args(["-c:v", "mjpeg_vaapi"])
        } else {
            invocation.args(["-c:v", "mjpeg", "-q:v", "2"])
        };

        invocation.arg("-y").arg(output.as_os_str())
    }

    /// 擷取一段短片
    #[must_use]
    pub fn extract_clip(
        &self,
        video: &Path,
        start: f64,
        length: f64,
        size: FrameSize,
        include_audio: bool,
        output: &Path,
    ) -> ToolInvocation {
        let mut invocation = self.base();
        if let Some(device) = self.capability.device() {
            invocation = invocation.arg("-vaapi_device").arg(device.as_os_str());
        }

        invocation = invocation
            .arg("-ss")
            .arg(format!("{start:.3}"))
            .arg("-i")
            .arg(video.as_os_str())
            .arg("-t")
            .arg(format!("{length:.3}"));

        self.encode_video(invocation, size, include_audio)
            .arg("-y")
            .arg(output.as_os_str())
    }

    /// 以 concat demuxer 串接短片並重新編碼
    #[must_use]
    pub fn concat_clips(
        &self,
        list_file: &Path,
        size: FrameSize,
        include_audio: bool,
        output: &Path,
    ) -> ToolInvocation {
        let mut invocation = self.base();
        if let Some(device) = self.capability.device() {
            invocation = invocation.arg("-vaapi_device").arg(device.as_os_str());
        }

        invocation = invocation
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(list_file.as_os_str());

        self.encode_video(invocation, size, include_audio)
            .args(["-movflags", "+faststart"])
            .arg("-y")
            .arg(output.as_os_str())
    }

    fn encode_video(
        &self,
        invocation: ToolInvocation,
        size: FrameSize,
        include_audio: bool,
    ) -> ToolInvocation {
        let FrameSize { width, height } = size;
        let invocation = if self.capability.is_accelerated() {
            invocation
                .arg("-vf")
                .arg(format!("format=nv12,hwupload,scale_vaapi=w={width}:h={height}"))
                .args(["-c:v", "h264_vaapi", "-qp", PREVIEW_QUALITY])
        } else {
            invocation
                .arg("-vf")
                .arg(format!("scale={width}:{height}"))
                .args([
                    "-c:v",
                    "libx264",
                    "-crf",
                    PREVIEW_QUALITY,
                    "-preset",
                    "slow",
                    "-pix_fmt",
                    "yuv420p",
                ])
        };

        if include_audio {
            invocation.args(["-c:a", "aac", "-b:a", "128k"])
        } else {
            invocation.arg("-an")
        }
    }
}

/// 擷取封面畫面（只需要一張圖，不經過加速路徑）
#[must_use]
pub fn cover_frame_invocation(ffmpeg: &Path, video: &Path, offset: &str, output: &Path) -> ToolInvocation {
    ToolInvocation::new(ffmpeg)
        .args(["-hide_banner", "-nostdin", "-loglevel", "error", "-ss", offset, "-i"])
        .arg(video.as_os_str())
        .args(["-frames:v", "1", "-q:v", "2", "-y"])
        .arg(output.as_os_str())
}

/// 等比例縮小後補黑邊到固定大小，兩種路徑的縮圖外觀一致
fn letterbox(size: FrameSize) -> String {
    let FrameSize { width, height } = size;
    format!("pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:black")
}

/// 建立 xstack 佈局字串
///
/// 每個位置格式為 `x_y`，以 `|` 分隔，例如 2x2 網格：`0_0|160_0|0_90|160_90`
#[must_use]
pub fn build_xstack_layout(count: usize, cols: usize, cell: FrameSize) -> String {
    let cols = cols.max(1);
    (0..count)
        .map(|i| {
            let x = (i % cols) as u32 * cell.width;
            let y = (i / cols) as u32 * cell.height;
            format!("{x}_{y}")
        })
        .collect::<Vec<_>>()
        .join("|")
}

/// 每個輸入先統一尺寸與像素格式，xstack 要求所有輸入格式一致
fn build_mosaic_filter(count: usize, cols: usize, cell: FrameSize, accelerated: bool) -> String {
    let FrameSize { width, height } = cell;
    let mut chains: Vec<String> = (0..count)
        .map(|i| format!("[{i}:v]scale={width}:{height},setsar=1,format=yuvj420p[c{i}]"))
        .collect();

    let labels: String = (0..count).map(|i| format!("[c{i}]")).collect();
    let layout = build_xstack_layout(count, cols, cell);
    let upload = if accelerated { ",format=nv12,hwupload" } else { "" };
    chains.push(format!(
        "{labels}xstack=inputs={count}:layout={layout}{upload}[out]"
    ));

    chains.join(";")
}
