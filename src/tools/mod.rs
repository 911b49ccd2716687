//! 共用工具：外部程式執行、ffmpeg 命令、暫存目錄與檔案檢查

mod artifact;
mod bounded_pool;
mod capability;
mod ffmpeg_command;
mod ffprobe_info;
mod file_mask;
mod fingerprint;
mod path_validator;
mod process;
mod workspace;

pub use artifact::{ArtifactPaths, artifact_key};
pub use bounded_pool::run_bounded;
pub use capability::{CapabilityRecord, detect, resolve};
pub use ffmpeg_command::{FfmpegCommand, FrameSize, MosaicCell, cover_frame_invocation};
pub use ffprobe_info::{ProbeError, VideoInfo, get_video_info};
pub use file_mask::FileMask;
pub use fingerprint::{FingerprintError, compute_fingerprint};
pub use path_validator::{check_directory_writable, check_executable, ensure_directory_exists};
pub use process::{CancelToken, SystemRunner, ToolError, ToolInvocation, ToolOutput, ToolRunner};
pub use workspace::{Workspace, sweep_temp_root};
