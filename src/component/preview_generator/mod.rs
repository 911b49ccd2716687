//! 預覽短片產生器：平均擷取多段短片後串接成一支預覽影片

mod clip_concatenator;
mod clip_extractor;
mod main;

pub use clip_concatenator::{concat_clips, write_concat_list};
pub use clip_extractor::{ClipTask, clip_start_times, create_clip_tasks, extract_clips_parallel};
pub use main::{PREVIEW_SIZE, PreviewGenerator, PreviewSettings};
