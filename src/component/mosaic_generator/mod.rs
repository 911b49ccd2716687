//! 馬賽克預覽圖產生器
//!
//! 流程：
//! A. 取得影片長度（ffprobe）
//! B. 以固定間隔計算 81 個時間點
//! C. 平行擷取縮圖（失敗的格子以黑色色塊填補）
//! D. 合併為 9x9 馬賽克圖
//! E. 寫出 WebVTT 索引檔

mod frame_extractor;
mod main;
mod mosaic_merger;
mod vtt_writer;

pub use frame_extractor::{FrameTask, create_frame_tasks, extract_frames_parallel};
pub use main::{FRAME_COUNT, GRID_COLS, GRID_ROWS, MOSAIC_CELL, MosaicGenerator};
pub use mosaic_merger::{build_cells, merge_mosaic};
pub use vtt_writer::{format_vtt_time, render_sidecar, write_sidecar};
