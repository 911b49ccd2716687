//! 工作探索：從目錄中挑出一批待處理單元

mod main;

pub use main::{WorkDiscovery, page_count};
