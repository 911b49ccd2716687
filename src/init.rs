use log::LevelFilter;

/// 初始化日誌；`RUST_LOG` 有設定時覆寫命令列選擇的等級
pub fn init_logger(level: LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_secs()
        .try_init();
}

/// `--debug` 優先於 `--verbose`；兩者都沒有時為 info
#[must_use]
pub const fn log_level(verbose: bool, debug: bool) -> LevelFilter {
    match (verbose, debug) {
        (_, true) => LevelFilter::Debug,
        _ => LevelFilter::Info,
    }
}
