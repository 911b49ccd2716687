use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 第一次中斷信號只設定旗標，讓執行中的單元完成；第二次立即結束
pub fn setup_shutdown_signal() -> Result<Arc<AtomicBool>> {
    let shutdown_signal = Arc::new(AtomicBool::new(false));
    let signal_clone = Arc::clone(&shutdown_signal);

    ctrlc::set_handler(move || {
        if signal_clone.swap(true, Ordering::SeqCst) {
            eprintln!("\n再次收到中斷信號，立即結束");
            let _ = console::Term::stdout().show_cursor();
            std::process::exit(130);
        }
        eprintln!("\n收到中斷信號，等待執行中的單元完成後關閉...");
    })
    .context("無法設定 Ctrl-C 處理器")?;

    Ok(shutdown_signal)
}
