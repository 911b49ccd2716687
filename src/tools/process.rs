//! 外部程式執行
//!
//! 所有外部工具（ffmpeg、ffprobe、指紋工具、vainfo）都經由 [`ToolRunner`] 呼叫，
//! 並接受一個 [`CancelToken`]：取消或逾時的時候，執行中的子程序會被強制終止。

use log::{debug, warn};
use std::ffi::OsString;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use wait_timeout::ChildExt;

#[cfg(unix)]
use std::os::unix::process::CommandExt;

/// 每次等待子程序的時間片，之後檢查取消狀態
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// 取消權杖：手動取消或超過期限都視為已取消
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// 共用同一個取消旗標，但期限較短者優先
    #[must_use]
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now().checked_add(timeout);
        let deadline = match (self.deadline, candidate) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.is_expired()
    }
}

/// 一次外部工具呼叫
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl ToolInvocation {
    #[must_use]
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// 是否包含指定參數（測試與除錯用）
    #[must_use]
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }

    /// 取得某個旗標後面的值
    #[must_use]
    pub fn value_after(&self, flag: &str) -> Option<String> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(|v| v.to_string_lossy().to_string())
    }

    /// 最後一個參數，多數 ffmpeg 呼叫的輸出路徑
    #[must_use]
    pub fn last_arg(&self) -> Option<PathBuf> {
        self.args.last().map(PathBuf::from)
    }

    #[must_use]
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map_or_else(|| self.program.display().to_string(), |n| n.to_string_lossy().to_string())
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    #[must_use]
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    #[must_use]
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("無法啟動 {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("{program} 執行失敗 (exit {code:?}): {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program} 已取消")]
    Cancelled { program: String },
}

impl ToolError {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// 外部工具執行介面
pub trait ToolRunner: Send + Sync {
    /// 執行工具直到結束；非零結束碼回傳 [`ToolError::Failed`]
    fn run(&self, invocation: &ToolInvocation, cancel: &CancelToken)
    -> Result<ToolOutput, ToolError>;
}

/// 以作業系統子程序執行工具
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, invocation: &ToolInvocation, cancel: &CancelToken) -> Result<ToolOutput, ToolError> {
        let program = invocation.program_name();
        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled { program });
        }

        debug!("執行: {invocation}");

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // 獨立的行程群組，取消時連同工具產生的子程序一起終止
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| ToolError::Spawn {
            program: program.clone(),
            message: e.to_string(),
        })?;

        // 另開執行緒讀取輸出，避免管線塞滿造成子程序卡住
        let stdout_reader = child.stdout.take().map(spawn_pipe_reader);
        let stderr_reader = child.stderr.take().map(spawn_pipe_reader);

        let status = loop {
            if cancel.is_cancelled() {
                warn!("終止程序群組 [{}]: {program}", child.id());
                kill_process_group(&mut child);
                // 讀取執行緒在管線關閉後自行結束，不等待
                drop(stdout_reader);
                drop(stderr_reader);
                return Err(ToolError::Cancelled { program });
            }

            match child.wait_timeout(WAIT_SLICE) {
                Ok(Some(status)) => break Some(status),
                Ok(None) => {}
                Err(e) => {
                    warn!("無法檢查程序狀態 [{program}]: {e}");
                    break None;
                }
            }
        };

        // 工具本身已結束，留在群組裡的輔助程序不得繼續佔用管線
        signal_process_group(child.id());

        let output = ToolOutput {
            stdout: join_pipe_reader(stdout_reader),
            stderr: join_pipe_reader(stderr_reader),
        };

        match status {
            Some(status) if status.success() => Ok(output),
            Some(status) => Err(ToolError::Failed {
                program,
                code: status.code(),
                stderr: output.stderr_text(),
            }),
            None => Err(ToolError::Failed {
                program,
                code: None,
                stderr: output.stderr_text(),
            }),
        }
    }
}

/// 終止整個行程群組並回收直接子程序
fn kill_process_group(child: &mut Child) {
    signal_process_group(child.id());
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn signal_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // 群組已不存在時回傳 ESRCH，忽略即可
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn signal_process_group(_pid: u32) {}

fn spawn_pipe_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        buffer
    })
}

fn join_pipe_reader(handle: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}
