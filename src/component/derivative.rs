//! 兩種衍生檔產生器共用的型別

use crate::tools::{CancelToken, ProbeError, ToolError, ToolInvocation, ToolRunner};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("無法讀取影片資訊: {0}")]
    Probe(#[from] ProbeError),

    #[error("影片太短 ({duration:.1}s)，無法產生預覽")]
    TooShort { duration: f64 },

    #[error("{total} 個子工作全部失敗")]
    AllSubTasksFailed { total: usize },

    #[error("合成失敗: {0}")]
    Assembly(ToolError),

    #[error("檔案操作失敗: {0}")]
    Io(String),

    #[error("已取消")]
    Cancelled,
}

impl GenerationError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Assembly(e) => e.is_cancelled(),
            Self::Probe(ProbeError::Tool(e)) => e.is_cancelled(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for GenerationError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// 單一子擷取（一張畫面或一段短片）的結果
#[derive(Debug, Clone)]
pub struct SubTaskResult {
    pub index: usize,
    pub artifact: Result<PathBuf, String>,
}

impl SubTaskResult {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.artifact.is_ok()
    }

    #[must_use]
    pub fn path(&self) -> Option<&PathBuf> {
        self.artifact.as_ref().ok()
    }
}

/// 產生器完成後的摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationReport {
    pub artifact: PathBuf,
    pub succeeded: usize,
    pub total: usize,
    /// 輸出已存在，未重新產生
    pub reused: bool,
}

impl GenerationReport {
    #[must_use]
    pub const fn reused(artifact: PathBuf) -> Self {
        Self {
            artifact,
            succeeded: 0,
            total: 0,
            reused: true,
        }
    }

    #[must_use]
    pub const fn failed(&self) -> usize {
        self.total - self.succeeded
    }
}

/// 把執行緒池回傳的結果攤平；被取消而未執行的項目視為失敗
pub(crate) fn collect_results(results: Vec<Option<SubTaskResult>>) -> Vec<SubTaskResult> {
    results
        .into_iter()
        .enumerate()
        .map(|(index, r)| {
            r.unwrap_or_else(|| SubTaskResult {
                index,
                artifact: Err("已取消".to_string()),
            })
        })
        .collect()
}

/// 執行一次擷取並確認輸出檔案確實產生
pub(crate) fn run_to_file(
    runner: &dyn ToolRunner,
    invocation: &ToolInvocation,
    output: &Path,
    cancel: &CancelToken,
) -> Result<PathBuf, String> {
    runner.run(invocation, cancel).map_err(|e| e.to_string())?;
    if output.is_file() {
        Ok(output.to_path_buf())
    } else {
        Err(format!("未產生輸出: {}", output.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_classification() {
        assert!(GenerationError::Cancelled.is_cancelled());
        assert!(
            GenerationError::Assembly(ToolError::Cancelled {
                program: "ffmpeg".to_string()
            })
            .is_cancelled()
        );
        assert!(!GenerationError::AllSubTasksFailed { total: 81 }.is_cancelled());
    }

    #[test]
    fn test_collect_results_marks_skipped() {
        let results = vec![
            Some(SubTaskResult {
                index: 0,
                artifact: Ok(PathBuf::from("a.jpg")),
            }),
            None,
        ];
        let collected = collect_results(results);
        assert!(collected[0].is_success());
        assert!(!collected[1].is_success());
        assert_eq!(collected[1].index, 1);
    }
}
