//! 感知指紋工具
//!
//! 外部工具以 `<binary> -json <path>` 呼叫，stdout 為含 `phash` 欄位的 JSON。

use crate::tools::process::{CancelToken, ToolError, ToolInvocation, ToolRunner};
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

static REGEX_PHASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{16}$").expect("Invalid regex"));

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("指紋工具輸出無法解析: {0}")]
    Parse(String),

    #[error("指紋格式錯誤: {0:?}")]
    Invalid(String),
}

#[derive(Deserialize)]
struct HashOutput {
    phash: Option<String>,
}

#[must_use]
pub fn fingerprint_invocation(binary: &Path, video: &Path) -> ToolInvocation {
    ToolInvocation::new(binary).arg("-json").arg(video.as_os_str())
}

/// 計算影片的感知指紋，回傳 16 位十六進位字串
pub fn compute_fingerprint(
    runner: &dyn ToolRunner,
    binary: &Path,
    video: &Path,
    cancel: &CancelToken,
) -> Result<String, FingerprintError> {
    let output = runner.run(&fingerprint_invocation(binary, video), cancel)?;
    parse_fingerprint(&output.stdout_text())
}

fn parse_fingerprint(stdout: &str) -> Result<String, FingerprintError> {
    let parsed: HashOutput =
        serde_json::from_str(stdout.trim()).map_err(|e| FingerprintError::Parse(e.to_string()))?;

    let value = parsed
        .phash
        .map(|v| v.trim().to_string())
        .ok_or_else(|| FingerprintError::Parse("缺少 phash 欄位".to_string()))?;

    if REGEX_PHASH.is_match(&value) {
        Ok(value)
    } else {
        Err(FingerprintError::Invalid(value))
    }
}
