use crate::component::scene_processor::{BatchOutcome, Failure};
use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// 只附加的失敗紀錄檔，同一時間只有一個寫入者
pub struct FailureLog {
    path: PathBuf,
    writer: Mutex<()>,
}

impl FailureLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 關鍵失敗與封面失敗各寫入一行；沒有任何失敗的結果不寫入
    pub fn append(&self, outcome: &BatchOutcome) -> std::io::Result<()> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let lines = format_failure_lines(outcome, &timestamp);
        if lines.is_empty() {
            return Ok(());
        }

        let _guard = self
            .writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        for line in lines {
            writeln!(file, "{line}")?;
        }
        Ok(())
    }
}

/// 封面失敗在前（發生較早），關鍵失敗在後
#[must_use]
pub fn format_failure_lines(outcome: &BatchOutcome, timestamp: &str) -> Vec<String> {
    outcome
        .cover_failure
        .iter()
        .chain(outcome.failure())
        .map(|failure| format_failure_line(outcome, failure, timestamp))
        .collect()
}

/// `[時間] unit=<id> file=<路徑> phase=<階段> kind=<種類> error=<訊息>`
#[must_use]
pub fn format_failure_line(outcome: &BatchOutcome, failure: &Failure, timestamp: &str) -> String {
    let message = failure.message.replace(['\n', '\r'], " ");
    format!(
        "[{timestamp}] unit={} file={} phase={} kind={} error={message}",
        outcome.unit_id, outcome.file, failure.phase, failure.kind
    )
}
