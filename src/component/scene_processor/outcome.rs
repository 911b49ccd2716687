use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    MissingFile,
    Claim,
    Fingerprint,
    Mosaic,
    Preview,
    /// 封面擷取或上傳失敗，不中斷流程
    Cover,
    Timeout,
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MissingFile => "missing_file",
            Self::Claim => "claim",
            Self::Fingerprint => "fingerprint",
            Self::Mosaic => "mosaic",
            Self::Preview => "preview",
            Self::Cover => "cover",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// 失敗發生的階段，寫入失敗紀錄檔
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    FileCheck,
    Claim,
    Setup,
    Fingerprint,
    Cover,
    Mosaic,
    Preview,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FileCheck => "file check",
            Self::Claim => "claim",
            Self::Setup => "setup",
            Self::Fingerprint => "fingerprint",
            Self::Cover => "cover",
            Self::Mosaic => "mosaic",
            Self::Preview => "preview",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub phase: Phase,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, phase: Phase, message: impl Into<String>) -> Self {
        Self {
            kind,
            phase,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    Success,
    /// 已有指紋且沒有待產生的衍生檔，未做任何修改
    Skipped,
    Failed(Failure),
}

/// 單一單元的處理結果
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub unit_id: String,
    /// 主要檔案的本機路徑
    pub file: String,
    pub status: UnitStatus,
    pub elapsed: Duration,
    /// 非關鍵問題（封面失敗、部分子工作失敗、釋放失敗）
    pub warnings: Vec<String>,
    /// 已加上 cover-error 標籤的封面失敗，同樣寫入失敗紀錄
    pub cover_failure: Option<Failure>,
}

impl BatchOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, UnitStatus::Success)
    }

    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self.status, UnitStatus::Skipped)
    }

    #[must_use]
    pub fn failure(&self) -> Option<&Failure> {
        match &self.status {
            UnitStatus::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure().map(|f| f.kind)
    }
}
