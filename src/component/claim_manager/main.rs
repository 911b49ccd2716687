use crate::catalog::{Catalog, CatalogError};
use crate::config::{CatalogSettings, TagSettings};
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// 錯誤標籤種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTag {
    Fingerprint,
    Cover,
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fingerprint => write!(f, "fingerprint-error"),
            Self::Cover => write!(f, "cover-error"),
        }
    }
}

#[derive(Debug, Error)]
#[error("{op} 失敗 (unit {unit_id}, 重試 {attempts} 次): {source}")]
pub struct ClaimError {
    pub op: &'static str,
    pub unit_id: String,
    pub attempts: u32,
    #[source]
    pub source: CatalogError,
}

/// 認領介面
pub trait ClaimStore: Send + Sync {
    /// 加上處理中標籤
    fn claim(&self, unit_id: &str) -> Result<(), ClaimError>;

    /// 移除處理中標籤
    fn release(&self, unit_id: &str) -> Result<(), ClaimError>;

    /// 加上錯誤標籤並移除處理中標籤
    fn mark_error(&self, unit_id: &str, tag: ErrorTag) -> Result<(), ClaimError>;

    /// 只加上錯誤標籤，處理中標籤保留（非關鍵失敗）
    fn flag_error(&self, unit_id: &str, tag: ErrorTag) -> Result<(), ClaimError>;

    /// 移除所有錯誤標籤
    fn clear_errors(&self, unit_id: &str) -> Result<(), ClaimError>;
}

/// 以目錄標籤實作的 [`ClaimStore`]，每個操作都有有限次數的重試
pub struct CatalogClaims {
    catalog: Arc<dyn Catalog>,
    tags: TagSettings,
    attempts: u32,
    backoff: Duration,
    dry_run: bool,
}

impl CatalogClaims {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        tags: TagSettings,
        settings: &CatalogSettings,
        dry_run: bool,
    ) -> Self {
        Self {
            catalog,
            tags,
            attempts: settings.retry_attempts.max(1),
            backoff: settings.retry_backoff(),
            dry_run,
        }
    }

    const fn tag_id(&self, tag: ErrorTag) -> &String {
        match tag {
            ErrorTag::Fingerprint => &self.tags.fingerprint_error,
            ErrorTag::Cover => &self.tags.cover_error,
        }
    }

    fn with_retry<F>(&self, op: &'static str, unit_id: &str, call: F) -> Result<(), ClaimError>
    where
        F: Fn() -> Result<(), CatalogError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call() {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.attempts => {
                    warn!("{op} 失敗 (unit {unit_id}, 第 {attempt} 次): {e}，稍後重試");
                    thread::sleep(self.backoff * attempt);
                }
                Err(e) => {
                    return Err(ClaimError {
                        op,
                        unit_id: unit_id.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }

    fn add(&self, op: &'static str, unit_id: &str, tag: &str) -> Result<(), ClaimError> {
        if self.dry_run {
            info!("[dry-run] 加上標籤 {tag} -> unit {unit_id}");
            return Ok(());
        }
        debug!("加上標籤 {tag} -> unit {unit_id}");
        self.with_retry(op, unit_id, || self.catalog.add_tag(unit_id, tag))
    }

    fn remove(&self, op: &'static str, unit_id: &str, tag: &str) -> Result<(), ClaimError> {
        if self.dry_run {
            info!("[dry-run] 移除標籤 {tag} <- unit {unit_id}");
            return Ok(());
        }
        debug!("移除標籤 {tag} <- unit {unit_id}");
        self.with_retry(op, unit_id, || self.catalog.remove_tag(unit_id, tag))
    }
}

impl ClaimStore for CatalogClaims {
    fn claim(&self, unit_id: &str) -> Result<(), ClaimError> {
        self.add("claim", unit_id, &self.tags.in_progress)
    }

    fn release(&self, unit_id: &str) -> Result<(), ClaimError> {
        self.remove("release", unit_id, &self.tags.in_progress)
            .inspect_err(|e| {
                error!("釋放失敗，unit {unit_id} 將停留在處理中狀態，需要人工移除標籤: {e}");
            })
    }

    fn mark_error(&self, unit_id: &str, tag: ErrorTag) -> Result<(), ClaimError> {
        let tagged = self.add("mark_error", unit_id, self.tag_id(tag));
        if let Err(e) = &tagged {
            error!("無法加上 {tag} 標籤 (unit {unit_id}): {e}");
        }
        self.release(unit_id)?;
        tagged
    }

    fn flag_error(&self, unit_id: &str, tag: ErrorTag) -> Result<(), ClaimError> {
        self.add("flag_error", unit_id, self.tag_id(tag))
    }

    fn clear_errors(&self, unit_id: &str) -> Result<(), ClaimError> {
        let fingerprint = self.remove("clear_errors", unit_id, &self.tags.fingerprint_error);
        let cover = self.remove("clear_errors", unit_id, &self.tags.cover_error);
        fingerprint.and(cover)
    }
}
