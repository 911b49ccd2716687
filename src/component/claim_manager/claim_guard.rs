use super::main::{ClaimError, ClaimStore, ErrorTag};
use log::{debug, warn};

/// 認領期間的作用域守衛
///
/// 預設處置為「標記 fingerprint-error 後釋放」，只有呼叫 [`ClaimGuard::succeed`]
/// 才會改為單純釋放。沒有明確呼叫 [`ClaimGuard::release`] 時（包含 panic 展開），
/// 會在 `Drop` 中執行處置。
pub struct ClaimGuard<'a> {
    store: &'a dyn ClaimStore,
    unit_id: String,
    error: Option<ErrorTag>,
    done: bool,
}

impl<'a> ClaimGuard<'a> {
    /// 認領單元；失敗時不留下任何守衛
    pub fn acquire(store: &'a dyn ClaimStore, unit_id: &str) -> Result<Self, ClaimError> {
        store.claim(unit_id)?;
        debug!("unit {unit_id}: 已認領");
        Ok(Self {
            store,
            unit_id: unit_id.to_string(),
            error: Some(ErrorTag::Fingerprint),
            done: false,
        })
    }

    pub fn succeed(&mut self) {
        self.error = None;
    }

    pub fn fail(&mut self, tag: ErrorTag) {
        self.error = Some(tag);
    }

    /// 執行處置並回報結果
    pub fn release(mut self) -> Result<(), ClaimError> {
        self.done = true;
        self.dispose()
    }

    fn dispose(&self) -> Result<(), ClaimError> {
        match self.error {
            Some(tag) => {
                debug!("unit {}: 標記 {tag} 並釋放", self.unit_id);
                self.store.mark_error(&self.unit_id, tag)
            }
            None => {
                debug!("unit {}: 釋放", self.unit_id);
                self.store.release(&self.unit_id)
            }
        }
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if std::thread::panicking() {
            warn!("unit {}: 處理中發生 panic，仍執行釋放", self.unit_id);
        }
        let _ = self.dispose();
    }
}
