//! 單元處理狀態機
//!
//! 檔案檢查 → 認領 → 指紋 → 封面 → 馬賽克 → 預覽 → 釋放
//!
//! 任何錯誤（包含 panic 與逾時）都不會離開這一層，一律轉換為 [`BatchOutcome`]。

mod main;
mod outcome;

pub use main::SceneProcessor;
pub use outcome::{BatchOutcome, Failure, FailureKind, Phase, UnitStatus};
