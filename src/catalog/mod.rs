//! 共享媒體目錄
//!
//! 核心流程只透過 [`Catalog`] 存取目錄，正式環境使用 GraphQL 客戶端，
//! 測試使用記憶體實作。

mod error;
mod memory;
mod stash;
mod types;

pub use error::CatalogError;
pub use memory::{CatalogOp, Fault, MemoryCatalog, Mutation};
pub use stash::StashClient;
pub use types::{
    Fingerprint, OSHASH_FINGERPRINT, PHASH_FINGERPRINT, PageRequest, Unit, UnitFile, UnitFilter,
    UnitPage,
};

/// 目錄協作者介面
///
/// 所有操作皆為同步、可能失敗，且在單一操作層級上具冪等性
/// （重複加上已存在的標籤不會有任何效果）。
pub trait Catalog: Send + Sync {
    /// 依條件查詢，回傳符合條件的總數與指定頁面
    fn query_units(&self, filter: &UnitFilter, page: PageRequest)
    -> Result<UnitPage, CatalogError>;

    /// 以 ID 取得單元目前的狀態
    fn find_unit(&self, unit_id: &str) -> Result<Option<Unit>, CatalogError>;

    fn add_tag(&self, unit_id: &str, tag: &str) -> Result<(), CatalogError>;

    fn remove_tag(&self, unit_id: &str, tag: &str) -> Result<(), CatalogError>;

    /// 寫入檔案的感知指紋
    fn set_fingerprint(&self, file_id: &str, value: &str) -> Result<(), CatalogError>;

    /// 以 JPEG 位元組更新封面
    fn set_cover_image(&self, unit_id: &str, jpeg: &[u8]) -> Result<(), CatalogError>;

    /// 目錄目前提供的是否為預設佔位封面
    fn needs_cover(&self, unit: &Unit) -> Result<bool, CatalogError>;
}
