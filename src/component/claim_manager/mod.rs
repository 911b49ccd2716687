//! 以目錄標籤模擬的認領機制
//!
//! 這不是真正的互斥鎖：標籤寫入沒有跨節點的原子性保證，
//! 兩個節點仍可能同時認領同一個單元。

mod claim_guard;
mod main;

pub use claim_guard::ClaimGuard;
pub use main::{CatalogClaims, ClaimError, ClaimStore, ErrorTag};
