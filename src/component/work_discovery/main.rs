use crate::catalog::{Catalog, CatalogError, PageRequest, Unit, UnitFilter, UnitPage};
use crate::config::{Config, TagSettings};
use crate::tools::FileMask;
use anyhow::{Context, Result};
use log::{debug, info};
use rand::Rng;
use std::sync::Arc;

/// 依總數與每頁大小計算頁數
#[must_use]
pub const fn page_count(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}

/// 工作探索
///
/// 先查第一頁取得符合條件的總數，再從所有頁面中均勻隨機挑選一頁，
/// 讓同時執行的多個節點分散到不同頁面。這只降低碰撞機率，無法完全避免。
pub struct WorkDiscovery {
    catalog: Arc<dyn Catalog>,
    tags: TagSettings,
    batch_size: usize,
    retry_errors: bool,
    filemask: Option<FileMask>,
}

impl WorkDiscovery {
    pub fn new(catalog: Arc<dyn Catalog>, config: &Config) -> Result<Self> {
        let filemask = config
            .filemask
            .as_deref()
            .map(FileMask::new)
            .transpose()
            .context("檔名過濾條件無效")?;

        Ok(Self {
            catalog,
            tags: config.tags.clone(),
            batch_size: config.batch.batch_size.max(1),
            retry_errors: config.retry_errors,
            filemask,
        })
    }

    /// 一般模式：沒有指紋且不帶任何阻擋標籤；重試模式：帶錯誤標籤且不在處理中
    #[must_use]
    pub fn filter(&self) -> UnitFilter {
        if self.retry_errors {
            UnitFilter {
                fingerprint_missing: false,
                include_any_tags: self.tags.errors(),
                exclude_tags: vec![self.tags.in_progress.clone()],
            }
        } else {
            UnitFilter {
                fingerprint_missing: true,
                include_any_tags: Vec::new(),
                exclude_tags: self.tags.blocking(),
            }
        }
    }

    pub fn discover(&self) -> Result<Vec<Unit>, CatalogError> {
        self.discover_with(&mut rand::rng())
    }

    pub fn discover_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<Unit>, CatalogError> {
        let filter = self.filter();
        let first = self.fetch_page(&filter, 1)?;
        if first.total == 0 {
            info!("沒有符合條件的單元");
            return Ok(Vec::new());
        }

        let pages = page_count(first.total, self.batch_size);
        let page = rng.random_range(1..=pages);
        info!(
            "符合條件 {} 個單元，共 {pages} 頁，選取第 {page} 頁",
            first.total
        );

        let units = if page == 1 {
            first.units
        } else {
            self.fetch_page(&filter, page)?.units
        };

        Ok(self.apply_filemask(units))
    }

    /// 取得指定頁面（頁碼從 1 開始）
    pub fn fetch_page(&self, filter: &UnitFilter, page: usize) -> Result<UnitPage, CatalogError> {
        debug!("查詢第 {page} 頁 (每頁 {})", self.batch_size);
        self.catalog
            .query_units(filter, PageRequest::new(page, self.batch_size))
    }

    /// 帶有任一錯誤標籤的第一頁，供清除錯誤標籤使用
    pub fn error_tagged_page(&self) -> Result<UnitPage, CatalogError> {
        let filter = UnitFilter {
            fingerprint_missing: false,
            include_any_tags: self.tags.errors(),
            exclude_tags: Vec::new(),
        };
        self.fetch_page(&filter, 1)
    }

    fn apply_filemask(&self, units: Vec<Unit>) -> Vec<Unit> {
        let Some(mask) = &self.filemask else {
            return units;
        };

        let before = units.len();
        let kept: Vec<Unit> = units
            .into_iter()
            .filter(|u| u.files.iter().any(|f| mask.matches(f.base_name())))
            .collect();
        debug!(
            "檔名過濾 {:?}: {before} -> {}",
            mask.pattern(),
            kept.len()
        );
        kept
    }
}
