use super::error::CatalogError;
use super::types::{Fingerprint, PHASH_FINGERPRINT, PageRequest, Unit, UnitFilter, UnitPage};
use super::Catalog;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// 可注入失敗的目錄操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogOp {
    Query,
    Find,
    AddTag,
    RemoveTag,
    SetFingerprint,
    SetCover,
    NeedsCover,
}

/// 注入的失敗：`tag` 限定只影響特定標籤，`remaining` 為 `None` 時永久失敗
#[derive(Debug, Clone)]
pub struct Fault {
    pub op: CatalogOp,
    pub tag: Option<String>,
    pub remaining: Option<u32>,
}

impl Fault {
    #[must_use]
    pub const fn always(op: CatalogOp) -> Self {
        Self {
            op,
            tag: None,
            remaining: None,
        }
    }

    #[must_use]
    pub fn for_tag(op: CatalogOp, tag: &str) -> Self {
        Self {
            op,
            tag: Some(tag.to_string()),
            remaining: None,
        }
    }

    #[must_use]
    pub const fn times(mut self, count: u32) -> Self {
        self.remaining = Some(count);
        self
    }
}

/// 成功套用的寫入操作紀錄
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    AddTag { unit_id: String, tag: String },
    RemoveTag { unit_id: String, tag: String },
    SetFingerprint { file_id: String, value: String },
    SetCover { unit_id: String, bytes: usize },
}

#[derive(Default)]
struct MemoryState {
    units: Vec<Unit>,
    placeholder_covers: HashSet<String>,
    covers: HashMap<String, Vec<u8>>,
    faults: Vec<Fault>,
    mutations: Vec<Mutation>,
    query_count: usize,
}

impl MemoryState {
    fn check_fault(&mut self, op: CatalogOp, tag: Option<&str>) -> Result<(), CatalogError> {
        let position = self.faults.iter().position(|f| {
            f.op == op
                && f.remaining != Some(0)
                && f.tag.as_deref().is_none_or(|t| Some(t) == tag)
        });

        if let Some(index) = position {
            let fault = &mut self.faults[index];
            if let Some(remaining) = fault.remaining.as_mut() {
                *remaining -= 1;
            }
            return Err(CatalogError::Http(format!("injected failure: {op:?}")));
        }
        Ok(())
    }

    fn unit_mut(&mut self, unit_id: &str) -> Result<&mut Unit, CatalogError> {
        self.units
            .iter_mut()
            .find(|u| u.id == unit_id)
            .ok_or_else(|| CatalogError::NotFound(unit_id.to_string()))
    }
}

/// 記憶體內的目錄，供測試與離線演練使用
#[derive(Default)]
pub struct MemoryCatalog {
    state: Mutex<MemoryState>,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new(units: Vec<Unit>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                units,
                ..MemoryState::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn inject(&self, fault: Fault) {
        self.lock().faults.push(fault);
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// 將單元的封面標記為佔位圖
    pub fn mark_placeholder_cover(&self, unit_id: &str) {
        self.lock().placeholder_covers.insert(unit_id.to_string());
    }

    #[must_use]
    pub fn unit(&self, unit_id: &str) -> Option<Unit> {
        self.lock().units.iter().find(|u| u.id == unit_id).cloned()
    }

    #[must_use]
    pub fn units(&self) -> Vec<Unit> {
        self.lock().units.clone()
    }

    #[must_use]
    pub fn cover(&self, unit_id: &str) -> Option<Vec<u8>> {
        self.lock().covers.get(unit_id).cloned()
    }

    #[must_use]
    pub fn mutations(&self) -> Vec<Mutation> {
        self.lock().mutations.clone()
    }

    #[must_use]
    pub fn query_count(&self) -> usize {
        self.lock().query_count
    }
}

impl Catalog for MemoryCatalog {
    fn query_units(&self, filter: &UnitFilter, page: PageRequest) -> Result<UnitPage, CatalogError> {
        let mut state = self.lock();
        state.check_fault(CatalogOp::Query, None)?;
        state.query_count += 1;

        let matching: Vec<&Unit> = state.units.iter().filter(|u| filter.matches(u)).collect();
        let skip = page.number.saturating_sub(1) * page.size;
        Ok(UnitPage {
            total: matching.len(),
            units: matching
                .into_iter()
                .skip(skip)
                .take(page.size)
                .cloned()
                .collect(),
        })
    }

    fn find_unit(&self, unit_id: &str) -> Result<Option<Unit>, CatalogError> {
        let mut state = self.lock();
        state.check_fault(CatalogOp::Find, None)?;
        Ok(state.units.iter().find(|u| u.id == unit_id).cloned())
    }

    fn add_tag(&self, unit_id: &str, tag: &str) -> Result<(), CatalogError> {
        let mut state = self.lock();
        state.check_fault(CatalogOp::AddTag, Some(tag))?;
        let unit = state.unit_mut(unit_id)?;
        if !unit.has_tag(tag) {
            unit.tags.push(tag.to_string());
        }
        state.mutations.push(Mutation::AddTag {
            unit_id: unit_id.to_string(),
            tag: tag.to_string(),
        });
        Ok(())
    }

    fn remove_tag(&self, unit_id: &str, tag: &str) -> Result<(), CatalogError> {
        let mut state = self.lock();
        state.check_fault(CatalogOp::RemoveTag, Some(tag))?;
        state.unit_mut(unit_id)?.tags.retain(|t| t != tag);
        state.mutations.push(Mutation::RemoveTag {
            unit_id: unit_id.to_string(),
            tag: tag.to_string(),
        });
        Ok(())
    }

    fn set_fingerprint(&self, file_id: &str, value: &str) -> Result<(), CatalogError> {
        let mut state = self.lock();
        state.check_fault(CatalogOp::SetFingerprint, None)?;

        let file = state
            .units
            .iter_mut()
            .flat_map(|u| u.files.iter_mut())
            .find(|f| f.id == file_id)
            .ok_or_else(|| CatalogError::NotFound(file_id.to_string()))?;
        file.fingerprints
            .retain(|fp| !fp.kind.eq_ignore_ascii_case(PHASH_FINGERPRINT));
        file.fingerprints.push(Fingerprint {
            kind: PHASH_FINGERPRINT.to_string(),
            value: value.to_string(),
        });

        state.mutations.push(Mutation::SetFingerprint {
            file_id: file_id.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn set_cover_image(&self, unit_id: &str, jpeg: &[u8]) -> Result<(), CatalogError> {
        let mut state = self.lock();
        state.check_fault(CatalogOp::SetCover, None)?;
        state.unit_mut(unit_id)?;
        state.covers.insert(unit_id.to_string(), jpeg.to_vec());
        state.placeholder_covers.remove(unit_id);
        state.mutations.push(Mutation::SetCover {
            unit_id: unit_id.to_string(),
            bytes: jpeg.len(),
        });
        Ok(())
    }

    fn needs_cover(&self, unit: &Unit) -> Result<bool, CatalogError> {
        let mut state = self.lock();
        state.check_fault(CatalogOp::NeedsCover, None)?;
        Ok(state.placeholder_covers.contains(&unit.id))
    }
}
