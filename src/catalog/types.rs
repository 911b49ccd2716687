use serde::{Deserialize, Serialize};

/// 目錄中的指紋類型名稱
pub const PHASH_FINGERPRINT: &str = "phash";
pub const OSHASH_FINGERPRINT: &str = "oshash";

/// 可處理的單元（目錄中的一個場景）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    #[serde(default)]
    pub files: Vec<UnitFile>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// 目錄提供的封面圖網址
    #[serde(default)]
    pub cover_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFile {
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub fingerprints: Vec<Fingerprint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl Unit {
    #[must_use]
    pub fn primary_file(&self) -> Option<&UnitFile> {
        self.files.first()
    }

    /// 感知指紋；缺少時代表此單元仍需處理
    #[must_use]
    pub fn phash(&self) -> Option<&str> {
        self.primary_file()
            .and_then(|f| f.fingerprint(PHASH_FINGERPRINT))
    }

    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// 主要檔案的檔名（不含目錄），供日誌使用
    #[must_use]
    pub fn display_name(&self) -> String {
        self.primary_file().map_or_else(
            || format!("unit {}", self.id),
            |f| file_base_name(&f.path).to_string(),
        )
    }
}

impl UnitFile {
    #[must_use]
    pub fn fingerprint(&self, kind: &str) -> Option<&str> {
        self.fingerprints
            .iter()
            .find(|fp| fp.kind.eq_ignore_ascii_case(kind) && !fp.value.is_empty())
            .map(|fp| fp.value.as_str())
    }

    #[must_use]
    pub fn base_name(&self) -> &str {
        file_base_name(&self.path)
    }
}

/// 同時接受 `/` 與 `\` 分隔的路徑
fn file_base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// 探索查詢條件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitFilter {
    /// 只要沒有感知指紋的單元
    pub fingerprint_missing: bool,
    /// 至少帶有其中一個標籤（空集合代表不限制）
    pub include_any_tags: Vec<String>,
    /// 不可帶有其中任何一個標籤
    pub exclude_tags: Vec<String>,
}

impl UnitFilter {
    #[must_use]
    pub fn matches(&self, unit: &Unit) -> bool {
        if self.fingerprint_missing && unit.phash().is_some() {
            return false;
        }
        if !self.include_any_tags.is_empty()
            && !self.include_any_tags.iter().any(|t| unit.has_tag(t))
        {
            return false;
        }
        !self.exclude_tags.iter().any(|t| unit.has_tag(t))
    }
}

/// 分頁，頁碼從 1 開始
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub number: usize,
    pub size: usize,
}

impl PageRequest {
    #[must_use]
    pub const fn new(number: usize, size: usize) -> Self {
        Self { number, size }
    }
}

/// 查詢結果：符合條件的總數與指定頁面內容
#[derive(Debug, Clone, Default)]
pub struct UnitPage {
    pub total: usize,
    pub units: Vec<Unit>,
}
