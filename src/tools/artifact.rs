use crate::catalog::{OSHASH_FINGERPRINT, UnitFile};
use std::path::{Path, PathBuf};

/// 衍生檔的檔名鍵值
///
/// 優先使用檔案的 oshash；沒有或含非法字元時，以路徑的 blake3 前 16 位代替。
#[must_use]
pub fn artifact_key(file: &UnitFile) -> String {
    file.fingerprint(OSHASH_FINGERPRINT)
        .filter(|v| v.chars().all(|c| c.is_ascii_alphanumeric()))
        .map_or_else(
            || {
                let hash = blake3::hash(file.path.as_bytes()).to_hex();
                hash[..16].to_string()
            },
            str::to_lowercase,
        )
}

/// 單一檔案所有衍生檔的輸出位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub sprite: PathBuf,
    pub sidecar: PathBuf,
    pub preview: PathBuf,
}

impl ArtifactPaths {
    #[must_use]
    pub fn new(key: &str, mosaic_dir: &Path, preview_dir: &Path) -> Self {
        Self {
            sprite: mosaic_dir.join(format!("{key}_sprite.jpg")),
            sidecar: mosaic_dir.join(format!("{key}_thumbs.vtt")),
            preview: preview_dir.join(format!("{key}.mp4")),
        }
    }

    /// 馬賽克圖與索引檔都已存在
    #[must_use]
    pub fn mosaic_exists(&self) -> bool {
        self.sprite.exists() && self.sidecar.exists()
    }

    #[must_use]
    pub fn preview_exists(&self) -> bool {
        self.preview.exists()
    }
}
