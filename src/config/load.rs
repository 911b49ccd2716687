use crate::config::types::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// 預設設定檔位置（目前工作目錄）
pub const DEFAULT_SETTINGS_PATH: &str = "settings.json";

impl Config {
    /// 載入設定檔；檔案不存在時使用預設值
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_SETTINGS_PATH));
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings from {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/settings.json"))).unwrap();
        assert_eq!(config.batch.batch_size, 25);
        assert!(!config.dry_run);
    }

    #[test]
    fn test_load_settings_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"dry_run": true, "tags": {{"in_progress": "7"}}, "path_translations": [{{"orig": "/data/", "local": "/mnt/"}}]}}"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert!(config.dry_run);
        assert_eq!(config.tags.in_progress, "7");
        assert_eq!(config.tags.cover_error, "15019");
        assert_eq!(config.path_translations.len(), 1);
    }

    #[test]
    fn test_load_invalid_json_fails() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(Config::load(Some(file.path())).is_err());
    }
}
