use anyhow::{Context, Result};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// 單一單元專用的暫存目錄，離開作用域時連同內容一起刪除
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    /// 在暫存根目錄下建立 `<unit_id>_<uuid>` 目錄，名稱保證不與其他單元重複
    pub fn create(temp_root: &Path, unit_id: &str) -> Result<Self> {
        let safe_id: String = unit_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let path = temp_root.join(format!("{safe_id}_{}", Uuid::new_v4().simple()));
        fs::create_dir_all(&path)
            .with_context(|| format!("無法建立暫存目錄: {}", path.display()))?;
        debug!("建立暫存目錄: {}", path.display());
        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.path.exists()
            && let Err(e) = fs::remove_dir_all(&self.path)
        {
            warn!("無法清理暫存目錄 {}: {e}", self.path.display());
        }
    }
}

/// 清除暫存根目錄下所有殘留項目（上次執行中斷留下的），回傳刪除數量
///
/// 只能在沒有單元執行中的時候呼叫。
pub fn sweep_temp_root(temp_root: &Path) -> Result<usize> {
    if !temp_root.exists() {
        fs::create_dir_all(temp_root)
            .with_context(|| format!("無法建立暫存根目錄: {}", temp_root.display()))?;
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(temp_root)
        .with_context(|| format!("無法讀取暫存根目錄: {}", temp_root.display()))?
    {
        let path = entry?.path();
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => warn!("無法刪除殘留暫存項目 {}: {e}", path.display()),
        }
    }

    if removed > 0 {
        debug!("已清除 {removed} 個殘留暫存項目");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_workspace_removed_on_drop() {
        let root = tempdir().unwrap();
        let path = {
            let ws = Workspace::create(root.path(), "42").unwrap();
            fs::write(ws.join("frame.jpg"), b"x").unwrap();
            assert!(ws.path().is_dir());
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_workspaces_are_unique() {
        let root = tempdir().unwrap();
        let a = Workspace::create(root.path(), "7").unwrap();
        let b = Workspace::create(root.path(), "7").unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_unit_id_is_sanitized() {
        let root = tempdir().unwrap();
        let ws = Workspace::create(root.path(), "../x").unwrap();
        assert_eq!(ws.path().parent(), Some(root.path()));
    }

    #[test]
    fn test_sweep_removes_leftovers() {
        let root = tempdir().unwrap();
        fs::create_dir_all(root.path().join("old_unit/nested")).unwrap();
        fs::write(root.path().join("stray.txt"), b"x").unwrap();

        assert_eq!(sweep_temp_root(root.path()).unwrap(), 2);
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_sweep_creates_missing_root() {
        let root = tempdir().unwrap();
        let temp_root = root.path().join(".tmp");
        assert_eq!(sweep_temp_root(&temp_root).unwrap(), 0);
        assert!(temp_root.is_dir());
    }
}
