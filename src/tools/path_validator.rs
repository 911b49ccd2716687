use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;
use uuid::Uuid;

pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("無法建立資料夾: {}", path.display()))?;
    }
    if !path.is_dir() {
        bail!("路徑不是資料夾: {}", path.display());
    }
    Ok(())
}

/// 以寫入再刪除一個探測檔的方式確認資料夾可寫入
pub fn check_directory_writable(path: &Path) -> Result<()> {
    ensure_directory_exists(path)?;
    let probe = path.join(format!(".write_probe_{}", Uuid::new_v4().simple()));
    fs::write(&probe, b"ok").with_context(|| format!("資料夾無法寫入: {}", path.display()))?;
    fs::remove_file(&probe).with_context(|| format!("無法刪除探測檔: {}", probe.display()))?;
    Ok(())
}

/// 檔案存在且（Unix 上）具有執行權限
pub fn check_executable(path: &Path) -> Result<()> {
    let metadata =
        fs::metadata(path).with_context(|| format!("找不到執行檔: {}", path.display()))?;
    if !metadata.is_file() {
        bail!("不是檔案: {}", path.display());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            bail!("沒有執行權限: {}", path.display());
        }
    }

    Ok(())
}
