use crate::config::{AccelerationMode, AccelerationSettings, DEFAULT_ACCELERATION_DEVICE};
use crate::tools::process::{CancelToken, ToolInvocation, ToolRunner};
use log::{debug, info};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// vainfo 輸出必須同時包含的兩個標記
const VERSION_MARKER: &str = "VA-API version";
const DRIVER_MARKER: &str = "Driver version";

/// 硬體加速能力
///
/// 每次執行只建立一次，之後以值或參考傳給所有產生器；任何地方都不可重新偵測。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapabilityRecord {
    device: Option<PathBuf>,
}

impl CapabilityRecord {
    /// 軟體路徑
    #[must_use]
    pub const fn software() -> Self {
        Self { device: None }
    }

    #[must_use]
    pub fn accelerated(device: impl AsRef<Path>) -> Self {
        Self {
            device: Some(device.as_ref().to_path_buf()),
        }
    }

    #[must_use]
    pub const fn is_accelerated(&self) -> bool {
        self.device.is_some()
    }

    #[must_use]
    pub fn device(&self) -> Option<&Path> {
        self.device.as_deref()
    }
}

impl fmt::Display for CapabilityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.device {
            Some(device) => write!(f, "VAAPI ({})", device.display()),
            None => write!(f, "software"),
        }
    }
}

/// 依序探測候選裝置，回傳第一個同時通過兩個標記檢查的裝置
///
/// 任何探測錯誤（找不到工具、逾時、權限不足）都視為該裝置不可用。
pub fn detect(
    runner: &dyn ToolRunner,
    vainfo: &Path,
    candidates: &[PathBuf],
    probe_timeout: Duration,
) -> CapabilityRecord {
    for device in candidates {
        let invocation = ToolInvocation::new(vainfo)
            .args(["--display", "drm", "--device"])
            .arg(device.as_os_str());
        let cancel = CancelToken::with_timeout(probe_timeout);

        match runner.run(&invocation, &cancel) {
            Ok(output) => {
                let text = format!("{}{}", output.stdout_text(), output.stderr_text());
                if text.contains(VERSION_MARKER) && text.contains(DRIVER_MARKER) {
                    info!("偵測到硬體加速裝置: {}", device.display());
                    return CapabilityRecord::accelerated(device);
                }
                debug!("裝置缺少必要標記: {}", device.display());
            }
            Err(e) => debug!("裝置探測失敗 {}: {e}", device.display()),
        }
    }

    CapabilityRecord::software()
}

/// 依設定模式決定能力：`off` 不探測，`on` 強制開啟，`auto` 探測一次
pub fn resolve(
    runner: &dyn ToolRunner,
    vainfo: &Path,
    settings: &AccelerationSettings,
) -> CapabilityRecord {
    let timeout = Duration::from_secs(settings.probe_timeout_secs);
    match settings.mode {
        AccelerationMode::Off => CapabilityRecord::software(),
        AccelerationMode::Auto => detect(runner, vainfo, &settings.candidate_devices, timeout),
        AccelerationMode::On => {
            let detected = detect(runner, vainfo, &settings.candidate_devices, timeout);
            if detected.is_accelerated() {
                detected
            } else {
                CapabilityRecord::accelerated(DEFAULT_ACCELERATION_DEVICE)
            }
        }
    }
}
