use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use sysinfo::System;

/// 預設每批處理的單元數量
pub const DEFAULT_BATCH_SIZE: usize = 25;

/// 每個衍生檔產生器內部平行擷取的寬度
pub const DEFAULT_INNER_WORKERS: usize = 4;

/// 單一單元的處理時間上限（秒）
pub const DEFAULT_UNIT_TIMEOUT_SECS: u64 = 600;

/// 硬體加速裝置預設路徑（強制開啟但偵測不到時使用）
pub const DEFAULT_ACCELERATION_DEVICE: &str = "/dev/dri/renderD128";

/// 執行期設定
///
/// 由 `settings.json` 載入，再套用命令列覆寫；之後以 `Arc<Config>` 共享，不再變動。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub catalog: CatalogSettings,
    pub tags: TagSettings,
    pub tools: ToolPaths,
    pub output: OutputSettings,
    pub batch: BatchSettings,
    pub generation: GenerationSettings,
    pub acceleration: AccelerationSettings,
    pub path_translations: Vec<PathTranslation>,
    pub dry_run: bool,
    pub filemask: Option<String>,
    pub retry_errors: bool,
}

impl Config {
    /// 實際同時執行的外部程序數量上限（外層寬度 × 內層寬度）
    #[must_use]
    pub const fn resource_pressure(&self) -> usize {
        self.batch.max_workers * self.batch.inner_workers
    }

    /// 依序套用路徑轉換，第一個符合的前綴生效
    #[must_use]
    pub fn translate_path(&self, catalog_path: &str) -> PathBuf {
        self.path_translations
            .iter()
            .find(|t| catalog_path.starts_with(&t.orig))
            .map_or_else(
                || PathBuf::from(catalog_path),
                |t| PathBuf::from(catalog_path.replacen(&t.orig, &t.local, 1)),
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// GraphQL 端點，例如 `http://192.168.1.71:9999/graphql`
    pub endpoint: String,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9999/graphql".to_string(),
            api_key: None,
            request_timeout_secs: 30,
            retry_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl CatalogSettings {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// 目錄中的標籤 ID，三者互斥
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagSettings {
    pub in_progress: String,
    pub fingerprint_error: String,
    pub cover_error: String,
}

impl Default for TagSettings {
    fn default() -> Self {
        Self {
            in_progress: "15015".to_string(),
            fingerprint_error: "15018".to_string(),
            cover_error: "15019".to_string(),
        }
    }
}

impl TagSettings {
    /// 任何一個都會讓單元被排除在一般探索之外
    #[must_use]
    pub fn blocking(&self) -> Vec<String> {
        vec![
            self.in_progress.clone(),
            self.fingerprint_error.clone(),
            self.cover_error.clone(),
        ]
    }

    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        vec![self.fingerprint_error.clone(), self.cover_error.clone()]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub fingerprint_binary: PathBuf,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub vainfo: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            fingerprint_binary: PathBuf::from("./bin/videohashes-linux"),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            vainfo: PathBuf::from("vainfo"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub mosaic_dir: PathBuf,
    pub preview_dir: PathBuf,
    pub temp_root: PathBuf,
    pub failure_log: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            mosaic_dir: PathBuf::from("generated/vtt"),
            preview_dir: PathBuf::from("generated/screenshots"),
            temp_root: PathBuf::from(".tmp"),
            failure_log: PathBuf::from("error_log.txt"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub max_workers: usize,
    pub inner_workers: usize,
    pub unit_timeout_secs: u64,
    pub round_delay_secs: u64,
    /// 只跑一輪就結束
    pub once: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_workers: default_worker_count(),
            inner_workers: DEFAULT_INNER_WORKERS,
            unit_timeout_secs: DEFAULT_UNIT_TIMEOUT_SECS,
            round_delay_secs: 5,
            once: false,
        }
    }
}

impl BatchSettings {
    #[must_use]
    pub const fn unit_timeout(&self) -> Duration {
        Duration::from_secs(self.unit_timeout_secs)
    }

    #[must_use]
    pub const fn round_delay(&self) -> Duration {
        Duration::from_secs(self.round_delay_secs)
    }
}

/// 以 CPU 數量作為外層工作者預設值
fn default_worker_count() -> usize {
    let mut system = System::new();
    system.refresh_cpu_all();
    system.cpus().len().max(1)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub mosaic: bool,
    pub preview: bool,
    pub preview_clips: usize,
    pub preview_clip_length: f64,
    pub preview_skip_seconds: f64,
    pub preview_audio: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            mosaic: false,
            preview: false,
            preview_clips: 15,
            preview_clip_length: 1.0,
            preview_skip_seconds: 15.0,
            preview_audio: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AccelerationMode {
    #[default]
    Auto,
    On,
    Off,
}

impl fmt::Display for AccelerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::On => write!(f, "on"),
            Self::Off => write!(f, "off"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccelerationSettings {
    pub mode: AccelerationMode,
    pub candidate_devices: Vec<PathBuf>,
    pub probe_timeout_secs: u64,
}

impl Default for AccelerationSettings {
    fn default() -> Self {
        Self {
            mode: AccelerationMode::Auto,
            candidate_devices: vec![
                PathBuf::from(DEFAULT_ACCELERATION_DEVICE),
                PathBuf::from("/dev/dri/card0"),
                PathBuf::from("/dev/dri/card1"),
            ],
            probe_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathTranslation {
    pub orig: String,
    pub local: String,
}

impl PathTranslation {
    #[must_use]
    pub fn new(orig: &str, local: &str) -> Self {
        Self {
            orig: orig.to_string(),
            local: local.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_path_first_match_wins() {
        let config = Config {
            path_translations: vec![
                PathTranslation::new("/data/", "/mnt/strangyr/"),
                PathTranslation::new("/data/sub/", "/mnt/other/"),
            ],
            ..Config::default()
        };

        assert_eq!(
            config.translate_path("/data/sub/a.mp4"),
            PathBuf::from("/mnt/strangyr/sub/a.mp4")
        );
        assert_eq!(
            config.translate_path("/elsewhere/a.mp4"),
            PathBuf::from("/elsewhere/a.mp4")
        );
    }

    #[test]
    fn test_translate_path_only_replaces_prefix_once() {
        let config = Config {
            path_translations: vec![PathTranslation::new("/x/", "/y/")],
            ..Config::default()
        };
        assert_eq!(config.translate_path("/x/x/v.mkv"), PathBuf::from("/y/x/v.mkv"));
    }

    #[test]
    fn test_resource_pressure() {
        let mut config = Config::default();
        config.batch.max_workers = 3;
        config.batch.inner_workers = 4;
        assert_eq!(config.resource_pressure(), 12);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"batch": {"batch_size": 10}, "acceleration": {"mode": "off"}}"#)
                .unwrap();
        assert_eq!(config.batch.batch_size, 10);
        assert_eq!(config.batch.inner_workers, DEFAULT_INNER_WORKERS);
        assert_eq!(config.acceleration.mode, AccelerationMode::Off);
        assert_eq!(config.tags.in_progress, "15015");
    }

    #[test]
    fn test_blocking_tags_contains_all_three() {
        let tags = TagSettings::default();
        let blocking = tags.blocking();
        assert_eq!(blocking.len(), 3);
        assert!(blocking.contains(&tags.in_progress));
        assert!(blocking.contains(&tags.fingerprint_error));
        assert!(blocking.contains(&tags.cover_error));
    }
}
