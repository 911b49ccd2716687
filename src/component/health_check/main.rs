use crate::catalog::{Catalog, PageRequest, UnitFilter};
use crate::config::Config;
use crate::tools::{
    CancelToken, CapabilityRecord, ToolInvocation, ToolRunner, check_directory_writable,
    check_executable,
};
use anyhow::{Result, bail};
use console::style;
use log::{error, info};
use std::fs::OpenOptions;
use std::path::Path;
use std::time::Duration;

const TOOL_VERSION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    fn from_result(name: &str, result: Result<String>) -> Self {
        match result {
            Ok(detail) => Self {
                name: name.to_string(),
                passed: true,
                detail,
            },
            Err(e) => Self {
                name: name.to_string(),
                passed: false,
                detail: format!("{e:#}"),
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    pub checks: Vec<CheckResult>,
}

impl HealthReport {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    #[must_use]
    pub fn failures(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    pub fn print(&self) {
        println!("{}", style("=== 健康檢查 ===").cyan().bold());
        for check in &self.checks {
            let mark = if check.passed {
                style("✓").green()
            } else {
                style("✗").red()
            };
            println!("  {mark} {:<16} {}", check.name, style(&check.detail).dim());
        }
    }

    /// 有任何失敗時回傳錯誤
    pub fn ensure_healthy(&self) -> Result<()> {
        if self.is_healthy() {
            info!("健康檢查通過");
            return Ok(());
        }
        let names: Vec<&str> = self.failures().iter().map(|c| c.name.as_str()).collect();
        error!("健康檢查失敗: {}", names.join(", "));
        bail!("健康檢查失敗: {}", names.join(", "))
    }
}

pub fn run_health_check(
    config: &Config,
    catalog: &dyn Catalog,
    runner: &dyn ToolRunner,
    capability: &CapabilityRecord,
) -> HealthReport {
    let mut checks = vec![
        CheckResult::from_result("catalog", check_catalog(catalog)),
        CheckResult::from_result(
            "fingerprint tool",
            check_executable(&config.tools.fingerprint_binary)
                .map(|()| config.tools.fingerprint_binary.display().to_string()),
        ),
        CheckResult::from_result("ffmpeg", check_tool_version(runner, &config.tools.ffmpeg)),
        CheckResult::from_result("ffprobe", check_tool_version(runner, &config.tools.ffprobe)),
    ];

    if config.generation.mosaic {
        checks.push(CheckResult::from_result(
            "mosaic dir",
            writable(&config.output.mosaic_dir),
        ));
    }
    if config.generation.preview {
        checks.push(CheckResult::from_result(
            "preview dir",
            writable(&config.output.preview_dir),
        ));
    }
    checks.push(CheckResult::from_result(
        "temp dir",
        writable(&config.output.temp_root),
    ));

    if let Some(device) = capability.device() {
        checks.push(CheckResult::from_result(
            "acceleration",
            check_device(device),
        ));
    }

    HealthReport { checks }
}

fn check_catalog(catalog: &dyn Catalog) -> Result<String> {
    let page = catalog.query_units(&UnitFilter::default(), PageRequest::new(1, 1))?;
    Ok(format!("{} 個單元", page.total))
}

/// 執行 `<tool> -version`，回傳第一行
fn check_tool_version(runner: &dyn ToolRunner, program: &Path) -> Result<String> {
    let invocation = ToolInvocation::new(program).arg("-version");
    let output = runner.run(&invocation, &CancelToken::with_timeout(TOOL_VERSION_TIMEOUT))?;
    Ok(output
        .stdout_text()
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string())
}

fn writable(path: &Path) -> Result<String> {
    check_directory_writable(path)?;
    Ok(path.display().to_string())
}

fn check_device(device: &Path) -> Result<String> {
    OpenOptions::new().read(true).write(true).open(device)?;
    Ok(device.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogOp, Fault, MemoryCatalog};
    use crate::tools::{ToolError, ToolOutput};
    use tempfile::tempdir;

    struct VersionRunner;

    impl ToolRunner for VersionRunner {
        fn run(&self, invocation: &ToolInvocation, _: &CancelToken) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput {
                stdout: format!("{} version 6.1\nconfiguration: ...", invocation.program_name())
                    .into_bytes(),
                stderr: Vec::new(),
            })
        }
    }

    fn config(root: &Path) -> Config {
        let mut config = Config::default();
        config.output.temp_root = root.join(".tmp");
        config.output.mosaic_dir = root.join("vtt");
        config.generation.mosaic = true;
        config.tools.fingerprint_binary = root.join("missing-binary");
        config
    }

    #[test]
    fn test_reports_every_failure() {
        let dir = tempdir().unwrap();
        let catalog = MemoryCatalog::default();
        catalog.inject(Fault::always(CatalogOp::Query));

        let report = run_health_check(
            &config(dir.path()),
            &catalog,
            &VersionRunner,
            &CapabilityRecord::software(),
        );

        let failed: Vec<&str> = report.failures().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(failed, vec!["catalog", "fingerprint tool"]);
        assert!(!report.is_healthy());
        assert!(report.ensure_healthy().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_healthy_environment() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        let binary = dir.path().join("videohashes");
        std::fs::write(&binary, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
        config.tools.fingerprint_binary = binary;

        let report = run_health_check(
            &config,
            &MemoryCatalog::default(),
            &VersionRunner,
            &CapabilityRecord::software(),
        );

        assert!(report.is_healthy(), "{:?}", report.failures());
        let ffmpeg = report.checks.iter().find(|c| c.name == "ffmpeg").unwrap();
        assert_eq!(ffmpeg.detail, "ffmpeg version 6.1");
        assert!(report.checks.iter().all(|c| c.name != "acceleration"));
    }

    #[test]
    fn test_missing_device_fails() {
        let dir = tempdir().unwrap();
        let report = run_health_check(
            &config(dir.path()),
            &MemoryCatalog::default(),
            &VersionRunner,
            &CapabilityRecord::accelerated(dir.path().join("renderD999")),
        );
        assert!(report.failures().iter().any(|c| c.name == "acceleration"));
    }
}
