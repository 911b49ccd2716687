//! 整合測試共用：記憶體目錄與可編排行為的假工具執行器

#![allow(dead_code)]

use scene_derivatives::catalog::{Fingerprint, MemoryCatalog, Unit, UnitFile};
use scene_derivatives::component::{CatalogClaims, ClaimStore, SceneProcessor};
use scene_derivatives::config::Config;
use scene_derivatives::tools::{
    CancelToken, CapabilityRecord, ToolError, ToolInvocation, ToolOutput, ToolRunner,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

pub const PHASH: &str = "0f1e2d3c4b5a6978";
pub const FINGERPRINT_TOOL: &str = "videohashes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Fail,
    /// 一直執行到被取消為止
    Hang,
    Panic,
}

/// 依程式名稱與參數決定的行為
#[derive(Debug, Clone)]
pub struct Rule {
    program: &'static str,
    output_contains: Option<String>,
    with_arg: Option<&'static str>,
    action: Action,
}

impl Rule {
    pub fn fail(program: &'static str) -> Self {
        Self::new(program, Action::Fail)
    }

    pub fn hang(program: &'static str) -> Self {
        Self::new(program, Action::Hang)
    }

    pub fn panic(program: &'static str) -> Self {
        Self::new(program, Action::Panic)
    }

    fn new(program: &'static str, action: Action) -> Self {
        Self {
            program,
            output_contains: None,
            with_arg: None,
            action,
        }
    }

    /// 只影響輸出路徑包含指定字串的呼叫
    pub fn on_output(mut self, needle: &str) -> Self {
        self.output_contains = Some(needle.to_string());
        self
    }

    pub fn with_arg(mut self, arg: &'static str) -> Self {
        self.with_arg = Some(arg);
        self
    }

    fn matches(&self, invocation: &ToolInvocation) -> bool {
        invocation.program_name() == self.program
            && self.with_arg.is_none_or(|a| invocation.has_arg(a))
            && self.output_contains.as_deref().is_none_or(|needle| {
                invocation
                    .last_arg()
                    .is_some_and(|p| p.to_string_lossy().contains(needle))
            })
    }
}

pub struct FakeRunner {
    pub duration: f64,
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<ToolInvocation>>,
    concat_lists: Mutex<Vec<String>>,
}

impl Default for FakeRunner {
    fn default() -> Self {
        Self {
            duration: 120.0,
            rules: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            concat_lists: Mutex::new(Vec::new()),
        }
    }
}

impl FakeRunner {
    pub fn add_rule(&self, rule: Rule) {
        self.rules.lock().unwrap().push(rule);
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<ToolInvocation> {
        self.calls()
            .into_iter()
            .filter(|c| c.program_name() == program)
            .collect()
    }

    /// 每次串接時清單檔的內容（工作目錄之後會被刪除）
    pub fn concat_lists(&self) -> Vec<String> {
        self.concat_lists.lock().unwrap().clone()
    }

    /// 馬賽克合成呼叫（帶有 -filter_complex）
    pub fn assembly_calls(&self) -> Vec<ToolInvocation> {
        self.calls_to("ffmpeg")
            .into_iter()
            .filter(|c| c.has_arg("-filter_complex"))
            .collect()
    }
}

impl ToolRunner for FakeRunner {
    fn run(&self, invocation: &ToolInvocation, cancel: &CancelToken) -> Result<ToolOutput, ToolError> {
        self.calls.lock().unwrap().push(invocation.clone());
        let program = invocation.program_name();

        let action = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.matches(invocation))
            .map(|r| r.action);

        match action {
            Some(Action::Fail) => {
                return Err(ToolError::Failed {
                    program,
                    code: Some(1),
                    stderr: "scripted failure".to_string(),
                });
            }
            Some(Action::Hang) => {
                while !cancel.is_cancelled() {
                    thread::sleep(Duration::from_millis(10));
                }
                return Err(ToolError::Cancelled { program });
            }
            Some(Action::Panic) => panic!("scripted panic in {program}"),
            None => {}
        }

        let stdout = match program.as_str() {
            FINGERPRINT_TOOL => format!(r#"{{"phash": "{PHASH}", "oshash": "x"}}"#),
            "ffprobe" => format!(
                r#"{{"format": {{"duration": "{}"}}, "streams": [{{"codec_type": "video", "width": 1920, "height": 1080}}]}}"#,
                self.duration
            ),
            "ffmpeg" => {
                if invocation.has_arg("concat")
                    && let Some(list) = invocation.value_after("-i")
                {
                    let text = fs::read_to_string(list).unwrap_or_default();
                    self.concat_lists.lock().unwrap().push(text);
                }
                if let Some(output) = invocation.last_arg() {
                    fs::write(output, b"\xff\xd8\xff\xe0fake").map_err(|e| ToolError::Failed {
                        program: program.clone(),
                        code: None,
                        stderr: e.to_string(),
                    })?;
                }
                String::new()
            }
            _ => {
                return Err(ToolError::Spawn {
                    program,
                    message: "not scripted".to_string(),
                });
            }
        };

        Ok(ToolOutput {
            stdout: stdout.into_bytes(),
            stderr: Vec::new(),
        })
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub catalog: Arc<MemoryCatalog>,
    pub runner: Arc<FakeRunner>,
    pub config: Config,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.tools.fingerprint_binary = PathBuf::from(FINGERPRINT_TOOL);
        config.output.temp_root = dir.path().join(".tmp");
        config.output.mosaic_dir = dir.path().join("vtt");
        config.output.preview_dir = dir.path().join("previews");
        config.output.failure_log = dir.path().join("error_log.txt");
        config.catalog.retry_backoff_ms = 0;
        config.batch.max_workers = 4;
        config.batch.round_delay_secs = 0;

        Self {
            dir,
            catalog: Arc::new(MemoryCatalog::default()),
            runner: Arc::new(FakeRunner::default()),
            config,
        }
    }

    pub fn with_units(mut self, units: Vec<Unit>) -> Self {
        self.catalog = Arc::new(MemoryCatalog::new(units));
        self
    }

    pub fn media_dir(&self) -> PathBuf {
        let dir = self.dir.path().join("media");
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// 建立一個實際存在的影片檔並回傳對應的單元
    pub fn video_unit(&self, id: &str) -> Unit {
        let path = self.media_dir().join(format!("scene_{id}.mp4"));
        fs::write(&path, b"video").unwrap();
        unit_at(id, &path)
    }

    pub fn claims(&self) -> Arc<dyn ClaimStore> {
        Arc::new(CatalogClaims::new(
            self.catalog.clone(),
            self.config.tags.clone(),
            &self.config.catalog,
            self.config.dry_run,
        ))
    }

    pub fn processor(&self, capability: &CapabilityRecord) -> SceneProcessor {
        SceneProcessor::new(
            Arc::new(self.config.clone()),
            self.catalog.clone(),
            self.claims(),
            self.runner.clone(),
            capability,
        )
    }

    pub fn tags_of(&self, unit_id: &str) -> Vec<String> {
        self.catalog.unit(unit_id).unwrap().tags
    }
}

pub fn unit_at(id: &str, path: &Path) -> Unit {
    Unit {
        id: id.to_string(),
        files: vec![UnitFile {
            id: format!("file-{id}"),
            path: path.to_string_lossy().to_string(),
            fingerprints: vec![Fingerprint {
                kind: "oshash".to_string(),
                value: format!("{id:0>16}"),
            }],
        }],
        tags: Vec::new(),
        cover_url: None,
    }
}

pub fn with_phash(mut unit: Unit) -> Unit {
    unit.files[0].fingerprints.push(Fingerprint {
        kind: "phash".to_string(),
        value: PHASH.to_string(),
    });
    unit
}
