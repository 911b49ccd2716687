//! 單元處理流程的整合測試：每條路徑都必須釋放認領

mod common;

use common::{Harness, Rule, FINGERPRINT_TOOL, PHASH, with_phash};
use scene_derivatives::catalog::{CatalogOp, Fault, Mutation};
use scene_derivatives::component::{FailureKind, MosaicGenerator};
use scene_derivatives::config::AccelerationMode;
use scene_derivatives::tools::{ArtifactPaths, CancelToken, CapabilityRecord, Workspace, artifact_key};
use std::time::{Duration, Instant};

fn generating_harness() -> Harness {
    let mut harness = Harness::new();
    harness.config.generation.mosaic = true;
    harness.config.generation.preview = true;
    harness
}

fn assert_released(harness: &Harness, unit_id: &str) {
    let tags = harness.tags_of(unit_id);
    assert!(
        !tags.contains(&harness.config.tags.in_progress),
        "unit {unit_id} still claimed: {tags:?}"
    );
}

#[test]
fn test_full_pipeline_success() {
    let base = generating_harness();
    let unit = base.video_unit("1");
    let harness = base.with_units(vec![unit.clone()]);

    let outcome = harness.processor(&CapabilityRecord::software()).process(&unit);

    assert!(outcome.is_success(), "{outcome:?}");
    assert_released(&harness, "1");
    assert!(harness.tags_of("1").is_empty());
    assert_eq!(harness.catalog.unit("1").unwrap().phash(), Some(PHASH));

    let paths = ArtifactPaths::new(
        &artifact_key(&unit.files[0]),
        &harness.config.output.mosaic_dir,
        &harness.config.output.preview_dir,
    );
    assert!(paths.sprite.is_file());
    assert!(paths.sidecar.is_file());
    assert!(paths.preview.is_file());

    // 工作目錄已被移除
    let leftovers = std::fs::read_dir(&harness.config.output.temp_root).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[test]
fn test_release_on_every_failure_path() {
    struct Case {
        name: &'static str,
        setup: fn(&Harness),
        expected: Option<FailureKind>,
        tag: Option<fn(&Harness) -> String>,
    }

    let fingerprint_tag: fn(&Harness) -> String = |h| h.config.tags.fingerprint_error.clone();
    let cover_tag: fn(&Harness) -> String = |h| h.config.tags.cover_error.clone();

    let cases = [
        Case {
            name: "fingerprint tool fails",
            setup: |h| h.runner.add_rule(Rule::fail(FINGERPRINT_TOOL)),
            expected: Some(FailureKind::Fingerprint),
            tag: Some(fingerprint_tag),
        },
        Case {
            name: "fingerprint write fails",
            setup: |h| h.catalog.inject(Fault::always(CatalogOp::SetFingerprint)),
            expected: Some(FailureKind::Fingerprint),
            tag: Some(fingerprint_tag),
        },
        Case {
            name: "fingerprint tool panics",
            setup: |h| h.runner.add_rule(Rule::panic(FINGERPRINT_TOOL)),
            expected: Some(FailureKind::Internal),
            tag: Some(fingerprint_tag),
        },
        Case {
            name: "cover extraction fails",
            setup: |h| {
                h.catalog.mark_placeholder_cover("1");
                h.runner.add_rule(Rule::fail("ffmpeg").on_output("cover.jpg"));
            },
            expected: None,
            tag: Some(cover_tag),
        },
        Case {
            name: "cover upload fails",
            setup: |h| {
                h.catalog.mark_placeholder_cover("1");
                h.catalog.inject(Fault::always(CatalogOp::SetCover));
            },
            expected: None,
            tag: Some(cover_tag),
        },
        Case {
            name: "cover status unknown",
            setup: |h| h.catalog.inject(Fault::always(CatalogOp::NeedsCover)),
            expected: None,
            tag: None,
        },
        Case {
            name: "probe fails",
            setup: |h| h.runner.add_rule(Rule::fail("ffprobe")),
            expected: Some(FailureKind::Mosaic),
            tag: Some(fingerprint_tag),
        },
        Case {
            name: "every frame fails",
            setup: |h| h.runner.add_rule(Rule::fail("ffmpeg").on_output("frame_")),
            expected: Some(FailureKind::Mosaic),
            tag: Some(fingerprint_tag),
        },
        Case {
            name: "mosaic assembly fails",
            setup: |h| h.runner.add_rule(Rule::fail("ffmpeg").with_arg("-filter_complex")),
            expected: Some(FailureKind::Mosaic),
            tag: Some(fingerprint_tag),
        },
        Case {
            name: "every clip fails",
            setup: |h| h.runner.add_rule(Rule::fail("ffmpeg").on_output("clip_")),
            expected: Some(FailureKind::Preview),
            tag: Some(fingerprint_tag),
        },
        Case {
            name: "concatenation fails",
            setup: |h| h.runner.add_rule(Rule::fail("ffmpeg").with_arg("concat")),
            expected: Some(FailureKind::Preview),
            tag: Some(fingerprint_tag),
        },
        Case {
            name: "release needs a retry",
            setup: |h| {
                let tag = h.config.tags.in_progress.clone();
                h.catalog.inject(Fault::for_tag(CatalogOp::RemoveTag, &tag).times(1));
            },
            expected: None,
            tag: None,
        },
        Case {
            name: "refresh after claim fails",
            setup: |h| h.catalog.inject(Fault::always(CatalogOp::Find)),
            expected: None,
            tag: None,
        },
    ];

    for case in cases {
        let base = generating_harness();
        let unit = base.video_unit("1");
        let harness = base.with_units(vec![unit.clone()]);
        (case.setup)(&harness);

        let outcome = harness.processor(&CapabilityRecord::software()).process(&unit);

        assert_eq!(outcome.failure_kind(), case.expected, "case: {}", case.name);
        assert_released(&harness, "1");
        let expected_tags: Vec<String> = case.tag.map(|f| f(&harness)).into_iter().collect();
        assert_eq!(harness.tags_of("1"), expected_tags, "case: {}", case.name);
    }
}

#[test]
fn test_missing_file_is_tagged_without_claim() {
    let harness = Harness::new();
    let unit = common::unit_at("7", &harness.dir.path().join("gone.mp4"));
    let harness = harness.with_units(vec![unit.clone()]);

    let outcome = harness.processor(&CapabilityRecord::software()).process(&unit);

    assert_eq!(outcome.failure_kind(), Some(FailureKind::MissingFile));
    assert_eq!(
        harness.catalog.mutations(),
        vec![Mutation::AddTag {
            unit_id: "7".to_string(),
            tag: harness.config.tags.fingerprint_error.clone(),
        }]
    );
    assert!(harness.runner.calls().is_empty());
}

#[test]
fn test_claim_failure_touches_nothing() {
    let base = Harness::new();
    let unit = base.video_unit("1");
    let harness = base.with_units(vec![unit.clone()]);
    let tag = harness.config.tags.in_progress.clone();
    harness.catalog.inject(Fault::for_tag(CatalogOp::AddTag, &tag));

    let outcome = harness.processor(&CapabilityRecord::software()).process(&unit);

    assert_eq!(outcome.failure_kind(), Some(FailureKind::Claim));
    assert!(harness.catalog.mutations().is_empty());
    assert!(harness.runner.calls().is_empty());
}

#[test]
fn test_second_run_is_a_no_op() {
    let base = generating_harness();
    let unit = base.video_unit("1");
    let harness = base.with_units(vec![unit.clone()]);
    let processor = harness.processor(&CapabilityRecord::software());

    assert!(processor.process(&unit).is_success());
    let mutations = harness.catalog.mutations().len();
    let calls = harness.runner.calls().len();

    let refreshed = harness.catalog.unit("1").unwrap();
    let outcome = processor.process(&refreshed);

    assert!(outcome.is_skipped());
    assert_eq!(harness.catalog.mutations().len(), mutations);
    assert_eq!(harness.runner.calls().len(), calls);
}

#[test]
fn test_stale_discovery_result_is_refreshed_after_claim() {
    let base = Harness::new();
    let unit = base.video_unit("1");
    // 目錄中已有指紋，但探索結果是舊的
    let harness = base.with_units(vec![with_phash(unit.clone())]);

    let outcome = harness.processor(&CapabilityRecord::software()).process(&unit);

    assert!(outcome.is_success());
    assert!(harness.runner.calls_to(FINGERPRINT_TOOL).is_empty());
    assert!(
        !harness
            .catalog
            .mutations()
            .iter()
            .any(|m| matches!(m, Mutation::SetFingerprint { .. }))
    );
}

#[test]
fn test_dry_run_mutates_nothing() {
    let mut base = generating_harness();
    base.config.dry_run = true;
    let unit = base.video_unit("1");
    let harness = base.with_units(vec![unit.clone()]);
    harness.catalog.mark_placeholder_cover("1");

    let outcome = harness.processor(&CapabilityRecord::software()).process(&unit);

    assert!(outcome.is_success());
    assert!(harness.catalog.mutations().is_empty());
    assert!(harness.runner.calls().is_empty());
}

#[test]
fn test_cover_falls_back_to_earlier_offset() {
    let base = Harness::new();
    let unit = base.video_unit("1");
    let harness = base.with_units(vec![unit.clone()]);
    harness.catalog.mark_placeholder_cover("1");
    harness
        .runner
        .add_rule(Rule::fail("ffmpeg").on_output("cover.jpg").with_arg("30"));

    let outcome = harness.processor(&CapabilityRecord::software()).process(&unit);

    assert!(outcome.is_success());
    assert!(harness.catalog.cover("1").is_some());
    assert!(harness.tags_of("1").is_empty());
    assert_eq!(harness.runner.calls_to("ffmpeg").len(), 2);
}

#[test]
fn test_few_frame_failures_still_succeed() {
    let mut base = Harness::new();
    base.config.generation.mosaic = true;
    let unit = base.video_unit("1");
    let harness = base.with_units(vec![unit.clone()]);
    for frame in ["frame_000", "frame_040", "frame_080"] {
        harness.runner.add_rule(Rule::fail("ffmpeg").on_output(frame));
    }

    let outcome = harness.processor(&CapabilityRecord::software()).process(&unit);

    assert!(outcome.is_success(), "{outcome:?}");
    let assembly = harness.runner.assembly_calls();
    assert_eq!(assembly.len(), 1);
    let placeholders = assembly[0]
        .args
        .iter()
        .filter(|a| a.to_string_lossy().starts_with("color=c=black"))
        .count();
    assert_eq!(placeholders, 3);
}

#[test]
fn test_all_frame_failures_fail_the_unit() {
    let mut base = Harness::new();
    base.config.generation.mosaic = true;
    let unit = base.video_unit("1");
    let harness = base.with_units(vec![unit.clone()]);
    harness.runner.add_rule(Rule::fail("ffmpeg").on_output("frame_"));

    let outcome = harness.processor(&CapabilityRecord::software()).process(&unit);

    assert_eq!(outcome.failure_kind(), Some(FailureKind::Mosaic));
    assert!(harness.runner.assembly_calls().is_empty());
    assert_released(&harness, "1");
}

#[test]
fn test_unit_timeout_releases_claim() {
    let mut base = Harness::new();
    base.config.generation.mosaic = true;
    base.config.batch.unit_timeout_secs = 1;
    let unit = base.video_unit("1");
    let harness = base.with_units(vec![unit.clone()]);
    harness.runner.add_rule(Rule::hang("ffmpeg"));

    let started = Instant::now();
    let outcome = harness.processor(&CapabilityRecord::software()).process(&unit);

    assert_eq!(outcome.failure_kind(), Some(FailureKind::Timeout));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_released(&harness, "1");
    assert_eq!(
        harness.tags_of("1"),
        vec![harness.config.tags.fingerprint_error.clone()]
    );
}

#[test]
fn test_software_capability_wins_over_forced_acceleration() {
    let mut base = Harness::new();
    base.config.generation.mosaic = true;
    base.config.generation.preview = true;
    base.config.acceleration.mode = AccelerationMode::On;
    let unit = base.video_unit("1");
    let harness = base.with_units(vec![unit.clone()]);

    let outcome = harness.processor(&CapabilityRecord::software()).process(&unit);

    assert!(outcome.is_success());
    for call in harness.runner.calls_to("ffmpeg") {
        assert!(!call.has_arg("-vaapi_device"), "{call}");
        assert!(!call.has_arg("mjpeg_vaapi"), "{call}");
        assert!(!call.has_arg("h264_vaapi"), "{call}");
    }
    assert!(harness.runner.assembly_calls()[0].has_arg("mjpeg"));
}

#[test]
fn test_accelerated_generator_uses_device_for_every_stage() {
    let harness = Harness::new();
    let video = harness.video_unit("1");
    let video_path = std::path::PathBuf::from(&video.files[0].path);
    let generator = MosaicGenerator::new(
        harness.runner.clone(),
        &harness.config.tools,
        CapabilityRecord::accelerated("/dev/dri/renderD128"),
        4,
    );
    let workspace = Workspace::create(&harness.config.output.temp_root, "1").unwrap();
    let paths = ArtifactPaths::new(
        "abc",
        &harness.config.output.mosaic_dir,
        &harness.config.output.preview_dir,
    );

    let report = generator
        .generate(&video_path, workspace.path(), &paths, &CancelToken::new())
        .unwrap();

    assert_eq!(report.succeeded, report.total);
    let ffmpeg_calls = harness.runner.calls_to("ffmpeg");
    assert!(ffmpeg_calls.iter().all(|c| c.has_arg("-vaapi_device")));
    assert!(harness.runner.assembly_calls()[0].has_arg("mjpeg_vaapi"));
}

#[test]
fn test_preview_concatenates_only_successful_clips() {
    let mut base = Harness::new();
    base.config.generation.preview = true;
    let unit = base.video_unit("1");
    let harness = base.with_units(vec![unit.clone()]);
    for clip in ["clip_003", "clip_007"] {
        harness.runner.add_rule(Rule::fail("ffmpeg").on_output(clip));
    }

    let outcome = harness.processor(&CapabilityRecord::software()).process(&unit);

    assert!(outcome.is_success(), "{outcome:?}");
    let lists = harness.runner.concat_lists();
    assert_eq!(lists.len(), 1);
    let entries: Vec<&str> = lists[0].lines().collect();
    assert_eq!(entries.len(), 13);
    assert!(entries.iter().all(|l| l.starts_with("file '")));
    assert!(!lists[0].contains("clip_003") && !lists[0].contains("clip_007"));

    let paths = ArtifactPaths::new(
        &artifact_key(&unit.files[0]),
        &harness.config.output.mosaic_dir,
        &harness.config.output.preview_dir,
    );
    assert!(paths.preview.is_file());
}
