mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{ImageBuffer, Rgba};

use common::{minimal_config, write_test_image, RecordingApplier, StubTemplateEngine};
use wallwright::config::OutputFormat;
use wallwright::error::ErrorKind;
use wallwright::orchestrator::{OrchestrationOptions, Orchestrator};
use wallwright::reporter::{InProcessReporter, NoopReporter, ProgressStatus};

#[test]
fn cold_run_mirrors_artifacts_into_the_requested_output_directories() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.png");
    write_test_image(&source);

    let config = minimal_config(&dir.path().join("cache"), &dir.path().join("templates"));
    let orchestrator = Orchestrator::new(config, Arc::new(RecordingApplier::new(false)), Arc::new(StubTemplateEngine::json_only())).unwrap();

    let mut options = OrchestrationOptions::new(Arc::new(NoopReporter));
    options.output_palette_dir = Some(dir.path().join("out-palette"));
    options.output_variants_dir = Some(dir.path().join("out-variants"));

    let result = orchestrator.orchestrate(&source, options).unwrap();
    assert!(!result.from_cache);
    assert!(result.palette_output_set.contains_key(&OutputFormat::Json));

    assert!(dir.path().join("out-palette/colors.json").exists());
    assert!(dir.path().join("out-variants/grayscale.png").exists());
}

#[test]
fn a_fresh_orchestrator_over_the_same_cache_root_serves_a_prior_commit() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.png");
    write_test_image(&source);

    let cache_root = dir.path().join("cache");
    let templates_dir = dir.path().join("templates");

    let first = Orchestrator::new(minimal_config(&cache_root, &templates_dir), Arc::new(RecordingApplier::new(false)), Arc::new(StubTemplateEngine::json_only())).unwrap();
    let first_result = first.orchestrate(&source, OrchestrationOptions::new(Arc::new(NoopReporter))).unwrap();
    assert!(!first_result.from_cache);

    // A brand new `Orchestrator` instance (as a fresh process invocation
    // would construct) reopens the same on-disk cache directory.
    let second = Orchestrator::new(minimal_config(&cache_root, &templates_dir), Arc::new(RecordingApplier::new(false)), Arc::new(StubTemplateEngine::json_only())).unwrap();
    let second_result = second.orchestrate(&source, OrchestrationOptions::new(Arc::new(NoopReporter))).unwrap();

    assert!(second_result.from_cache);
    assert_eq!(first_result.palette.colors, second_result.palette.colors);
}

#[test]
fn zero_configured_variants_still_produces_a_palette_and_applies() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.png");
    write_test_image(&source);

    let mut config = minimal_config(&dir.path().join("cache"), &dir.path().join("templates"));
    config.variants = Vec::new();

    let orchestrator = Orchestrator::new(config, Arc::new(RecordingApplier::new(false)), Arc::new(StubTemplateEngine::json_only())).unwrap();
    let result = orchestrator.orchestrate(&source, OrchestrationOptions::new(Arc::new(NoopReporter))).unwrap();

    assert!(result.applied);
    assert!(result.variant_set.is_empty());
}

#[test]
fn force_rebuild_recomputes_even_when_the_cache_is_warm() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.png");
    write_test_image(&source);

    let config = minimal_config(&dir.path().join("cache"), &dir.path().join("templates"));
    let orchestrator = Orchestrator::new(config, Arc::new(RecordingApplier::new(false)), Arc::new(StubTemplateEngine::json_only())).unwrap();

    orchestrator.orchestrate(&source, OrchestrationOptions::new(Arc::new(NoopReporter))).unwrap();

    let mut options = OrchestrationOptions::new(Arc::new(NoopReporter));
    options.force_rebuild = true;
    let result = orchestrator.orchestrate(&source, options).unwrap();
    assert!(!result.from_cache);
}

#[test]
fn the_reporter_receives_a_terminal_complete_event() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.png");
    write_test_image(&source);

    let config = minimal_config(&dir.path().join("cache"), &dir.path().join("templates"));
    let orchestrator = Orchestrator::new(config, Arc::new(RecordingApplier::new(false)), Arc::new(StubTemplateEngine::json_only())).unwrap();

    let complete_events = Arc::new(AtomicUsize::new(0));
    let complete_events2 = Arc::clone(&complete_events);
    let reporter = InProcessReporter::new(
        move |_step, _frac, status| {
            if status == ProgressStatus::Complete {
                complete_events2.fetch_add(1, Ordering::SeqCst);
            }
        },
        |_step, _err| {},
    );

    let result = orchestrator.orchestrate(&source, OrchestrationOptions::new(Arc::new(reporter))).unwrap();
    assert!(result.applied);
    assert_eq!(complete_events.load(Ordering::SeqCst), 1);
}

#[test]
fn an_apply_failure_on_a_warm_run_is_reported_but_does_not_fail_the_call() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.png");
    write_test_image(&source);

    let config = minimal_config(&dir.path().join("cache"), &dir.path().join("templates"));
    let orchestrator = Orchestrator::new(config, Arc::new(RecordingApplier::new(true)), Arc::new(StubTemplateEngine::json_only())).unwrap();

    orchestrator.orchestrate(&source, OrchestrationOptions::new(Arc::new(NoopReporter))).unwrap();
    let warm = orchestrator.orchestrate(&source, OrchestrationOptions::new(Arc::new(NoopReporter))).unwrap();

    assert!(warm.from_cache);
    assert!(!warm.applied);
    assert!(!warm.warnings.is_empty());
}

#[test]
fn different_source_images_do_not_collide_in_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.png");
    let b = dir.path().join("b.png");
    write_test_image(&a);
    common::write_distinct_image(&b);

    let config = minimal_config(&dir.path().join("cache"), &dir.path().join("templates"));
    let orchestrator = Orchestrator::new(config, Arc::new(RecordingApplier::new(false)), Arc::new(StubTemplateEngine::json_only())).unwrap();

    let result_a = orchestrator.orchestrate(&a, OrchestrationOptions::new(Arc::new(NoopReporter))).unwrap();
    let result_b = orchestrator.orchestrate(&b, OrchestrationOptions::new(Arc::new(NoopReporter))).unwrap();

    assert_ne!(result_a.palette.colors, result_b.palette.colors);
}

#[test]
fn an_apply_failure_on_a_cold_run_still_returns_the_committed_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.png");
    write_test_image(&source);

    let config = minimal_config(&dir.path().join("cache"), &dir.path().join("templates"));
    let orchestrator = Orchestrator::new(config, Arc::new(RecordingApplier::new(true)), Arc::new(StubTemplateEngine::json_only())).unwrap();

    let result = orchestrator.orchestrate(&source, OrchestrationOptions::new(Arc::new(NoopReporter))).unwrap();
    assert!(!result.applied);
    assert!(!result.warnings.is_empty());
    assert_eq!(result.variant_set.len(), 1);
}

#[test]
fn an_undecodable_image_fails_fast_with_image_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let bogus = dir.path().join("not-an-image.png");
    std::fs::write(&bogus, b"not a real image").unwrap();

    let config = minimal_config(&dir.path().join("cache"), &dir.path().join("templates"));
    let orchestrator = Orchestrator::new(config, Arc::new(RecordingApplier::new(false)), Arc::new(StubTemplateEngine::json_only())).unwrap();

    let err = orchestrator.orchestrate(&bogus, OrchestrationOptions::new(Arc::new(NoopReporter))).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ImageInvalid));
}

#[test]
fn a_single_pixel_image_still_produces_a_full_palette() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.png");
    let img: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_fn(1, 1, |_, _| Rgba([120, 60, 200, 255]));
    img.save(&source).unwrap();

    let config = minimal_config(&dir.path().join("cache"), &dir.path().join("templates"));
    let orchestrator = Orchestrator::new(config, Arc::new(RecordingApplier::new(false)), Arc::new(StubTemplateEngine::json_only())).unwrap();

    let result = orchestrator.orchestrate(&source, OrchestrationOptions::new(Arc::new(NoopReporter))).unwrap();
    assert!(result.applied);
    assert_ne!(result.palette.background, result.palette.foreground);
}

#[test]
fn concurrent_identical_requests_each_get_a_valid_result() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.png");
    write_test_image(&source);

    let config = minimal_config(&dir.path().join("cache"), &dir.path().join("templates"));
    let orchestrator = Arc::new(Orchestrator::new(config, Arc::new(RecordingApplier::new(false)), Arc::new(StubTemplateEngine::json_only())).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let orchestrator = Arc::clone(&orchestrator);
            let source = source.clone();
            std::thread::spawn(move || orchestrator.orchestrate(&source, OrchestrationOptions::new(Arc::new(NoopReporter))))
        })
        .collect();

    // Two requests for the same fingerprint racing `begin_insert` is spec
    // §9's "two concurrent identical orchestrate calls": the loser of the
    // lock either waits behind the winner's commit or proceeds uncached
    // (spec §4.7), but every caller still gets a usable result.
    for handle in handles {
        let result = handle.join().unwrap().unwrap();
        assert!(result.applied);
        assert_eq!(result.variant_set.len(), 1);
    }
}

#[test]
fn a_zero_byte_cache_quota_does_not_evict_the_entry_just_committed() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.png");
    write_test_image(&source);

    let mut config = minimal_config(&dir.path().join("cache"), &dir.path().join("templates"));
    config.cache.max_bytes = 0;
    config.cache.low_watermark_bytes = 0;

    let orchestrator = Orchestrator::new(config, Arc::new(RecordingApplier::new(false)), Arc::new(StubTemplateEngine::json_only())).unwrap();

    let mut options = OrchestrationOptions::new(Arc::new(NoopReporter));
    options.output_palette_dir = Some(dir.path().join("out-palette"));
    options.output_variants_dir = Some(dir.path().join("out-variants"));

    let result = orchestrator.orchestrate(&source, options).unwrap();

    // `enforce_quota` runs after the cache commit and the output-dir copies,
    // so the paths this call just returned must still exist on disk even
    // though the cache's own quota would immediately evict them.
    for path in result.palette_output_set.values() {
        assert!(path.exists(), "{path:?} should still exist");
    }
    assert!(dir.path().join("out-palette/colors.json").exists());
    assert!(dir.path().join("out-variants/grayscale.png").exists());
}

#[test]
fn config_level_allow_cache_false_bypasses_a_warm_cache_even_when_options_allow_it() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.png");
    write_test_image(&source);

    let cache_root = dir.path().join("cache");
    let templates_dir = dir.path().join("templates");

    let mut config = minimal_config(&cache_root, &templates_dir);
    config.orchestrator.allow_cache = true;
    let warm_up = Orchestrator::new(config, Arc::new(RecordingApplier::new(false)), Arc::new(StubTemplateEngine::json_only())).unwrap();
    warm_up.orchestrate(&source, OrchestrationOptions::new(Arc::new(NoopReporter))).unwrap();

    let mut config = minimal_config(&cache_root, &templates_dir);
    config.orchestrator.allow_cache = false;
    let orchestrator = Orchestrator::new(config, Arc::new(RecordingApplier::new(false)), Arc::new(StubTemplateEngine::json_only())).unwrap();

    // `options.allow_cache` defaults to `true` and is left untouched here;
    // only the config-level switch is off, so this must still recompute.
    let options = OrchestrationOptions::new(Arc::new(NoopReporter));
    assert!(options.allow_cache);
    let result = orchestrator.orchestrate(&source, options).unwrap();
    assert!(!result.from_cache);
}
