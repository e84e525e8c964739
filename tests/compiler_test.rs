mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{compiler, compiler_with, fast_settings, files_with_extension, StubRasterizer, StubRunner};
use diagram_question_gen::services::diagram_compiler::validate_output;
use diagram_question_gen::services::CompileStage;

const GOOD_SOURCE: &str = r"\draw (0,0) -- (3,4) node[right] {$B$};";

#[tokio::test]
async fn test_unbalanced_source_never_reaches_compiler() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(StubRunner::default());
    let compiler = compiler(runner.clone(), &dir.path().join("scratch"), fast_settings(3, 1));

    let result = compiler
        .compile(r"\draw (0,0) -- (1,1) node {A;", &dir.path().join("out.png"))
        .await;

    assert!(!result.success);
    assert_eq!(result.failed_stage, Some(CompileStage::Sanitize));
    assert_eq!(runner.calls(), 0);
}

#[tokio::test]
async fn test_denied_directive_fails_at_sanitize() {
    let _ = tracing_subscriber::fmt::try_init();
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(StubRunner::default());
    let compiler = compiler(runner.clone(), &dir.path().join("scratch"), fast_settings(3, 1));

    let result = compiler
        .compile(r"\input{/etc/passwd} \draw (0,0) -- (1,1);", &dir.path().join("out.png"))
        .await;

    assert!(!result.success);
    assert_eq!(result.failed_stage, Some(CompileStage::Sanitize));
    assert!(result.error_message().unwrap().starts_with("[sanitize]"));
    assert_eq!(runner.calls(), 0);
}

#[tokio::test]
async fn test_compile_retries_with_linear_backoff() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(StubRunner {
        fail_first: 2,
        ..StubRunner::default()
    });
    let compiler = compiler(runner.clone(), &dir.path().join("scratch"), fast_settings(3, 10));
    let output = dir.path().join("diagrams").join("retry.png");

    let result = compiler.compile(GOOD_SOURCE, &output).await;

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(runner.calls(), 3);
    // 两次失败后的等待: 10ms * 1 + 10ms * 2
    assert!(result.elapsed >= Duration::from_millis(30));
    assert_eq!(validate_output(&output, u64::MAX), Ok((20, 10)));
}

#[tokio::test]
async fn test_exhausted_retries_fail_compile_stage() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(StubRunner {
        fail_first: usize::MAX,
        ..StubRunner::default()
    });
    let compiler = compiler(runner.clone(), &dir.path().join("scratch"), fast_settings(2, 1));

    let result = compiler.compile(GOOD_SOURCE, &dir.path().join("out.png")).await;

    assert!(!result.success);
    assert_eq!(result.failed_stage, Some(CompileStage::Compile));
    assert_eq!(runner.calls(), 2);
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors[0].contains("stub failure"));
}

#[tokio::test]
async fn test_empty_artifact_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(StubRunner {
        empty_artifact: true,
        ..StubRunner::default()
    });
    let compiler = compiler(runner.clone(), &dir.path().join("scratch"), fast_settings(2, 1));

    let result = compiler.compile(GOOD_SOURCE, &dir.path().join("out.png")).await;

    assert!(!result.success);
    assert_eq!(result.failed_stage, Some(CompileStage::Compile));
    assert!(result.error_message().unwrap().contains("empty"));
    assert_eq!(runner.calls(), 2);
}

#[tokio::test]
async fn test_scratch_is_cleaned_unless_kept() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = dir.path().join("scratch");
    let runner = Arc::new(StubRunner::default());

    let result = compiler(runner.clone(), &scratch, fast_settings(1, 1))
        .compile(GOOD_SOURCE, &dir.path().join("a.png"))
        .await;
    assert!(result.success);
    assert!(result.intermediate_paths.is_empty());
    assert!(files_with_extension(&scratch, "tex").is_empty());
    assert!(files_with_extension(&scratch, "pdf").is_empty());

    let mut settings = fast_settings(1, 1);
    settings.keep_intermediate = true;
    let result = compiler(runner, &scratch, settings)
        .compile(GOOD_SOURCE, &dir.path().join("b.png"))
        .await;
    assert!(result.success);
    assert_eq!(result.intermediate_paths.len(), 2);
    assert_eq!(files_with_extension(&scratch, "tex").len(), 1);
}

#[tokio::test]
async fn test_rasterize_retried_without_recompiling() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = dir.path().join("scratch");
    let runner = Arc::new(StubRunner::default());
    let rasterizer = Arc::new(StubRasterizer {
        fail_first: 1,
        ..StubRasterizer::default()
    });
    let output = dir.path().join("diagrams").join("raster.png");

    let result = compiler_with(runner.clone(), rasterizer.clone(), &scratch, fast_settings(3, 1))
        .compile(GOOD_SOURCE, &output)
        .await;

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(runner.calls(), 1);
    assert_eq!(rasterizer.calls(), 2);
    assert!(output.is_file());
    assert!(files_with_extension(&scratch, "png").is_empty());
}

#[tokio::test]
async fn test_unacceptable_image_fails_validate_stage() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(StubRunner::default());
    let rasterizer = Arc::new(StubRasterizer {
        sixteen_bit: true,
        ..StubRasterizer::default()
    });
    let output = dir.path().join("deep.png");

    let result = compiler_with(runner, rasterizer, &dir.path().join("scratch"), fast_settings(2, 1))
        .compile(GOOD_SOURCE, &output)
        .await;

    assert!(!result.success);
    assert_eq!(result.failed_stage, Some(CompileStage::Validate));
    assert!(result.error_message().unwrap().starts_with("[validate]"));
    assert!(!output.exists());
}

#[tokio::test]
async fn test_stalled_raster_attempt_cannot_overwrite_output() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(StubRunner::default());
    let rasterizer = Arc::new(StubRasterizer {
        stall_first: Some(Duration::from_millis(300)),
        ..StubRasterizer::default()
    });
    let mut settings = fast_settings(3, 1);
    settings.raster_timeout = Duration::from_millis(100);
    let output = dir.path().join("stalled.png");

    let result = compiler_with(runner, rasterizer.clone(), &dir.path().join("scratch"), settings)
        .compile(GOOD_SOURCE, &output)
        .await;
    assert!(result.success, "{:?}", result.errors);
    assert!(result.errors.is_empty());

    // 等超时的渲染线程写完
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(rasterizer.calls(), 2);
    assert_eq!(validate_output(&output, u64::MAX), Ok((20, 10)));
}
