mod common;

use std::sync::Arc;

use common::{compiler, fast_settings, ScriptedGenerator, StubRasterizer, StubRunner};
use diagram_question_gen::error::GenerationError;
use diagram_question_gen::models::{QuestionInstance, SolvabilityStatus};
use diagram_question_gen::orchestrator::{PatternProcessor, RenderMode, CANCELLED};
use diagram_question_gen::services::{MarkdownAssembler, QuestionSource};
use diagram_question_gen::workflow::RenderFlow;
use diagram_question_gen::{App, Config};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn question(instance_id: u32, diagram_source: &str) -> QuestionInstance {
    serde_json::from_value(json!({
        "instance_id": instance_id,
        "pattern_id": 1,
        "question_text": format!("Question {} about the diagram", instance_id),
        "correct_answer": "42 units",
        "tikz_code": diagram_source,
    }))
    .unwrap()
}

fn processor(runner: Arc<StubRunner>, dir: &std::path::Path, mode: RenderMode) -> PatternProcessor {
    let unused = Arc::new(ScriptedGenerator {
        respond: Box::new(|_: &str| Err(GenerationError::EmptyResponse)),
    });
    let flow = RenderFlow::new(
        Arc::new(compiler(runner, &dir.join("scratch"), fast_settings(1, 1))),
        dir.join("diagrams"),
        false,
    );
    PatternProcessor::new(
        QuestionSource::new(unused, 3),
        flow,
        Arc::new(MarkdownAssembler::new(dir.join("documents"))),
        mode,
        true,
    )
}

#[tokio::test]
async fn test_results_follow_instance_order_not_completion_order() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(StubRunner::default());
    let processor = processor(runner.clone(), dir.path(), RenderMode::Pooled(3));

    let questions = vec![
        question(0, "% delay 300\n\\draw (0,0) -- (1,1);"),
        question(1, "% delay 150\n\\draw (0,0) -- (2,2);"),
        question(2, "% delay 1\n\\draw (0,0) -- (3,3);"),
    ];
    let results = processor.render_all(&questions, &CancellationToken::new()).await;

    // 完成顺序与派发顺序相反
    assert_eq!(*runner.finished.lock().unwrap(), vec![1, 150, 300]);

    let ids: Vec<u32> = results.iter().map(|r| r.instance_id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert!(results.iter().all(|r| r.success));
    assert!(results[0]
        .image_path
        .as_ref()
        .unwrap()
        .ends_with("pattern_01_question_00.png"));
}

#[tokio::test]
async fn test_sequential_mode_renders_one_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(StubRunner::default());
    let processor = processor(runner.clone(), dir.path(), RenderMode::Sequential);

    let questions = vec![
        question(0, "% delay 120\n\\draw (0,0) -- (1,1);"),
        question(1, "% delay 60\n\\draw (0,0) -- (2,2);"),
        question(2, "% delay 1\n\\draw (0,0) -- (3,3);"),
    ];
    let results = processor.render_all(&questions, &CancellationToken::new()).await;

    // 顺序模式下完成顺序就是派发顺序
    assert_eq!(*runner.finished.lock().unwrap(), vec![120, 60, 1]);
    let ids: Vec<u32> = results.iter().map(|r| r.instance_id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert!(results.iter().all(|r| r.success));
}

#[tokio::test]
async fn test_duplicate_instance_ids_render_to_distinct_images() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(StubRunner::default());
    let processor = processor(runner.clone(), dir.path(), RenderMode::Pooled(2));

    let questions = vec![question(4, "\\draw (0,0) -- (1,1);"), question(4, "\\draw (0,0) -- (2,2);")];
    let results = processor.render_all(&questions, &CancellationToken::new()).await;

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success));
    assert_ne!(results[0].image_path, results[1].image_path);
    assert!(results.iter().all(|r| r.image_path.as_ref().unwrap().is_file()));
}

#[tokio::test]
async fn test_cancelled_batch_yields_failed_entries() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(StubRunner::default());
    let processor = processor(runner.clone(), dir.path(), RenderMode::Pooled(2));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let questions = vec![question(0, "\\draw (0,0) -- (1,1);"), question(1, "\\draw (0,0) -- (2,2);")];
    let results = processor.render_all(&questions, &cancel).await;

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| !r.success && r.error.as_deref() == Some(CANCELLED)));
    assert_eq!(runner.calls(), 0);
}

fn pattern_response() -> String {
    json!([
        {
            "pattern_id": 1,
            "pattern_name": "Distance Between Points",
            "diagram_description": "Two labeled points on a grid",
            "question_template": "Find the distance between A({x1}, {y1}) and B({x2}, {y2}).",
            "variables": [
                {"name": "x1", "type": "int", "min_value": 0, "max_value": 9, "description": "x of A"},
                {"name": "y1", "type": "int", "min_value": 0, "max_value": 9, "description": "y of A"},
                {"name": "x2", "type": "int", "min_value": 0, "max_value": 9, "description": "x of B"},
                {"name": "y2", "type": "int", "min_value": 0, "max_value": 9, "description": "y of B"}
            ],
            "difficulty": "medium",
            "learning_objective": "Apply the distance formula"
        },
        {
            "pattern_id": 2,
            "pattern_name": "Slope of a Line",
            "diagram_description": "A line through two points",
            "question_template": "What is the slope of the line through ({x1}, {y1}) and ({x2}, {y2})?",
            "variables": [
                {"name": "x1", "type": "int", "min_value": 0, "max_value": 9, "description": "x of P"},
                {"name": "y1", "type": "int", "min_value": 0, "max_value": 9, "description": "y of P"},
                {"name": "x2", "type": "int", "min_value": 0, "max_value": 9, "description": "x of Q"},
                {"name": "y2", "type": "int", "min_value": 0, "max_value": 9, "description": "y of Q"}
            ],
            "difficulty": "easy",
            "learning_objective": "Compute slope as rise over run"
        }
    ])
    .to_string()
}

fn question_response(pattern_id: u32) -> String {
    let instances: Vec<_> = (0..3u32)
        .map(|i| {
            let tikz = if pattern_id == 2 && i == 1 {
                // 缺少右花括号
                "\\draw (0,0) -- (4,3) node[right] {Q;".to_string()
            } else {
                format!("\\draw (0,0) -- ({},{}) node[right] {{B}};", i + 2, i + 3)
            };
            json!({
                "instance_id": i,
                "variables": {"x1": 0, "y1": 0, "x2": i + 2, "y2": i + 3},
                "question_text": format!("Using the diagram, find the answer for (0, 0) and ({}, {}).", i + 2, i + 3),
                "correct_answer": format!("answer {}", i + 5),
                "tikz_code": tikz,
            })
        })
        .collect();
    json!(instances).to_string()
}

fn scripted() -> Arc<ScriptedGenerator> {
    Arc::new(ScriptedGenerator {
        respond: Box::new(|prompt: &str| {
            if prompt.contains("Pattern ID: 1") {
                Ok(question_response(1))
            } else if prompt.contains("Pattern ID: 2") {
                Ok(question_response(2))
            } else {
                Ok(pattern_response())
            }
        }),
    })
}

#[tokio::test]
async fn test_end_to_end_with_one_broken_diagram() {
    let _ = tracing_subscriber::fmt::try_init();
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        output_dir: dir.path().join("output"),
        scratch_dir: dir.path().join("scratch"),
        max_workers: 2,
        max_retries: 2,
        retry_backoff_ms: 1,
        patterns_per_topic: 2,
        questions_per_pattern: 3,
        use_fallback_patterns: false,
        ..Config::default()
    };

    let runner = Arc::new(StubRunner::default());
    let app = App::new(config, scripted(), runner.clone(), Arc::new(StubRasterizer::default())).unwrap();
    let manifest = app.run("Coordinate Geometry").await.unwrap();

    assert_eq!(manifest.total_patterns, 2);
    assert_eq!(manifest.total_questions, 6);
    assert_eq!(manifest.total_rendered, 5);
    assert_eq!(manifest.total_failed, 1);
    assert_eq!(manifest.model_used, "scripted");
    // 源码清洗失败的题目不会调用编译器
    assert_eq!(runner.calls(), 5);

    let failed: Vec<_> = manifest.entries().filter(|e| !e.diagram.success).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].question.pattern_id, 2);
    assert_eq!(failed[0].question.instance_id, 1);
    assert!(!failed[0].diagram.error.as_deref().unwrap_or_default().is_empty());
    assert_eq!(failed[0].diagram.failed_stage.as_deref(), Some("sanitize"));
    // 渲染失败不影响可解性
    assert_eq!(failed[0].question.solvability, SolvabilityStatus::Valid);

    for pattern in &manifest.patterns {
        let ids: Vec<u32> = pattern.entries.iter().map(|e| e.question.instance_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(pattern.document_path.as_ref().unwrap().exists());
        assert!(pattern.error.is_none());
    }

    let output = dir.path().join("output");
    for file in [
        "coordinate_geometry_patterns.json",
        "coordinate_geometry_questions.json",
        "coordinate_geometry_manifest.json",
    ] {
        assert!(output.join(file).is_file(), "missing {}", file);
    }
    assert!(output.join("diagrams").join("pattern_02_question_02.png").is_file());
    assert!(!output.join("diagrams").join("pattern_02_question_01.png").exists());
}

#[tokio::test]
async fn test_unrecoverable_question_batch_affects_only_its_pattern() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        output_dir: dir.path().join("output"),
        scratch_dir: dir.path().join("scratch"),
        retry_backoff_ms: 1,
        patterns_per_topic: 2,
        questions_per_pattern: 3,
        use_fallback_patterns: false,
        ..Config::default()
    };
    let generator = Arc::new(ScriptedGenerator {
        respond: Box::new(|prompt: &str| {
            if prompt.contains("Pattern ID: 1") {
                Ok("I'm sorry, I cannot produce JSON today.".to_string())
            } else if prompt.contains("Pattern ID: 2") {
                // 记录里没有 pattern_id，归属到当前模式
                Ok(question_response(1))
            } else {
                Ok(pattern_response())
            }
        }),
    });

    let app = App::new(
        config,
        generator,
        Arc::new(StubRunner::default()),
        Arc::new(StubRasterizer::default()),
    )
    .unwrap();
    let manifest = app.run("Coordinate Geometry").await.unwrap();

    assert_eq!(manifest.total_patterns, 2);
    assert!(manifest.patterns[0].error.as_deref().unwrap().contains("unrecoverable"));
    assert!(manifest.patterns[0].entries.is_empty());
    assert_eq!(manifest.patterns[1].entries.len(), 3);
    assert_eq!(manifest.total_rendered, 3);
}

#[tokio::test]
async fn test_no_patterns_without_fallback_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        output_dir: dir.path().join("output"),
        scratch_dir: dir.path().join("scratch"),
        use_fallback_patterns: false,
        ..Config::default()
    };
    let generator = Arc::new(ScriptedGenerator {
        respond: Box::new(|_: &str| Err(GenerationError::Timeout { secs: 1 })),
    });
    let app = App::new(
        config,
        generator,
        Arc::new(StubRunner::default()),
        Arc::new(StubRasterizer::default()),
    )
    .unwrap();
    assert!(app.run("Coordinate Geometry").await.is_err());
}
