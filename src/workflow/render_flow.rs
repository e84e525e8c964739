//! 单题渲染流程 - 流程层
//!
//! 核心职责：定义"一道题"的渲染流程
//!
//! 题目实例 → 图表编译器（一次完整的五阶段编译）→ 渲染结果
//!
//! - 不持有任何外部资源，只依赖 `DiagramCompiler`
//! - 失败不会向上抛出，统一转换成 `success = false` 的 `RenderedDiagram`

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::models::{QuestionInstance, RenderedDiagram};
use crate::services::diagram_compiler::{DiagramCompiler, RenderResult};
use crate::utils::logging::truncate_text;
use crate::workflow::render_ctx::RenderCtx;

/// 单题渲染流程
#[derive(Clone)]
pub struct RenderFlow {
    compiler: Arc<DiagramCompiler>,
    diagrams_dir: PathBuf,
    verbose_logging: bool,
}

impl RenderFlow {
    pub fn new(compiler: Arc<DiagramCompiler>, diagrams_dir: impl Into<PathBuf>, verbose_logging: bool) -> Self {
        Self {
            compiler,
            diagrams_dir: diagrams_dir.into(),
            verbose_logging,
        }
    }

    pub async fn run(&self, question: &QuestionInstance, ctx: &RenderCtx) -> RenderedDiagram {
        if self.verbose_logging {
            info!("{} 📄 源码预览: {}", ctx, truncate_text(&question.diagram_source, 120));
        }

        let output = self.diagrams_dir.join(ctx.image_file_name());
        let result = self.compiler.compile(&question.diagram_source, &output).await;

        if result.success {
            info!("{} ✓ 渲染完成 ({} ms)", ctx, result.elapsed.as_millis());
        } else {
            warn!(
                "{} ❌ 渲染失败: {}",
                ctx,
                result.error_message().unwrap_or_default()
            );
        }
        to_rendered(question, result)
    }
}

/// 把编译结果转换为清单中的渲染结果
pub fn to_rendered(question: &QuestionInstance, result: RenderResult) -> RenderedDiagram {
    let error = result.error_message();
    RenderedDiagram {
        instance_id: question.instance_id,
        pattern_id: question.pattern_id,
        diagram_source: question.diagram_source.clone(),
        image_path: result.success.then(|| result.image_path.clone()),
        intermediate_path: result
            .intermediate_paths
            .iter()
            .find(|p| p.extension().is_some_and(|ext| ext == "pdf"))
            .cloned(),
        elapsed_ms: result.elapsed.as_millis() as u64,
        success: result.success,
        error,
        failed_stage: result.failed_stage.map(|stage| stage.to_string()),
    }
}
