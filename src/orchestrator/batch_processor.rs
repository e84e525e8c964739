//! 批量处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责一次完整运行：主题 → 清单。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：创建文本生成服务、定位编译器、绑定光栅化库、准备草稿目录
//! 2. **模式生成**：委托 `PatternSource`，必要时退回内置模板
//! 3. **逐个模式处理**：委托 `PatternProcessor`，单个模式失败不影响其他模式
//! 4. **持久化**：写入模式集合、题目集合和最终清单
//! 5. **全局统计**：汇总所有模式的渲染结果
//!
//! 只有两种情况会让整次运行失败：没有任何模式可用，或者产物无法写入存储。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::infrastructure::{CompilerRunner, PdfiumRasterizer, Rasterizer, ScratchDir, TectonicRunner};
use crate::models::{OutputManifest, QuestionSet};
use crate::orchestrator::pattern_processor::{PatternProcessor, RenderMode};
use crate::services::{
    ArtifactStore, CompilerSettings, DiagramCompiler, LlmService, MarkdownAssembler, PatternSource, QuestionSource,
    TextGenerator,
};
use crate::utils::logging::{log_pattern_complete, log_pattern_start, log_startup, print_final_stats};
use crate::workflow::RenderFlow;

/// 应用主结构
pub struct App {
    config: Config,
    patterns: PatternSource,
    processor: PatternProcessor,
    store: ArtifactStore,
    cancel: CancellationToken,
}

impl App {
    /// 使用真实的外部协作方初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate().context("配置无效")?;

        let generator: Arc<dyn TextGenerator> = Arc::new(LlmService::new(&config));

        let compile_timeout = Duration::from_secs(config.compile_timeout_secs);
        let runner = match TectonicRunner::locate(&config.compiler_path, compile_timeout).await {
            Some(runner) => runner,
            None => {
                warn!("⚠️ 继续使用配置的编译器路径，编译阶段可能全部失败: {}", config.compiler_path);
                TectonicRunner::new(config.compiler_path.clone(), compile_timeout)
            }
        };
        let rasterizer = PdfiumRasterizer::new(config.pdfium_library_path.clone());

        Self::new(config, generator, Arc::new(runner), Arc::new(rasterizer))
    }

    /// 由调用方注入文本生成、编译器和光栅化能力
    pub fn new(
        config: Config,
        generator: Arc<dyn TextGenerator>,
        runner: Arc<dyn CompilerRunner>,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> Result<Self> {
        let scratch = ScratchDir::new(&config.scratch_dir)
            .with_context(|| format!("无法创建草稿目录: {}", config.scratch_dir.display()))?;
        let compiler = DiagramCompiler::new(
            runner,
            rasterizer,
            Arc::new(scratch),
            CompilerSettings::from_config(&config),
        );

        let store = ArtifactStore::new(config.output_dir.clone());
        let flow = RenderFlow::new(Arc::new(compiler), store.diagrams_dir(), config.verbose_logging);
        let mode = if config.parallel_rendering {
            RenderMode::Pooled(config.max_workers)
        } else {
            RenderMode::Sequential
        };
        let processor = PatternProcessor::new(
            QuestionSource::new(generator.clone(), config.questions_per_pattern),
            flow,
            Arc::new(MarkdownAssembler::new(store.documents_dir())),
            mode,
            config.validate_solvability,
        );

        Ok(Self {
            patterns: PatternSource::new(generator, config.patterns_per_topic, config.use_fallback_patterns),
            processor,
            store,
            cancel: CancellationToken::new(),
            config,
        })
    }

    /// 取消令牌：取消后不再派发新的渲染任务，已派发的任务照常完成
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 运行应用主逻辑
    pub async fn run(&self, topic: &str) -> Result<OutputManifest> {
        log_startup(topic, &self.config);

        self.store.prepare().await.context("无法准备输出目录")?;

        // ========== 生成模式 ==========
        let collection = self
            .patterns
            .generate(topic)
            .await
            .with_context(|| format!("主题 \"{}\" 没有可用的模式", topic))?;
        if collection.degraded {
            warn!("⚠️ 模式集合经过降级恢复（来源: {}）", collection.model_used);
        }
        self.store
            .save_patterns(&collection)
            .await
            .context("保存模式集合失败")?;

        // ========== 逐个处理模式 ==========
        let total = collection.patterns.len();
        let mut outputs = Vec::with_capacity(total);
        let mut question_sets: Vec<QuestionSet> = Vec::new();

        for (index, pattern) in collection.patterns.iter().enumerate() {
            log_pattern_start(index + 1, total, pattern.pattern_id, &pattern.pattern_name);

            let run = self.processor.process(topic, pattern, &self.cancel).await;
            log_pattern_complete(&run.output);

            question_sets.extend(run.question_set);
            outputs.push(run.output);
        }

        self.store
            .save_questions(topic, &question_sets)
            .await
            .context("保存题目集合失败")?;

        // ========== 清单 ==========
        let manifest = OutputManifest::assemble(
            topic,
            &collection.model_used,
            self.store.output_dir().to_path_buf(),
            self.store.diagrams_dir(),
            outputs,
        );
        let path = self
            .store
            .save_manifest(&manifest)
            .await
            .context("保存清单失败")?;
        info!("📋 清单: {}", path.display());

        print_final_stats(&manifest);
        Ok(manifest)
    }
}
