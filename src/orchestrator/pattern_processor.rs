//! 单个模式处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块负责一个模式下的全部题目，是模式级别的编排器。
//!
//! ## 核心功能
//!
//! 1. **生成题目**：委托 `QuestionSource` 生成并恢复题目实例
//! 2. **一致性校验**：只记录日志，不拦截
//! 3. **渲染调度**：顺序渲染，或通过 Semaphore 限宽的任务池并发渲染
//! 4. **结果重排**：按题目原始位置收集结果，与完成顺序无关
//! 5. **文档组装**：把 (题目, 渲染结果) 对按原始顺序交给文档组装器

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::models::{ManifestEntry, Pattern, PatternOutput, QuestionInstance, QuestionSet, RenderedDiagram};
use crate::services::validator::validate_batch;
use crate::services::{DocumentAssembler, QuestionSource};
use crate::workflow::{RenderCtx, RenderFlow};

/// 被取消的批次中未派发题目的错误说明
pub const CANCELLED: &str = "cancelled: 批次已取消，未派发";

/// 渲染调度方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Sequential,
    /// 并发渲染，参数为任务池宽度
    Pooled(usize),
}

/// 一个模式的处理结果
#[derive(Debug, Clone)]
pub struct PatternRun {
    pub output: PatternOutput,
    /// 校验后的题目集合；题目批次无法恢复时为 `None`
    pub question_set: Option<QuestionSet>,
}

/// 单个模式处理器
pub struct PatternProcessor {
    questions: QuestionSource,
    flow: RenderFlow,
    assembler: Arc<dyn DocumentAssembler>,
    mode: RenderMode,
    validate_solvability: bool,
}

impl PatternProcessor {
    pub fn new(
        questions: QuestionSource,
        flow: RenderFlow,
        assembler: Arc<dyn DocumentAssembler>,
        mode: RenderMode,
        validate_solvability: bool,
    ) -> Self {
        Self {
            questions,
            flow,
            assembler,
            mode,
            validate_solvability,
        }
    }

    /// 处理一个模式
    ///
    /// 题目批次无法恢复只影响本模式：返回带 `error` 的空输出，不向上抛出。
    pub async fn process(&self, topic: &str, pattern: &Pattern, cancel: &CancellationToken) -> PatternRun {
        let set = match self.questions.generate(topic, pattern).await {
            Ok(set) => set,
            Err(e) => {
                error!("[模式 {}] ❌ 题目生成失败: {}", pattern.pattern_id, e);
                return PatternRun {
                    output: PatternOutput {
                        pattern_id: pattern.pattern_id,
                        pattern_name: pattern.pattern_name.clone(),
                        entries: Vec::new(),
                        document_path: None,
                        degraded: false,
                        defects: Vec::new(),
                        error: Some(e.to_string()),
                    },
                    question_set: None,
                };
            }
        };

        // 一致性校验（只记录）
        let (questions, report) = validate_batch(pattern, set.questions, self.validate_solvability);
        if !report.is_clean() {
            info!(
                "[模式 {}] 校验: {} 个缺陷, {} 个警告",
                pattern.pattern_id,
                report.defects.len(),
                report.warnings.len()
            );
        }

        let diagrams = self.render_all(&questions, cancel).await;
        let pairs: Vec<(QuestionInstance, RenderedDiagram)> = questions.iter().cloned().zip(diagrams).collect();

        let document_path = match self.assembler.assemble(topic, pattern, &pairs).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("[模式 {}] ⚠️ 文档组装失败: {}", pattern.pattern_id, e);
                None
            }
        };

        PatternRun {
            output: PatternOutput {
                pattern_id: pattern.pattern_id,
                pattern_name: pattern.pattern_name.clone(),
                entries: pairs
                    .into_iter()
                    .map(|(question, diagram)| ManifestEntry { question, diagram })
                    .collect(),
                document_path,
                degraded: set.degraded,
                defects: report.defects,
                error: None,
            },
            question_set: Some(QuestionSet { questions, ..set }),
        }
    }

    /// 渲染全部题目，结果与 `questions` 一一对应、顺序相同
    pub async fn render_all(&self, questions: &[QuestionInstance], cancel: &CancellationToken) -> Vec<RenderedDiagram> {
        let slots = match self.mode {
            RenderMode::Sequential => self.render_sequential(questions, cancel).await,
            RenderMode::Pooled(width) => self.render_pooled(questions, width, cancel).await,
        };

        slots
            .into_iter()
            .zip(questions)
            .map(|(slot, q)| {
                slot.unwrap_or_else(|| {
                    RenderedDiagram::not_dispatched(q.instance_id, q.pattern_id, &q.diagram_source, CANCELLED)
                })
            })
            .collect()
    }

    async fn render_sequential(
        &self,
        questions: &[QuestionInstance],
        cancel: &CancellationToken,
    ) -> Vec<Option<RenderedDiagram>> {
        let mut slots = vec![None; questions.len()];
        for (position, question) in questions.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("[模式 {}] ⏹ 已取消，剩余 {} 道题目未渲染", question.pattern_id, questions.len() - position);
                break;
            }
            let ctx = RenderCtx::new(question.pattern_id, question.instance_id, position);
            slots[position] = Some(self.flow.run(question, &ctx).await);
        }
        slots
    }

    async fn render_pooled(
        &self,
        questions: &[QuestionInstance],
        width: usize,
        cancel: &CancellationToken,
    ) -> Vec<Option<RenderedDiagram>> {
        let semaphore = Arc::new(Semaphore::new(width.max(1)));
        let mut handles = Vec::with_capacity(questions.len());

        // 为每道题创建并发任务
        for (position, question) in questions.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("[模式 {}] ⏹ 已取消，停止派发新任务", question.pattern_id);
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!("[模式 {}] 任务池已关闭: {}", question.pattern_id, e);
                        break;
                    }
                },
            };

            let flow = self.flow.clone();
            let question = question.clone();
            let ctx = RenderCtx::new(question.pattern_id, question.instance_id, position);

            let handle = tokio::spawn(async move {
                let _permit = permit;
                flow.run(&question, &ctx).await
            });
            handles.push((position, handle));
        }

        // 按位置收集结果，与完成顺序无关
        let joined = join_all(
            handles
                .into_iter()
                .map(|(position, handle)| async move { (position, handle.await) }),
        )
        .await;

        let mut slots = vec![None; questions.len()];
        for (position, outcome) in joined {
            let question = &questions[position];
            slots[position] = Some(match outcome {
                Ok(rendered) => rendered,
                Err(e) => {
                    error!("[模式 {} 题目 {}] 任务执行失败: {}", question.pattern_id, question.instance_id, e);
                    RenderedDiagram::not_dispatched(
                        question.instance_id,
                        question.pattern_id,
                        &question.diagram_source,
                        &format!("任务执行失败: {}", e),
                    )
                }
            });
        }
        slots
    }
}
