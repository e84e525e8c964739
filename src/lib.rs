//! # Diagram Question Gen
//!
//! 根据主题生成带图表的练习题：文本生成服务给出题目模式和实例，
//! 图表编译流水线把 TikZ 源码编译成 PNG，最后组装成文档和清单。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源，只暴露能力
//! - `CompilerRunner` - 外部编译器子进程（tectonic）
//! - `Rasterizer` - 光栅化库（pdfium）
//! - `ScratchDir` - 草稿目录
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `RecoveryEngine` - 把不可靠的生成文本恢复成记录
//! - `DiagramCompiler` - 五阶段图表编译
//! - `validator` - 一致性校验（只记录）
//! - `PatternSource` / `QuestionSource` - 模式与题目生成
//! - `ArtifactStore` / `MarkdownAssembler` - 持久化与文档组装
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一道题"的渲染流程
//! - `RenderCtx` - 上下文封装（pattern_id + instance_id）
//! - `RenderFlow` - 题目 → 编译 → 渲染结果
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 主题级处理器，管理资源和持久化
//! - `orchestrator/pattern_processor` - 模式级处理器，管理渲染并发

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{OutputManifest, Pattern, QuestionInstance, RenderedDiagram};
pub use orchestrator::App;
pub use services::{DiagramCompiler, RecoveryEngine};
pub use workflow::{RenderCtx, RenderFlow};
