//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和渲染调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量处理器
//! - 管理应用生命周期（初始化、运行）
//! - 生成模式集合，逐个交给模式处理器
//! - 持久化 JSON 产物和最终清单
//! - 输出全局统计信息
//!
//! ### `pattern_processor` - 单个模式处理器
//! - 生成并校验一个模式下的题目
//! - 控制渲染并发（Semaphore）
//! - 按原始顺序收集渲染结果
//! - 组装文档
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<Pattern>)
//!     ↓
//! pattern_processor (处理 Vec<QuestionInstance>)
//!     ↓
//! workflow::RenderFlow (处理单个 QuestionInstance)
//!     ↓
//! services (能力层：recovery / compiler / validator / storage)
//!     ↓
//! infrastructure (基础设施：CompilerRunner / Rasterizer / ScratchDir)
//! ```

pub mod batch_processor;
pub mod pattern_processor;

// 重新导出主要类型
pub use batch_processor::App;
pub use pattern_processor::{PatternProcessor, PatternRun, RenderMode, CANCELLED};
