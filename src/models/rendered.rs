//! 渲染结果（Rendered Diagram）

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// 一次题目渲染尝试的结果，与题目实例一一对应
///
/// 通过 id 弱引用题目实例；创建后不再修改，重试会产生新的值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedDiagram {
    pub instance_id: u32,
    pub pattern_id: u32,
    pub diagram_source: String,
    pub image_path: Option<PathBuf>,
    /// 排版中间产物（PDF）
    pub intermediate_path: Option<PathBuf>,
    pub elapsed_ms: u64,
    pub success: bool,
    pub error: Option<String>,
    /// 失败所在阶段
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
}

impl RenderedDiagram {
    /// 未被派发的实例（例如批次被取消）
    pub fn not_dispatched(instance_id: u32, pattern_id: u32, diagram_source: &str, reason: &str) -> Self {
        Self {
            instance_id,
            pattern_id,
            diagram_source: diagram_source.to_string(),
            image_path: None,
            intermediate_path: None,
            elapsed_ms: 0,
            success: false,
            error: Some(reason.to_string()),
            failed_stage: None,
        }
    }
}
