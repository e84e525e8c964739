//! 输出清单（Output Manifest）

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::question::QuestionInstance;
use super::rendered::RenderedDiagram;

/// 清单中的一条：题目及其渲染结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub question: QuestionInstance,
    pub diagram: RenderedDiagram,
}

/// 单个模式的输出
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternOutput {
    pub pattern_id: u32,
    pub pattern_name: String,
    /// 按原始实例顺序排列
    pub entries: Vec<ManifestEntry>,
    pub document_path: Option<PathBuf>,
    pub degraded: bool,
    /// 校验器给出的缺陷（仅供参考）
    #[serde(default)]
    pub defects: Vec<String>,
    /// 整个模式的题目批次无法恢复时的错误
    pub error: Option<String>,
}

impl PatternOutput {
    pub fn rendered_count(&self) -> usize {
        self.entries.iter().filter(|e| e.diagram.success).count()
    }

    pub fn failed_count(&self) -> usize {
        self.entries.len() - self.rendered_count()
    }
}

/// 一次完整运行的最终产物
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputManifest {
    pub topic: String,
    pub total_patterns: usize,
    pub total_questions: usize,
    pub total_rendered: usize,
    pub total_failed: usize,
    pub generation_timestamp: String,
    pub model_used: String,
    pub output_dir: PathBuf,
    pub diagrams_dir: PathBuf,
    pub patterns: Vec<PatternOutput>,
}

impl OutputManifest {
    /// 根据各模式输出汇总计数
    pub fn assemble(
        topic: &str,
        model_used: &str,
        output_dir: PathBuf,
        diagrams_dir: PathBuf,
        patterns: Vec<PatternOutput>,
    ) -> Self {
        let total_questions = patterns.iter().map(|p| p.entries.len()).sum();
        let total_rendered = patterns.iter().map(PatternOutput::rendered_count).sum();
        Self {
            topic: topic.to_string(),
            total_patterns: patterns.len(),
            total_questions,
            total_rendered,
            total_failed: total_questions - total_rendered,
            generation_timestamp: chrono::Utc::now().to_rfc3339(),
            model_used: model_used.to_string(),
            output_dir,
            diagrams_dir,
            patterns,
        }
    }

    /// 遍历所有条目
    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.patterns.iter().flat_map(|p| p.entries.iter())
    }
}
