//! 文档组装服务 - 业务能力层
//!
//! 消费按原始顺序排列的 (题目, 渲染结果) 对，为每个模式生成一份可交付文档。
//! 失败的渲染不会嵌入图片，只留下说明。

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::error::StorageError;
use crate::models::{Pattern, QuestionInstance, RenderedDiagram};

/// 文档组装能力
#[async_trait]
pub trait DocumentAssembler: Send + Sync {
    /// 组装一个模式的文档，返回写入的路径
    async fn assemble(
        &self,
        topic: &str,
        pattern: &Pattern,
        entries: &[(QuestionInstance, RenderedDiagram)],
    ) -> Result<PathBuf, StorageError>;
}

/// Markdown 练习卷
pub struct MarkdownAssembler {
    documents_dir: PathBuf,
}

impl MarkdownAssembler {
    pub fn new(documents_dir: impl Into<PathBuf>) -> Self {
        Self {
            documents_dir: documents_dir.into(),
        }
    }

    /// 图片相对文档目录的链接
    fn image_link(&self, image: &Path) -> String {
        let relative = pathdiff(image, &self.documents_dir);
        relative.to_string_lossy().replace('\\', "/")
    }

    /// 渲染 Markdown 文本
    pub fn render(&self, topic: &str, pattern: &Pattern, entries: &[(QuestionInstance, RenderedDiagram)]) -> String {
        let mut doc = String::new();
        let _ = writeln!(doc, "# {} - {}\n", topic, pattern.pattern_name);
        let _ = writeln!(doc, "- 难度: {}", pattern.difficulty);
        if !pattern.learning_objective.is_empty() {
            let _ = writeln!(doc, "- 学习目标: {}", pattern.learning_objective);
        }
        doc.push('\n');

        for (number, (question, diagram)) in entries.iter().enumerate() {
            let _ = writeln!(doc, "## 第 {} 题\n", number + 1);
            let _ = writeln!(doc, "{}\n", question.question_text.trim());
            match (&diagram.image_path, diagram.success) {
                (Some(image), true) => {
                    let _ = writeln!(doc, "![题目 {} 图]({})\n", question.instance_id, self.image_link(image));
                }
                _ => {
                    let reason = diagram.error.as_deref().unwrap_or("未知错误");
                    let _ = writeln!(doc, "> 图表渲染失败: {}\n", reason.lines().next().unwrap_or(reason));
                }
            }
        }

        doc.push_str("---\n\n## 答案\n\n");
        for (number, (question, _)) in entries.iter().enumerate() {
            let _ = writeln!(doc, "{}. {}", number + 1, question.correct_answer.trim());
        }
        doc
    }
}

/// 计算 `path` 相对 `base` 的路径；两者没有共同前缀时返回原路径
fn pathdiff(path: &Path, base: &Path) -> PathBuf {
    let path_parts: Vec<_> = path.components().collect();
    let base_parts: Vec<_> = base.components().collect();
    let common = path_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();
    if common == 0 {
        return path.to_path_buf();
    }

    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &path_parts[common..] {
        relative.push(part.as_os_str());
    }
    relative
}

#[async_trait]
impl DocumentAssembler for MarkdownAssembler {
    async fn assemble(
        &self,
        topic: &str,
        pattern: &Pattern,
        entries: &[(QuestionInstance, RenderedDiagram)],
    ) -> Result<PathBuf, StorageError> {
        tokio::fs::create_dir_all(&self.documents_dir)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: self.documents_dir.clone(),
                source,
            })?;

        let path = self
            .documents_dir
            .join(format!("pattern_{:02}.md", pattern.pattern_id));
        tokio::fs::write(&path, self.render(topic, pattern, entries))
            .await
            .map_err(|source| StorageError::Write { path: path.clone(), source })?;

        info!("[模式 {}] 📄 文档已生成: {}", pattern.pattern_id, path.display());
        Ok(path)
    }
}
