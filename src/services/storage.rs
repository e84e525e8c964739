//! 产物存储服务 - 业务能力层
//!
//! 只负责"把结果写到输出目录"能力，不关心流程。
//!
//! 目录布局：
//! ```text
//! <output_dir>/
//!   <topic>_patterns.json
//!   <topic>_questions.json
//!   <topic>_manifest.json
//!   diagrams/
//!   documents/
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::models::{OutputManifest, PatternCollection, QuestionSet};

/// 把主题转换成文件名安全的前缀
pub fn topic_slug(topic: &str) -> String {
    let slug: String = topic
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    let slug = slug
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if slug.is_empty() {
        "topic".to_string()
    } else {
        slug
    }
}

/// 产物存储
pub struct ArtifactStore {
    output_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn diagrams_dir(&self) -> PathBuf {
        self.output_dir.join("diagrams")
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.output_dir.join("documents")
    }

    /// 创建输出目录结构
    pub async fn prepare(&self) -> Result<(), StorageError> {
        for dir in [self.output_dir.clone(), self.diagrams_dir(), self.documents_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|source| StorageError::CreateDir { path: dir.clone(), source })?;
        }
        debug!("输出目录已就绪: {}", self.output_dir.display());
        Ok(())
    }

    async fn write_json<T: Serialize>(
        &self,
        file_name: String,
        what: &str,
        value: &T,
    ) -> Result<PathBuf, StorageError> {
        let json = serde_json::to_string_pretty(value).map_err(|source| StorageError::Serialize {
            what: what.to_string(),
            source,
        })?;
        let path = self.output_dir.join(file_name);
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| StorageError::Write { path: path.clone(), source })?;
        info!("💾 已保存{}: {}", what, path.display());
        Ok(path)
    }

    pub async fn save_patterns(&self, collection: &PatternCollection) -> Result<PathBuf, StorageError> {
        let name = format!("{}_patterns.json", topic_slug(&collection.topic));
        self.write_json(name, "模式", collection).await
    }

    pub async fn save_questions(&self, topic: &str, sets: &[QuestionSet]) -> Result<PathBuf, StorageError> {
        let name = format!("{}_questions.json", topic_slug(topic));
        self.write_json(name, "题目", &sets).await
    }

    pub async fn save_manifest(&self, manifest: &OutputManifest) -> Result<PathBuf, StorageError> {
        let name = format!("{}_manifest.json", topic_slug(&manifest.topic));
        self.write_json(name, "清单", manifest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_slug() {
        assert_eq!(topic_slug("Coordinate Geometry"), "coordinate_geometry");
        assert_eq!(topic_slug("  Trig: Sine / Cosine "), "trig_sine_cosine");
        assert_eq!(topic_slug("!!!"), "topic");
    }

    #[tokio::test]
    async fn test_save_manifest_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("out"));
        store.prepare().await.unwrap();
        assert!(store.diagrams_dir().is_dir());
        assert!(store.documents_dir().is_dir());

        let manifest = OutputManifest::assemble(
            "Coordinate Geometry",
            "test",
            store.output_dir().to_path_buf(),
            store.diagrams_dir(),
            Vec::new(),
        );
        let path = store.save_manifest(&manifest).await.unwrap();
        assert!(path.ends_with("coordinate_geometry_manifest.json"));

        let loaded: OutputManifest = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(loaded.topic, "Coordinate Geometry");
        assert_eq!(loaded.total_questions, 0);
    }

    #[tokio::test]
    async fn test_write_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("never_created"));
        let err = store.save_questions("Geo", &[]).await.unwrap_err();
        assert!(matches!(err, StorageError::Write { .. }));
    }
}
