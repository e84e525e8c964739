//! 模式来源 - 业务能力层
//!
//! 文本生成 → 恢复引擎 → `Pattern`。转换失败或违反不变量的记录被丢弃并记录警告；
//! 一条都没有时按配置退回内置模板。

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::GenerationError;
use crate::models::{Pattern, PatternCollection};
use crate::services::fallback::fallback_patterns;
use crate::services::llm_service::TextGenerator;
use crate::services::recovery::{Record, RecoveryEngine};

const SYSTEM_PROMPT: &str = "You are an expert mathematics curriculum designer. \
You design question patterns whose answers can only be found by reading an accompanying diagram. \
Respond with a single JSON array and nothing else.";

/// 把一条记录转换为模式
pub fn pattern_from_record(record: Record) -> Result<Pattern, GenerationError> {
    let pattern: Pattern =
        serde_json::from_value(Value::Object(record)).map_err(|e| GenerationError::InvalidRecord(e.to_string()))?;
    let defects = pattern.validate();
    if !defects.is_empty() {
        return Err(GenerationError::InvalidRecord(defects.join("; ")));
    }
    Ok(pattern)
}

/// 批量转换，返回 (模式, 被丢弃的原因)；id 重复的后者被丢弃
pub fn patterns_from_records(records: Vec<Record>) -> (Vec<Pattern>, Vec<String>) {
    let mut patterns = Vec::new();
    let mut discarded = Vec::new();
    let mut ids = HashSet::new();

    for (index, record) in records.into_iter().enumerate() {
        match pattern_from_record(record) {
            Ok(pattern) if !ids.insert(pattern.pattern_id) => {
                discarded.push(format!("记录 {}: pattern_id {} 重复", index, pattern.pattern_id))
            }
            Ok(pattern) => patterns.push(pattern),
            Err(e) => discarded.push(format!("记录 {}: {}", index, e)),
        }
    }
    (patterns, discarded)
}

/// 构建模式生成的用户 prompt
pub fn build_prompt(topic: &str, count: usize) -> String {
    format!(
        r#"Create {count} distinct question patterns for the topic "{topic}".

Each pattern must describe a diagram that carries the information needed to answer the question.
Return a JSON array of exactly {count} objects with these fields:
- "pattern_id": integer starting at 1
- "pattern_name": short unique name
- "diagram_description": what the diagram shows
- "question_template": question text with placeholders such as {{x1}} for every variable
- "variables": array of {{"name", "type" (int|float|enum|string), "min_value", "max_value", "allowed_values", "unit", "description"}}
  numeric variables need both min_value and max_value with min_value < max_value; enum variables need allowed_values
- "difficulty": easy | medium | hard
- "learning_objective": one sentence

Do not wrap the array in markdown."#
    )
}

/// 模式来源
pub struct PatternSource {
    generator: Arc<dyn TextGenerator>,
    engine: RecoveryEngine,
    count: usize,
    use_fallback: bool,
}

impl PatternSource {
    pub fn new(generator: Arc<dyn TextGenerator>, count: usize, use_fallback: bool) -> Self {
        Self {
            generator,
            engine: RecoveryEngine::default(),
            count,
            use_fallback,
        }
    }

    /// 为主题生成模式集合
    pub async fn generate(&self, topic: &str) -> Result<PatternCollection, GenerationError> {
        info!("🧩 正在为主题 \"{}\" 生成 {} 个模式...", topic, self.count);

        match self.generate_from_service(topic).await {
            Ok(collection) => Ok(collection),
            Err(e) if self.use_fallback => {
                warn!("⚠️ 模式生成失败，使用内置模板: {}", e);
                self.fallback(topic)
            }
            Err(e) => Err(e),
        }
    }

    async fn generate_from_service(&self, topic: &str) -> Result<PatternCollection, GenerationError> {
        let raw = self
            .generator
            .generate(SYSTEM_PROMPT, &build_prompt(topic, self.count))
            .await?;
        let recovered = self.engine.recover(&raw)?;

        let (patterns, discarded) = patterns_from_records(recovered.records);
        for reason in &discarded {
            warn!("⚠️ 丢弃模式记录: {}", reason);
        }
        if patterns.is_empty() {
            return Err(GenerationError::InvalidRecord("没有可用的模式记录".to_string()));
        }

        let collection = PatternCollection {
            topic: topic.to_string(),
            patterns,
            generation_timestamp: chrono::Utc::now().to_rfc3339(),
            model_used: self.generator.model_name().to_string(),
            degraded: recovered.degraded || !discarded.is_empty(),
        };
        for defect in collection.validate() {
            warn!("⚠️ 模式集合: {}", defect);
        }
        info!("✓ 恢复出 {} 个模式", collection.patterns.len());
        Ok(collection)
    }

    fn fallback(&self, topic: &str) -> Result<PatternCollection, GenerationError> {
        let patterns = fallback_patterns(topic, self.count);
        if patterns.is_empty() {
            return Err(GenerationError::InvalidRecord("内置模板为空".to_string()));
        }
        Ok(PatternCollection {
            topic: topic.to_string(),
            patterns,
            generation_timestamp: chrono::Utc::now().to_rfc3339(),
            model_used: "fallback".to_string(),
            degraded: true,
        })
    }
}
