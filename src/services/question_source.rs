//! 题目来源 - 业务能力层
//!
//! 按模式生成题目实例：先确定性地采样几组变量值作为提示，
//! 再把生成服务的原始输出交给恢复引擎，最后转换为 `QuestionInstance`。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Number, Value};
use tracing::{info, warn};

use crate::error::GenerationError;
use crate::models::{Pattern, QuestionInstance, QuestionSet, VariableKind};
use crate::services::llm_service::TextGenerator;
use crate::services::recovery::{Record, RecoveryEngine};

/// prompt 中给出的示例组数
pub const SAMPLE_SETS: usize = 3;

const SYSTEM_PROMPT: &str = "You are an expert mathematics teacher who writes diagram-based questions. \
Every diagram is a TikZ snippet without preamble or tikzpicture wrapper. \
Respond with a single JSON array and nothing else.";

/// splitmix64，用于确定性采样
fn mix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// 为模式采样第 `index` 组变量值，同一输入总是得到同样的结果
pub fn sample_values(pattern: &Pattern, index: usize) -> BTreeMap<String, Value> {
    pattern
        .variables
        .iter()
        .enumerate()
        .map(|(position, def)| {
            let seed = mix(((pattern.pattern_id as u64) << 32) ^ ((index as u64) << 16) ^ position as u64);
            let min = def.min_value.unwrap_or(0.0);
            let max = def.max_value.unwrap_or(min + 10.0).max(min);

            let value = match def.kind {
                VariableKind::Integer => {
                    let (lo, hi) = (min.ceil() as i64, max.floor() as i64);
                    let span = (hi - lo).max(0) as u64 + 1;
                    Value::from(lo + (seed % span) as i64)
                }
                VariableKind::Real => {
                    let unit = (seed >> 11) as f64 / (1u64 << 53) as f64;
                    let v = (((min + unit * (max - min)) * 100.0).round() / 100.0).clamp(min, max);
                    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
                }
                VariableKind::Enumerated => match def.allowed_values.as_deref() {
                    Some(values) if !values.is_empty() => {
                        Value::String(values[(seed % values.len() as u64) as usize].clone())
                    }
                    _ => Value::Null,
                },
                VariableKind::Text => Value::String(format!("<{}>", def.name)),
            };
            (def.name.clone(), value)
        })
        .collect()
}

/// 用变量值替换模板占位符，实数保留两位小数
pub fn fill_template(template: &str, values: &BTreeMap<String, Value>) -> String {
    values.iter().fold(template.to_string(), |text, (name, value)| {
        let rendered = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) if n.is_f64() => format!("{:.2}", n.as_f64().unwrap_or_default()),
            other => other.to_string(),
        };
        text.replace(&format!("{{{}}}", name), &rendered)
    })
}

fn describe_variables(pattern: &Pattern) -> String {
    pattern
        .variables
        .iter()
        .map(|v| {
            let mut line = format!("  - {} ({:?}): {}", v.name, v.kind, v.description);
            if v.kind.is_numeric() {
                line.push_str(&format!(
                    " [Range: {}-{}]",
                    v.min_value.unwrap_or_default(),
                    v.max_value.unwrap_or_default()
                ));
            }
            if let Some(values) = &v.allowed_values {
                line.push_str(&format!(" [Values: {}]", values.join(", ")));
            }
            if let Some(unit) = &v.unit {
                line.push_str(&format!(" [Unit: {}]", unit));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 构建题目生成的用户 prompt
pub fn build_prompt(topic: &str, pattern: &Pattern, count: usize) -> String {
    let samples = (0..SAMPLE_SETS)
        .map(|i| {
            let values = sample_values(pattern, i);
            format!("  Example {}: {}", i + 1, fill_template(&pattern.question_template, &values))
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Topic: {topic}
Pattern ID: {id}
Pattern Name: {name}
Difficulty: {difficulty}

DIAGRAM DESCRIPTION:
{diagram}

QUESTION TEMPLATE:
{template}

VARIABLES:
{variables}

SAMPLE INSTANTIATIONS:
{samples}

Generate exactly {count} different question instances for this pattern.
Each question must be impossible to answer without the diagram, and the diagram must label every value the question needs.
TikZ rules: basic primitives only (\draw, \node, \fill, --, circle, arc), no preamble, no \begin{{tikzpicture}} wrapper, no packages.

Return a JSON array:
[{{"instance_id": 0, "variables": {{"name": value}}, "question_text": "...", "correct_answer": "...", "tikz_code": "...", "difficulty": "{difficulty}"}}]
Use instance_id 0 to {last}. Return only JSON, no markdown."#,
        id = pattern.pattern_id,
        name = pattern.pattern_name,
        difficulty = pattern.difficulty,
        diagram = pattern.diagram_description,
        template = pattern.question_template,
        variables = describe_variables(pattern),
        last = count.saturating_sub(1),
    )
}

/// 把记录转换为题目；缺失的 pattern_id / topic / instance_id 用上下文补齐
pub fn question_from_record(
    mut record: Record,
    topic: &str,
    pattern: &Pattern,
    position: usize,
) -> Result<QuestionInstance, GenerationError> {
    record
        .entry("pattern_id")
        .or_insert_with(|| Value::from(pattern.pattern_id));
    record
        .entry("instance_id")
        .or_insert_with(|| Value::from(position as u64));
    if record.get("topic").and_then(Value::as_str).map_or(true, str::is_empty) {
        record.insert("topic".to_string(), Value::String(topic.to_string()));
    }
    if !record.contains_key("difficulty") {
        record.insert("difficulty".to_string(), Value::String(pattern.difficulty.clone()));
    }

    serde_json::from_value(Value::Object(record)).map_err(|e| GenerationError::InvalidRecord(e.to_string()))
}

/// 题目来源
pub struct QuestionSource {
    generator: Arc<dyn TextGenerator>,
    engine: RecoveryEngine,
    per_pattern: usize,
}

impl QuestionSource {
    pub fn new(generator: Arc<dyn TextGenerator>, per_pattern: usize) -> Self {
        Self {
            generator,
            engine: RecoveryEngine::default(),
            per_pattern,
        }
    }

    /// 为一个模式生成题目集合
    pub async fn generate(&self, topic: &str, pattern: &Pattern) -> Result<QuestionSet, GenerationError> {
        info!(
            "[模式 {}] 📝 正在生成 {} 道题目: {}",
            pattern.pattern_id, self.per_pattern, pattern.pattern_name
        );

        let raw = self
            .generator
            .generate(SYSTEM_PROMPT, &build_prompt(topic, pattern, self.per_pattern))
            .await?;
        let recovered = self.engine.recover(&raw)?;

        // 重复的 instance_id 原样保留，由校验器记录为缺陷
        let mut questions = Vec::new();
        let mut discarded = 0;
        for (position, record) in recovered.records.into_iter().enumerate() {
            match question_from_record(record, topic, pattern, position) {
                Ok(q) => questions.push(q),
                Err(e) => {
                    warn!("[模式 {}] ⚠️ 丢弃记录 {}: {}", pattern.pattern_id, position, e);
                    discarded += 1;
                }
            }
        }

        if questions.is_empty() {
            return Err(GenerationError::InvalidRecord(format!(
                "模式 {} 没有可用的题目记录",
                pattern.pattern_id
            )));
        }
        if questions.len() != self.per_pattern {
            warn!(
                "[模式 {}] ⚠️ 期望 {} 道题目，实际 {} 道",
                pattern.pattern_id,
                self.per_pattern,
                questions.len()
            );
        }

        info!("[模式 {}] ✓ 恢复出 {} 道题目", pattern.pattern_id, questions.len());
        Ok(QuestionSet {
            topic: topic.to_string(),
            pattern_id: pattern.pattern_id,
            questions,
            generation_timestamp: chrono::Utc::now().to_rfc3339(),
            degraded: recovered.degraded || discarded > 0,
        })
    }
}
