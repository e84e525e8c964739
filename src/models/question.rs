//! 题目实例（Question Instance）

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::pattern::default_difficulty;

/// 可解性状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolvabilityStatus {
    #[default]
    Pending,
    Valid,
    Invalid,
}

impl fmt::Display for SolvabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolvabilityStatus::Pending => "pending",
            SolvabilityStatus::Valid => "valid",
            SolvabilityStatus::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// 由某个模式实例化出的一道具体题目
///
/// 除了可解性状态外创建后不再修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionInstance {
    pub instance_id: u32,
    pub pattern_id: u32,
    #[serde(default)]
    pub topic: String,
    pub question_text: String,
    #[serde(deserialize_with = "string_or_scalar")]
    pub correct_answer: String,
    /// 绘图源码（TikZ）
    #[serde(rename = "tikz_code", alias = "diagram_source")]
    pub diagram_source: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(rename = "solvability_check", default)]
    pub solvability: SolvabilityStatus,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
}

impl QuestionInstance {
    /// 更新可解性状态（唯一允许的修改）
    pub fn with_solvability(mut self, status: SolvabilityStatus) -> Self {
        self.solvability = status;
        self
    }
}

/// 生成器偶尔把答案写成数字，这里统一转成字符串
fn string_or_scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Ok(other.to_string()),
    }
}

/// 一个模式下的题目集合
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSet {
    pub topic: String,
    pub pattern_id: u32,
    pub questions: Vec<QuestionInstance>,
    pub generation_timestamp: String,
    /// 恢复过程是否降级
    #[serde(default)]
    pub degraded: bool,
}
