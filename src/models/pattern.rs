//! 题目模式（Pattern）与变量定义

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// 变量的标量类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableKind {
    #[serde(rename = "int", alias = "integer")]
    Integer,
    #[serde(rename = "float", alias = "real", alias = "number")]
    Real,
    #[serde(rename = "enum", alias = "enumerated")]
    Enumerated,
    #[serde(rename = "string", alias = "text", alias = "str")]
    Text,
}

impl VariableKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, VariableKind::Integer | VariableKind::Real)
    }
}

/// 变量定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: VariableKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub description: String,
}

impl VariableDefinition {
    /// 整数变量的便捷构造
    pub fn integer(name: &str, min: i64, max: i64, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: VariableKind::Integer,
            min_value: Some(min as f64),
            max_value: Some(max as f64),
            allowed_values: None,
            unit: None,
            description: description.to_string(),
        }
    }

    pub fn enumerated(name: &str, values: &[&str], description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: VariableKind::Enumerated,
            min_value: None,
            max_value: None,
            allowed_values: Some(values.iter().map(|v| v.to_string()).collect()),
            unit: None,
            description: description.to_string(),
        }
    }

    /// 检查单个变量定义的约束，返回缺陷列表
    pub fn validate(&self) -> Vec<String> {
        let mut defects = Vec::new();
        if self.name.trim().is_empty() {
            defects.push("变量名为空".to_string());
        }
        if self.description.trim().is_empty() {
            defects.push(format!("变量 {} 缺少描述", self.name));
        }
        match self.kind {
            VariableKind::Integer | VariableKind::Real => match (self.min_value, self.max_value) {
                (Some(min), Some(max)) if min < max => {}
                (Some(min), Some(max)) => {
                    defects.push(format!("变量 {} 的范围无效: min {} >= max {}", self.name, min, max))
                }
                _ => defects.push(format!("数值变量 {} 必须同时给出 min_value 和 max_value", self.name)),
            },
            VariableKind::Enumerated => {
                if self.allowed_values.as_ref().map_or(true, |v| v.is_empty()) {
                    defects.push(format!("枚举变量 {} 必须给出 allowed_values", self.name));
                }
            }
            VariableKind::Text => {}
        }
        defects
    }

    /// 数值是否落在闭区间内
    pub fn contains(&self, value: f64) -> bool {
        let above = self.min_value.map_or(true, |min| value >= min);
        let below = self.max_value.map_or(true, |max| value <= max);
        above && below
    }
}

/// 可复用的题目模板
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub pattern_id: u32,
    pub pattern_name: String,
    pub diagram_description: String,
    pub question_template: String,
    #[serde(default)]
    pub variables: Vec<VariableDefinition>,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default)]
    pub learning_objective: String,
}

pub(crate) fn default_difficulty() -> String {
    "medium".to_string()
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"))
}

impl Pattern {
    /// 模板中引用的变量名（按出现顺序去重）
    pub fn placeholders(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        placeholder_regex()
            .captures_iter(&self.question_template)
            .map(|c| c[1].to_string())
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }

    pub fn variable(&self, name: &str) -> Option<&VariableDefinition> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// 检查模式的不变量：
    /// 模板中的占位符必须在变量列表中唯一出现，且每个变量定义自身合法
    pub fn validate(&self) -> Vec<String> {
        let mut defects = Vec::new();
        if self.pattern_name.trim().is_empty() {
            defects.push(format!("模式 {} 名称为空", self.pattern_id));
        }
        if self.question_template.trim().is_empty() {
            defects.push(format!("模式 {} 题目模板为空", self.pattern_id));
        }

        let mut names = HashSet::new();
        for var in &self.variables {
            if !names.insert(var.name.as_str()) {
                defects.push(format!("模式 {} 变量重复: {}", self.pattern_id, var.name));
            }
            defects.extend(var.validate().into_iter().map(|d| format!("模式 {}: {}", self.pattern_id, d)));
        }

        for placeholder in self.placeholders() {
            if !names.contains(placeholder.as_str()) {
                defects.push(format!(
                    "模式 {} 模板引用了未定义的变量: {}",
                    self.pattern_id, placeholder
                ));
            }
        }
        defects
    }
}

/// 一个主题下的全部模式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternCollection {
    pub topic: String,
    pub patterns: Vec<Pattern>,
    pub generation_timestamp: String,
    pub model_used: String,
    /// 是否经过降级恢复或使用了内置模板
    #[serde(default)]
    pub degraded: bool,
}

impl PatternCollection {
    /// 集合级检查：id 与名称唯一
    pub fn validate(&self) -> Vec<String> {
        let mut defects = Vec::new();
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for pattern in &self.patterns {
            if !ids.insert(pattern.pattern_id) {
                defects.push(format!("pattern_id 重复: {}", pattern.pattern_id));
            }
            if !names.insert(pattern.pattern_name.as_str()) {
                defects.push(format!("pattern_name 重复: {}", pattern.pattern_name));
            }
        }
        defects
    }
}
