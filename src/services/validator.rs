//! 一致性校验 - 业务能力层
//!
//! 所有检查都是建议性的：返回缺陷或警告列表，从不返回错误，流程带着缺陷继续。
//! 可解性和变量使用检查是启发式的，可能误报（例如变量只以坐标形式出现在图中），
//! 因此只作为警告，不作为关卡。

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{Pattern, QuestionInstance, SolvabilityStatus, VariableKind};
use crate::services::sanitizer::MIN_SOURCE_LEN;

pub const MIN_QUESTION_LEN: usize = 10;
pub const MIN_ANSWER_LEN: usize = 1;
/// 可解性检查中答案的最短长度
pub const MIN_SOLVABLE_ANSWER_LEN: usize = 2;

const ANSWER_PLACEHOLDERS: [&str; 2] = ["unknown", "n/a"];

/// 一批题目的校验报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// 结构缺陷
    pub defects: Vec<String>,
    /// 启发式警告
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.defects.is_empty() && self.warnings.is_empty()
    }
}

/// 结构校验：id 唯一、所属模式一致、字段长度
pub fn validate_schema(pattern_id: u32, questions: &[QuestionInstance]) -> Vec<String> {
    let mut defects = Vec::new();
    let mut seen = HashSet::new();

    for q in questions {
        let tag = format!("题目 {}", q.instance_id);
        if !seen.insert(q.instance_id) {
            defects.push(format!("{}: instance_id 重复", tag));
        }
        if q.pattern_id != pattern_id {
            defects.push(format!(
                "{}: pattern_id {} 与所属模式 {} 不一致",
                tag, q.pattern_id, pattern_id
            ));
        }
        if q.question_text.trim().chars().count() < MIN_QUESTION_LEN {
            defects.push(format!("{}: question_text 为空或过短", tag));
        }
        if q.correct_answer.trim().chars().count() < MIN_ANSWER_LEN {
            defects.push(format!("{}: correct_answer 为空", tag));
        }
        if q.diagram_source.trim().chars().count() < MIN_SOURCE_LEN {
            defects.push(format!("{}: tikz_code 为空或过短", tag));
        }
    }
    defects
}

/// 可解性启发式：只看答案，尽力而为，不是正确性证明
pub fn check_solvability(question: &QuestionInstance) -> SolvabilityStatus {
    let answer = question.correct_answer.trim();
    if answer.is_empty() {
        return SolvabilityStatus::Invalid;
    }
    let lowered = answer.to_lowercase();
    if ANSWER_PLACEHOLDERS.contains(&lowered.as_str()) {
        return SolvabilityStatus::Invalid;
    }
    if answer.chars().count() < MIN_SOLVABLE_ANSWER_LEN {
        return SolvabilityStatus::Invalid;
    }
    SolvabilityStatus::Valid
}

/// 变量值可能出现的文本形式
fn textual_forms(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.to_lowercase()],
        Value::Number(n) => {
            let mut forms = vec![n.to_string()];
            if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 {
                    forms.push(format!("{}", f as i64));
                } else {
                    forms.push(format!("{:.2}", f));
                    forms.push(format!("{:.1}", f));
                }
            }
            forms
        }
        Value::Bool(b) => vec![b.to_string()],
        Value::Null => Vec::new(),
        other => vec![other.to_string().to_lowercase()],
    }
}

/// 变量使用检查：变量值没有出现在题干或绘图源码中时给出警告
pub fn check_variable_usage(question: &QuestionInstance) -> Vec<String> {
    let combined = format!("{} {}", question.question_text, question.diagram_source).to_lowercase();
    question
        .variables
        .iter()
        .filter(|(_, value)| {
            let forms = textual_forms(value);
            !forms.is_empty() && !forms.iter().any(|form| combined.contains(form.as_str()))
        })
        .map(|(name, value)| {
            format!(
                "题目 {}: 变量 {}={} 未出现在题干或图中",
                question.instance_id, name, value
            )
        })
        .collect()
}

/// 变量一致性：实例变量必须都在模式中声明，声明的变量都要实例化，取值在范围内
pub fn check_variable_consistency(pattern: &Pattern, question: &QuestionInstance) -> Vec<String> {
    let mut issues = Vec::new();
    let tag = format!("题目 {}", question.instance_id);

    for name in question.variables.keys() {
        if pattern.variable(name).is_none() {
            issues.push(format!("{}: 变量 {} 未在模式中声明", tag, name));
        }
    }

    for def in &pattern.variables {
        let Some(value) = question.variables.get(&def.name) else {
            issues.push(format!("{}: 模式变量 {} 未实例化", tag, def.name));
            continue;
        };
        match def.kind {
            VariableKind::Integer | VariableKind::Real => {
                let number = value
                    .as_f64()
                    .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()));
                match number {
                    Some(n) if !def.contains(n) => issues.push(format!(
                        "{}: 变量 {}={} 超出范围 [{:?}, {:?}]",
                        tag, def.name, n, def.min_value, def.max_value
                    )),
                    Some(n) if def.kind == VariableKind::Integer && n.fract() != 0.0 => {
                        issues.push(format!("{}: 变量 {}={} 应为整数", tag, def.name, n))
                    }
                    Some(_) => {}
                    None => issues.push(format!("{}: 变量 {} 不是数值: {}", tag, def.name, value)),
                }
            }
            VariableKind::Enumerated => {
                let text = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                let allowed = def.allowed_values.as_deref().unwrap_or_default();
                if !allowed.iter().any(|a| a == &text) {
                    issues.push(format!("{}: 变量 {}={} 不在允许值中", tag, def.name, text));
                }
            }
            VariableKind::Text => {}
        }
    }
    issues
}

/// 对一批题目执行全部检查，并按需更新可解性状态
///
/// 返回更新后的题目（顺序不变）和报告；结果只用于日志和清单。
pub fn validate_batch(
    pattern: &Pattern,
    questions: Vec<QuestionInstance>,
    solvability_enabled: bool,
) -> (Vec<QuestionInstance>, ValidationReport) {
    let mut report = ValidationReport {
        defects: validate_schema(pattern.pattern_id, &questions),
        warnings: Vec::new(),
    };

    let questions = questions
        .into_iter()
        .map(|q| {
            report.warnings.extend(check_variable_usage(&q));
            report.warnings.extend(check_variable_consistency(pattern, &q));
            if solvability_enabled {
                let status = check_solvability(&q);
                if status == SolvabilityStatus::Invalid {
                    report
                        .warnings
                        .push(format!("题目 {}: 可解性检查未通过", q.instance_id));
                }
                q.with_solvability(status)
            } else {
                q
            }
        })
        .collect();

    for defect in &report.defects {
        warn!("[模式 {}] ⚠️ {}", pattern.pattern_id, defect);
    }
    for warning in &report.warnings {
        debug!("[模式 {}] {}", pattern.pattern_id, warning);
    }
    (questions, report)
}
