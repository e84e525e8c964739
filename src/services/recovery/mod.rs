//! 结构化响应恢复引擎 - 业务能力层
//!
//! ## 职责
//!
//! 把文本生成服务返回的、"应该是"一个 JSON 对象数组的原始文本，尽力恢复成记录列表，
//! 并给出恢复是否降级的信号。
//!
//! ## 策略链
//!
//! 1. 严格解析
//! 2. 去掉 markdown 围栏后严格解析
//! 3. 宽松语法解析（json5）
//! 4. 修复绘图字段的转义后宽松解析
//! 5. 括号计数截取第一个对象数组
//! 6. 逐条重建，丢弃损坏的记录，保留完好的兄弟记录
//!
//! 第 1 个策略之外的任何成功都标记 `degraded = true`。引擎是纯函数，
//! 对同一输入重复调用得到相同结果。

mod repair;
mod strategies;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::RecoveryError;

pub use repair::repair_escapes;
pub use strategies::{unwrap_markdown, Strategy, STRATEGIES};

/// 一条恢复出的记录
pub type Record = Map<String, Value>;

/// 恢复结果
#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub records: Vec<Record>,
    pub degraded: bool,
    /// 成功的策略名
    pub strategy: &'static str,
}

/// 恢复引擎
#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    id_keys: Vec<String>,
    field_re: Regex,
    id_re: Regex,
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(&["tikz_code", "diagram_source"], &["instance_id", "pattern_id"])
    }
}

impl RecoveryEngine {
    /// - `diagram_keys`: 内嵌绘图源码的字段名
    /// - `id_keys`: 逐条重建时用来识别记录的字段名
    pub fn new(diagram_keys: &[&str], id_keys: &[&str]) -> Self {
        let diagram_keys: Vec<String> = diagram_keys.iter().map(|k| k.to_string()).collect();
        let id_keys: Vec<String> = id_keys.iter().map(|k| k.to_string()).collect();
        let id_alternatives = id_keys
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        let id_re = Regex::new(&format!(r#"["']?(?:{})["']?\s*:"#, id_alternatives))
            .expect("escaped keys form a valid regex");

        Self {
            field_re: repair::field_regex(&diagram_keys),
            id_keys,
            id_re,
        }
    }

    fn has_id(&self, record: &Record) -> bool {
        self.id_keys.iter().any(|k| record.contains_key(k))
    }

    /// 恢复记录
    ///
    /// 空白输入返回 `EmptyInput`；所有策略都失败时返回带前 500 字符预览的
    /// `UnrecoverableFormat`。
    pub fn recover(&self, raw_text: &str) -> Result<Recovered, RecoveryError> {
        if raw_text.trim().is_empty() {
            return Err(RecoveryError::EmptyInput);
        }

        for (index, strategy) in STRATEGIES.iter().enumerate() {
            if let Some(records) = (strategy.attempt)(self, raw_text) {
                let degraded = index > 0;
                if degraded {
                    warn!(
                        "⚠️ 响应格式不规范，经策略 [{}] 恢复出 {} 条记录",
                        strategy.name,
                        records.len()
                    );
                } else {
                    debug!("严格解析成功，共 {} 条记录", records.len());
                }
                return Ok(Recovered {
                    records,
                    degraded,
                    strategy: strategy.name,
                });
            }
            debug!("恢复策略 [{}] 未成功", strategy.name);
        }

        Err(RecoveryError::unrecoverable(raw_text))
    }
}

/// 使用默认字段配置恢复记录，返回 `(records, degraded)`
pub fn recover(raw_text: &str) -> Result<(Vec<Record>, bool), RecoveryError> {
    RecoveryEngine::default()
        .recover(raw_text)
        .map(|r| (r.records, r.degraded))
}
