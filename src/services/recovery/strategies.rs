//! 恢复策略
//!
//! 每个策略都是 `fn(&RecoveryEngine, &str) -> Option<Vec<Record>>`，按顺序尝试，
//! 第一个返回非空记录的策略胜出。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::repair::{has_raw_commands, repair_escapes};
use super::{Record, RecoveryEngine};

/// 一个命名的恢复策略
pub struct Strategy {
    pub name: &'static str,
    pub attempt: fn(&RecoveryEngine, &str) -> Option<Vec<Record>>,
}

/// 按优先级排列的策略链
pub const STRATEGIES: [Strategy; 6] = [
    Strategy {
        name: "strict",
        attempt: strict_parse,
    },
    Strategy {
        name: "markdown_unwrap",
        attempt: markdown_unwrap,
    },
    Strategy {
        name: "lenient",
        attempt: lenient_parse,
    },
    Strategy {
        name: "escape_repair",
        attempt: escape_repair,
    },
    Strategy {
        name: "bracket_extraction",
        attempt: bracket_extraction,
    },
    Strategy {
        name: "per_record",
        attempt: per_record,
    },
];

// ========== 解析工具 ==========

fn parse_strict(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

fn parse_lenient(text: &str) -> Option<Value> {
    json5::from_str::<Value>(text).ok().map(integral_numbers)
}

/// 宽松解析器可能把整数读成浮点数，这里还原为整数
fn integral_numbers(value: Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Value::from(f as i64),
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(integral_numbers).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, integral_numbers(v))).collect()),
        other => other,
    }
}

/// 把解析结果展开为记录列表
///
/// - 数组：保留其中的对象
/// - 只包裹了一个对象数组的对象（如 `{"questions": [...]}`）：展开该数组
/// - 其他对象：视为单条记录
fn into_records(engine: &RecoveryEngine, value: Value) -> Option<Vec<Record>> {
    let records: Vec<Record> = match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        Value::Object(map) => {
            let wrapped: Vec<&Value> = map
                .values()
                .filter(|v| matches!(v, Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object)))
                .collect();
            if wrapped.len() == 1 && !engine.has_id(&map) {
                let inner = wrapped[0].clone();
                return into_records(engine, inner);
            }
            vec![map]
        }
        _ => return None,
    };
    (!records.is_empty()).then_some(records)
}

/// 去掉 markdown 代码围栏：取第一个围栏块；缺少结束围栏时取开头之后的全部内容
pub fn unwrap_markdown(text: &str) -> &str {
    static FENCED: OnceLock<Regex> = OnceLock::new();
    static OPENING: OnceLock<Regex> = OnceLock::new();
    let fenced = FENCED.get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9]*[ \t]*\r?\n?(.*?)```").expect("fence regex"));
    let opening = OPENING.get_or_init(|| Regex::new(r"```[A-Za-z0-9]*[ \t]*\r?\n?").expect("opening fence regex"));

    if let Some(caps) = fenced.captures(text) {
        if let Some(body) = caps.get(1) {
            return body.as_str().trim();
        }
    }
    if let Some(m) = opening.find(text) {
        return text[m.end()..].trim();
    }
    text.trim()
}

/// 从 `open` 处的括号开始做配对计数，跳过字符串内部的括号；返回闭合位置
fn balanced_end(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string: Option<u8> = None;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == quote {
                in_string = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' => in_string = Some(b),
            b'[' | b'{' => stack.push(b),
            b']' | b'}' => {
                let expected = if b == b']' { b'[' } else { b'{' };
                if stack.pop() != Some(expected) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

// ========== 策略 ==========

/// 1. 原文严格解析
fn strict_parse(engine: &RecoveryEngine, text: &str) -> Option<Vec<Record>> {
    if has_raw_commands(text, &engine.field_re) {
        return None;
    }
    into_records(engine, parse_strict(text)?)
}

/// 2. 去掉围栏后严格解析
fn markdown_unwrap(engine: &RecoveryEngine, text: &str) -> Option<Vec<Record>> {
    if !text.contains("```") {
        return None;
    }
    strict_parse(engine, unwrap_markdown(text))
}

/// 3. 宽松语法（尾逗号、无引号键、单引号）
fn lenient_parse(engine: &RecoveryEngine, text: &str) -> Option<Vec<Record>> {
    let body = unwrap_markdown(text);
    if has_raw_commands(body, &engine.field_re) {
        return None;
    }
    into_records(engine, parse_lenient(body)?)
}

/// 4. 修复绘图字段转义后宽松解析
fn escape_repair(engine: &RecoveryEngine, text: &str) -> Option<Vec<Record>> {
    let repaired = repair_escapes(unwrap_markdown(text), &engine.field_re);
    into_records(engine, parse_lenient(&repaired)?)
}

/// 5. 括号计数截取第一个对象数组
fn bracket_extraction(engine: &RecoveryEngine, text: &str) -> Option<Vec<Record>> {
    static ARRAY_START: OnceLock<Regex> = OnceLock::new();
    let array_start = ARRAY_START.get_or_init(|| Regex::new(r"\[\s*\{").expect("array start regex"));

    let body = unwrap_markdown(text);
    let repaired = repair_escapes(body, &engine.field_re);
    for candidate in [repaired.as_str(), body] {
        let Some(start) = array_start.find(candidate).map(|m| m.start()) else {
            continue;
        };
        let Some(end) = balanced_end(candidate, start) else {
            continue;
        };
        let span = &candidate[start..=end];
        if let Some(records) = parse_lenient(span).and_then(|v| into_records(engine, v)) {
            return Some(records);
        }
    }
    None
}

/// 6. 逐条重建：扫描每个 `{...}`，保留含有标识字段且能解析的记录
fn per_record(engine: &RecoveryEngine, text: &str) -> Option<Vec<Record>> {
    let repaired = repair_escapes(unwrap_markdown(text), &engine.field_re);
    let bytes = repaired.as_bytes();
    let mut records = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'{' {
            i += 1;
            continue;
        }
        let Some(end) = balanced_end(&repaired, i) else {
            i += 1;
            continue;
        };
        let span = &repaired[i..=end];
        if engine.id_re.is_match(span) {
            if let Some(Value::Object(map)) = parse_lenient(span) {
                if engine.has_id(&map) {
                    records.push(map);
                    i = end + 1;
                    continue;
                }
            }
        }
        i += 1;
    }

    (!records.is_empty()).then_some(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> RecoveryEngine {
        RecoveryEngine::default()
    }

    #[test]
    fn test_unwrap_markdown_variants() {
        assert_eq!(unwrap_markdown("```json\n[1]\n```"), "[1]");
        assert_eq!(unwrap_markdown("intro\n```\n[2]\n``` outro"), "[2]");
        assert_eq!(unwrap_markdown("```json\n[3, 4"), "[3, 4");
        assert_eq!(unwrap_markdown("  [5] "), "[5]");
    }

    #[test]
    fn test_balanced_end_ignores_brackets_in_strings() {
        let text = r#"[{"a": "x]}"}, {"b": 2}] tail"#;
        let end = balanced_end(text, 0).unwrap();
        assert_eq!(&text[end..], "] tail");
    }

    #[test]
    fn test_balanced_end_rejects_mismatch() {
        assert_eq!(balanced_end("[{]}", 0), None);
        assert_eq!(balanced_end("[{\"a\": 1}", 0), None);
    }

    #[test]
    fn test_wrapper_object_is_unwrapped() {
        let value = serde_json::json!({"questions": [{"instance_id": 1}, {"instance_id": 2}]});
        assert_eq!(into_records(&engine(), value).unwrap().len(), 2);
    }

    #[test]
    fn test_single_record_object_kept() {
        let value = serde_json::json!({"instance_id": 1, "variables": [{"name": "x"}]});
        let records = into_records(&engine(), value).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].contains_key("instance_id"));
    }

    #[test]
    fn test_per_record_skips_broken_sibling() {
        let text = r#"[{"instance_id": 1, "x": 1}, {"instance_id": 2, "x": }, {"instance_id": 3, "x": 3}"#;
        let records = per_record(&engine(), text).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r["instance_id"].as_u64().unwrap()).collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
