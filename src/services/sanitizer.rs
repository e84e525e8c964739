//! 绘图源码清洗
//!
//! 生成的 TikZ 代码不可信：不允许定义宏、读写文件、调用 shell 或改动外层文档结构。
//! 这里的检查都是不可重试的输入缺陷。

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};
use thiserror::Error;

/// 源码最短长度（去掉首尾空白后）
pub const MIN_SOURCE_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
    #[error("绘图源码为空")]
    Empty,
    #[error("绘图源码过短: {len} < {min}")]
    TooShort { len: usize, min: usize },
    #[error("括号不匹配 (unbalanced {open}{close}): {detail}")]
    Unbalanced { open: char, close: char, detail: String },
    #[error("包含禁止的指令: {directive}")]
    Forbidden { directive: String },
}

/// 清洗后的源码，可直接嵌入文档模板
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedSource {
    /// 原 `tikzpicture` 环境的选项，例如 `[scale=0.8]`
    pub options: Option<String>,
    pub body: String,
}

fn forbidden_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let commands = [
            "input", "include", "includegraphics", "includeonly", "write", "read", "openin", "openout",
            "closein", "closeout", "immediate", "shell", "shellescape", "special", "directlua", "def",
            "gdef", "edef", "xdef", "let", "futurelet", "newcommand", "renewcommand",
            "providecommand", "newenvironment", "renewenvironment", "usepackage", "requirepackage",
            "documentclass", "usetikzlibrary", "tikzset", "catcode", "csname", "expandafter",
        ];
        let pattern = format!(
            r"\\(?:{})(?:[^A-Za-z]|$)|\\(?:begin|end)\s*\{{\s*document\s*\}}",
            commands.join("|")
        );
        RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .expect("deny-list regex")
    })
}

/// 返回第一个被禁止的指令
pub fn find_forbidden(source: &str) -> Option<String> {
    forbidden_regex().find(source).map(|m| {
        m.as_str()
            .trim_end_matches(|c: char| !c.is_ascii_alphabetic() && c != '}')
            .to_string()
    })
}

/// 去掉行注释（未转义的 `%` 到行尾）
fn strip_comments(source: &str) -> String {
    source
        .lines()
        .map(|line| {
            let bytes = line.as_bytes();
            let mut cut = line.len();
            for (i, &b) in bytes.iter().enumerate() {
                if b == b'%' && (i == 0 || bytes[i - 1] != b'\\') {
                    cut = i;
                    break;
                }
            }
            &line[..cut]
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 检查 `{}` 与 `[]` 是否平衡，跳过 `\{`、`\}` 和注释
pub fn check_balance(source: &str) -> Result<(), SanitizeError> {
    let cleaned = strip_comments(source);
    for (open, close) in [('{', '}'), ('[', ']')] {
        let mut depth: i64 = 0;
        let mut prev_backslash = false;
        for (line_no, line) in cleaned.lines().enumerate() {
            for c in line.chars() {
                if prev_backslash {
                    prev_backslash = false;
                    continue;
                }
                if c == '\\' {
                    prev_backslash = true;
                    continue;
                }
                if c == open {
                    depth += 1;
                } else if c == close {
                    depth -= 1;
                    if depth < 0 {
                        return Err(SanitizeError::Unbalanced {
                            open,
                            close,
                            detail: format!("第 {} 行出现多余的 '{}'", line_no + 1, close),
                        });
                    }
                }
            }
            prev_backslash = false;
        }
        if depth != 0 {
            return Err(SanitizeError::Unbalanced {
                open,
                close,
                detail: format!("缺少 {} 个 '{}'", depth, close),
            });
        }
    }
    Ok(())
}

/// 常见 Unicode 符号到数学命令的映射
const SYMBOLS: [(char, &str); 14] = [
    ('°', r"\ensuremath{^\circ}"),
    ('α', r"\ensuremath{\alpha}"),
    ('β', r"\ensuremath{\beta}"),
    ('γ', r"\ensuremath{\gamma}"),
    ('δ', r"\ensuremath{\delta}"),
    ('θ', r"\ensuremath{\theta}"),
    ('λ', r"\ensuremath{\lambda}"),
    ('μ', r"\ensuremath{\mu}"),
    ('π', r"\ensuremath{\pi}"),
    ('σ', r"\ensuremath{\sigma}"),
    ('φ', r"\ensuremath{\varphi}"),
    ('ω', r"\ensuremath{\omega}"),
    ('Δ', r"\ensuremath{\Delta}"),
    ('√', r"\ensuremath{\surd}"),
];

fn replace_symbols(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    for c in source.chars() {
        match SYMBOLS.iter().find(|(symbol, _)| *symbol == c) {
            Some((_, replacement)) => out.push_str(replacement),
            None => out.push(c),
        }
    }
    out
}

/// 去掉外层的 `tikzpicture` 环境，返回 (选项, 正文)
fn split_environment(source: &str) -> (Option<String>, String) {
    static ENV: OnceLock<Regex> = OnceLock::new();
    let env = ENV.get_or_init(|| {
        Regex::new(r"(?s)^\\begin\{tikzpicture\}\s*(\[[^\]]*\])?(.*)\\end\{tikzpicture\}$").expect("environment regex")
    });

    let trimmed = source.trim();
    match env.captures(trimmed) {
        Some(caps) => (
            caps.get(1).map(|m| m.as_str().to_string()),
            caps.get(2).map_or_else(String::new, |m| m.as_str().trim().to_string()),
        ),
        None => (None, trimmed.to_string()),
    }
}

/// 阶段 1：校验并规范化绘图源码
pub fn sanitize(source: &str) -> Result<SanitizedSource, SanitizeError> {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Err(SanitizeError::Empty);
    }
    let len = trimmed.chars().count();
    if len < MIN_SOURCE_LEN {
        return Err(SanitizeError::TooShort {
            len,
            min: MIN_SOURCE_LEN,
        });
    }
    check_balance(trimmed)?;
    // `^^xx` 在读入时还原成任意字符，可以拼出任何被禁止的指令
    if trimmed.contains("^^") {
        return Err(SanitizeError::Forbidden {
            directive: "^^".to_string(),
        });
    }
    if let Some(directive) = find_forbidden(trimmed) {
        return Err(SanitizeError::Forbidden { directive });
    }

    let (options, body) = split_environment(trimmed);
    Ok(SanitizedSource {
        options,
        body: replace_symbols(&body),
    })
}
