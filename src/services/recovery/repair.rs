//! 绘图源码字段的转义修复
//!
//! 生成器经常把 TikZ 代码原样塞进 JSON 字符串：`\draw`、`\node` 这类命令里的反斜杠
//! 没有转义，还可能夹带裸引号和换行。这里只改写已知绘图字段的字符串值，其余部分保持原样。

use regex::Regex;

/// 字符串值里一个反斜杠的含义
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backslash {
    /// `\\`
    Pair,
    /// 合法的 JSON 转义，长度为字符数
    Escape(usize),
    /// 绘图语言命令或非法转义
    Raw,
}

fn classify(chars: &[char], i: usize) -> Backslash {
    match chars.get(i + 1) {
        Some('\\') => Backslash::Pair,
        Some('"') | Some('/') => Backslash::Escape(2),
        Some('u') => {
            let hex = chars
                .get(i + 2..i + 6)
                .map_or(false, |h| h.iter().all(|c| c.is_ascii_hexdigit()));
            if hex {
                Backslash::Escape(6)
            } else {
                Backslash::Raw
            }
        }
        // `\b` `\f` `\n` `\r` `\t` 既可能是 JSON 转义，也可能是 `\node`、`\frac` 这类命令；
        // 只有整个控制词是已知命令时才按命令处理，`\nnode` 仍是换行加 `node`
        Some('b' | 'f' | 'n' | 'r' | 't') => {
            let word: String = chars[i + 1..].iter().take_while(|c| c.is_ascii_alphabetic()).collect();
            if is_known_command(&word) {
                Backslash::Raw
            } else {
                Backslash::Escape(2)
            }
        }
        _ => Backslash::Raw,
    }
}

/// 以 b/f/n/r/t 开头的常见绘图与数学命令
const AMBIGUOUS_COMMANDS: &[&str] = &[
    // b
    "backslash", "bar", "baselineskip", "begin", "beta", "bf", "big", "bigg", "bigl", "bigr",
    "binom", "bmod", "boldsymbol", "bot", "bullet",
    // f
    "fbox", "fill", "filldraw", "flat", "fontsize", "footnotesize", "foreach", "forall", "frac",
    "frown",
    // n
    "nabla", "ne", "neg", "neq", "newline", "ni", "node", "noindent", "not", "nu", "null",
    // r
    "raggedright", "raisebox", "rangle", "rceil", "rfloor", "rho", "right", "rightarrow", "rm",
    "rule",
    // t
    "tan", "tau", "tfrac", "text", "textbf", "textit", "textrm", "textsf", "texttt", "theta",
    "tilde", "times", "tiny", "to", "top", "triangle",
];

fn is_known_command(word: &str) -> bool {
    AMBIGUOUS_COMMANDS.contains(&word) || word.starts_with("tikz")
}

/// 匹配绘图字段的键和值起始引号
pub fn field_regex(keys: &[String]) -> Regex {
    let alternatives = keys
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!(r#"["']?(?:{})["']?\s*:\s*""#, alternatives);
    Regex::new(&pattern).expect("escaped keys form a valid regex")
}

/// 从 `j` 开始跳过空白
fn skip_ws(bytes: &[u8], mut j: usize) -> usize {
    while j < bytes.len() && bytes[j].is_ascii_whitespace() {
        j += 1;
    }
    j
}

/// 位于 `quote` 的引号是否为字符串值的结束引号
fn closes_value(bytes: &[u8], quote: usize) -> bool {
    let j = skip_ws(bytes, quote + 1);
    if j >= bytes.len() {
        return true;
    }
    match bytes[j] {
        b',' => {
            let k = skip_ws(bytes, j + 1);
            k >= bytes.len() || matches!(bytes[k], b'"' | b'\'' | b'}' | b']')
        }
        b'}' | b']' => {
            let k = skip_ws(bytes, j + 1);
            k >= bytes.len() || matches!(bytes[k], b',' | b'}' | b']' | b'`')
        }
        _ => false,
    }
}

/// 返回值内容的字节区间 `[start, end)`；找不到结束引号时延伸到文本末尾
fn value_span(text: &str, start: usize) -> (usize, usize) {
    let bytes = text.as_bytes();
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'"' if closes_value(bytes, i) => return (start, i),
            _ => {}
        }
        i += 1;
    }
    (start, bytes.len())
}

/// 所有绘图字段值的字节区间
pub fn field_spans(text: &str, key_re: &Regex) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut from = 0;
    while let Some(m) = key_re.find_at(text, from) {
        let (start, end) = value_span(text, m.end());
        spans.push((start, end));
        from = (end + 1).min(text.len());
        if from >= text.len() {
            break;
        }
    }
    spans
}

/// 绘图字段中是否含有未转义的命令反斜杠
pub fn has_raw_commands(text: &str, key_re: &Regex) -> bool {
    field_spans(text, key_re).into_iter().any(|(start, end)| {
        let chars: Vec<char> = text[start..end].chars().collect();
        let mut i = 0;
        while i < chars.len() {
            if chars[i] == '\\' {
                match classify(&chars, i) {
                    Backslash::Pair => i += 2,
                    Backslash::Escape(n) => i += n,
                    Backslash::Raw => return true,
                }
            } else {
                i += 1;
            }
        }
        false
    })
}

/// 重新转义单个字段值
fn escape_value(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    let mut out = String::with_capacity(content.len() + 16);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => match classify(&chars, i) {
                Backslash::Pair => {
                    out.push_str("\\\\");
                    i += 2;
                    continue;
                }
                Backslash::Escape(n) => {
                    out.extend(&chars[i..i + n]);
                    i += n;
                    continue;
                }
                Backslash::Raw => out.push_str("\\\\"),
            },
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push(' '),
            c => out.push(c),
        }
        i += 1;
    }
    out
}

/// 修复文本中所有绘图字段的转义，其余内容原样保留
pub fn repair_escapes(text: &str, key_re: &Regex) -> String {
    let spans = field_spans(text, key_re);
    if spans.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + 64);
    let mut cursor = 0;
    for (start, end) in spans {
        out.push_str(&text[cursor..start]);
        out.push_str(&escape_value(&text[start..end]));
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}
