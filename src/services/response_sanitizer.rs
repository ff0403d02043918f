//! LLM 返回内容修复 - 业务能力层
//!
//! 只负责把 LLM 返回的原始文本变成结构化判定，容忍各种格式问题
//!
//! 修复顺序（幂等，顺序有意义）：
//! 1. 去掉代码块标记
//! 2. 去掉右括号前和结尾处多余的逗号
//! 3. 结构位置上的单引号、裸键名、Python 风格字面量统一成 JSON 写法
//! 4. 控制字符替换为空格
//! 5. 补齐未闭合的字符串和括号，丢弃多余的右括号
//! 6. 截取最外层的完整对象

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::JudgeError;
use crate::models::{SimilarityVerdict, VerdictSource};

const DEFAULT_REASON: &str = "未提供判定理由";
const DEFAULT_EXPLANATION: &str = "未提供说明";

/// LLM 返回的判定，所有字段都可能缺失
#[derive(Debug, Default, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    score: Option<ScoreValue>,
    #[serde(default, alias = "isSame", alias = "same", alias = "isDuplicate")]
    is_same: Option<FlagValue>,
    #[serde(default)]
    reasons: Option<ReasonsValue>,
    #[serde(default)]
    explanation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScoreValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FlagValue {
    Bool(bool),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReasonsValue {
    List(Vec<String>),
    Single(String),
}

impl ScoreValue {
    fn as_f64(&self) -> Option<f64> {
        let (raw, percent) = match self {
            ScoreValue::Number(n) => (*n, false),
            ScoreValue::Text(s) => {
                let s = s.trim();
                let percent = s.ends_with('%');
                (s.trim_end_matches('%').trim().parse().ok()?, percent)
            }
        };
        if !raw.is_finite() {
            return None;
        }
        // 有的模型按百分制打分；1 到 2 之间视为略微超出上限
        let scaled = if percent || (2.0..=100.0).contains(&raw) {
            raw / 100.0
        } else {
            raw
        };
        Some(scaled.clamp(0.0, 1.0))
    }
}

impl FlagValue {
    fn as_bool(&self) -> Option<bool> {
        match self {
            FlagValue::Bool(b) => Some(*b),
            FlagValue::Text(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "是" => Some(true),
                "false" | "no" | "否" => Some(false),
                _ => None,
            },
        }
    }
}

/// 只接受顶层为对象的 JSON
fn decode_object(text: &str) -> Result<RawVerdict, String> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    if !value.is_object() {
        return Err("顶层不是 JSON 对象".to_string());
    }
    serde_json::from_value(value).map_err(|e| e.to_string())
}

/// 返回内容修复器
#[derive(Debug, Clone, Copy)]
pub struct ResponseSanitizer {
    duplicate_threshold: f64,
}

impl ResponseSanitizer {
    pub fn new(duplicate_threshold: f64) -> Self {
        Self {
            duplicate_threshold,
        }
    }

    /// 解析 LLM 返回内容
    ///
    /// # 参数
    /// - `raw`: LLM 原始返回文本
    /// - `lexical`: 这对题目的词法分数，`score` 缺失时使用
    ///
    /// # 返回
    /// 修复后仍无法解析时返回 `JudgeError::MalformedOutput`
    pub fn parse(&self, raw: &str, lexical: f64) -> Result<SimilarityVerdict, JudgeError> {
        let parsed = self.parse_raw(raw)?;
        Ok(self.fill_defaults(parsed, lexical))
    }

    fn parse_raw(&self, raw: &str) -> Result<RawVerdict, JudgeError> {
        if let Ok(parsed) = decode_object(raw.trim()) {
            return Ok(parsed);
        }

        let repaired = std::panic::catch_unwind(|| repair(raw))
            .map_err(|_| JudgeError::malformed("修复过程异常"))?;
        debug!("修复后的返回内容: {}", repaired);

        decode_object(&repaired).map_err(|e| {
            JudgeError::malformed(format!(
                "无法解析 LLM 返回内容: {} (原文: {})",
                e,
                crate::utils::truncate_text(raw, 120)
            ))
        })
    }

    fn fill_defaults(&self, parsed: RawVerdict, lexical: f64) -> SimilarityVerdict {
        let score = parsed
            .score
            .as_ref()
            .and_then(ScoreValue::as_f64)
            .unwrap_or(lexical);
        let is_same = parsed
            .is_same
            .as_ref()
            .and_then(FlagValue::as_bool)
            .unwrap_or(score > self.duplicate_threshold);
        let reasons = match parsed.reasons {
            Some(ReasonsValue::List(list)) if !list.is_empty() => list,
            Some(ReasonsValue::Single(reason)) if !reason.trim().is_empty() => vec![reason],
            _ => vec![DEFAULT_REASON.to_string()],
        };
        let explanation = parsed
            .explanation
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_EXPLANATION.to_string());

        SimilarityVerdict {
            score,
            is_same,
            reasons,
            explanation,
            source: VerdictSource::Oracle,
        }
    }
}

/// 按固定顺序修复文本
pub fn repair(raw: &str) -> String {
    let text = strip_fences(raw);
    let text = drop_dangling_separators(&text);
    let text = normalize_quotes(&text);
    let text = strip_control_chars(&text);
    let text = balance_brackets(&text);
    isolate_object(&text).to_string()
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    // 模式都是编译期常量
    cell.get_or_init(|| Regex::new(pattern).unwrap_or_else(|e| panic!("非法正则 {pattern}: {e}")))
}

fn strip_fences(text: &str) -> String {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    regex(&FENCE, r"```[A-Za-z0-9_-]*")
        .replace_all(text, "")
        .into_owned()
}

fn drop_dangling_separators(text: &str) -> String {
    static BEFORE_CLOSER: OnceLock<Regex> = OnceLock::new();
    let re = regex(&BEFORE_CLOSER, r",\s*([}\]])");
    let text = map_outside_strings(text, |segment| re.replace_all(segment, "$1").into_owned());
    strip_trailing_separator(&text)
}

fn strip_trailing_separator(text: &str) -> String {
    let trimmed = text.trim_end();
    match trimmed.strip_suffix(',') {
        Some(rest) => rest.trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

fn normalize_quotes(text: &str) -> String {
    static SINGLE_KEY: OnceLock<Regex> = OnceLock::new();
    static SINGLE_VALUE: OnceLock<Regex> = OnceLock::new();
    static SINGLE_ITEM: OnceLock<Regex> = OnceLock::new();
    static BARE_KEY: OnceLock<Regex> = OnceLock::new();
    static PY_TRUE: OnceLock<Regex> = OnceLock::new();
    static PY_FALSE: OnceLock<Regex> = OnceLock::new();
    static PY_NONE: OnceLock<Regex> = OnceLock::new();

    let single_key = regex(&SINGLE_KEY, r#"'([^'"\\]*)'(\s*):"#);
    let single_value = regex(&SINGLE_VALUE, r#":(\s*)'([^'"\\]*)'"#);
    let single_item = regex(&SINGLE_ITEM, r#"([\[,]\s*)'([^'"\\]*)'(\s*[,\]])"#);
    let bare_key = regex(&BARE_KEY, r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*):");
    let py_true = regex(&PY_TRUE, r"\bTrue\b");
    let py_false = regex(&PY_FALSE, r"\bFalse\b");
    let py_none = regex(&PY_NONE, r"\bNone\b");

    // 单引号一改，字符串边界就变了，所以每一步都重新切分
    let mut text = map_outside_strings(text, |s| single_key.replace_all(s, "\"$1\"$2:").into_owned());
    text = map_outside_strings(&text, |s| single_value.replace_all(s, ":$1\"$2\"").into_owned());
    for _ in 0..2 {
        text = map_outside_strings(&text, |s| single_item.replace_all(s, "$1\"$2\"$3").into_owned());
    }
    text = map_outside_strings(&text, |s| bare_key.replace_all(s, "$1\"$2\"$3:").into_owned());
    map_outside_strings(&text, |s| {
        let s = py_true.replace_all(s, "true");
        let s = py_false.replace_all(&s, "false");
        py_none.replace_all(&s, "null").into_owned()
    })
}

fn strip_control_chars(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

fn balance_brackets(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 4);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '{' => {
                stack.push('}');
                out.push(c);
            }
            '[' => {
                stack.push(']');
                out.push(c);
            }
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                    out.push(c);
                } else if stack.contains(&c) {
                    // 中间漏掉的右括号先补上
                    while let Some(closer) = stack.pop() {
                        out.push(closer);
                        if closer == c {
                            break;
                        }
                    }
                }
                // 多余的右括号直接丢弃
            }
            _ => out.push(c),
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    if stack.is_empty() {
        return out;
    }

    let mut out = strip_trailing_separator(&out);
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

fn isolate_object(text: &str) -> &str {
    let Some(start) = text.find('{') else {
        return text.trim();
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &text[start..start + offset + c.len_utf8()];
                }
            }
            _ => {}
        }
    }
    text[start..].trim_end()
}

/// 只对双引号字符串以外的片段做替换
fn map_outside_strings(text: &str, mut f: impl FnMut(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut segment_start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                out.push_str(&text[segment_start..=idx]);
                segment_start = idx + 1;
            }
        } else if c == '"' {
            out.push_str(&f(&text[segment_start..idx]));
            segment_start = idx;
            in_string = true;
        }
    }

    let tail = &text[segment_start..];
    if in_string {
        out.push_str(tail);
    } else {
        out.push_str(&f(tail));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN: &str = r#"{"score": 0.92, "isSame": true, "reasons": ["同一问题", "措辞不同"], "explanation": "两题询问同一概念"}"#;

    fn sanitizer() -> ResponseSanitizer {
        ResponseSanitizer::new(0.85)
    }

    #[test]
    fn test_clean_json_parses() {
        let verdict = sanitizer().parse(CLEAN, 0.3).unwrap();
        assert_eq!(verdict.score, 0.92);
        assert!(verdict.is_same);
        assert_eq!(verdict.reasons, vec!["同一问题", "措辞不同"]);
        assert_eq!(verdict.source, VerdictSource::Oracle);
    }

    #[test]
    fn test_fenced_trailing_comma_missing_brace_matches_clean() {
        let broken = "```json\n{\"score\": 0.92, \"isSame\": true, \"reasons\": [\"同一问题\", \"措辞不同\",], \"explanation\": \"两题询问同一概念\",\n```";
        let expected = sanitizer().parse(CLEAN, 0.3).unwrap();
        assert_eq!(sanitizer().parse(broken, 0.3).unwrap(), expected);
    }

    #[test]
    fn test_prose_around_object_is_removed() {
        let raw = format!("Sure! Here is my judgement:\n{}\nHope this helps.", CLEAN);
        let expected = sanitizer().parse(CLEAN, 0.3).unwrap();
        assert_eq!(sanitizer().parse(&raw, 0.3).unwrap(), expected);
    }

    #[test]
    fn test_single_quotes_and_bare_keys() {
        let raw = "{score: 0.4, 'isSame': False, 'reasons': ['topic differs', 'scope differs'], explanation: 'not the same, really'}";
        let verdict = sanitizer().parse(raw, 0.1).unwrap();
        assert_eq!(verdict.score, 0.4);
        assert!(!verdict.is_same);
        assert_eq!(verdict.reasons, vec!["topic differs", "scope differs"]);
        assert_eq!(verdict.explanation, "not the same, really");
    }

    #[test]
    fn test_commas_and_colons_inside_strings_survive() {
        let raw = r#"{"score": 0.5, "explanation": "note: a, b: c, }",}"#;
        let verdict = sanitizer().parse(raw, 0.1).unwrap();
        assert_eq!(verdict.explanation, "note: a, b: c, }");
    }

    #[test]
    fn test_control_chars_and_unterminated_string() {
        let raw = "{\"score\": 0.7, \"explanation\": \"line one\nline two";
        let verdict = sanitizer().parse(raw, 0.1).unwrap();
        assert_eq!(verdict.score, 0.7);
        assert_eq!(verdict.explanation, "line one line two");
    }

    #[test]
    fn test_missing_fields_are_defaulted() {
        let verdict = sanitizer().parse("{}", 0.9).unwrap();
        assert_eq!(verdict.score, 0.9);
        assert!(verdict.is_same);
        assert_eq!(verdict.reasons, vec![DEFAULT_REASON]);
        assert_eq!(verdict.explanation, DEFAULT_EXPLANATION);

        let verdict = sanitizer().parse(r#"{"score": "0.2"}"#, 0.9).unwrap();
        assert_eq!(verdict.score, 0.2);
        assert!(!verdict.is_same);
    }

    #[test]
    fn test_percentage_score_is_scaled() {
        let verdict = sanitizer().parse(r#"{"score": 88, "is_same": "yes"}"#, 0.0).unwrap();
        assert!((verdict.score - 0.88).abs() < 1e-9);
        assert!(verdict.is_same);

        let verdict = sanitizer().parse(r#"{"score": "1.5%"}"#, 0.0).unwrap();
        assert!((verdict.score - 0.015).abs() < 1e-9);
    }

    #[test]
    fn test_score_slightly_above_one_is_clamped() {
        let verdict = sanitizer().parse(r#"{"score": 1.5}"#, 0.0).unwrap();
        assert_eq!(verdict.score, 1.0);
        assert!(verdict.is_same);
    }

    #[test]
    fn test_top_level_array_is_malformed() {
        for raw in ["[]", "[0.1, true]", "```json\n[0.9, true, [\"a\"], \"b\"]\n```"] {
            assert!(
                matches!(
                    sanitizer().parse(raw, 0.9),
                    Err(JudgeError::MalformedOutput { .. })
                ),
                "应当拒绝: {}",
                raw
            );
        }
    }

    #[test]
    fn test_unrecoverable_output_is_malformed() {
        assert!(matches!(
            sanitizer().parse("I cannot answer that.", 0.5),
            Err(JudgeError::MalformedOutput { .. })
        ));
        assert!(matches!(
            sanitizer().parse("{\"score\": }", 0.5),
            Err(JudgeError::MalformedOutput { .. })
        ));
    }

    #[test]
    fn test_repair_is_idempotent() {
        let broken = "```json\n{'score': 0.6, reasons: ['a',], \"explanation\": \"x\"\n```";
        let once = repair(broken);
        assert_eq!(repair(&once), once);
    }
}
