//! 生成输出规整 - 业务能力层
//!
//! LLM 返回的"结构化"输出常常混着 markdown 代码栅栏、客套前缀、
//! 收尾标记。这里把各种形态的脏输出尽力还原成 JSON：
//! 直接解析 -> 提取最外层花括号片段 -> 剥栅栏与前缀后重试。
//! 全部失败时返回带诊断键的包装对象，绝不抛错——
//! 每个调用方都必须把"解析失败"当作可恢复情况处理。

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::warn;

/// 提示词约定的收尾标记
const TERMINATE_MARKER: &str = "TERMINATE";

/// 解析失败时包装原始文本用的诊断键
pub const RAW_TEXT_KEY: &str = "raw_text";

/// 常见的客套前缀，剥掉后再尝试解析
const BOILERPLATE_PREFIXES: [&str; 10] = [
    "here is the result:",
    "here's the output:",
    "output:",
    "result:",
    "json:",
    "here is the rewritten section:",
    "rewritten section:",
    "here's the updated content:",
    "updated content:",
    "here is the modified section:",
];

fn brace_span_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // 最外层花括号片段（容忍一层嵌套，配合解析校验使用）
    RE.get_or_init(|| {
        Regex::new(r"(?s)\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").expect("花括号片段正则不合法")
    })
}

fn code_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```[\w]*\n?").expect("代码栅栏正则不合法"))
}

/// 去掉收尾标记及其后的所有内容
pub fn strip_terminate(text: &str) -> &str {
    match text.find(TERMINATE_MARKER) {
        Some(idx) => text[..idx].trim_end(),
        None => text,
    }
}

/// 从任意生成文本中提取一个 JSON 值
///
/// 依次尝试：直接解析、花括号片段、剥栅栏与前缀后重试。
/// 找不到合法 JSON 时返回 None。
pub fn extract_json(text: &str) -> Option<Value> {
    let text = strip_terminate(text).trim();

    // 1. 直接解析
    if let Ok(v) = serde_json::from_str::<Value>(text) {
        return Some(v);
    }

    // 2. 提取花括号片段
    if let Some(v) = parse_brace_span(text) {
        return Some(v);
    }

    // 3. 剥掉代码栅栏与客套前缀再试
    let cleaned = strip_markup(text);
    if let Ok(v) = serde_json::from_str::<Value>(&cleaned) {
        return Some(v);
    }
    parse_brace_span(&cleaned)
}

/// 提取一个结构化记录（JSON 对象）
///
/// 解析失败时返回 `{"raw_text": <清理后的文本>}` 包装对象，由
/// 调用方决定兜底策略（沿用原内容 / 空表 / 原样展示）。
pub fn extract_record(text: &str) -> Value {
    match extract_json(text) {
        Some(Value::Object(map)) => Value::Object(map),
        Some(other) => {
            warn!("生成输出是合法 JSON 但不是对象: {}", other);
            fallback_record(text)
        }
        None => {
            warn!(
                "无法从生成输出中提取 JSON，返回原始文本包装: {}",
                crate::utils::logging::truncate_text(text, 80)
            );
            fallback_record(text)
        }
    }
}

fn fallback_record(text: &str) -> Value {
    let cleaned = strip_markup(strip_terminate(text));
    serde_json::json!({ RAW_TEXT_KEY: cleaned })
}

fn parse_brace_span(text: &str) -> Option<Value> {
    for m in brace_span_re().find_iter(text) {
        if let Ok(v) = serde_json::from_str::<Value>(m.as_str()) {
            return Some(v);
        }
    }
    None
}

/// 剥掉代码栅栏与客套前缀
fn strip_markup(text: &str) -> String {
    let text = code_fence_re().replace_all(text, "");
    let mut text = text.trim().to_string();
    loop {
        let lower = text.to_lowercase();
        let mut stripped = false;
        for prefix in BOILERPLATE_PREFIXES {
            if lower.starts_with(prefix) {
                text = text[prefix.len()..].trim_start().to_string();
                stripped = true;
                break;
            }
        }
        if !stripped {
            break;
        }
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_json() {
        let v = extract_record(r#"{"title":"A","content":"B"}"#);
        assert_eq!(v["title"], "A");
        assert_eq!(v["content"], "B");
    }

    #[test]
    fn test_fenced_json() {
        let v = extract_record("```json\n{\"title\":\"A\",\"content\":\"B\"}\n```");
        assert_eq!(v["title"], "A");
        assert_eq!(v["content"], "B");
    }

    #[test]
    fn test_json_with_preamble_and_terminate() {
        let v = extract_record(
            "Here is the result:\n{\"title\": \"Scope\", \"content\": \"text\"}\nTERMINATE",
        );
        assert_eq!(v["title"], "Scope");
    }

    #[test]
    fn test_embedded_brace_span() {
        let v = extract_record("Sure, here you go {\"title\":\"T\",\"content\":\"C\"} hope it helps");
        assert_eq!(v["title"], "T");
    }

    #[test]
    fn test_nested_object() {
        let v = extract_record(r#"{"writing_style": {"tone": "formal"}, "other": 1}"#);
        assert_eq!(v["writing_style"]["tone"], "formal");
    }

    #[test]
    fn test_no_json_falls_back_without_raising() {
        let v = extract_record("I could not produce structured output, sorry.");
        assert!(v[RAW_TEXT_KEY].is_string());
        assert!(v[RAW_TEXT_KEY]
            .as_str()
            .unwrap()
            .contains("could not produce"));
    }

    #[test]
    fn test_strip_terminate() {
        assert_eq!(strip_terminate("content here\nTERMINATE"), "content here");
        assert_eq!(strip_terminate("no marker"), "no marker");
    }
}
