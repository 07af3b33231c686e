//! 写作风格画像服务 - 业务能力层
//!
//! ## 职责
//! 从示例文档里提取结构化的写作风格画像（语气、句式、版式偏好等），
//! 起草阶段把画像扁平化后拼入提示词，使产出贴近示例文风。
//!
//! ## 失败语义
//! 画像是锦上添花：LLM 返回无法解析时退化为
//! `{"raw_analysis": 原文, "extraction_note": ...}`，流程照常继续。

use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::services::llm_service::TextGenerator;
use crate::services::response_normalizer::extract_json;

/// 画像扁平化时列表最多展示的条目数
const MAX_LIST_ITEMS: usize = 5;

/// 写作风格画像服务
pub struct StyleExtractorService {
    generator: Arc<dyn TextGenerator>,
}

impl StyleExtractorService {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// 分析示例文档，产出风格画像
    ///
    /// 永远返回一个 JSON 对象：解析失败时是带 `raw_analysis` 的兜底对象。
    pub async fn extract_style(&self, example_text: &str) -> Result<Value> {
        let prompt = build_style_prompt(example_text);
        let response = self.generator.generate(&prompt, None).await?;

        match extract_json(&response) {
            Some(profile) if profile.is_object() => {
                info!("✓ 风格画像提取完成");
                Ok(profile)
            }
            _ => {
                warn!("⚠️ 风格画像无法解析为 JSON 对象，保留原始分析文本");
                Ok(json!({
                    "raw_analysis": response.trim(),
                    "extraction_note": "style profile could not be parsed as JSON",
                }))
            }
        }
    }
}

fn build_style_prompt(example_text: &str) -> String {
    format!(
        "You are a writing style analyst. Analyze the example document below and produce \
a structured style profile as a JSON object. Cover at least: tone, sentence structure, \
vocabulary level, paragraph length, formatting preferences (bullets, numbering, headings), \
and any recurring phrases or conventions. Use snake_case keys, and use strings or arrays \
of strings as values.\n\n\
Example document:\n{example_text}\n\n\
Respond with the JSON object only, then the word TERMINATE."
    )
}

/// 把风格画像扁平化为提示词片段
///
/// snake_case 键转 Title Case 标签；嵌套对象缩进两格递归展开；
/// 列表截断到前 {MAX_LIST_ITEMS} 条。
pub fn format_style_guidance(profile: &Value) -> String {
    let mut lines = Vec::new();
    flatten_value(profile, 0, &mut lines);
    lines.join("\n")
}

fn flatten_value(value: &Value, depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                let label = title_case_key(key);
                match val {
                    Value::Object(_) => {
                        lines.push(format!("{indent}{label}:"));
                        flatten_value(val, depth + 1, lines);
                    }
                    Value::Array(items) => {
                        lines.push(format!("{indent}{label}:"));
                        for item in items.iter().take(MAX_LIST_ITEMS) {
                            lines.push(format!("{indent}  - {}", scalar_text(item)));
                        }
                        if items.len() > MAX_LIST_ITEMS {
                            lines.push(format!(
                                "{indent}  - ... ({} more)",
                                items.len() - MAX_LIST_ITEMS
                            ));
                        }
                    }
                    scalar => {
                        lines.push(format!("{indent}{label}: {}", scalar_text(scalar)));
                    }
                }
            }
        }
        other => lines.push(format!("{indent}{}", scalar_text(other))),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn title_case_key(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_style_guidance_flattens_nested_profile() {
        let profile = json!({
            "tone": "formal",
            "sentence_structure": {
                "average_length": "medium",
                "voice": "active"
            }
        });
        let text = format_style_guidance(&profile);
        assert!(text.contains("Tone: formal"));
        assert!(text.contains("Sentence Structure:"));
        assert!(text.contains("  Average Length: medium"));
        assert!(text.contains("  Voice: active"));
    }

    #[test]
    fn test_format_style_guidance_truncates_long_lists() {
        let profile = json!({
            "recurring_phrases": ["a", "b", "c", "d", "e", "f", "g"]
        });
        let text = format_style_guidance(&profile);
        assert!(text.contains("- e"));
        assert!(!text.contains("- f\n"));
        assert!(text.contains("(2 more)"));
    }

    #[test]
    fn test_title_case_key() {
        assert_eq!(title_case_key("sentence_structure"), "Sentence Structure");
        assert_eq!(title_case_key("tone"), "Tone");
    }
}
