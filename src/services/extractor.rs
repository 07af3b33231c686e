//! 事实抽取服务 - 业务能力层
//!
//! ## 职责
//! 对每一份来源文本调用一次 LLM，按该来源负责的章节标题
//! 抽取结构化事实（键值映射），供后续起草阶段引用。
//!
//! ## 失败语义
//! 单个来源解析失败不终止流程：记录警告并给出空映射，
//! 起草阶段对缺失事实自行兜底。

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::{info, warn};

use crate::models::section::{SectionMap, SectionNode};
use crate::models::state::SourceExtraction;
use crate::services::llm_service::TextGenerator;
use crate::services::response_normalizer::extract_json;

/// 抽取结果里必须出现的公司名事实键
pub const COMPANY_NAME_FACT: &str = "Company Name";

/// 事实抽取服务
///
/// 不持有连接资源，仅依赖注入的文本生成能力。
pub struct ExtractorService {
    generator: Arc<dyn TextGenerator>,
}

impl ExtractorService {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// 针对单个来源执行一次抽取
    ///
    /// `source_id` 对应章节树里 `source` 字段的取值；
    /// 只有声明使用该来源的章节标题会进入提示词。
    pub async fn extract_source(
        &self,
        source_id: &str,
        source_text: &str,
        sections: &SectionMap,
    ) -> Result<SourceExtraction> {
        let titles = collect_titles_for_source(sections, source_id);
        if titles.is_empty() {
            info!("来源 '{}' 没有关联章节，跳过抽取", source_id);
            return Ok(SourceExtraction::new());
        }

        let prompt = build_extraction_prompt(&titles, source_text);
        let response = self.generator.generate(&prompt, None).await?;

        match parse_extraction(&response, &titles) {
            Some(extraction) => {
                info!(
                    "✓ 来源 '{}' 抽取完成，覆盖 {} 个章节",
                    source_id,
                    extraction.len()
                );
                Ok(extraction)
            }
            None => {
                warn!("⚠️ 来源 '{}' 的抽取结果无法解析为 JSON 对象，按空结果处理", source_id);
                Ok(SourceExtraction::new())
            }
        }
    }

    /// 从合并后的抽取结果里找公司名
    ///
    /// 任意章节映射里出现 `Company Name` 即采用，取第一处。
    pub fn get_company_name(extractions: &[SourceExtraction]) -> Option<String> {
        for extraction in extractions {
            for facts in extraction.values() {
                if let Some(Value::String(name)) = facts.get(COMPANY_NAME_FACT) {
                    let name = name.trim();
                    if !name.is_empty() {
                        return Some(name.to_string());
                    }
                }
            }
        }
        None
    }
}

/// 收集声明使用指定来源的全部章节标题（先序）
pub fn collect_titles_for_source(sections: &SectionMap, source_id: &str) -> Vec<String> {
    fn walk(nodes: &SectionMap, source_id: &str, out: &mut Vec<String>) {
        for node in nodes.values() {
            collect_node(node, source_id, out);
        }
    }
    fn collect_node(node: &SectionNode, source_id: &str, out: &mut Vec<String>) {
        if node.source == source_id {
            out.push(node.title.clone());
        }
        walk(&node.subsections, source_id, out);
    }

    let mut titles = Vec::new();
    walk(sections, source_id, &mut titles);
    titles
}

fn build_extraction_prompt(titles: &[String], source_text: &str) -> String {
    let title_list = titles
        .iter()
        .map(|t| format!("- {t}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a fact extraction specialist. Extract key facts from the source document \
below for each of the following report sections:\n\n{title_list}\n\n\
Return a single JSON object. Each section title above must appear as a top-level key, \
mapped to an object of fact names and values relevant to that section. If the document \
has no literal heading for a section, infer which facts belong to it from context. \
Always include a \"{COMPANY_NAME_FACT}\" fact in at least one section when the document \
names the company. Do not invent facts that are not supported by the document.\n\n\
Source document:\n{source_text}\n\n\
Respond with the JSON object only, then the word TERMINATE."
    )
}

/// 把 LLM 响应解析为"章节标题 -> 事实映射"
///
/// 顶层值不是对象的条目会被丢弃；整体不是对象时返回 None。
fn parse_extraction(response: &str, titles: &[String]) -> Option<SourceExtraction> {
    let value = extract_json(response)?;
    let obj = value.as_object()?;

    let mut extraction = SourceExtraction::new();
    for (key, val) in obj {
        match val {
            Value::Object(facts) => {
                extraction.insert(key.clone(), facts.clone());
            }
            other => {
                warn!("抽取结果里 '{}' 的值不是对象（{}），丢弃", key, value_kind(other));
            }
        }
    }

    // 模型偶尔漏掉个别章节键，补上空映射保持形状稳定
    for title in titles {
        if !extraction.contains_key(title) {
            extraction.insert(title.clone(), serde_json::Map::new());
        }
    }
    Some(extraction)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sections_fixture() -> SectionMap {
        let template = json!({
            "Executive Summary": {"title": "Executive Summary", "source": "overview"},
            "Financials": {
                "title": "Financials",
                "source": "finance",
                "subsections": {
                    "Revenue": {"title": "Revenue", "source": "finance"}
                }
            }
        });
        serde_json::from_value(template).unwrap()
    }

    #[test]
    fn test_collect_titles_for_source() {
        let sections = sections_fixture();
        assert_eq!(
            collect_titles_for_source(&sections, "finance"),
            vec!["Financials".to_string(), "Revenue".to_string()]
        );
        assert_eq!(
            collect_titles_for_source(&sections, "overview"),
            vec!["Executive Summary".to_string()]
        );
        assert!(collect_titles_for_source(&sections, "missing").is_empty());
    }

    #[test]
    fn test_parse_extraction_fills_missing_titles() {
        let titles = vec!["Financials".to_string(), "Revenue".to_string()];
        let response = r#"{"Financials": {"Company Name": "Acme"}} TERMINATE"#;
        let extraction = parse_extraction(response, &titles).unwrap();
        assert_eq!(extraction["Financials"]["Company Name"], "Acme");
        assert!(extraction["Revenue"].is_empty());
    }

    #[test]
    fn test_parse_extraction_drops_non_object_values() {
        let titles = vec!["Financials".to_string()];
        let response = r#"{"Financials": {"k": "v"}, "stray": "not an object"}"#;
        let extraction = parse_extraction(response, &titles).unwrap();
        assert!(extraction.contains_key("Financials"));
        assert!(!extraction.contains_key("stray"));
    }

    #[test]
    fn test_parse_extraction_rejects_non_object() {
        assert!(parse_extraction("just prose, no json", &[]).is_none());
    }

    #[test]
    fn test_get_company_name() {
        let mut a = SourceExtraction::new();
        a.insert("Intro".into(), serde_json::Map::new());
        let mut b = SourceExtraction::new();
        let mut facts = serde_json::Map::new();
        facts.insert(COMPANY_NAME_FACT.into(), json!("Acme Corp"));
        b.insert("Financials".into(), facts);

        assert_eq!(
            ExtractorService::get_company_name(&[a.clone(), b]),
            Some("Acme Corp".to_string())
        );
        assert_eq!(ExtractorService::get_company_name(&[a]), None);
    }
}
