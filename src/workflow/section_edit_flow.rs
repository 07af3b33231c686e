//! 章节定向改写流程 - 流程层
//!
//! 核心职责：定义"一个章节"按用户方向改写的完整流程
//!
//! 流程顺序：
//! 1. 分析原文结构（词数 / 段落数 / 是否列表体）
//! 2. LLM 生成检索查询，在允许的来源范围内检索
//! 3. LLM 按用户方向改写，要求保持原文结构
//! 4. 解析改写结果并做结构漂移检查
//!
//! 任一环节产出不可用时回退为原文，绝不让单个章节拖垮整次改写。

use anyhow::Result;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{info, warn};

use crate::infrastructure::{Snippet, VectorStore};
use crate::models::state::SectionEditJob;
use crate::services::response_normalizer::{extract_record, strip_terminate, RAW_TEXT_KEY};
use crate::services::TextGenerator;
use crate::workflow::section_ctx::SectionCtx;

/// 提示词里整篇文档上下文的截断长度（字符）
const DOCUMENT_CONTEXT_LIMIT: usize = 5000;

/// 原文结构特征
///
/// 改写前测量一次，既进提示词（结构约束），也用于事后漂移检查。
#[derive(Debug, Clone, Copy)]
struct ContentShape {
    word_count: usize,
    paragraph_count: usize,
    has_bullets: bool,
}

/// 单个章节的改写结果
///
/// 改写输出是 `{title, content}` 两字段记录：模型可以在改写正文的
/// 同时调整章节标题，重组阶段按这里的标题输出。
#[derive(Debug, Clone)]
pub struct EditOutcome {
    /// 改写后的标题；模型未给出时回退为原标题
    pub title: String,
    /// 改写后的正文；回退时等于原文
    pub content: String,
    /// 是否真正发生了改写（正文或标题任一变化）
    pub modified: bool,
}

/// 章节定向改写流程
///
/// - 编排单个章节的检索与改写
/// - 不持有语料资源（store 由编排层传入）
/// - 只依赖业务能力（services）
pub struct SectionEditFlow {
    generator: Arc<dyn TextGenerator>,
    verbose_logging: bool,
}

impl SectionEditFlow {
    pub fn new(generator: Arc<dyn TextGenerator>, verbose_logging: bool) -> Self {
        Self {
            generator,
            verbose_logging,
        }
    }

    /// 执行完整的单章节改写流程
    pub async fn run(
        &self,
        store: &VectorStore,
        job: &SectionEditJob,
        ctx: &SectionCtx,
    ) -> Result<EditOutcome> {
        let shape = measure_shape(&job.original_content);
        if self.verbose_logging {
            info!(
                "{} 原文结构: {} 词 / {} 段 / 列表体={}",
                ctx, shape.word_count, shape.paragraph_count, shape.has_bullets
            );
        }

        // ========== 步骤 1: 检索支撑材料 ==========
        info!("{} 🔍 为改写生成检索查询...", ctx);
        let query = self.formulate_query(job).await?;
        let scope = store.scope(&job.allowed_sources);
        let snippets = store.search(&scope, &query).await?;
        info!("{} ✓ 检索到 {} 个相关片段", ctx, snippets.len());

        // ========== 步骤 2: 改写 ==========
        let prompt = build_edit_prompt(job, shape, &snippets);
        let response = self.generator.generate(&prompt, None).await?;

        // ========== 步骤 3: 解析与漂移检查 ==========
        match parse_edited_content(&response) {
            Some((new_title, content)) => {
                check_drift(ctx, shape, &content);
                let title = new_title.unwrap_or_else(|| job.section_title.clone());
                let modified = content != job.original_content || title != job.section_title;
                if modified {
                    info!("{} ✓ 改写完成", ctx);
                } else {
                    info!("{} 改写结果与原文一致", ctx);
                }
                Ok(EditOutcome {
                    title,
                    content,
                    modified,
                })
            }
            None => {
                warn!("{} ⚠️ 改写结果为空或无法解析，保留原文", ctx);
                Ok(EditOutcome {
                    title: job.section_title.clone(),
                    content: job.original_content.clone(),
                    modified: false,
                })
            }
        }
    }

    async fn formulate_query(&self, job: &SectionEditJob) -> Result<String> {
        let prompt = format!(
            "You are about to revise the report section \"{}\" according to this direction:\n\
{}\n\n\
Formulate ONE short search query (a phrase, not a sentence) to retrieve supporting \
passages from the reference documents. Respond with the query only.",
            job.section_title, job.user_direction
        );
        let response = self.generator.generate(&prompt, None).await?;
        let query = strip_terminate(&response).trim().trim_matches('"').to_string();
        if query.is_empty() || query.chars().count() > 200 {
            Ok(job.user_direction.clone())
        } else {
            Ok(query)
        }
    }
}

fn measure_shape(content: &str) -> ContentShape {
    let word_count = content.split_whitespace().count();
    let paragraph_count = content
        .split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .count()
        .max(1);
    let has_bullets = content.lines().any(|l| {
        let l = l.trim_start();
        l.starts_with("- ") || l.starts_with("* ") || l.starts_with("• ")
    });
    ContentShape {
        word_count,
        paragraph_count,
        has_bullets,
    }
}

fn build_edit_prompt(job: &SectionEditJob, shape: ContentShape, snippets: &[Snippet]) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "You are revising one section of an existing report. Revise ONLY the section \
\"{}\" according to the user's direction, keeping its role in the document intact.\n\n",
        job.section_title
    ));

    prompt.push_str(&format!("User direction: {}\n\n", job.user_direction));
    prompt.push_str(&format!("Current section content:\n{}\n\n", job.original_content));

    // 结构约束：篇幅 ±20%，段落数不变，列表体保持列表体
    let min_words = shape.word_count * 4 / 5;
    let max_words = shape.word_count * 6 / 5;
    prompt.push_str(&format!(
        "Structural requirements:\n\
- Keep the length between {} and {} words (original: {} words)\n\
- Keep exactly {} paragraph(s)\n",
        min_words, max_words, shape.word_count, shape.paragraph_count
    ));
    if shape.has_bullets {
        prompt.push_str("- The original uses bullet points; keep a bulleted structure\n");
    }

    if !snippets.is_empty() {
        prompt.push_str("\nRelevant reference passages:\n");
        for (i, s) in snippets.iter().enumerate() {
            prompt.push_str(&format!("[{}] (from {})\n{}\n\n", i + 1, s.source, s.text));
        }
    }

    let context: String = job
        .full_document_context
        .chars()
        .take(DOCUMENT_CONTEXT_LIMIT)
        .collect();
    prompt.push_str(&format!(
        "\nFull document context (may be truncated):\n{context}\n"
    ));

    prompt.push_str(&format!(
        "\nRespond with a JSON object: {{\"title\": \"{}\", \"content\": \"<revised section text>\"}} \
then the word TERMINATE.",
        job.section_title
    ));
    prompt
}

/// 从改写响应中取出 `{title, content}` 记录
///
/// 正文优先取 JSON 里的 `content` 键；退化对象则取 `raw_text`；
/// 两者都为空时返回 None，由调用方回退原文。
/// 标题缺省或为空时返回 None，由调用方沿用原标题。
fn parse_edited_content(response: &str) -> Option<(Option<String>, String)> {
    let record = extract_record(response);
    let content = record
        .get("content")
        .and_then(JsonValue::as_str)
        .or_else(|| record.get(RAW_TEXT_KEY).and_then(JsonValue::as_str))
        .map(str::trim)
        .unwrap_or("");
    if content.is_empty() {
        return None;
    }
    let title = record
        .get("title")
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    Some((title, content.to_string()))
}

/// 结构漂移检查：超出约束只告警不拦截
///
/// 约束与提示词一致：篇幅 ±20%，段落数不变。
fn check_drift(ctx: &SectionCtx, original: ContentShape, revised: &str) {
    let revised_shape = measure_shape(revised);
    if word_count_drifted(original.word_count, revised_shape.word_count) {
        warn!(
            "{} ⚠️ 改写后篇幅超出 ±20% 约束: {} 词 -> {} 词",
            ctx, original.word_count, revised_shape.word_count
        );
    }
    if revised_shape.paragraph_count != original.paragraph_count {
        warn!(
            "{} ⚠️ 改写后段落数变化: {} 段 -> {} 段",
            ctx, original.paragraph_count, revised_shape.paragraph_count
        );
    }
}

/// 词数是否超出原文的 ±20%
fn word_count_drifted(original: usize, revised: usize) -> bool {
    if original == 0 {
        return false;
    }
    let ratio = revised as f64 / original as f64;
    !(0.8..=1.2).contains(&ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_shape() {
        let text = "First paragraph with five words here.\n\n- bullet one\n- bullet two";
        let shape = measure_shape(text);
        assert_eq!(shape.paragraph_count, 2);
        assert!(shape.has_bullets);
        assert_eq!(shape.word_count, 12);
    }

    #[test]
    fn test_parse_edited_content_from_json() {
        let response = r#"{"title": "Scope", "content": "Revised text."} TERMINATE"#;
        assert_eq!(
            parse_edited_content(response),
            Some((Some("Scope".to_string()), "Revised text.".to_string()))
        );
    }

    #[test]
    fn test_parse_edited_content_falls_back_to_raw_text() {
        let response = "Just plain prose output without JSON. TERMINATE";
        // 退化对象没有标题，标题交由调用方沿用原值
        assert_eq!(
            parse_edited_content(response),
            Some((None, "Just plain prose output without JSON.".to_string()))
        );
    }

    #[test]
    fn test_parse_edited_content_empty_is_none() {
        assert_eq!(parse_edited_content("   "), None);
        assert_eq!(parse_edited_content(r#"{"title": "x", "content": ""}"#), None);
    }

    #[test]
    fn test_parse_edited_content_blank_title_is_dropped() {
        let response = r#"{"title": "  ", "content": "Body."}"#;
        assert_eq!(
            parse_edited_content(response),
            Some((None, "Body.".to_string()))
        );
    }

    #[test]
    fn test_word_count_drift_bounds() {
        // ±20% 区间内不告警
        assert!(!word_count_drifted(100, 80));
        assert!(!word_count_drifted(100, 120));
        // 超出立即告警
        assert!(word_count_drifted(100, 79));
        assert!(word_count_drifted(100, 121));
        // 原文为空无从比较
        assert!(!word_count_drifted(0, 50));
    }
}
